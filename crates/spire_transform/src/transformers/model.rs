//! `@model`: stored entity types.
//!
//! Configures the model, generates its inputs, connection and root fields,
//! contributes the data functions of every generated operation and the
//! table, role and data source backing them.

use super::common::{
    add_root_field, ensure_scalar_filter, ensure_shared_types, input_type, is_leaf, is_relation, key_attribute,
    object, object_mut, site_location, sort_argument_name, sort_key_argument,
};
use crate::context::TransformContext;
use crate::model_config::{ModelConfig, ModelOperations, Timestamps};
use crate::names;
use crate::resolver::{Function, Slot};
use crate::templates;
use crate::transformer::Transformer;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{
    Definition, Directive, FieldDefinition, InputObjectType, InputValue, ObjectType, SchemaDocument, TypeRef, Value,
};
use spire_stack::{
    DataSourceKind, DataSourceProps, GlobalIndex, PolicyStatement, Resource, ResourceProps, RoleProps, TableProps,
};
use tracing::debug;

const PLUGIN: &str = "model";
const ARGUMENTS: &[&str] = &["queries", "mutations", "subscriptions", "timestamps"];

/// Owns `@model`
pub struct ModelTransformer;

impl Transformer for ModelTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["model"]
    }

    fn validate(&self, doc: &SchemaDocument, _ctx: &mut TransformContext) -> CompileResult<()> {
        let mut seen = Vec::new();
        for site in doc.directive_sites("model") {
            let location = site_location(&site);
            if site.field_name.is_some() {
                return Err(CompileError::invalid_directive("model", location, "only applies to object types"));
            }
            if names::is_root_type(&site.type_name) {
                return Err(CompileError::invalid_directive(
                    "model",
                    location,
                    "root operation types cannot be models",
                ));
            }
            if seen.contains(&site.type_name) {
                return Err(CompileError::invalid_directive("model", location, "declared more than once"));
            }
            if let Some(arg) = site.directive.arguments.keys().find(|a| !ARGUMENTS.contains(&a.as_str())) {
                return Err(CompileError::invalid_directive(
                    "model",
                    location,
                    format!("unknown argument '{arg}'"),
                ));
            }
            seen.push(site.type_name);
        }
        Ok(())
    }

    fn configure(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for name in doc.objects_with("model") {
            let location = Location::of_type(&name);
            let object = object_mut(&mut doc, &name)?;
            let directive = object
                .directive("model")
                .cloned()
                .ok_or_else(|| CompileError::internal(format!("{name} lost @model")))?;

            let mut config = ModelConfig::new(&name);
            config.operations = parse_operations(&directive, &name, &location)?;
            config.timestamps = parse_timestamps(&directive, &location)?;

            let declares_key = object.fields.iter().any(|f| f.has_directive("primaryKey"));
            if !declares_key && !object.has_field("id") {
                object.fields.insert(0, FieldDefinition::new("id", TypeRef::required("ID")));
            }
            for field in [&config.timestamps.created_at, &config.timestamps.updated_at]
                .into_iter()
                .flatten()
            {
                object.add_field_if_missing(FieldDefinition::new(field, TypeRef::required("AWSDateTime")));
            }

            debug!(plugin = PLUGIN, model = %name, "configured model");
            ctx.models.insert(name, config);
        }
        Ok(doc)
    }

    fn generate_schema(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        if ctx.models.is_empty() {
            return Ok(doc);
        }
        ensure_shared_types(&mut doc);
        let models: Vec<String> = ctx.models.keys().cloned().collect();
        for name in &models {
            let object = object(&doc, name)?.clone();
            let config = ctx.model(name)?.clone();

            add_filter_inputs(&mut doc, ctx, &object, &config);
            add_connection(&mut doc, name);
            add_mutation_inputs(&mut doc, ctx, &object, &config)?;
            add_root_fields(&mut doc, &object, &config)?;

            ctx.model_mut(name)?.fields = object.fields.iter().map(|f| f.name.clone()).collect();
        }
        Ok(doc)
    }

    fn generate_resolvers(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let limit = ctx.list_limit();
        let models: Vec<ModelConfig> = ctx.models.values().cloned().collect();
        for config in &models {
            let object = object(doc, &config.name)?;
            let group = config.name.as_str();
            let data_source = config.data_source_id();
            let key_fields = config.primary_key.fields();
            let ops = &config.operations;

            if let Some(get) = &ops.get {
                let pipeline = ctx.resolvers.pipeline(names::QUERY, get, group);
                pipeline.claim_data_load(
                    Function::new("GetItem", PLUGIN, templates::get_item(&key_fields), templates::get_response())
                        .with_data_source(&data_source),
                )?;
                pipeline.append(Slot::PostDataLoad, shape());
            }

            if let Some(list) = &ops.list {
                let partition = config.primary_key.partition.as_str();
                let request = match sort_argument_name(&config.primary_key.sort) {
                    Some(sort) => format!(
                        "#if( !$util.isNull($ctx.args.{partition}) )\n{}#else\n{}#end\n",
                        templates::query(None, partition, Some(&sort), limit),
                        templates::scan(limit)
                    ),
                    None => templates::scan(limit),
                };
                let pipeline = ctx.resolvers.pipeline(names::QUERY, list, group);
                pipeline.claim_data_load(
                    Function::new("ListItems", PLUGIN, request, templates::result_response())
                        .with_data_source(&data_source),
                )?;
                pipeline.append(Slot::PostDataLoad, shape());
            }

            if let Some(create) = &ops.create {
                let generate_id = config.primary_key.sort.is_empty()
                    && config.primary_key.partition == "id"
                    && object.field("id").is_some_and(|f| f.ty.base_name() == "ID");
                let pipeline = ctx.resolvers.pipeline(names::MUTATION, create, group);
                pipeline.append(
                    Slot::Init,
                    Function::new(
                        "CreateInit",
                        PLUGIN,
                        templates::create_init(&config.defaults, &config.timestamps, generate_id),
                        templates::empty_request(),
                    ),
                );
                pipeline.claim_data_load(
                    Function::new("PutItem", PLUGIN, templates::put_item(&key_fields), templates::result_response())
                        .with_data_source(&data_source),
                )?;
                pipeline.append(Slot::PostDataLoad, shape());
            }

            if let Some(update) = &ops.update {
                let pipeline = ctx.resolvers.pipeline(names::MUTATION, update, group);
                pipeline.claim_data_load(
                    Function::new(
                        "UpdateItem",
                        PLUGIN,
                        templates::update_item(&key_fields, &config.timestamps),
                        templates::result_response(),
                    )
                    .with_data_source(&data_source),
                )?;
                pipeline.append(Slot::PostDataLoad, shape());
            }

            if let Some(delete) = &ops.delete {
                let pipeline = ctx.resolvers.pipeline(names::MUTATION, delete, group);
                pipeline.claim_data_load(
                    Function::new("DeleteItem", PLUGIN, templates::delete_item(&key_fields), templates::result_response())
                        .with_data_source(&data_source),
                )?;
                pipeline.append(Slot::PostDataLoad, shape());
            }

            for subscription in ops.on_create.iter().chain(&ops.on_update).chain(&ops.on_delete) {
                ctx.resolvers.pipeline(names::SUBSCRIPTION, subscription, group).claim_data_load(
                    Function::new(
                        "Subscribe",
                        PLUGIN,
                        templates::subscription_request(),
                        templates::subscription_response(),
                    )
                    .with_data_source(names::NONE_DATA_SOURCE),
                )?;
            }
        }
        Ok(())
    }

    fn generate_resources(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let models: Vec<ModelConfig> = ctx.models.values().cloned().collect();
        for config in &models {
            let object = object(doc, &config.name)?;
            let group = config.name.as_str();
            let table_id = config.table_id();
            let role_id = names::role_id(&config.name);
            let Some(partition_key) = key_attribute(object, std::slice::from_ref(&config.primary_key.partition))
            else {
                return Err(CompileError::internal(format!("{}: empty primary key", config.name)));
            };

            let global_indexes = config
                .indexes
                .iter()
                .filter(|i| i.provisioned)
                .filter_map(|i| {
                    key_attribute(object, std::slice::from_ref(&i.partition)).map(|partition_key| GlobalIndex {
                        name: i.name.clone(),
                        partition_key,
                        sort_key: key_attribute(object, &i.sort),
                    })
                })
                .collect();

            ctx.resources.add(Resource::new(
                &table_id,
                group,
                ResourceProps::Table(TableProps {
                    table_name: format!("{}-{}", config.name, ctx.config.api_name),
                    partition_key,
                    sort_key: key_attribute(object, &config.primary_key.sort),
                    global_indexes,
                    billing_mode: "PAY_PER_REQUEST".to_string(),
                    stream_enabled: config.searchable.is_some(),
                    point_in_time_recovery: false,
                    ttl_attribute: None,
                }),
            ))?;

            ctx.resources.add(
                Resource::new(
                    &role_id,
                    group,
                    ResourceProps::Role(RoleProps {
                        role_name: format!("{}IAMRole", config.name),
                        assumed_by: "appsync.amazonaws.com".to_string(),
                        statements: vec![PolicyStatement {
                            actions: [
                                "dynamodb:BatchGetItem",
                                "dynamodb:BatchWriteItem",
                                "dynamodb:PutItem",
                                "dynamodb:DeleteItem",
                                "dynamodb:GetItem",
                                "dynamodb:Scan",
                                "dynamodb:Query",
                                "dynamodb:UpdateItem",
                            ]
                            .iter()
                            .map(|a| (*a).to_string())
                            .collect(),
                            resources: vec![table_id.clone(), format!("{table_id}/index/*")],
                        }],
                    }),
                )
                .with_reference(&table_id),
            )?;

            ctx.resources.add(
                Resource::new(
                    config.data_source_id(),
                    group,
                    ResourceProps::DataSource(DataSourceProps {
                        name: config.data_source_id(),
                        kind: DataSourceKind::Table,
                        target: Some(table_id.clone()),
                    }),
                )
                .with_reference(names::API_RESOURCE)
                .with_reference(&table_id)
                .with_reference(&role_id),
            )?;
        }
        Ok(())
    }
}

fn shape() -> Function {
    Function::new("ShapeResult", PLUGIN, templates::empty_request(), templates::previous_result())
}

fn operation_name(
    value: &Value,
    key: &str,
    location: &Location,
) -> CompileResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(name) | Value::Enum(name) if spire_core::naming::is_valid_name(name) => Ok(Some(name.clone())),
        _ => Err(CompileError::invalid_directive(
            "model",
            location.clone(),
            format!("'{key}' must be a field name or null"),
        )),
    }
}

fn parse_group(
    directive: &Directive,
    argument: &str,
    keys: &[&str],
    defaults: &[Option<String>],
    location: &Location,
) -> CompileResult<Vec<Option<String>>> {
    match directive.argument(argument) {
        None => Ok(defaults.to_vec()),
        Some(Value::Null) => Ok(vec![None; keys.len()]),
        Some(Value::Object(map)) => {
            if let Some(unknown) = map.keys().find(|k| !keys.contains(&k.as_str())) {
                return Err(CompileError::invalid_directive(
                    "model",
                    location.clone(),
                    format!("unknown key '{unknown}' in '{argument}'"),
                ));
            }
            keys.iter()
                .map(|key| match map.get(*key) {
                    Some(value) => operation_name(value, key, location),
                    None => Ok(None),
                })
                .collect()
        }
        Some(_) => Err(CompileError::invalid_directive(
            "model",
            location.clone(),
            format!("'{argument}' must be an object or null"),
        )),
    }
}

fn parse_operations(directive: &Directive, model: &str, location: &Location) -> CompileResult<ModelOperations> {
    let defaults = ModelOperations::defaults(model);
    let queries = parse_group(
        directive,
        "queries",
        &["get", "list"],
        &[defaults.get.clone(), defaults.list.clone()],
        location,
    )?;
    let mutations = parse_group(
        directive,
        "mutations",
        &["create", "update", "delete"],
        &[defaults.create.clone(), defaults.update.clone(), defaults.delete.clone()],
        location,
    )?;

    let mut ops = ModelOperations {
        get: queries[0].clone(),
        list: queries[1].clone(),
        create: mutations[0].clone(),
        update: mutations[1].clone(),
        delete: mutations[2].clone(),
        on_create: Vec::new(),
        on_update: Vec::new(),
        on_delete: Vec::new(),
    };

    let default_subscriptions = |ops: &mut ModelOperations| {
        if ops.create.is_some() {
            ops.on_create = defaults.on_create.clone();
        }
        if ops.update.is_some() {
            ops.on_update = defaults.on_update.clone();
        }
        if ops.delete.is_some() {
            ops.on_delete = defaults.on_delete.clone();
        }
    };

    match directive.argument("subscriptions") {
        None => default_subscriptions(&mut ops),
        Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            match map.get("level").and_then(Value::as_str) {
                Some("off") => return finish(ops, location),
                Some("public" | "on") | None => {}
                Some(other) => {
                    return Err(CompileError::invalid_directive(
                        "model",
                        location.clone(),
                        format!("unknown subscription level '{other}'"),
                    ));
                }
            }
            let explicit: Vec<(&String, &Value)> = map.iter().filter(|(k, _)| k.as_str() != "level").collect();
            if explicit.is_empty() {
                default_subscriptions(&mut ops);
            }
            for (key, value) in explicit {
                let target = match key.as_str() {
                    "onCreate" => &mut ops.on_create,
                    "onUpdate" => &mut ops.on_update,
                    "onDelete" => &mut ops.on_delete,
                    other => {
                        return Err(CompileError::invalid_directive(
                            "model",
                            location.clone(),
                            format!("unknown key '{other}' in 'subscriptions'"),
                        ));
                    }
                };
                *target = value.as_string_list().ok_or_else(|| {
                    CompileError::invalid_directive(
                        "model",
                        location.clone(),
                        format!("'{key}' must be a list of field names"),
                    )
                })?;
            }
        }
        Some(_) => {
            return Err(CompileError::invalid_directive(
                "model",
                location.clone(),
                "'subscriptions' must be an object or null",
            ));
        }
    }

    finish(ops, location)
}

// A subscription can only fire from a mutation that exists
fn finish(ops: ModelOperations, location: &Location) -> CompileResult<ModelOperations> {
    let pairs = [
        (&ops.create, ops.on_create.is_empty()),
        (&ops.update, ops.on_update.is_empty()),
        (&ops.delete, ops.on_delete.is_empty()),
    ];
    if pairs.iter().any(|(mutation, empty)| mutation.is_none() && !empty) {
        return Err(CompileError::invalid_directive(
            "model",
            location.clone(),
            "a subscription names a disabled mutation",
        ));
    }
    Ok(ops)
}

fn parse_timestamps(directive: &Directive, location: &Location) -> CompileResult<Timestamps> {
    let defaults = Timestamps::default();
    let names = parse_group(
        directive,
        "timestamps",
        &["createdAt", "updatedAt"],
        &[defaults.created_at.clone(), defaults.updated_at.clone()],
        location,
    )?;
    // Keys left out of an explicit object keep their default name
    let explicit = directive.argument("timestamps").and_then(Value::as_object);
    let pick = |key: &str, parsed: &Option<String>, default: &Option<String>| match explicit {
        Some(map) if !map.contains_key(key) => default.clone(),
        _ => parsed.clone(),
    };
    Ok(Timestamps {
        created_at: pick("createdAt", &names[0], &defaults.created_at),
        updated_at: pick("updatedAt", &names[1], &defaults.updated_at),
    })
}

fn filter_fields(doc: &mut SchemaDocument, ctx: &TransformContext, object: &ObjectType, skip_key: Option<&ModelConfig>) -> Vec<InputValue> {
    let mut fields = Vec::new();
    for field in &object.fields {
        let base = field.ty.base_name();
        if is_relation(field, ctx) || !is_leaf(doc, base) {
            continue;
        }
        if skip_key.is_some_and(|c| c.primary_key.contains(&field.name)) {
            continue;
        }
        let input = ensure_scalar_filter(doc, base);
        fields.push(InputValue::new(&field.name, TypeRef::named(input)));
    }
    fields
}

fn with_logic(mut input: InputObjectType) -> InputObjectType {
    let name = input.name.clone();
    input = input
        .with_field("and", TypeRef::list_of(TypeRef::named(&name)))
        .with_field("or", TypeRef::list_of(TypeRef::named(&name)))
        .with_field("not", TypeRef::named(&name));
    input
}

fn add_filter_inputs(doc: &mut SchemaDocument, ctx: &TransformContext, object: &ObjectType, config: &ModelConfig) {
    let filter = names::filter_input(&config.name);
    if !doc.has_type(&filter) {
        let mut input = InputObjectType::new(&filter);
        input.fields = filter_fields(doc, ctx, object, None);
        doc.definitions.push(Definition::Input(with_logic(input)));
    }

    let ops = &config.operations;
    let mutates = ops.create.is_some() || ops.update.is_some() || ops.delete.is_some();
    let condition = names::condition_input(&config.name);
    if mutates && !doc.has_type(&condition) {
        let mut input = InputObjectType::new(&condition);
        input.fields = filter_fields(doc, ctx, object, Some(config));
        doc.definitions.push(Definition::Input(with_logic(input)));
    }
}

fn add_connection(doc: &mut SchemaDocument, model: &str) {
    doc.add_if_missing(Definition::Object(
        ObjectType::new(names::connection_type(model))
            .with_field(FieldDefinition::new(
                "items",
                TypeRef::list_of(TypeRef::named(model)).non_null(),
            ))
            .with_field(FieldDefinition::new("nextToken", TypeRef::named("String"))),
    ));
}

fn add_mutation_inputs(
    doc: &mut SchemaDocument,
    ctx: &TransformContext,
    object: &ObjectType,
    config: &ModelConfig,
) -> CompileResult<()> {
    let ops = &config.operations;
    let key = &config.primary_key;
    let timestamps = [&config.timestamps.created_at, &config.timestamps.updated_at];
    let is_timestamp = |name: &str| timestamps.iter().any(|t| t.as_deref() == Some(name));
    let generated_id = key.partition == "id" && key.sort.is_empty();

    let mut create = InputObjectType::new(names::mutation_input("create", &config.name));
    let mut update = InputObjectType::new(names::mutation_input("update", &config.name));
    for field in &object.fields {
        if is_relation(field, ctx) {
            continue;
        }
        let Some(ty) = input_type(doc, ctx, &field.ty) else {
            continue;
        };
        let optional_on_create = config.defaults.contains_key(&field.name)
            || is_timestamp(&field.name)
            || (generated_id && field.name == "id");
        let create_ty = if optional_on_create { ty.clone().nullable() } else { ty.clone() };
        create.fields.push(InputValue::new(&field.name, create_ty));

        let update_ty = if key.contains(&field.name) { ty.non_null() } else { ty.nullable() };
        update.fields.push(InputValue::new(&field.name, update_ty));
    }

    let mut delete = InputObjectType::new(names::mutation_input("delete", &config.name));
    for field in key.fields() {
        let ty = object
            .field(&field)
            .map(|f| f.ty.clone().non_null())
            .ok_or_else(|| CompileError::internal(format!("{}: key field '{field}' missing", config.name)))?;
        delete.fields.push(InputValue::new(&field, ty));
    }

    for (enabled, input) in [(&ops.create, create), (&ops.update, update), (&ops.delete, delete)] {
        if enabled.is_some() {
            doc.add_if_missing(Definition::Input(input));
        }
    }
    Ok(())
}

fn add_root_fields(doc: &mut SchemaDocument, object: &ObjectType, config: &ModelConfig) -> CompileResult<()> {
    let model = config.name.as_str();
    let ops = &config.operations;
    let key = &config.primary_key;

    if let Some(get) = &ops.get {
        let mut field = FieldDefinition::new(get, TypeRef::named(model));
        for key_field in key.fields() {
            let ty = object
                .field(&key_field)
                .map(|f| f.ty.clone().non_null())
                .ok_or_else(|| CompileError::internal(format!("{model}: key field '{key_field}' missing")))?;
            field.arguments.push(InputValue::new(&key_field, ty));
        }
        add_root_field(doc, names::QUERY, field)?;
    }

    if let Some(list) = &ops.list {
        let mut field = FieldDefinition::new(list, TypeRef::named(names::connection_type(model)));
        if let Some(sort) = sort_key_argument(doc, model, object, &key.sort) {
            let partition = object
                .field(&key.partition)
                .map(|f| f.ty.clone().nullable())
                .unwrap_or_else(|| TypeRef::named("ID"));
            field.arguments.push(InputValue::new(&key.partition, partition));
            field.arguments.push(sort);
            field = field.with_argument("sortDirection", TypeRef::named(names::SORT_DIRECTION));
        }
        field = field
            .with_argument("filter", TypeRef::named(names::filter_input(model)))
            .with_argument("limit", TypeRef::named("Int"))
            .with_argument("nextToken", TypeRef::named("String"));
        add_root_field(doc, names::QUERY, field)?;
    }

    for (verb, name) in [("create", &ops.create), ("update", &ops.update), ("delete", &ops.delete)] {
        if let Some(name) = name {
            let field = FieldDefinition::new(name, TypeRef::named(model))
                .with_argument("input", TypeRef::required(names::mutation_input(verb, model)))
                .with_argument("condition", TypeRef::named(names::condition_input(model)));
            add_root_field(doc, names::MUTATION, field)?;
        }
    }

    for (mutation, subscriptions) in [
        (&ops.create, &ops.on_create),
        (&ops.update, &ops.on_update),
        (&ops.delete, &ops.on_delete),
    ] {
        let Some(mutation) = mutation else {
            continue;
        };
        for subscription in subscriptions {
            let field = FieldDefinition::new(subscription, TypeRef::named(model)).with_directive(
                Directive::new("aws_subscribe")
                    .with_argument("mutations", Value::List(vec![Value::String(mutation.clone())])),
            );
            add_root_field(doc, names::SUBSCRIPTION, field)?;
        }
    }
    Ok(())
}
