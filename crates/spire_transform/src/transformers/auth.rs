//! `@auth`: access control matrices and the `auth` slot of every pipeline.
//!
//! Rules are gathered during preprocess so owner and group fields exist
//! before the model inputs are generated. Matrices are resolved once the
//! schema is final, and each pipeline receives the plan for what it does.
//! A pipeline whose plan admits nobody keeps an empty `auth` slot and is
//! recorded as deny-all. Fields that some reader of their type may not read
//! get an auth-only field pipeline, which renders its denial explicitly.

use super::common::{object, object_mut, site_location};
use crate::context::TransformContext;
use crate::model_config::{EdgeKind, ModelConfig};
use crate::names;
use crate::resolver::{Function, Slot};
use crate::templates;
use crate::transformer::Transformer;
use spire_auth::{parse_auth_directive, resolve, AuthPlan, GroupSource, PlanKind, ScopedRule, Strategy};
use spire_core::{AuthProvider, CompileError, CompileResult, Location};
use spire_schema::{Directive, FieldDefinition, SchemaDocument, TypeRef};
use std::collections::BTreeSet;
use tracing::debug;

const PLUGIN: &str = "auth";

/// Owns `@auth`
pub struct AuthTransformer;

impl Transformer for AuthTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["auth"]
    }

    fn preprocess(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        let mut injected: Vec<(String, String, TypeRef)> = Vec::new();
        for site in doc.directive_sites("auth") {
            let location = site_location(&site);
            let is_model = object(&doc, &site.type_name)?.has_directive("model");
            if site.field_name.is_none() && !is_model {
                return Err(CompileError::invalid_auth_rule(
                    location,
                    "type-level @auth only applies to @model types",
                ));
            }
            let rules = parse_auth_directive(&site.directive, &location, &ctx.config, &mut ctx.diagnostics)?;
            for rule in &rules {
                ctx.providers_used.insert(rule.provider);
                match &rule.strategy {
                    Strategy::Owner { owner_field, .. } => {
                        injected.push((site.type_name.clone(), owner_field.clone(), TypeRef::named("String")));
                    }
                    Strategy::Groups {
                        source: GroupSource::Dynamic(field),
                        ..
                    } => {
                        injected.push((
                            site.type_name.clone(),
                            field.clone(),
                            TypeRef::list_of(TypeRef::named("String")),
                        ));
                    }
                    _ => {}
                }
            }
            let scoped = rules.into_iter().map(|rule| match &site.field_name {
                Some(field) => ScopedRule::on_field(rule, field),
                None => ScopedRule::on_type(rule),
            });
            ctx.auth_rules.entry(site.type_name.clone()).or_default().extend(scoped);
        }

        for (type_name, field, ty) in injected {
            let object = object_mut(&mut doc, &type_name)?;
            match object.field(&field) {
                Some(existing) if matches!(existing.ty.base_name(), "String" | "ID") => {}
                Some(existing) => {
                    return Err(CompileError::invalid_auth_rule(
                        Location::of_field(&type_name, &field),
                        format!("'{field}' must be a String or ID to hold identities, found {}", existing.ty),
                    ));
                }
                None => {
                    debug!(plugin = PLUGIN, model = %type_name, field = %field, "injected identity field");
                    object.fields.push(FieldDefinition::new(&field, ty));
                }
            }
        }
        Ok(doc)
    }

    fn generate_schema(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        if ctx.providers_used.len() < 2 {
            return Ok(doc);
        }
        let models: Vec<ModelConfig> = ctx.models.values().cloned().collect();
        for config in &models {
            let providers = rule_providers(ctx, &config.name, None);
            if providers.is_empty() {
                continue;
            }
            annotate(&mut object_mut(&mut doc, &config.name)?.directives, &providers);
            for generated in [names::connection_type(&config.name), names::searchable_connection(&config.name)] {
                if let Some(object) = doc.object_mut(&generated) {
                    annotate(&mut object.directives, &providers);
                }
            }
            for (root, field) in config.root_fields() {
                if let Some(field) = doc.object_mut(root).and_then(|o| o.field_mut(&field)) {
                    annotate(&mut field.directives, &providers);
                }
            }
        }

        let scoped_fields: Vec<(String, String)> = ctx
            .auth_rules
            .iter()
            .flat_map(|(type_name, rules)| {
                rules
                    .iter()
                    .filter_map(|r| r.field.clone())
                    .map(move |field| (type_name.clone(), field))
            })
            .collect();
        for (type_name, field) in scoped_fields {
            let providers = rule_providers(ctx, &type_name, Some(&field));
            if let Some(definition) = doc.object_mut(&type_name).and_then(|o| o.field_mut(&field)) {
                annotate(&mut definition.directives, &providers);
            }
        }
        Ok(doc)
    }

    fn generate_resolvers(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        build_matrices(doc, ctx)?;

        let populate_owner = ctx.config.feature_flags.populate_owner_field_for_static_group_auth;
        let mut guards: Vec<(String, String, Vec<AuthPlan>)> = Vec::new();
        for config in ctx.models.values() {
            let acm = ctx
                .matrices
                .get(&config.name)
                .ok_or_else(|| CompileError::internal(format!("{}: no access control matrix", config.name)))?;
            let ops = &config.operations;
            for (root, field) in config.root_fields() {
                let kind = if root == names::SUBSCRIPTION {
                    PlanKind::Subscription
                } else if Some(&field) == ops.create.as_ref() {
                    PlanKind::Create
                } else if Some(&field) == ops.update.as_ref() {
                    PlanKind::Update
                } else if Some(&field) == ops.delete.as_ref() {
                    PlanKind::Delete
                } else {
                    PlanKind::Query
                };
                let plan = AuthPlan::for_model(acm, kind);
                let plan = if kind == PlanKind::Create {
                    plan.with_populate_owner(populate_owner)
                } else {
                    plan
                };
                guards.push((root.to_string(), field, vec![plan]));
            }

            for edge in config.edges.iter().filter(|e| e.kind != EdgeKind::ManyToMany) {
                let target = ctx.matrices.get(&edge.target_type).ok_or_else(|| {
                    CompileError::internal(format!("{}: no access control matrix", edge.target_type))
                })?;
                let mut plans = Vec::with_capacity(2);
                if acm.needs_field_guard(&edge.source_field) {
                    plans.push(AuthPlan::for_field(acm, &edge.source_field));
                }
                plans.push(AuthPlan::for_model(target, PlanKind::Query));
                guards.push((config.name.clone(), edge.source_field.clone(), plans));
            }
        }

        let claimed: BTreeSet<String> = guards.iter().map(|(t, f, _)| format!("{t}.{f}")).collect();
        let pending: Vec<String> = ctx.resolvers.keys().filter(|k| !claimed.contains(*k)).map(str::to_string).collect();
        for key in pending {
            let Some((type_name, field)) = key.split_once('.') else {
                continue;
            };
            if let Some(acm) = ctx.matrices.get(type_name) {
                guards.push((type_name.to_string(), field.to_string(), vec![AuthPlan::for_field(acm, field)]));
            }
        }

        let mut field_pipelines: Vec<(String, String, AuthPlan)> = Vec::new();
        for (type_name, acm) in &ctx.matrices {
            if names::is_root_type(type_name) {
                continue;
            }
            for field in acm.fields.iter().filter(|f| acm.needs_field_guard(f)) {
                if !ctx.resolvers.contains(type_name, field) {
                    field_pipelines.push((type_name.clone(), field.clone(), AuthPlan::for_field(acm, field)));
                }
            }
        }
        let mut field_guards: BTreeSet<String> = BTreeSet::new();
        for (type_name, field, plan) in field_pipelines {
            field_guards.insert(format!("{type_name}.{field}"));
            ctx.resolvers.pipeline(&type_name, &field, &type_name).claim_data_load(
                Function::new(
                    "ResolveField",
                    PLUGIN,
                    templates::source_field_request(&field),
                    templates::result_response(),
                )
                .with_data_source(names::NONE_DATA_SOURCE),
            )?;
            guards.push((type_name, field, vec![plan]));
        }

        for (type_name, field, plans) in guards {
            let Some(pipeline) = ctx.resolvers.get_mut(&type_name, &field) else {
                continue;
            };
            let key = format!("{type_name}.{field}");
            if let Some(denied) = plans.iter().find(|p| p.is_deny_all()) {
                // field guards deny in the auth slot itself
                if field_guards.contains(&key) {
                    pipeline.append(
                        Slot::Auth,
                        Function::new("Authorize", PLUGIN, denied.render_request(), denied.render_response()),
                    );
                } else {
                    debug!(plugin = PLUGIN, field = %key, "no role admitted; deny all");
                }
                continue;
            }
            for plan in plans {
                pipeline.append(
                    Slot::Auth,
                    Function::new("Authorize", PLUGIN, plan.render_request(), plan.render_response()),
                );
            }
        }
        Ok(())
    }
}

/// Resolve a matrix for every model and every other type carrying field rules
fn build_matrices(doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
    let mut types: Vec<String> = ctx.models.keys().cloned().collect();
    for type_name in ctx.auth_rules.keys() {
        if !types.contains(type_name) {
            types.push(type_name.clone());
        }
    }
    for type_name in types {
        let fields: Vec<String> = object(doc, &type_name)?.fields.iter().map(|f| f.name.clone()).collect();
        let rules = ctx.auth_rules.get(&type_name).map(Vec::as_slice).unwrap_or_default();
        let acm = resolve(&type_name, &fields, rules);
        debug!(
            plugin = PLUGIN,
            model = %type_name,
            roles = acm.roles.len(),
            deny_all = acm.denies_all(),
            "access control matrix"
        );
        ctx.matrices.insert(type_name, acm);
    }
    Ok(())
}

/// Providers named by the rules of a type, or of one of its fields
fn rule_providers(ctx: &TransformContext, type_name: &str, field: Option<&str>) -> BTreeSet<AuthProvider> {
    ctx.auth_rules
        .get(type_name)
        .into_iter()
        .flatten()
        .filter(|r| field.is_none() || r.field.as_deref() == field)
        .map(|r| r.rule.provider)
        .collect()
}

fn annotate(directives: &mut Vec<Directive>, providers: &BTreeSet<AuthProvider>) {
    for provider in providers {
        if !directives.iter().any(|d| d.name == provider.directive_name()) {
            directives.push(Directive::new(provider.directive_name()));
        }
    }
}
