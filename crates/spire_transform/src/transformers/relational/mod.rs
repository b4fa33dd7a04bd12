//! Relationships: `@hasOne`, `@hasMany`, `@belongsTo` and `@manyToMany`.
//!
//! Edges are reconciled in two passes. Validation records every declared edge
//! once all models are known. Configuration then pairs each `@hasMany` and
//! `@hasOne` with the `@belongsTo` pointing back, settles the key fields of
//! every edge and synthesizes the ones the schema leaves out. Many-to-many
//! relations are rewritten into a join model during preprocessing, so both
//! passes only see the other three kinds.

mod join;

use super::common::{RELATION_DIRECTIVES, object, object_mut, site_location};
use crate::context::TransformContext;
use crate::model_config::{EdgeKind, IndexOrigin, KeySide, RelationalEdge, SecondaryIndex};
use crate::names;
use crate::resolver::{Function, Slot};
use crate::templates;
use crate::transformer::Transformer;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{DirectiveSite, FieldDefinition, InputValue, SchemaDocument, TypeRef, Value};
use tracing::debug;

const PLUGIN: &str = "relational";
const DECLARED: [EdgeKind; 3] = [EdgeKind::HasOne, EdgeKind::HasMany, EdgeKind::BelongsTo];

/// Owns the relationship directives
pub struct RelationalTransformer;

impl Transformer for RelationalTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        RELATION_DIRECTIVES
    }

    fn preprocess(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        join::synthesize_join_models(doc, ctx)
    }

    fn validate(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        ctx.edges.retain(|e| e.kind == EdgeKind::ManyToMany);
        let mut declared = Vec::new();
        for kind in DECLARED {
            for site in doc.directive_sites(kind.directive()) {
                declared.push(parse_edge(doc, ctx, &site, kind)?);
            }
        }
        // Keep document order regardless of directive kind
        let position = |edge: &RelationalEdge| {
            doc.objects()
                .position(|t| t.name == edge.source_type)
                .and_then(|t| {
                    doc.object(&edge.source_type)
                        .and_then(|o| o.fields.iter().position(|f| f.name == edge.source_field))
                        .map(|f| (t, f))
                })
        };
        declared.sort_by_key(position);
        ctx.edges.extend(declared);
        Ok(())
    }

    fn configure(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        let respect_sort = ctx.config.feature_flags.respect_primary_key_attributes_on_connection_field;
        let (joins, declared): (Vec<RelationalEdge>, Vec<RelationalEdge>) =
            ctx.edges.iter().cloned().partition(|e| e.kind == EdgeKind::ManyToMany);
        let children: Vec<RelationalEdge> = declared.iter().filter(|e| e.kind == EdgeKind::BelongsTo).cloned().collect();

        // Parents first so a belongsTo can reuse the keys of its pair
        let mut resolved: Vec<(usize, RelationalEdge)> = Vec::with_capacity(declared.len());
        for (i, edge) in declared.iter().enumerate().filter(|(_, e)| e.kind != EdgeKind::BelongsTo) {
            let edge = resolve_parent(&mut doc, ctx, edge.clone(), &children, respect_sort)?;
            resolved.push((i, edge));
        }
        for (i, edge) in declared.iter().enumerate().filter(|(_, e)| e.kind == EdgeKind::BelongsTo) {
            let parents: Vec<&RelationalEdge> = resolved.iter().map(|(_, e)| e).collect();
            let edge = resolve_child(&mut doc, ctx, edge.clone(), &parents, respect_sort)?;
            resolved.push((i, edge));
        }
        resolved.sort_by_key(|(i, _)| *i);

        for join in &joins {
            if let Some(relation) = &join.relation_name {
                ctx.model_mut(relation)?.join_for = Some(relation.clone());
            }
        }
        let mut edges = joins.clone();
        for (_, mut edge) in resolved {
            edge.relation_name = joins
                .iter()
                .find(|j| j.source_type == edge.source_type && j.source_field == edge.source_field)
                .and_then(|j| j.relation_name.clone());
            debug!(
                plugin = PLUGIN,
                edge = %edge.key(),
                kind = edge.kind.directive(),
                keys = ?edge.key_fields,
                "resolved edge"
            );
            ctx.model_mut(&edge.source_type)?.edges.push(edge.clone());
            edges.push(edge);
        }
        ctx.edges = edges;
        Ok(doc)
    }

    fn generate_schema(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for edge in ctx.edges.iter().filter(|e| e.kind == EdgeKind::HasMany) {
            let object = object_mut(&mut doc, &edge.source_type)?;
            let field = object.field_mut(&edge.source_field).ok_or_else(|| {
                CompileError::internal(format!("relationship field {} disappeared", edge.key()))
            })?;
            field.ty = TypeRef::named(names::connection_type(&edge.target_type));
            for (name, ty) in [
                ("filter", TypeRef::named(names::filter_input(&edge.target_type))),
                ("sortDirection", TypeRef::named(names::SORT_DIRECTION)),
                ("limit", TypeRef::named("Int")),
                ("nextToken", TypeRef::named("String")),
            ] {
                if !field.arguments.iter().any(|a| a.name == name) {
                    field.arguments.push(InputValue::new(name, ty));
                }
            }
        }
        Ok(doc)
    }

    fn generate_resolvers(&self, _doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let limit = ctx.list_limit();
        let edges: Vec<RelationalEdge> = ctx.edges.iter().filter(|e| e.kind != EdgeKind::ManyToMany).cloned().collect();
        for edge in &edges {
            let source_key = ctx.model(&edge.source_type)?.primary_key.fields();
            let target_key = ctx.model(&edge.target_type)?.primary_key.fields();
            let data_source = names::data_source_id(&edge.target_type);
            let load = match (edge.key_side, &edge.index) {
                (KeySide::Target, Some(index)) => {
                    let response = if edge.kind == EdgeKind::HasMany {
                        templates::result_response()
                    } else {
                        templates::first_item_response()
                    };
                    Function::new(
                        "QueryRelated",
                        PLUGIN,
                        templates::related_query(index, &edge.key_fields, prefix(&source_key, &edge.key_fields), limit),
                        response,
                    )
                }
                (KeySide::Source, _) => Function::new(
                    "GetRelated",
                    PLUGIN,
                    templates::related_get(&edge.key_fields, prefix(&target_key, &edge.key_fields)),
                    templates::get_response(),
                ),
                (KeySide::Target, None) => {
                    return Err(CompileError::internal(format!("{}: related keys without an index", edge.key())));
                }
            };
            let pipeline = ctx.resolvers.pipeline(&edge.source_type, &edge.source_field, &edge.source_type);
            pipeline.claim_data_load(load.with_data_source(data_source))?;
            pipeline.append(
                Slot::PostDataLoad,
                Function::new("ShapeResult", PLUGIN, templates::empty_request(), templates::previous_result()),
            );
        }
        Ok(())
    }
}

// Leading key fields matched by the relation keys
fn prefix<'a>(key: &'a [String], fields: &[String]) -> &'a [String] {
    &key[..fields.len().min(key.len())]
}

fn parse_edge(
    doc: &SchemaDocument,
    ctx: &TransformContext,
    site: &DirectiveSite,
    kind: EdgeKind,
) -> CompileResult<RelationalEdge> {
    let location = site_location(site);
    let invalid = |reason: String| CompileError::invalid_directive(kind.directive(), location.clone(), reason);

    let Some(field_name) = &site.field_name else {
        return Err(invalid("only applies to fields".to_string()));
    };
    if !ctx.is_model(&site.type_name) {
        return Err(invalid("only applies to fields of @model types".to_string()));
    }
    if let Some(arg) = site.directive.arguments.keys().find(|a| a.as_str() != "references") {
        return Err(invalid(format!("unknown argument '{arg}'")));
    }
    let field = object(doc, &site.type_name)?
        .field(field_name)
        .ok_or_else(|| CompileError::internal(format!("{location} disappeared")))?;
    if RELATION_DIRECTIVES.iter().filter(|d| field.has_directive(d)).count() > 1 {
        return Err(invalid("a field can declare only one relationship".to_string()));
    }

    let target = field.ty.base_name();
    if !ctx.is_model(target) {
        return Err(invalid(format!("related type '{target}' must be a @model type")));
    }
    match kind {
        EdgeKind::HasMany if !field.ty.is_list() => {
            return Err(invalid("@hasMany fields must be lists".to_string()));
        }
        EdgeKind::HasOne | EdgeKind::BelongsTo if field.ty.is_list() => {
            return Err(invalid(format!("@{} fields must not be lists", kind.directive())));
        }
        _ => {}
    }

    let references = match site.directive.argument("references") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => match value.as_string_list() {
            Some(fields) if !fields.is_empty() => fields,
            _ => return Err(invalid("'references' must be a non-empty list of field names".to_string())),
        },
    };
    Ok(RelationalEdge::declared(kind, &site.type_name, field_name, target, references))
}

/// Primary key fields of a model with their base types
fn key_types(doc: &SchemaDocument, ctx: &TransformContext, model: &str) -> CompileResult<Vec<(String, String)>> {
    let object = object(doc, model)?;
    ctx.model(model)?
        .primary_key
        .fields()
        .into_iter()
        .map(|field| {
            let base = object
                .field(&field)
                .map(|f| f.ty.base_name().to_string())
                .ok_or_else(|| CompileError::internal(format!("{model}: key field '{field}' missing")))?;
            Ok((field, base))
        })
        .collect()
}

/// Key fields of an implicit relation: the related key, or its partition alone
fn implicit_key(key: &[(String, String)], respect_sort: bool) -> &[(String, String)] {
    if respect_sort { key } else { &key[..key.len().min(1)] }
}

/// Check explicit reference fields against a key, or synthesize missing implicit ones
fn ensure_key_fields(
    doc: &mut SchemaDocument,
    edge: &RelationalEdge,
    owner: &str,
    fields: &[String],
    key: &[(String, String)],
    explicit: bool,
) -> CompileResult<()> {
    let location = Location::of_field(&edge.source_type, &edge.source_field);
    let invalid = |reason: String| CompileError::invalid_directive(edge.kind.directive(), location.clone(), reason);
    if fields.len() != key.len() {
        return Err(invalid(format!(
            "{} reference field(s) given but the related key has {}",
            fields.len(),
            key.len()
        )));
    }
    let object = object_mut(doc, owner)?;
    for (name, (key_field, base)) in fields.iter().zip(key) {
        match object.field(name) {
            Some(existing) if existing.ty.is_list() || existing.ty.base_name() != base => {
                return Err(invalid(format!(
                    "reference field {owner}.{name} must be a {base} to match key field '{key_field}'"
                )));
            }
            Some(_) => {}
            None => {
                debug!(plugin = PLUGIN, model = %owner, field = %name, explicit, "synthesized key field");
                object.fields.push(FieldDefinition::new(name, TypeRef::named(base)));
            }
        }
    }
    Ok(())
}

/// Index on the related table keyed by the relation keys, reusing an existing one
fn ensure_relation_index(ctx: &mut TransformContext, edge: &RelationalEdge, key: &[String]) -> CompileResult<String> {
    let model = ctx.model_mut(&edge.target_type)?;
    if let Some(existing) = model.indexes.iter().find(|i| i.provisioned && i.keyed_by(key)) {
        return Ok(existing.name.clone());
    }
    let name = names::relation_index(&edge.source_type, &edge.source_field);
    model.indexes.push(SecondaryIndex {
        name: name.clone(),
        partition: key[0].clone(),
        sort: key[1..].to_vec(),
        query_field: None,
        provisioned: true,
        origin: IndexOrigin::Relation,
    });
    Ok(name)
}

fn conflict(edge: &RelationalEdge, pair: &RelationalEdge) -> CompileError {
    CompileError::edge_conflict(
        Location::of_field(&edge.source_type, &edge.source_field),
        format!(
            "references [{}] disagree with [{}] declared by {}",
            edge.references.join(", "),
            pair.references.join(", "),
            pair.key()
        ),
    )
}

fn resolve_parent(
    doc: &mut SchemaDocument,
    ctx: &mut TransformContext,
    mut edge: RelationalEdge,
    children: &[RelationalEdge],
    respect_sort: bool,
) -> CompileResult<RelationalEdge> {
    let pair = children
        .iter()
        .find(|c| c.source_type == edge.target_type && c.target_type == edge.source_type);
    let explicit_pair = pair.filter(|p| !p.references.is_empty());
    if let Some(pair) = explicit_pair {
        if !edge.references.is_empty() && edge.references != pair.references {
            return Err(conflict(&edge, pair));
        }
    }
    let parent_key = key_types(doc, ctx, &edge.source_type)?;

    let references = if edge.references.is_empty() {
        explicit_pair.map(|p| p.references.clone())
    } else {
        Some(edge.references.clone())
    };

    match (edge.kind, references) {
        (_, Some(references)) => {
            ensure_key_fields(doc, &edge, &edge.target_type, &references, &parent_key, true)?;
            edge.index = Some(ensure_relation_index(ctx, &edge, &references)?);
            edge.key_fields = references;
            edge.key_side = KeySide::Target;
        }
        (EdgeKind::HasMany, None) => {
            let key = implicit_key(&parent_key, respect_sort);
            let prefix = names::foreign_key_prefix(&edge.source_type, &edge.source_field);
            let fields: Vec<String> = key.iter().map(|(k, _)| names::foreign_key(&prefix, k)).collect();
            ensure_key_fields(doc, &edge, &edge.target_type, &fields, key, false)?;
            edge.index = Some(ensure_relation_index(ctx, &edge, &fields)?);
            edge.key_fields = fields;
            edge.key_side = KeySide::Target;
        }
        (_, None) => {
            let target_key = key_types(doc, ctx, &edge.target_type)?;
            let key = implicit_key(&target_key, respect_sort);
            let prefix = names::foreign_key_prefix(&edge.source_type, &edge.source_field);
            let fields: Vec<String> = key.iter().map(|(k, _)| names::foreign_key(&prefix, k)).collect();
            ensure_key_fields(doc, &edge, &edge.source_type, &fields, key, false)?;
            edge.key_fields = fields;
            edge.key_side = KeySide::Source;
        }
    }
    Ok(edge)
}

fn resolve_child(
    doc: &mut SchemaDocument,
    ctx: &mut TransformContext,
    mut edge: RelationalEdge,
    parents: &[&RelationalEdge],
    respect_sort: bool,
) -> CompileResult<RelationalEdge> {
    let target_key = key_types(doc, ctx, &edge.target_type)?;
    // A parent storing its keys on this type owns the fields this edge reads
    let pair = parents.iter().find(|p| {
        p.source_type == edge.target_type && p.target_type == edge.source_type && p.key_side == KeySide::Target
    });

    let (fields, explicit) = match pair {
        Some(pair) if !edge.references.is_empty() && !pair.references.is_empty() && pair.references != edge.references => {
            return Err(conflict(&edge, pair));
        }
        _ if !edge.references.is_empty() => (edge.references.clone(), true),
        Some(pair) => (pair.key_fields.clone(), false),
        None => {
            let prefix = names::foreign_key_prefix(&edge.source_type, &edge.source_field);
            let key = implicit_key(&target_key, respect_sort);
            (key.iter().map(|(k, _)| names::foreign_key(&prefix, k)).collect(), false)
        }
    };
    let key = if explicit { &target_key[..] } else { &target_key[..fields.len().min(target_key.len())] };
    ensure_key_fields(doc, &edge, &edge.source_type, &fields, key, explicit)?;
    edge.key_fields = fields;
    edge.key_side = KeySide::Source;
    Ok(edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::index::IndexTransformer;
    use crate::transformers::model::ModelTransformer;
    use crate::transformers::primary_key::PrimaryKeyTransformer;
    use spire_core::{FeatureFlags, TransformConfig};
    use spire_schema::parse_fragments;

    fn run_with(sdl: &str, config: TransformConfig) -> CompileResult<(SchemaDocument, TransformContext)> {
        let doc = parse_fragments(&[sdl]).unwrap();
        let mut ctx = TransformContext::new(config);
        let doc = RelationalTransformer.preprocess(doc, &mut ctx)?;
        let doc = ModelTransformer.configure(doc, &mut ctx)?;
        PrimaryKeyTransformer.validate(&doc, &mut ctx)?;
        let doc = PrimaryKeyTransformer.configure(doc, &mut ctx)?;
        IndexTransformer.validate(&doc, &mut ctx)?;
        let doc = IndexTransformer.configure(doc, &mut ctx)?;
        RelationalTransformer.validate(&doc, &mut ctx)?;
        let doc = RelationalTransformer.configure(doc, &mut ctx)?;
        let doc = ModelTransformer.generate_schema(doc, &mut ctx)?;
        let doc = RelationalTransformer.generate_schema(doc, &mut ctx)?;
        Ok((doc, ctx))
    }

    fn run(sdl: &str) -> CompileResult<(SchemaDocument, TransformContext)> {
        run_with(sdl, TransformConfig::new())
    }

    fn field_count(doc: &SchemaDocument, type_name: &str, field: &str) -> usize {
        doc.object(type_name).map_or(0, |t| t.fields.iter().filter(|f| f.name == field).count())
    }

    #[test]
    fn test_explicit_pair_shares_one_field() {
        for sdl in [
            "type A @model { id: ID! bs: [B] @hasMany(references: [\"aId\"]) } type B @model { id: ID! a: A @belongsTo(references: [\"aId\"]) }",
            "type B @model { id: ID! a: A @belongsTo(references: [\"aId\"]) } type A @model { id: ID! bs: [B] @hasMany(references: [\"aId\"]) }",
        ] {
            let (doc, ctx) = run(sdl).unwrap();
            assert_eq!(field_count(&doc, "B", "aId"), 1);
            assert_eq!(field_count(&doc, "A", "aId"), 0);
            let has_many = ctx.models["A"].edge("bs").unwrap();
            assert_eq!(has_many.key_side, KeySide::Target);
            assert_eq!(has_many.index.as_deref(), Some("gsi-A.bs"));
            assert!(ctx.models["B"].index("gsi-A.bs").is_some());
            assert_eq!(ctx.models["B"].edge("a").unwrap().key_fields, vec!["aId"]);
        }
    }

    #[test]
    fn test_implicit_pair_reuses_parent_key() {
        let (doc, ctx) = run(
            "type Post @model { id: ID! comments: [Comment] @hasMany } type Comment @model { id: ID! post: Post @belongsTo }",
        )
        .unwrap();
        assert!(doc.object("Comment").unwrap().has_field("postCommentsId"));
        assert!(!doc.object("Comment").unwrap().has_field("commentPostId"));
        assert_eq!(ctx.models["Comment"].edge("post").unwrap().key_fields, vec!["postCommentsId"]);
        let comments = doc.object("Post").unwrap().field("comments").unwrap();
        assert_eq!(comments.ty.to_string(), "ModelCommentConnection");
        let args: Vec<&str> = comments.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(args, vec!["filter", "sortDirection", "limit", "nextToken"]);
        assert!(doc.input("CreateCommentInput").unwrap().fields.iter().any(|f| f.name == "postCommentsId"));
    }

    #[test]
    fn test_has_one_stores_key_on_source() {
        let (doc, ctx) = run("type Project @model { id: ID! team: Team @hasOne } type Team @model { id: ID! }").unwrap();
        assert!(doc.object("Project").unwrap().has_field("projectTeamId"));
        assert_eq!(ctx.models["Project"].edge("team").unwrap().key_side, KeySide::Source);
    }

    #[test]
    fn test_sort_key_included_by_flag() {
        let sdl = "type Post @model { slug: String! @primaryKey(sortKeyFields: [\"day\"]) day: AWSDate! comments: [Comment] @hasMany } type Comment @model { id: ID! }";
        let (doc, _) = run(sdl).unwrap();
        let comment = doc.object("Comment").unwrap();
        assert!(comment.has_field("postCommentsSlug"));
        assert!(comment.has_field("postCommentsDay"));

        let config = TransformConfig::new()
            .with_flags(FeatureFlags::default().with_primary_key_attributes_on_connection(false));
        let (doc, _) = run_with(sdl, config).unwrap();
        assert!(!doc.object("Comment").unwrap().has_field("postCommentsDay"));
    }

    #[test]
    fn test_conflicting_references_fail() {
        let err = run(
            "type A @model { id: ID! bs: [B] @hasMany(references: [\"aId\"]) } type B @model { id: ID! otherId: ID a: A @belongsTo(references: [\"otherId\"]) }",
        )
        .unwrap_err();
        assert_eq!(err.code(), "RelationalEdgeConflictError");
    }

    #[test]
    fn test_reference_mismatch_and_shape_errors() {
        let count = run("type A @model { id: ID! bs: [B] @hasMany(references: [\"x\", \"y\"]) } type B @model { id: ID! }");
        assert_eq!(count.unwrap_err().code(), "InvalidDirectiveError");
        let ty = run("type A @model { id: ID! bs: [B] @hasMany(references: [\"aId\"]) } type B @model { id: ID! aId: Int }");
        assert!(ty.is_err());
        assert!(run("type A @model { id: ID! b: B @hasMany } type B @model { id: ID! }").is_err());
        assert!(run("type A @model { id: ID! b: [B] @hasOne } type B @model { id: ID! }").is_err());
        assert!(run("type A @model { id: ID! b: B @belongsTo } type B { id: ID! }").is_err());
    }

    #[test]
    fn test_many_to_many_join_edges() {
        let (doc, ctx) = run(
            "type Post @model { id: ID! tags: [Tag] @manyToMany(relationName: \"PostTags\") } type Tag @model { id: ID! posts: [Post] @manyToMany(relationName: \"PostTags\") }",
        )
        .unwrap();
        let join = &ctx.models["PostTags"];
        assert_eq!(join.join_for.as_deref(), Some("PostTags"));
        assert_eq!(join.edges.iter().filter(|e| e.kind == EdgeKind::BelongsTo).count(), 2);
        // the declared join index is reused rather than a relation index added
        assert!(join.index("byPost").is_some());
        assert!(join.index("gsi-Post.tags").is_none());
        let tags = ctx.models["Post"].edge("tags").unwrap();
        assert_eq!(tags.relation_name.as_deref(), Some("PostTags"));
        assert_eq!(
            doc.object("Post").unwrap().field("tags").unwrap().ty.to_string(),
            "ModelPostTagsConnection"
        );
    }

    #[test]
    fn test_relation_pipelines_in_source_group() {
        let (doc, mut ctx) = run(
            "type Post @model { id: ID! comments: [Comment] @hasMany } type Comment @model { id: ID! post: Post @belongsTo }",
        )
        .unwrap();
        RelationalTransformer.generate_resolvers(&doc, &mut ctx).unwrap();
        let comments = ctx.resolvers.get("Post", "comments").unwrap();
        assert_eq!(comments.group(), "Post");
        let load: Vec<_> = comments.slot(Slot::PreDataLoad).collect();
        assert_eq!(load[0].data_source.as_deref(), Some("CommentDataSource"));
        let post = ctx.resolvers.get("Comment", "post").unwrap();
        assert_eq!(post.slot(Slot::PreDataLoad).next().unwrap().name, "GetRelated");
    }
}
