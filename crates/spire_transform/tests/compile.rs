//! End-to-end compiles through the public API.

use spire_auth::Operation;
use spire_core::{FeatureFlags, TransformConfig};
use spire_schema::{parse_fragments, SchemaDocument};
use spire_stack::{ResourceProps, ResourceVisitor, TableProps, CONNECTION_STACK};
use spire_transform::{compile, Compiler, EdgeKind, Guard, Slot};

fn compiled(sdl: &str) -> spire_transform::CompiledSchema {
    compile(&[sdl], &TransformConfig::new()).unwrap()
}

fn reparsed(schema: &str) -> SchemaDocument {
    parse_fragments(&[schema]).unwrap()
}

fn error_code(sdl: &str) -> &'static str {
    compile(&[sdl], &TransformConfig::new()).unwrap_err().code()
}

const TODO: &str = "type Todo @model @auth(rules: [{allow: public}]) { id: ID! content: String }";

#[test]
fn test_public_todo_scenario() {
    let out = compiled(TODO);
    for (root, field) in [
        ("Query", "getTodo"),
        ("Query", "listTodos"),
        ("Mutation", "createTodo"),
        ("Mutation", "updateTodo"),
        ("Mutation", "deleteTodo"),
    ] {
        let pipeline = out.pipeline(root, field).unwrap();
        assert!(!pipeline.slot(Slot::PreDataLoad).is_empty(), "{root}.{field}");
        assert_eq!(pipeline.guard, Guard::Enforced, "{root}.{field}");
    }
    let acm = &out.access["Todo"];
    for field in ["id", "content"] {
        for op in [Operation::Create, Operation::Read, Operation::Update, Operation::Delete] {
            assert!(acm.is_allowed("apiKey:public", field, op), "{field} {op:?}");
        }
    }
}

#[test]
fn test_every_pipeline_has_seven_slots_and_auth_iff_rules() {
    let out = compiled(
        "type Todo @model @auth(rules: [{allow: public}]) { id: ID! content: String } type Secret @model { id: ID! body: String }",
    );
    assert!(!out.pipelines.is_empty());
    for pipeline in out.pipelines.values() {
        assert_eq!(pipeline.slot_order(), Slot::ALL.to_vec());
        let guarded = !pipeline.slot(Slot::Auth).is_empty();
        assert_eq!(guarded, pipeline.type_name != "Secret" && !pipeline.field_name.contains("Secret"));
        assert_eq!(pipeline.guard == Guard::Enforced, guarded);
    }
}

#[test]
fn test_model_without_rules_denies_everything() {
    let out = compiled("type Secret @model { id: ID! body: String }");
    assert!(out.access["Secret"].denies_all());
    assert!(out.pipelines.values().all(|p| p.guard == Guard::DenyAll));
}

#[test]
fn test_default_auth_declaration_applies() {
    let out = compiled(
        "input AMPLIFY { globalAuthRule: AuthRule = { allow: public } } type Todo @model { id: ID! }",
    );
    assert!(!out.access["Todo"].denies_all());
    assert_eq!(out.pipeline("Query", "getTodo").unwrap().guard, Guard::Enforced);
    assert!(!out.schema.contains("AMPLIFY"));
}

#[test]
fn test_field_rule_is_exact() {
    let out = compiled(
        "type Todo @model @auth(rules: [{allow: public}, {allow: private}]) { id: ID! content: String secret: String @auth(rules: [{allow: private, operations: [read]}]) }",
    );
    let acm = &out.access["Todo"];
    assert!(acm.is_allowed("userPools:private", "secret", Operation::Read));
    assert!(!acm.is_allowed("userPools:private", "secret", Operation::Update));
    assert!(!acm.is_allowed("apiKey:public", "secret", Operation::Read));
    assert!(acm.is_allowed("apiKey:public", "content", Operation::Update));
    assert_eq!(out.pipeline("Todo", "secret").unwrap().guard, Guard::Enforced);
}

#[test]
fn test_field_grant_does_not_open_other_fields() {
    let out = compiled(
        "type A @model @auth(rules: [{allow: owner}]) { id: ID! body: String note: String @auth(rules: [{allow: owner}, {allow: private, operations: [read]}]) }",
    );
    let acm = &out.access["A"];
    assert!(!acm.is_allowed("userPools:private", "body", Operation::Read));
    assert!(acm.is_allowed("userPools:private", "note", Operation::Read));
    let body = out.pipeline("A", "body").unwrap();
    assert_eq!(body.guard, Guard::Enforced);
    assert!(!body.slot(Slot::Auth)[0].request.contains("role userPools:private"));
    let note = out.pipeline("A", "note").unwrap();
    assert!(note.slot(Slot::Auth)[0].request.contains("role userPools:private"));
}

#[test]
fn test_field_only_rules() {
    let out = compiled(
        "type Note @model { id: ID! body: String secret: String @auth(rules: [{allow: private, operations: [read]}]) }",
    );
    let acm = &out.access["Note"];
    assert!(acm.is_allowed("userPools:private", "secret", Operation::Read));
    assert!(!acm.is_allowed("userPools:private", "body", Operation::Read));

    let get = out.pipeline("Query", "getNote").unwrap();
    assert_eq!(get.guard, Guard::Enforced);
    let create = out.pipeline("Mutation", "createNote").unwrap();
    assert!(create.slot(Slot::Auth).is_empty());
    assert_eq!(create.guard, Guard::DenyAll);

    let secret = out.pipeline("Note", "secret").unwrap();
    assert!(secret.slot(Slot::Auth)[0].request.contains("role userPools:private"));
    let body = out.pipeline("Note", "body").unwrap();
    assert!(body.slot(Slot::Auth)[0].request.contains("$util.unauthorized()"));
}

#[test]
fn test_second_data_load_on_a_field_conflicts() {
    assert_eq!(
        error_code(
            "type Query { weather(city: String): String @function(name: \"weather\") @http(url: \"https://api.weather.com/v1/:city\") }"
        ),
        "ResolverSlotConflictError"
    );
    assert_eq!(
        error_code("type A @model { id: ID! b: B @hasOne @function(name: \"a\") } type B @model { id: ID! }"),
        "ResolverSlotConflictError"
    );
    let out = compiled(
        "type Query { echo(msg: String): String @function(name: \"auth\") @function(name: \"echo\") @auth(rules: [{allow: public}]) }",
    );
    assert_eq!(out.pipeline("Query", "echo").unwrap().slot(Slot::PreDataLoad).len(), 2);
}

fn field_count(out: &spire_transform::CompiledSchema, type_name: &str, field: &str) -> usize {
    reparsed(&out.schema)
        .object(type_name)
        .unwrap()
        .fields
        .iter()
        .filter(|f| f.name == field)
        .count()
}

#[test]
fn test_has_many_belongs_to_in_either_order() {
    let post = "type Post @model @auth(rules: [{allow: public}]) { id: ID! comments: [Comment] @hasMany(references: [\"postId\"]) }";
    let comment = "type Comment @model @auth(rules: [{allow: public}]) { id: ID! postId: ID post: Post @belongsTo(references: [\"postId\"]) }";
    for sdl in [format!("{post} {comment}"), format!("{comment} {post}")] {
        let out = compiled(&sdl);
        assert_eq!(field_count(&out, "Comment", "postId"), 1);
        assert!(out.pipeline("Post", "comments").is_some());
        assert!(out.pipeline("Comment", "post").is_some());
    }
}

#[test]
fn test_implicit_foreign_key_synthesized_once() {
    let out = compiled(
        "type Post @model { id: ID! comments: [Comment] @hasMany } type Comment @model { id: ID! post: Post @belongsTo }",
    );
    assert_eq!(field_count(&out, "Comment", "postCommentsId"), 1);
    let comments = reparsed(&out.schema).object("Post").unwrap().field("comments").unwrap().clone();
    assert_eq!(comments.ty.base_name(), "ModelCommentConnection");
    assert!(comments.arguments.iter().any(|a| a.name == "nextToken"));
}

#[test]
fn test_many_to_many_join_model() {
    let out = compiled(
        "type Post @model { id: ID! tags: [Tag] @manyToMany(relationName: \"PostTags\") } type Tag @model { id: ID! posts: [Post] @manyToMany(relationName: \"PostTags\") }",
    );
    let doc = reparsed(&out.schema);
    assert_eq!(doc.objects().filter(|o| o.name == "PostTags").count(), 1);
    let join = &out.models["PostTags"];
    assert_eq!(join.edges.iter().filter(|e| e.kind == EdgeKind::BelongsTo).count(), 2);
    assert!(out.pipeline("Query", "getPostTags").is_some());
    assert_eq!(
        doc.object("Post").unwrap().field("tags").unwrap().ty.base_name(),
        "ModelPostTagsConnection"
    );
}

#[test]
fn test_many_to_many_declared_in_reverse_order() {
    let out = compiled(
        "type Tag @model { id: ID! posts: [Post] @manyToMany(relationName: \"PostTags\") } type Post @model { id: ID! tags: [Tag] @manyToMany(relationName: \"PostTags\") }",
    );
    assert_eq!(reparsed(&out.schema).objects().filter(|o| o.name == "PostTags").count(), 1);
    let join = &out.models["PostTags"];
    assert_eq!(join.edges.iter().filter(|e| e.kind == EdgeKind::BelongsTo).count(), 2);
    assert!(out.pipeline("Tag", "posts").is_some());
    assert!(out.pipeline("Post", "tags").is_some());
}

#[test]
fn test_mismatched_references_conflict() {
    assert_eq!(
        error_code(
            "type A @model { id: ID! bs: [B] @hasMany(references: [\"aId\"]) } type B @model { id: ID! otherId: ID a: A @belongsTo(references: [\"otherId\"]) }"
        ),
        "RelationalEdgeConflictError"
    );
}

#[test]
fn test_duplicate_index_name_fails() {
    assert_eq!(
        error_code("type A @model { id: ID! x: String @index(name: \"byKey\") y: String @index(name: \"byKey\") }"),
        "InvalidDirectiveError"
    );
}

#[test]
fn test_circular_models_promote_to_connection_stack() {
    let out = compiled(
        "type User @model { id: ID! posts: [Post] @hasMany } type Post @model { id: ID! author: User @belongsTo }",
    );
    let group = out.resources.group(CONNECTION_STACK).unwrap();
    assert!(!group.resources.is_empty());
    let position = |name: &str| out.resources.group_names().iter().position(|g| *g == name).unwrap();
    assert!(position("User") < position(CONNECTION_STACK));
    assert!(position("Post") < position(CONNECTION_STACK));
}

#[test]
fn test_pinned_cycle_fails() {
    let config = TransformConfig::new()
        .with_stack_mapping("PostDataSource", "User")
        .with_stack_mapping("UserDataSource", "Post");
    let err = compile(&["type User @model { id: ID! } type Post @model { id: ID! }"], &config).unwrap_err();
    assert_eq!(err.code(), "CircularResourceReferenceError");
}

#[test]
fn test_unknown_stack_mapping_warns() {
    let config = TransformConfig::new().with_stack_mapping("NoSuchResource", "Elsewhere");
    let out = compile(&[TODO], &config).unwrap();
    assert!(out.diagnostics.iter().any(|d| d.code == "unknown-stack-mapping"));
}

#[test]
fn test_default_values_type_checked() {
    assert_eq!(
        error_code("type Post @model { id: ID! views: Int @default(value: \"many\") }"),
        "InvalidDirectiveError"
    );
    let out = compiled("type Post @model { id: ID! views: Int @default(value: \"0\") }");
    let init = &out.pipeline("Mutation", "createPost").unwrap().slot(Slot::Init)[0];
    assert!(init.request.contains("views"));
}

#[test]
fn test_validate_patterns_must_compile() {
    assert_eq!(
        error_code("type User @model { id: ID! name: String @validate(type: matches, value: \"[a-\") }"),
        "InvalidDirectiveError"
    );
    let out = compiled("type User @model { id: ID! name: String @validate(type: matches, value: \"^[a-z]+$\") }");
    assert_eq!(out.pipeline("Mutation", "createUser").unwrap().slot(Slot::PostAuth).len(), 1);
}

#[test]
fn test_unknown_directive_rejected() {
    assert_eq!(error_code("type Todo @model @cached { id: ID! }"), "UnknownDirectiveError");
}

#[test]
fn test_owned_directives_stripped_from_output() {
    let out = compiled(TODO);
    assert!(!out.schema.contains("@model"));
    assert!(!out.schema.contains("@auth"));
    assert!(out.schema.contains("type ModelTodoConnection"));
}

#[test]
fn test_artifacts_cover_every_function() {
    let out = compiled(TODO);
    let files = out.artifacts().unwrap();
    assert!(files.contains_key("schema.graphql"));
    assert!(files.contains_key("stacks/Todo.json"));
    assert!(files.contains_key("stacks/root.json"));
    assert!(files.contains_key("resolvers/Query.getTodo.auth.1.req.vtl"));
    assert!(files.contains_key("resolvers/Query.getTodo.preDataLoad.1.res.vtl"));
    let templates = files.keys().filter(|k| k.starts_with("resolvers/")).count();
    let functions: usize = out.pipelines.values().map(|p| p.len()).sum();
    assert_eq!(templates, functions * 2);
}

#[test]
fn test_searchable_function_and_http_groups() {
    let out = compiled(
        "type Todo @model @searchable @auth(rules: [{allow: public}]) { id: ID! name: String } type Query { echo(msg: String): String @function(name: \"echo-${env}\") @auth(rules: [{allow: public}]) weather(city: String): String @http(url: \"https://api.weather.com/v1/:city\") }",
    );
    let names = out.resources.group_names();
    for group in ["SearchableStack", "FunctionDirectiveStack", "HttpStack"] {
        assert!(names.contains(&group), "{group}");
    }
    assert_eq!(out.pipeline("Query", "searchTodos").unwrap().guard, Guard::Enforced);
    assert_eq!(out.pipeline("Query", "echo").unwrap().guard, Guard::Enforced);
    assert_eq!(out.pipeline("Query", "weather").unwrap().guard, Guard::DenyAll);
    let table = out.resources.resources.get("TodoTable").unwrap();
    match &table.props {
        ResourceProps::Table(props) => assert!(props.stream_enabled),
        other => panic!("unexpected props {other:?}"),
    }
}

struct OnDemandTables;

impl ResourceVisitor for OnDemandTables {
    fn visit_table(&mut self, _id: &str, props: &mut TableProps) {
        props.point_in_time_recovery = true;
    }
}

#[test]
fn test_visitor_adjusts_resources() {
    let mut compiler = Compiler::new().with_visitor(Box::new(OnDemandTables));
    let out = compiler.compile(&[TODO], &TransformConfig::new()).unwrap();
    match &out.resources.resources["TodoTable"].props {
        ResourceProps::Table(props) => assert!(props.point_in_time_recovery),
        other => panic!("unexpected props {other:?}"),
    }
}

#[test]
fn test_feature_flags_change_output() {
    let sdl = "type Todo @model { id: ID! owner: String @index(name: \"byOwner\") }";
    let on = compile(&[sdl], &TransformConfig::new().with_flags(FeatureFlags::default().with_auto_index_query_names(true))).unwrap();
    let off = compile(&[sdl], &TransformConfig::new()).unwrap();
    assert_ne!(on.fingerprint, off.fingerprint);
    assert!(reparsed(&on.schema).object("Query").unwrap().has_field("listTodosByOwner"));
}
