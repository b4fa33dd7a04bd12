//! Names of generated types, fields and resources.
//!
//! Every generated name is derived from model and field names only, so two
//! compiles of the same schema agree on every identifier.

use spire_core::naming::{camel_join, lower_first, pascal_join, plural, truncate_name, upper_first};

/// Longest generated resource id
pub const MAX_RESOURCE_ID: usize = 64;

/// Root query type
pub const QUERY: &str = "Query";
/// Root mutation type
pub const MUTATION: &str = "Mutation";
/// Root subscription type
pub const SUBSCRIPTION: &str = "Subscription";

/// Shared sort direction enum
pub const SORT_DIRECTION: &str = "ModelSortDirection";
/// Shared attribute type enum used by filter inputs
pub const ATTRIBUTE_TYPES: &str = "ModelAttributeTypes";
/// Shared size filter input
pub const SIZE_INPUT: &str = "ModelSizeInput";

/// Data source with no backend
pub const NONE_DATA_SOURCE: &str = "NoneDataSource";
/// The API resource
pub const API_RESOURCE: &str = "GraphQLAPI";
/// The schema resource
pub const SCHEMA_RESOURCE: &str = "GraphQLSchema";
/// The API key resource
pub const API_KEY_RESOURCE: &str = "GraphQLAPIDefaultApiKey";

/// Check if a type name is one of the root operation types
#[must_use]
pub fn is_root_type(name: &str) -> bool {
    matches!(name, QUERY | MUTATION | SUBSCRIPTION)
}

/// `getTodo`
#[must_use]
pub fn get_query(model: &str) -> String {
    format!("get{model}")
}

/// `listTodos`
#[must_use]
pub fn list_query(model: &str) -> String {
    format!("list{}", plural(model))
}

/// `createTodo`, `updateTodo`, `deleteTodo`
#[must_use]
pub fn mutation(verb: &str, model: &str) -> String {
    format!("{verb}{model}")
}

/// `onCreateTodo`
#[must_use]
pub fn subscription(verb: &str, model: &str) -> String {
    format!("on{}{model}", upper_first(verb))
}

/// `ModelTodoConnection`
#[must_use]
pub fn connection_type(model: &str) -> String {
    format!("Model{model}Connection")
}

/// `ModelTodoFilterInput`
#[must_use]
pub fn filter_input(model: &str) -> String {
    format!("Model{model}FilterInput")
}

/// `ModelTodoConditionInput`
#[must_use]
pub fn condition_input(model: &str) -> String {
    format!("Model{model}ConditionInput")
}

/// `CreateTodoInput`, `UpdateTodoInput`, `DeleteTodoInput`
#[must_use]
pub fn mutation_input(verb: &str, model: &str) -> String {
    format!("{}{model}Input", upper_first(verb))
}

/// Input mirroring a non-model object type: `AddressInput`
#[must_use]
pub fn embedded_input(type_name: &str) -> String {
    format!("{type_name}Input")
}

/// Filter input for a scalar or enum: `ModelStringInput`, `ModelStatusInput`
#[must_use]
pub fn scalar_filter_input(base: &str) -> String {
    let scalar = match base {
        "ID" | "String" | "Int" | "Float" | "Boolean" => base,
        b if b.starts_with("AWS") => "String",
        other => other,
    };
    format!("Model{scalar}Input")
}

/// Key condition input for a single sort field: `ModelStringKeyConditionInput`
#[must_use]
pub fn key_condition_input(base: &str) -> String {
    let scalar = match base {
        "ID" | "Int" | "Float" => base,
        _ => "String",
    };
    format!("Model{scalar}KeyConditionInput")
}

/// Key condition input over several sort fields
#[must_use]
pub fn composite_key_condition_input(model: &str, sort_fields: &[String]) -> String {
    format!("Model{model}{}CompositeKeyConditionInput", joined_fields(sort_fields))
}

/// Input carrying one value per composite sort field
#[must_use]
pub fn composite_key_input(model: &str, sort_fields: &[String]) -> String {
    format!("Model{model}{}CompositeKeyInput", joined_fields(sort_fields))
}

/// Name of the single sort argument standing for several sort fields: `statusCreatedAt`
#[must_use]
pub fn composite_sort_argument(sort_fields: &[String]) -> String {
    let parts: Vec<&str> = sort_fields.iter().map(String::as_str).collect();
    lower_first(&pascal_join(&parts))
}

/// Default secondary index name: `byOwner`, `byStatusAndCreatedAt`
#[must_use]
pub fn default_index_name(partition: &str, sort_fields: &[String]) -> String {
    let mut fields = vec![partition.to_string()];
    fields.extend(sort_fields.iter().cloned());
    format!("by{}", joined_fields(&fields))
}

/// Generated index query: `listTodosByOwnerAndCreatedAt`
#[must_use]
pub fn index_query(model: &str, partition: &str, sort_fields: &[String]) -> String {
    let mut fields = vec![partition.to_string()];
    fields.extend(sort_fields.iter().cloned());
    format!("list{}By{}", plural(model), joined_fields(&fields))
}

/// Index a `hasMany` relation queries: `gsi-Post.comments`
#[must_use]
pub fn relation_index(parent: &str, field: &str) -> String {
    format!("gsi-{parent}.{field}")
}

/// Prefix of implicit foreign-key fields: `postComments`
#[must_use]
pub fn foreign_key_prefix(type_name: &str, field: &str) -> String {
    camel_join(&[type_name, field])
}

/// Implicit foreign-key field for one key attribute: `postCommentsId`
#[must_use]
pub fn foreign_key(prefix: &str, key_field: &str) -> String {
    format!("{prefix}{}", upper_first(key_field))
}

/// Join model field referencing one key attribute of a side: `postId`
#[must_use]
pub fn join_key(type_name: &str, key_field: &str) -> String {
    format!("{}{}", lower_first(type_name), upper_first(key_field))
}

/// Join model field holding the related record of a side: `post`
#[must_use]
pub fn join_field(type_name: &str) -> String {
    lower_first(type_name)
}

/// `searchTodos`
#[must_use]
pub fn search_query(model: &str) -> String {
    format!("search{}", plural(model))
}

/// `SearchableTodoConnection`
#[must_use]
pub fn searchable_connection(model: &str) -> String {
    format!("Searchable{model}Connection")
}

/// `SearchableTodoFilterInput`
#[must_use]
pub fn searchable_filter_input(model: &str) -> String {
    format!("Searchable{model}FilterInput")
}

/// `SearchableTodoSortInput`
#[must_use]
pub fn searchable_sort_input(model: &str) -> String {
    format!("Searchable{model}SortInput")
}

/// `SearchableTodoSortableFields`
#[must_use]
pub fn searchable_sortable_fields(model: &str) -> String {
    format!("Searchable{model}SortableFields")
}

/// `SearchableStringFilterInput`
#[must_use]
pub fn searchable_scalar_filter(base: &str) -> String {
    let scalar = match base {
        "ID" | "Int" | "Float" | "Boolean" => base,
        _ => "String",
    };
    format!("Searchable{scalar}FilterInput")
}

/// `TodoTable`
#[must_use]
pub fn table_id(model: &str) -> String {
    format!("{model}Table")
}

/// `TodoDataSource`
#[must_use]
pub fn data_source_id(model: &str) -> String {
    format!("{model}DataSource")
}

/// `TodoRole`
#[must_use]
pub fn role_id(model: &str) -> String {
    format!("{model}Role")
}

/// Resolver resource id: `QueryGetTodoResolver`
#[must_use]
pub fn resolver_id(type_name: &str, field: &str) -> String {
    truncate_name(&format!("{type_name}{}Resolver", upper_first(field)), MAX_RESOURCE_ID)
}

/// Pipeline function id: `QueryGetTodoAuth1Function`
#[must_use]
pub fn function_id(type_name: &str, field: &str, slot: &str, position: usize) -> String {
    truncate_name(
        &format!("{type_name}{}{}{position}Function", upper_first(field), upper_first(slot)),
        MAX_RESOURCE_ID,
    )
}

/// Lambda data source for a function name; environment placeholders are dropped
#[must_use]
pub fn lambda_data_source(function_name: &str) -> String {
    let base = function_name.replace("${env}", "");
    truncate_name(&format!("{}LambdaDataSource", pascal_join(&words(&base))), MAX_RESOURCE_ID)
}

/// HTTP data source for an origin: `https://api.example.com` -> `ApiExampleComDataSource`
#[must_use]
pub fn http_data_source(origin: &str) -> String {
    let host = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    truncate_name(&format!("{}DataSource", pascal_join(&words(host))), MAX_RESOURCE_ID)
}

/// Path parameter input of an HTTP field: `QueryGetUserParamsInput`
#[must_use]
pub fn http_params_input(type_name: &str, field: &str) -> String {
    format!("{type_name}{}ParamsInput", upper_first(field))
}

fn words(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn joined_fields(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| upper_first(f))
        .collect::<Vec<_>>()
        .join("And")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_names() {
        assert_eq!(get_query("Todo"), "getTodo");
        assert_eq!(list_query("Todo"), "listTodos");
        assert_eq!(list_query("Category"), "listCategories");
        assert_eq!(mutation("create", "Todo"), "createTodo");
        assert_eq!(subscription("create", "Todo"), "onCreateTodo");
        assert_eq!(mutation_input("update", "Todo"), "UpdateTodoInput");
    }

    #[test]
    fn test_key_names() {
        let sort = vec!["status".to_string(), "createdAt".to_string()];
        assert_eq!(default_index_name("owner", &[]), "byOwner");
        assert_eq!(default_index_name("owner", &sort), "byOwnerAndStatusAndCreatedAt");
        assert_eq!(index_query("Todo", "owner", &[]), "listTodosByOwner");
        assert_eq!(composite_sort_argument(&sort), "statusCreatedAt");
        assert_eq!(
            composite_key_condition_input("Todo", &sort),
            "ModelTodoStatusAndCreatedAtCompositeKeyConditionInput"
        );
    }

    #[test]
    fn test_relation_names() {
        let prefix = foreign_key_prefix("Post", "comments");
        assert_eq!(prefix, "postComments");
        assert_eq!(foreign_key(&prefix, "id"), "postCommentsId");
        assert_eq!(join_key("Post", "id"), "postId");
        assert_eq!(relation_index("Post", "comments"), "gsi-Post.comments");
    }

    #[test]
    fn test_filter_inputs() {
        assert_eq!(scalar_filter_input("String"), "ModelStringInput");
        assert_eq!(scalar_filter_input("AWSDateTime"), "ModelStringInput");
        assert_eq!(scalar_filter_input("Status"), "ModelStatusInput");
        assert_eq!(key_condition_input("AWSDate"), "ModelStringKeyConditionInput");
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(resolver_id("Query", "getTodo"), "QueryGetTodoResolver");
        assert_eq!(function_id("Query", "getTodo", "auth", 1), "QueryGetTodoAuth1Function");
        assert_eq!(lambda_data_source("echo-fn-${env}"), "EchoFnLambdaDataSource");
        assert_eq!(http_data_source("https://api.example.com"), "ApiExampleComDataSource");
        assert!(resolver_id("Query", &"x".repeat(100)).len() <= MAX_RESOURCE_ID);
    }
}
