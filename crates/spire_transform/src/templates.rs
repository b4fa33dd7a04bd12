//! Request and response templates of generated pipeline functions.

use crate::model_config::{Timestamps, Validation, ValidationKind};
use indexmap::IndexMap;
use std::fmt::Write;

const RESULT_RESPONSE: &str = "#if( $ctx.error )\n  $util.error($ctx.error.message, $ctx.error.type)\n#end\n$util.toJson($ctx.result)\n";

/// Response of a data-loading function: raise errors, else pass the result on
#[must_use]
pub fn result_response() -> String {
    RESULT_RESPONSE.to_string()
}

/// Request and response of a function that only stashes or passes data on
#[must_use]
pub fn empty_request() -> String {
    "$util.toJson({})\n".to_string()
}

/// Response returning the previous function's result
#[must_use]
pub fn previous_result() -> String {
    "$util.toJson($ctx.prev.result)\n".to_string()
}

fn key_map(key_fields: &[String], source: &str) -> String {
    key_fields
        .iter()
        .map(|f| format!("\"{f}\": $util.dynamodb.toDynamoDB({source}.{f})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `GetItem` by primary key read from the arguments
#[must_use]
pub fn get_item(key_fields: &[String]) -> String {
    format!(
        "{{\n  \"version\": \"2018-05-29\",\n  \"operation\": \"GetItem\",\n  \"key\": {{ {} }}\n}}\n",
        key_map(key_fields, "$ctx.args")
    )
}

/// Response of a get: apply the stashed auth filter to the loaded record
#[must_use]
pub fn get_response() -> String {
    let mut out = String::from("#if( $ctx.error )\n  $util.error($ctx.error.message, $ctx.error.type)\n#end\n");
    out.push_str("#if( !$util.isNull($ctx.stash.authFilter) && !$util.isNull($ctx.result) )\n");
    out.push_str("  #set( $visible = $util.transform.toDynamoDBFilterExpression($ctx.stash.authFilter) )\n");
    out.push_str("  $util.qr($ctx.stash.put(\"postFilter\", $ctx.stash.authFilter))\n");
    out.push_str("#end\n$util.toJson($ctx.result)\n");
    out
}

/// Scan of a whole table with filter, auth filter and paging
#[must_use]
pub fn scan(limit: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#set( $limit = $util.defaultIfNull($ctx.args.limit, {limit}) )");
    out.push_str("#set( $request = { \"version\": \"2018-05-29\", \"operation\": \"Scan\", \"limit\": $limit } )\n");
    push_filters(&mut out);
    out.push_str("#if( $ctx.args.nextToken )\n  $util.qr($request.put(\"nextToken\", $ctx.args.nextToken))\n#end\n");
    out.push_str("$util.toJson($request)\n");
    out
}

/// Query on the table or an index, keyed by the partition argument
///
/// `sort_argument` names the argument carrying the sort key condition.
#[must_use]
pub fn query(index: Option<&str>, partition: &str, sort_argument: Option<&str>, limit: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#set( $limit = $util.defaultIfNull($ctx.args.limit, {limit}) )");
    out.push_str("#set( $query = { \"expression\": \"#pk = :pk\", \"expressionNames\": { \"#pk\": \"");
    out.push_str(partition);
    out.push_str("\" }, \"expressionValues\": { \":pk\": $util.dynamodb.toDynamoDB($ctx.args.");
    out.push_str(partition);
    out.push_str(") } } )\n");
    if let Some(sort) = sort_argument {
        let _ = writeln!(
            out,
            "#if( !$util.isNull($ctx.args.{sort}) )\n  #set( $sortCondition = $util.transform.toDynamoDBConditionExpression($ctx.args.{sort}) )\n  $util.qr($query.put(\"expression\", \"$query.expression AND $sortCondition.expression\"))\n  $util.qr($query.expressionNames.putAll($sortCondition.expressionNames))\n  $util.qr($query.expressionValues.putAll($sortCondition.expressionValues))\n#end"
        );
    }
    out.push_str("#set( $request = { \"version\": \"2018-05-29\", \"operation\": \"Query\", \"query\": $query, \"limit\": $limit } )\n");
    if let Some(index) = index {
        let _ = writeln!(out, "$util.qr($request.put(\"index\", \"{index}\"))");
    }
    out.push_str("#if( $ctx.args.sortDirection == \"DESC\" )\n  $util.qr($request.put(\"scanIndexForward\", false))\n#end\n");
    push_filters(&mut out);
    out.push_str("#if( $ctx.args.nextToken )\n  $util.qr($request.put(\"nextToken\", $ctx.args.nextToken))\n#end\n");
    out.push_str("$util.toJson($request)\n");
    out
}

fn push_filters(out: &mut String) {
    out.push_str("#set( $filters = [] )\n");
    out.push_str("#if( !$util.isNullOrEmpty($ctx.args.filter) )\n  $util.qr($filters.add($ctx.args.filter))\n#end\n");
    out.push_str("#if( !$util.isNull($ctx.stash.authFilter) )\n  $util.qr($filters.add($ctx.stash.authFilter))\n#end\n");
    out.push_str("#if( !$filters.isEmpty() )\n  $util.qr($request.put(\"filter\", $util.parseJson($util.transform.toDynamoDBFilterExpression({ \"and\": $filters }))))\n#end\n");
}

/// `PutItem` of the create input, refusing to overwrite an existing key
#[must_use]
pub fn put_item(key_fields: &[String]) -> String {
    let mut out = String::new();
    out.push_str("#set( $input = $util.defaultIfNull($ctx.stash.defaultValues, {}) )\n");
    out.push_str("$util.qr($input.putAll($util.defaultIfNull($ctx.args.input, {})))\n");
    let _ = writeln!(
        out,
        "#set( $condition = {{ \"expression\": \"attribute_not_exists(#pk)\", \"expressionNames\": {{ \"#pk\": \"{}\" }} }} )",
        key_fields.first().map_or("id", String::as_str)
    );
    push_condition_merge(&mut out);
    let _ = writeln!(
        out,
        "{{\n  \"version\": \"2018-05-29\",\n  \"operation\": \"PutItem\",\n  \"key\": {{ {} }},\n  \"attributeValues\": $util.dynamodb.toMapValuesJson($input),\n  \"condition\": $util.toJson($condition)\n}}",
        key_map(key_fields, "$input")
    );
    out
}

/// `UpdateItem` setting every non-key input attribute
#[must_use]
pub fn update_item(key_fields: &[String], timestamps: &Timestamps) -> String {
    let mut out = String::new();
    out.push_str("#set( $input = $util.defaultIfNull($ctx.args.input, {}) )\n");
    if let Some(updated) = &timestamps.updated_at {
        let _ = writeln!(out, "$util.qr($input.put(\"{updated}\", $util.time.nowISO8601()))");
    }
    let keys = key_fields.iter().map(|k| format!("\"{k}\"")).collect::<Vec<_>>().join(", ");
    let _ = writeln!(out, "#set( $keyFields = [{keys}] )");
    out.push_str("#set( $sets = [] )\n#set( $removes = [] )\n#set( $names = {} )\n#set( $values = {} )\n");
    out.push_str("#foreach( $entry in $input.entrySet() )\n  #if( !$keyFields.contains($entry.key) )\n    $util.qr($names.put(\"#$entry.key\", $entry.key))\n    #if( $util.isNull($entry.value) )\n      $util.qr($removes.add(\"#$entry.key\"))\n    #else\n      $util.qr($sets.add(\"#$entry.key = :$entry.key\"))\n      $util.qr($values.put(\":$entry.key\", $util.dynamodb.toDynamoDB($entry.value)))\n    #end\n  #end\n#end\n");
    out.push_str("#set( $expression = \"\" )\n#if( !$sets.isEmpty() )\n  #set( $expression = \"SET $util.join(', ', $sets)\" )\n#end\n#if( !$removes.isEmpty() )\n  #set( $expression = \"$expression REMOVE $util.join(', ', $removes)\" )\n#end\n");
    out.push_str("#set( $condition = { \"expression\": \"attribute_exists(#pk)\", \"expressionNames\": { \"#pk\": $keyFields[0] } } )\n");
    push_condition_merge(&mut out);
    let _ = writeln!(
        out,
        "{{\n  \"version\": \"2018-05-29\",\n  \"operation\": \"UpdateItem\",\n  \"key\": {{ {} }},\n  \"update\": {{ \"expression\": \"$expression\", \"expressionNames\": $util.toJson($names), \"expressionValues\": $util.toJson($values) }},\n  \"condition\": $util.toJson($condition)\n}}",
        key_map(key_fields, "$input")
    );
    out
}

/// `DeleteItem` by primary key read from the input
#[must_use]
pub fn delete_item(key_fields: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "#set( $condition = {{ \"expression\": \"attribute_exists(#pk)\", \"expressionNames\": {{ \"#pk\": \"{}\" }} }} )",
        key_fields.first().map_or("id", String::as_str)
    );
    push_condition_merge(&mut out);
    let _ = writeln!(
        out,
        "{{\n  \"version\": \"2018-05-29\",\n  \"operation\": \"DeleteItem\",\n  \"key\": {{ {} }},\n  \"condition\": $util.toJson($condition)\n}}",
        key_map(key_fields, "$ctx.args.input")
    );
    out
}

fn push_condition_merge(out: &mut String) {
    out.push_str("#set( $conditions = [] )\n");
    out.push_str("#if( !$util.isNull($ctx.args.condition) )\n  $util.qr($conditions.add($ctx.args.condition))\n#end\n");
    out.push_str("#if( !$util.isNull($ctx.stash.authCondition) )\n  $util.qr($conditions.add($ctx.stash.authCondition))\n#end\n");
    out.push_str("#if( !$conditions.isEmpty() )\n  #set( $extra = $util.parseJson($util.transform.toDynamoDBConditionExpression({ \"and\": $conditions })) )\n  $util.qr($condition.put(\"expression\", \"($condition.expression) AND ($extra.expression)\"))\n  $util.qr($condition.expressionNames.putAll($extra.expressionNames))\n  $util.qr($condition.put(\"expressionValues\", $util.defaultIfNull($extra.expressionValues, {})))\n#end\n");
}

/// `init` logic stashing defaults, timestamps and a generated id for create
#[must_use]
pub fn create_init(defaults: &IndexMap<String, String>, timestamps: &Timestamps, generate_id: bool) -> String {
    let mut out = String::from("#set( $defaultValues = {} )\n");
    if generate_id {
        out.push_str("$util.qr($defaultValues.put(\"id\", $util.autoId()))\n");
    }
    if timestamps.created_at.is_some() || timestamps.updated_at.is_some() {
        out.push_str("#set( $now = $util.time.nowISO8601() )\n");
    }
    for field in [&timestamps.created_at, &timestamps.updated_at].into_iter().flatten() {
        let _ = writeln!(out, "$util.qr($defaultValues.put(\"{field}\", $now))");
    }
    for (field, value) in defaults {
        let _ = writeln!(
            out,
            "$util.qr($defaultValues.put(\"{field}\", $util.parseJson(\"{}\")))",
            escape(&serde_json_literal(value))
        );
    }
    out.push_str("$util.qr($ctx.stash.put(\"defaultValues\", $defaultValues))\n");
    out.push_str("$util.toJson({})\n");
    out
}

fn serde_json_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Input validation for one field
#[must_use]
pub fn validations(field: &str, checks: &[Validation]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#set( $value = $ctx.args.input.{field} )");
    out.push_str("#if( !$util.isNull($value) )\n");
    for check in checks {
        let failed = match check.kind {
            ValidationKind::MinLength => format!("$value.length() < {}", check.value),
            ValidationKind::MaxLength => format!("$value.length() > {}", check.value),
            ValidationKind::StartsWith => format!("!$value.startsWith(\"{}\")", escape(&check.value)),
            ValidationKind::EndsWith => format!("!$value.endsWith(\"{}\")", escape(&check.value)),
            ValidationKind::Matches => format!("!$util.matches(\"{}\", $value)", escape(&check.value)),
            ValidationKind::Gt => format!("$value <= {}", check.value),
            ValidationKind::Lt => format!("$value >= {}", check.value),
            ValidationKind::Gte => format!("$value < {}", check.value),
            ValidationKind::Lte => format!("$value > {}", check.value),
        };
        let _ = writeln!(
            out,
            "  #if( {failed} )\n    $util.error(\"{}\", \"ValidationError\")\n  #end",
            escape(&check.error_message)
        );
    }
    out.push_str("#end\n$util.toJson({})\n");
    out
}

/// Subscription request against the no-backend data source
#[must_use]
pub fn subscription_request() -> String {
    "{\n  \"version\": \"2018-05-29\",\n  \"payload\": {}\n}\n".to_string()
}

/// Subscription response; the payload comes from the triggering mutation
#[must_use]
pub fn subscription_response() -> String {
    "$util.toJson(null)\n".to_string()
}

/// Field read passed through the no-backend data source
#[must_use]
pub fn source_field_request(field: &str) -> String {
    format!("{{\n  \"version\": \"2018-05-29\",\n  \"payload\": $util.toJson($ctx.source.{field})\n}}\n")
}

/// `GetItem` of a related record keyed by fields of the parent
#[must_use]
pub fn related_get(source_fields: &[String], target_key: &[String]) -> String {
    let mut out = String::new();
    let present = source_fields
        .iter()
        .map(|f| format!("!$util.isNull($ctx.source.{f})"))
        .collect::<Vec<_>>()
        .join(" && ");
    let key = source_fields
        .iter()
        .zip(target_key)
        .map(|(s, t)| format!("\"{t}\": $util.dynamodb.toDynamoDB($ctx.source.{s})"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "#if( {present} )");
    let _ = writeln!(
        out,
        "  {{\n    \"version\": \"2018-05-29\",\n    \"operation\": \"GetItem\",\n    \"key\": {{ {key} }}\n  }}"
    );
    out.push_str("#else\n  #return\n#end\n");
    out
}

/// Query of related records through an index keyed by fields of the related type
#[must_use]
pub fn related_query(index: &str, target_fields: &[String], source_key: &[String], limit: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#if( $util.isNull($ctx.source.{}) )", source_key.first().map_or("id", String::as_str));
    out.push_str("  #return\n#end\n");
    let _ = writeln!(out, "#set( $limit = $util.defaultIfNull($ctx.args.limit, {limit}) )");
    let conditions = target_fields
        .iter()
        .enumerate()
        .map(|(i, _)| format!("#k{i} = :k{i}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let names = target_fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("\"#k{i}\": \"{f}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let values = source_key
        .iter()
        .enumerate()
        .map(|(i, s)| format!("\":k{i}\": $util.dynamodb.toDynamoDB($ctx.source.{s})"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "#set( $request = {{ \"version\": \"2018-05-29\", \"operation\": \"Query\", \"index\": \"{index}\", \"limit\": $limit, \"query\": {{ \"expression\": \"{conditions}\", \"expressionNames\": {{ {names} }}, \"expressionValues\": {{ {values} }} }} }} )"
    );
    out.push_str("#if( $ctx.args.sortDirection == \"DESC\" )\n  $util.qr($request.put(\"scanIndexForward\", false))\n#end\n");
    push_filters(&mut out);
    out.push_str("#if( $ctx.args.nextToken )\n  $util.qr($request.put(\"nextToken\", $ctx.args.nextToken))\n#end\n");
    out.push_str("$util.toJson($request)\n");
    out
}

/// Response of a relation query returning a single record
#[must_use]
pub fn first_item_response() -> String {
    "#if( $ctx.error )\n  $util.error($ctx.error.message, $ctx.error.type)\n#end\n#if( !$ctx.result.items.isEmpty() && $ctx.result.items.size() == 1 )\n  $util.toJson($ctx.result.items[0])\n#else\n  $util.toJson(null)\n#end\n".to_string()
}

/// Search request with filter, sort and paging
#[must_use]
pub fn search(model: &str, limit: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#set( $limit = $util.defaultIfNull($ctx.args.limit, {limit}) )");
    out.push_str("#set( $query = { \"match_all\": {} } )\n");
    out.push_str("#if( !$util.isNullOrEmpty($ctx.args.filter) )\n  #set( $query = $util.parseJson($util.transform.toElasticsearchQueryDSL($ctx.args.filter)) )\n#end\n");
    out.push_str("#if( !$util.isNull($ctx.stash.authFilter) )\n  #set( $query = { \"bool\": { \"must\": [$query, $util.parseJson($util.transform.toElasticsearchQueryDSL($ctx.stash.authFilter))] } } )\n#end\n");
    out.push_str("#set( $sort = [] )\n#foreach( $item in $util.defaultIfNull($ctx.args.sort, []) )\n  $util.qr($sort.add({ $item.field: { \"order\": $util.defaultIfNull($item.direction, \"asc\") } }))\n#end\n");
    let index = model.to_lowercase();
    let _ = writeln!(
        out,
        "{{\n  \"version\": \"2018-05-29\",\n  \"operation\": \"GET\",\n  \"path\": \"/{index}/_search\",\n  \"params\": {{\n    \"body\": {{\n      \"size\": $limit,\n      \"from\": $util.defaultIfNull($ctx.args.from, 0),\n      \"query\": $util.toJson($query),\n      \"sort\": $util.toJson($sort),\n      \"version\": false\n    }}\n  }}\n}}"
    );
    out
}

/// Search response mapped onto the searchable connection
#[must_use]
pub fn search_response() -> String {
    "#if( $ctx.error )\n  $util.error($ctx.error.message, $ctx.error.type)\n#end\n#set( $items = [] )\n#foreach( $hit in $ctx.result.hits.hits )\n  $util.qr($items.add($hit.get(\"_source\")))\n#end\n$util.toJson({ \"items\": $items, \"total\": $ctx.result.hits.total.value })\n".to_string()
}

/// Function invocation carrying the resolver context
#[must_use]
pub fn lambda_invoke() -> String {
    "{\n  \"version\": \"2018-05-29\",\n  \"operation\": \"Invoke\",\n  \"payload\": {\n    \"typeName\": $util.toJson($ctx.stash.get(\"typeName\")),\n    \"fieldName\": $util.toJson($ctx.stash.get(\"fieldName\")),\n    \"arguments\": $util.toJson($ctx.arguments),\n    \"identity\": $util.toJson($ctx.identity),\n    \"source\": $util.toJson($ctx.source),\n    \"request\": $util.toJson($ctx.request),\n    \"prev\": $util.toJson($ctx.prev)\n  }\n}\n".to_string()
}

/// HTTP request to a path on the data source origin
///
/// `:name` segments of `path` are filled from `$ctx.args.params`.
#[must_use]
pub fn http_request(method: &str, path: &str, headers: &[(String, String)], sends_body: bool) -> String {
    let mut resolved = String::new();
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            resolved.push('/');
        }
        match segment.strip_prefix(':') {
            Some(param) => {
                let _ = write!(resolved, "$ctx.args.params.{param}");
            }
            None => resolved.push_str(segment),
        }
    }
    let header_pairs = headers
        .iter()
        .map(|(k, v)| format!("\"{}\": \"{}\"", escape(k), escape(v)))
        .collect::<Vec<_>>();
    let mut out = String::new();
    let _ = writeln!(out, "#set( $headers = {{ {} }} )", header_pairs.join(", "));
    out.push_str("#set( $args = $util.defaultIfNull($ctx.args, {}) )\n#set( $payload = {} )\n");
    out.push_str("#foreach( $entry in $args.entrySet() )\n  #if( $entry.key != \"params\" )\n    $util.qr($payload.put($entry.key, $entry.value))\n  #end\n#end\n");
    let params = if sends_body {
        "{ \"headers\": $util.toJson($headers), \"body\": $util.toJson($payload) }"
    } else {
        "{ \"headers\": $util.toJson($headers), \"query\": $util.toJson($payload) }"
    };
    let _ = writeln!(
        out,
        "{{\n  \"version\": \"2018-05-29\",\n  \"method\": \"{method}\",\n  \"resourcePath\": \"{resolved}\",\n  \"params\": {params}\n}}"
    );
    out
}

/// HTTP response: non-2xx status codes become errors
#[must_use]
pub fn http_response() -> String {
    "#if( $ctx.error )\n  $util.error($ctx.error.message, $ctx.error.type)\n#end\n#if( $ctx.result.statusCode >= 200 && $ctx.result.statusCode < 300 )\n  #if( $util.isNullOrEmpty($ctx.result.body) )\n    $util.toJson(null)\n  #else\n    $ctx.result.body\n  #end\n#else\n  $util.error($ctx.result.body, \"HttpError\")\n#end\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_get_item_uses_every_key_field() {
        let t = get_item(&keys(&["pk", "sk"]));
        assert!(t.contains("\"pk\": $util.dynamodb.toDynamoDB($ctx.args.pk)"));
        assert!(t.contains("\"sk\": $util.dynamodb.toDynamoDB($ctx.args.sk)"));
    }

    #[test]
    fn test_query_with_index_and_sort() {
        let t = query(Some("byOwner"), "owner", Some("createdAt"), 50);
        assert!(t.contains("\"index\", \"byOwner\""));
        assert!(t.contains("$ctx.args.createdAt"));
        assert!(t.contains("defaultIfNull($ctx.args.limit, 50)"));
        assert!(t.contains("$ctx.stash.authFilter"));
    }

    #[test]
    fn test_create_init_defaults_and_timestamps() {
        let mut defaults = IndexMap::new();
        defaults.insert("status".to_string(), "DRAFT".to_string());
        let t = create_init(&defaults, &Timestamps::default(), true);
        assert!(t.contains("$util.autoId()"));
        assert!(t.contains("\"createdAt\", $now"));
        assert!(t.contains("\"status\", $util.parseJson(\"\\\"DRAFT\\\"\")"));
    }

    #[test]
    fn test_validations_render_each_check() {
        let checks = vec![
            Validation {
                kind: ValidationKind::MinLength,
                value: "3".into(),
                error_message: "too short".into(),
            },
            Validation {
                kind: ValidationKind::Matches,
                value: "^[a-z]+$".into(),
                error_message: "lowercase only".into(),
            },
        ];
        let t = validations("title", &checks);
        assert!(t.contains("$value.length() < 3"));
        assert!(t.contains("$util.matches(\"^[a-z]+$\", $value)"));
        assert_eq!(t.matches("ValidationError").count(), 2);
    }

    #[test]
    fn test_http_path_params() {
        let t = http_request("GET", "/posts/:id", &[("x-api".into(), "1".into())], false);
        assert!(t.contains("\"resourcePath\": \"/posts/$ctx.args.params.id\""));
        assert!(t.contains("\"query\""));
        assert!(t.contains("\"x-api\": \"1\""));
    }

    #[test]
    fn test_related_templates() {
        let q = related_query("gsi-Post.comments", &keys(&["postCommentsId"]), &keys(&["id"]), 100);
        assert!(q.contains("\"index\": \"gsi-Post.comments\""));
        assert!(q.contains("\"#k0\": \"postCommentsId\""));
        assert!(q.contains("#k0 = :k0"));
        assert!(q.contains("$ctx.source.id"));

        let g = related_get(&keys(&["postId"]), &keys(&["id"]));
        assert!(g.contains("\"id\": $util.dynamodb.toDynamoDB($ctx.source.postId)"));
    }
}
