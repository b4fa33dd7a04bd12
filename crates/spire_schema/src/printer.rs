//! Deterministic SDL printer.
//!
//! Definitions print in document order, fields in declaration order, with
//! two-space indentation and one blank line between definitions.

use crate::ast::{
    Definition, Directive, EnumType, FieldDefinition, InputObjectType, InputValue, ObjectType,
    SchemaDocument, Value,
};
use std::fmt::Write;

/// Print a document as SDL text
#[must_use]
pub fn print_document(doc: &SchemaDocument) -> String {
    let blocks: Vec<String> = doc.definitions.iter().map(print_definition).collect();
    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

/// Print a single definition
#[must_use]
pub fn print_definition(definition: &Definition) -> String {
    match definition {
        Definition::Object(t) => print_object("type", t),
        Definition::Interface(t) => print_object("interface", t),
        Definition::ObjectExtension(t) => print_object("extend type", t),
        Definition::Input(t) => print_input(t),
        Definition::Enum(t) => print_enum(t),
        Definition::Scalar(t) => format!(
            "{}scalar {}{}",
            description(t.description.as_deref(), ""),
            t.name,
            directives(&t.directives)
        ),
        Definition::Union(t) => format!(
            "{}union {}{} = {}",
            description(t.description.as_deref(), ""),
            t.name,
            directives(&t.directives),
            t.members.join(" | ")
        ),
    }
}

fn print_object(keyword: &str, t: &ObjectType) -> String {
    let mut out = description(t.description.as_deref(), "");
    let _ = write!(out, "{keyword} {}", t.name);
    if !t.interfaces.is_empty() {
        let _ = write!(out, " implements {}", t.interfaces.join(" & "));
    }
    out.push_str(&directives(&t.directives));
    if !t.fields.is_empty() {
        out.push_str(" {\n");
        for field in &t.fields {
            out.push_str(&print_field(field));
        }
        out.push('}');
    }
    out
}

fn print_field(field: &FieldDefinition) -> String {
    let mut out = description(field.description.as_deref(), "  ");
    let _ = write!(out, "  {}", field.name);
    if !field.arguments.is_empty() {
        let args: Vec<String> = field.arguments.iter().map(print_input_value).collect();
        let _ = write!(out, "({})", args.join(", "));
    }
    let _ = writeln!(out, ": {}{}", field.ty, directives(&field.directives));
    out
}

fn print_input(t: &InputObjectType) -> String {
    let mut out = description(t.description.as_deref(), "");
    let _ = write!(out, "input {}{}", t.name, directives(&t.directives));
    if !t.fields.is_empty() {
        out.push_str(" {\n");
        for field in &t.fields {
            out.push_str(&description(field.description.as_deref(), "  "));
            let _ = writeln!(out, "  {}", print_input_value(field));
        }
        out.push('}');
    }
    out
}

fn print_enum(t: &EnumType) -> String {
    let mut out = description(t.description.as_deref(), "");
    let _ = write!(out, "enum {}{} {{\n", t.name, directives(&t.directives));
    for value in &t.values {
        out.push_str(&description(value.description.as_deref(), "  "));
        let _ = writeln!(out, "  {}{}", value.name, directives(&value.directives));
    }
    out.push('}');
    out
}

fn print_input_value(value: &InputValue) -> String {
    let mut out = format!("{}: {}", value.name, value.ty);
    if let Some(default) = &value.default_value {
        let _ = write!(out, " = {}", print_value(default));
    }
    out.push_str(&directives(&value.directives));
    out
}

fn directives(list: &[Directive]) -> String {
    let mut out = String::new();
    for d in list {
        let _ = write!(out, " @{}", d.name);
        if !d.arguments.is_empty() {
            let args: Vec<String> = d
                .arguments
                .iter()
                .map(|(k, v)| format!("{k}: {}", print_value(v)))
                .collect();
            let _ = write!(out, "({})", args.join(", "));
        }
    }
    out
}

fn description(text: Option<&str>, indent: &str) -> String {
    match text {
        None => String::new(),
        Some(text) if text.contains('\n') => {
            let body: Vec<String> = text.lines().map(|l| format!("{indent}{l}")).collect();
            format!("{indent}\"\"\"\n{}\n{indent}\"\"\"\n", body.join("\n"))
        }
        Some(text) => format!("{indent}{}\n", quote(text)),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Print a constant value
#[must_use]
pub fn print_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.clone(),
        Value::String(s) => quote(s),
        Value::Enum(e) => e.clone(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(print_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{k}: {}", print_value(v)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_fragment;

    #[test]
    fn test_print_object() {
        let doc = parse_fragment(
            "type Todo @model { id: ID! content(limit: Int = 10): String @aws_api_key }",
            0,
        )
        .unwrap();
        assert_eq!(
            print_document(&doc),
            "type Todo @model {\n  id: ID!\n  content(limit: Int = 10): String @aws_api_key\n}\n"
        );
    }

    #[test]
    fn test_print_reparses_identically() {
        let src = r#"
            "Status of a post"
            enum Status { DRAFT PUBLISHED }
            input Filter { eq: String = "a\"b" in: [String] }
            union Item = Post | Note
            type Post @auth(rules: [{allow: owner, operations: [read]}]) { id: ID! status: Status }
            type Note { id: ID! }
        "#;
        let doc = parse_fragment(src, 0).unwrap();
        let printed = print_document(&doc);
        let reparsed = parse_fragment(&printed, 0).unwrap();
        assert_eq!(printed, print_document(&reparsed));
    }

    #[test]
    fn test_print_value() {
        let doc = parse_fragment(r#"type A @d(v: {a: [1, 2.5, true, null, X], b: "s"}) { id: ID }"#, 0).unwrap();
        let d = &doc.object("A").unwrap().directives[0];
        assert_eq!(
            print_value(d.argument("v").unwrap()),
            r#"{a: [1, 2.5, true, null, X], b: "s"}"#
        );
    }

    #[test]
    fn test_multiline_description() {
        let doc = parse_fragment("\"\"\"\nline one\nline two\n\"\"\"\ntype A { id: ID }", 0).unwrap();
        let printed = print_document(&doc);
        assert!(printed.starts_with("\"\"\"\nline one\nline two\n\"\"\"\ntype A"));
    }
}
