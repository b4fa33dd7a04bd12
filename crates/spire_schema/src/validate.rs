//! Base semantic validation.
//!
//! Checks that hold for every well-formed document regardless of which
//! directives it carries. The orchestrator runs these after every phase.

use crate::ast::{Definition, InputValue, SchemaDocument, TypeRef};
use indexmap::{IndexMap, IndexSet};
use spire_core::{CompileError, CompileResult, Location};

/// Scalars every document may reference without declaring
pub const BUILTIN_SCALARS: &[&str] = &[
    "ID",
    "String",
    "Int",
    "Float",
    "Boolean",
    "AWSDate",
    "AWSTime",
    "AWSDateTime",
    "AWSTimestamp",
    "AWSEmail",
    "AWSJSON",
    "AWSURL",
    "AWSPhone",
    "AWSIPAddress",
];

/// Directives accepted without a transformer and kept in the printed schema
pub const BUILTIN_DIRECTIVES: &[&str] = &[
    "deprecated",
    "aws_api_key",
    "aws_iam",
    "aws_oidc",
    "aws_cognito_user_pools",
    "aws_lambda",
    "aws_subscribe",
];

/// Check if a name is a built-in scalar
#[must_use]
pub fn is_builtin_scalar(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    Input,
}

impl Kind {
    fn is_output(self) -> bool {
        !matches!(self, Self::Input)
    }

    fn is_input(self) -> bool {
        matches!(self, Self::Scalar | Self::Enum | Self::Input)
    }
}

/// Validate base semantics of a document
///
/// # Errors
///
/// Returns `SchemaValidation` for duplicate names, references to undefined
/// types, types used in the wrong position, empty field lists and leftover
/// extensions
pub fn check_document(doc: &SchemaDocument) -> CompileResult<()> {
    let kinds = collect_kinds(doc)?;

    for definition in &doc.definitions {
        let type_name = definition.name();
        match definition {
            Definition::ObjectExtension(_) => {
                return Err(CompileError::schema(
                    Location::of_type(type_name),
                    "unmerged type extension",
                ));
            }
            Definition::Object(t) | Definition::Interface(t) => {
                if t.fields.is_empty() {
                    return Err(CompileError::schema(
                        Location::of_type(type_name),
                        "type must declare at least one field",
                    ));
                }
                for interface in &t.interfaces {
                    if kinds.get(interface.as_str()) != Some(&Kind::Interface) {
                        return Err(CompileError::schema(
                            Location::of_type(type_name),
                            format!("implements '{interface}', which is not an interface"),
                        ));
                    }
                }

                let mut seen = IndexSet::new();
                for field in &t.fields {
                    let location = Location::of_field(type_name, &field.name);
                    if !seen.insert(field.name.as_str()) {
                        return Err(CompileError::schema(location, "duplicate field"));
                    }
                    check_reserved(&field.name, &location)?;
                    check_type_ref(&kinds, &field.ty, &location, Kind::is_output, "output")?;
                    check_arguments(&kinds, &field.arguments, &location)?;
                }
            }
            Definition::Input(t) => {
                if t.fields.is_empty() {
                    return Err(CompileError::schema(
                        Location::of_type(type_name),
                        "input type must declare at least one field",
                    ));
                }
                check_arguments(&kinds, &t.fields, &Location::of_type(type_name))?;
            }
            Definition::Enum(t) => {
                if t.values.is_empty() {
                    return Err(CompileError::schema(
                        Location::of_type(type_name),
                        "enum must declare at least one value",
                    ));
                }
                let mut seen = IndexSet::new();
                for value in &t.values {
                    if !seen.insert(value.name.as_str()) {
                        return Err(CompileError::schema(
                            Location::of_field(type_name, &value.name),
                            "duplicate enum value",
                        ));
                    }
                }
            }
            Definition::Union(t) => {
                for member in &t.members {
                    if kinds.get(member.as_str()) != Some(&Kind::Object) {
                        return Err(CompileError::schema(
                            Location::of_type(type_name),
                            format!("union member '{member}' is not an object type"),
                        ));
                    }
                }
            }
            Definition::Scalar(_) => {}
        }
    }
    Ok(())
}

fn collect_kinds(doc: &SchemaDocument) -> CompileResult<IndexMap<&str, Kind>> {
    let mut kinds: IndexMap<&str, Kind> = BUILTIN_SCALARS.iter().map(|s| (*s, Kind::Scalar)).collect();

    for definition in &doc.definitions {
        let name = definition.name();
        let kind = match definition {
            Definition::Object(_) | Definition::ObjectExtension(_) => Kind::Object,
            Definition::Interface(_) => Kind::Interface,
            Definition::Input(_) => Kind::Input,
            Definition::Enum(_) => Kind::Enum,
            Definition::Scalar(_) => Kind::Scalar,
            Definition::Union(_) => Kind::Union,
        };
        check_reserved(name, &Location::of_type(name))?;
        if kinds.insert(name, kind).is_some() {
            return Err(CompileError::schema(
                Location::of_type(name),
                "duplicate type definition",
            ));
        }
    }
    Ok(kinds)
}

fn check_reserved(name: &str, location: &Location) -> CompileResult<()> {
    if name.starts_with("__") {
        return Err(CompileError::schema(
            location.clone(),
            format!("'{name}' uses the reserved '__' prefix"),
        ));
    }
    Ok(())
}

fn check_arguments(
    kinds: &IndexMap<&str, Kind>,
    arguments: &[InputValue],
    location: &Location,
) -> CompileResult<()> {
    let mut seen = IndexSet::new();
    for arg in arguments {
        if !seen.insert(arg.name.as_str()) {
            return Err(CompileError::schema(
                location.clone(),
                format!("duplicate argument or input field '{}'", arg.name),
            ));
        }
        check_type_ref(kinds, &arg.ty, location, Kind::is_input, "input")?;
    }
    Ok(())
}

fn check_type_ref(
    kinds: &IndexMap<&str, Kind>,
    ty: &TypeRef,
    location: &Location,
    allowed: fn(Kind) -> bool,
    position: &str,
) -> CompileResult<()> {
    let base = ty.base_name();
    match kinds.get(base) {
        None => Err(CompileError::schema(
            location.clone(),
            format!("references undefined type '{base}'"),
        )),
        Some(kind) if !allowed(*kind) => Err(CompileError::schema(
            location.clone(),
            format!("'{base}' cannot be used in {position} position"),
        )),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_fragment;

    fn check(src: &str) -> CompileResult<()> {
        check_document(&parse_fragment(src, 0).unwrap())
    }

    #[test]
    fn test_valid_document() {
        check(
            r#"
            enum Status { OPEN CLOSED }
            interface Node { id: ID! }
            input TodoInput { id: ID status: Status }
            type Todo implements Node { id: ID! status: Status when: AWSDateTime }
            type Query { todo(input: TodoInput): Todo }
            union Any = Todo
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_duplicate_type() {
        let err = check("type A { id: ID } type A { id: ID }").unwrap_err();
        assert_eq!(err, CompileError::schema(Location::of_type("A"), "duplicate type definition"));
    }

    #[test]
    fn test_redeclared_builtin_scalar() {
        assert!(check("scalar AWSJSON").is_err());
    }

    #[test]
    fn test_duplicate_field() {
        let err = check("type A { id: ID id: String }").unwrap_err();
        assert_eq!(err, CompileError::schema(Location::of_field("A", "id"), "duplicate field"));
    }

    #[test]
    fn test_undefined_type() {
        let err = check("type A { b: Missing }").unwrap_err();
        assert!(err.to_string().contains("undefined type 'Missing'"));
    }

    #[test]
    fn test_wrong_positions() {
        assert!(check("input I { x: Int } type A { i: I }").is_err());
        assert!(check("type B { id: ID } type A { f(b: B): Int }").is_err());
    }

    #[test]
    fn test_empty_and_reserved() {
        assert!(check("type A").is_err());
        assert!(check("type __A { id: ID }").is_err());
        assert!(check("type A { __id: ID }").is_err());
    }

    #[test]
    fn test_implements_non_interface() {
        assert!(check("type N { id: ID } type A implements N { id: ID }").is_err());
    }
}
