//! Schema document AST.
//!
//! Every node is plain owned data so a transform stage can consume a
//! document and return a new one without sharing structure.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a node
///
/// Nodes synthesized by the compiler carry `Span::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Index of the input fragment
    pub fragment: usize,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Span {
    /// Create a span
    #[must_use]
    pub const fn new(fragment: usize, line: u32, column: u32) -> Self {
        Self {
            fragment,
            line,
            column,
        }
    }

    /// Check if the node came from user input
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.line == 0
    }
}

/// Constant value in a directive argument or default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal, kept as written
    Float(String),
    /// String literal (escapes resolved)
    String(String),
    /// Enum value
    Enum(String),
    /// List literal
    List(Vec<Value>),
    /// Object literal
    Object(IndexMap<String, Value>),
}

impl Value {
    /// String or enum contents
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean contents
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer contents
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Object contents
    #[must_use]
    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// List contents; a single non-list value coerces to a one-element list
    #[must_use]
    pub fn as_list(&self) -> Vec<&Value> {
        match self {
            Self::List(items) => items.iter().collect(),
            Self::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// List of strings/enums, with single-value coercion
    #[must_use]
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list()
            .into_iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Check for `null`
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Reference to a type in a field, argument or input field position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    /// Named type
    Named(String),
    /// List of the inner type
    List(Box<TypeRef>),
    /// Non-null wrapper
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Nullable named type
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Non-null named type
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self::NonNull(Box::new(Self::Named(name.into())))
    }

    /// Wrap in a list
    #[must_use]
    pub fn list_of(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Wrap in non-null unless already non-null
    #[must_use]
    pub fn non_null(self) -> Self {
        match self {
            Self::NonNull(_) => self,
            other => Self::NonNull(Box::new(other)),
        }
    }

    /// Strip an outer non-null wrapper
    #[must_use]
    pub fn nullable(self) -> Self {
        match self {
            Self::NonNull(inner) => *inner,
            other => other,
        }
    }

    /// Innermost named type
    #[must_use]
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.base_name(),
        }
    }

    /// Check for an outer non-null wrapper
    #[must_use]
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Check if the type is a list (ignoring an outer non-null)
    #[must_use]
    pub fn is_list(&self) -> bool {
        match self {
            Self::List(_) => true,
            Self::NonNull(inner) => inner.is_list(),
            Self::Named(_) => false,
        }
    }

    /// Replace the innermost named type, keeping wrappers
    #[must_use]
    pub fn with_base(&self, name: &str) -> Self {
        match self {
            Self::Named(_) => Self::Named(name.to_string()),
            Self::List(inner) => Self::List(Box::new(inner.with_base(name))),
            Self::NonNull(inner) => Self::NonNull(Box::new(inner.with_base(name))),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// Directive application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    /// Name without `@`
    pub name: String,
    /// Arguments in source order
    pub arguments: IndexMap<String, Value>,
    /// Source position
    pub span: Span,
}

impl Directive {
    /// Synthesized directive without arguments
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: IndexMap::new(),
            span: Span::default(),
        }
    }

    /// Add an argument
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Look up an argument
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

fn find_directive<'a>(directives: &'a [Directive], name: &str) -> Option<&'a Directive> {
    directives.iter().find(|d| d.name == name)
}

/// Field, argument or input field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputValue {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Type
    pub ty: TypeRef,
    /// Default value
    pub default_value: Option<Value>,
    /// Directives
    pub directives: Vec<Directive>,
    /// Source position
    pub span: Span,
}

impl InputValue {
    /// Synthesized input value
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
            directives: Vec::new(),
            span: Span::default(),
        }
    }
}

/// Field of an object or interface type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Arguments
    pub arguments: Vec<InputValue>,
    /// Type
    pub ty: TypeRef,
    /// Directives
    pub directives: Vec<Directive>,
    /// Source position
    pub span: Span,
}

impl FieldDefinition {
    /// Synthesized field
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            ty,
            directives: Vec::new(),
            span: Span::default(),
        }
    }

    /// Add an argument
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.arguments.push(InputValue::new(name, ty));
        self
    }

    /// Add a directive
    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// First directive with the given name
    #[must_use]
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        find_directive(&self.directives, name)
    }

    /// All directives with the given name
    pub fn directives_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Directive> {
        self.directives.iter().filter(move |d| d.name == name)
    }

    /// Check for a directive
    #[must_use]
    pub fn has_directive(&self, name: &str) -> bool {
        self.directive(name).is_some()
    }
}

/// Object or interface type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Directives
    pub directives: Vec<Directive>,
    /// Fields
    pub fields: Vec<FieldDefinition>,
    /// Source position
    pub span: Span,
}

impl ObjectType {
    /// Synthesized empty type
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            interfaces: Vec::new(),
            directives: Vec::new(),
            fields: Vec::new(),
            span: Span::default(),
        }
    }

    /// Add a field
    #[must_use]
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field mutably
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDefinition> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Check for a field
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// First directive with the given name
    #[must_use]
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        find_directive(&self.directives, name)
    }

    /// Check for a directive
    #[must_use]
    pub fn has_directive(&self, name: &str) -> bool {
        self.directive(name).is_some()
    }

    /// Append a field unless one with the same name exists; returns whether it was added
    pub fn add_field_if_missing(&mut self, field: FieldDefinition) -> bool {
        if self.has_field(&field.name) {
            return false;
        }
        self.fields.push(field);
        true
    }
}

/// Input object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputObjectType {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Directives
    pub directives: Vec<Directive>,
    /// Input fields
    pub fields: Vec<InputValue>,
    /// Source position
    pub span: Span,
}

impl InputObjectType {
    /// Synthesized input type
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            directives: Vec::new(),
            fields: Vec::new(),
            span: Span::default(),
        }
    }

    /// Add an input field
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.fields.push(InputValue::new(name, ty));
        self
    }
}

/// Enum value declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Directives
    pub directives: Vec<Directive>,
}

/// Enum type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Directives
    pub directives: Vec<Directive>,
    /// Values
    pub values: Vec<EnumValue>,
    /// Source position
    pub span: Span,
}

impl EnumType {
    /// Synthesized enum
    #[must_use]
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: None,
            directives: Vec::new(),
            values: values
                .iter()
                .map(|v| EnumValue {
                    name: (*v).to_string(),
                    description: None,
                    directives: Vec::new(),
                })
                .collect(),
            span: Span::default(),
        }
    }

    /// Check for a value
    #[must_use]
    pub fn has_value(&self, name: &str) -> bool {
        self.values.iter().any(|v| v.name == name)
    }
}

/// Scalar type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarType {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Directives
    pub directives: Vec<Directive>,
    /// Source position
    pub span: Span,
}

/// Union type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionType {
    /// Name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Directives
    pub directives: Vec<Directive>,
    /// Member types
    pub members: Vec<String>,
    /// Source position
    pub span: Span,
}

/// Top-level definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Definition {
    /// `type`
    Object(ObjectType),
    /// `interface`
    Interface(ObjectType),
    /// `input`
    Input(InputObjectType),
    /// `enum`
    Enum(EnumType),
    /// `scalar`
    Scalar(ScalarType),
    /// `union`
    Union(UnionType),
    /// `extend type`; merged away by the normalizer
    ObjectExtension(ObjectType),
}

impl Definition {
    /// Name of the defined type
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Object(t) | Self::Interface(t) | Self::ObjectExtension(t) => &t.name,
            Self::Input(t) => &t.name,
            Self::Enum(t) => &t.name,
            Self::Scalar(t) => &t.name,
            Self::Union(t) => &t.name,
        }
    }

    /// Directives attached to the definition itself
    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        match self {
            Self::Object(t) | Self::Interface(t) | Self::ObjectExtension(t) => &t.directives,
            Self::Input(t) => &t.directives,
            Self::Enum(t) => &t.directives,
            Self::Scalar(t) => &t.directives,
            Self::Union(t) => &t.directives,
        }
    }
}

/// Where a directive is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSite {
    /// Owning type
    pub type_name: String,
    /// Owning field, for field directives
    pub field_name: Option<String>,
    /// The directive
    pub directive: Directive,
}

/// Parsed schema document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Definitions in source order
    pub definitions: Vec<Definition>,
}

impl SchemaDocument {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an object type
    #[must_use]
    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.definitions.iter().find_map(|d| match d {
            Definition::Object(t) if t.name == name => Some(t),
            _ => None,
        })
    }

    /// Look up an object type mutably
    pub fn object_mut(&mut self, name: &str) -> Option<&mut ObjectType> {
        self.definitions.iter_mut().find_map(|d| match d {
            Definition::Object(t) if t.name == name => Some(t),
            _ => None,
        })
    }

    /// Look up an object type, creating an empty one at the end if absent
    pub fn object_or_insert(&mut self, name: &str) -> &mut ObjectType {
        let index = match self.definitions.iter().position(
            |d| matches!(d, Definition::Object(t) if t.name == name),
        ) {
            Some(index) => index,
            None => {
                self.definitions.push(Definition::Object(ObjectType::new(name)));
                self.definitions.len() - 1
            }
        };
        match &mut self.definitions[index] {
            Definition::Object(t) => t,
            _ => unreachable!("position matched an object definition"),
        }
    }

    /// All object types in order
    pub fn objects(&self) -> impl Iterator<Item = &ObjectType> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Object(t) => Some(t),
            _ => None,
        })
    }

    /// All object types mutably
    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut ObjectType> {
        self.definitions.iter_mut().filter_map(|d| match d {
            Definition::Object(t) => Some(t),
            _ => None,
        })
    }

    /// Look up an input type
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&InputObjectType> {
        self.definitions.iter().find_map(|d| match d {
            Definition::Input(t) if t.name == name => Some(t),
            _ => None,
        })
    }

    /// Look up an enum type
    #[must_use]
    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        self.definitions.iter().find_map(|d| match d {
            Definition::Enum(t) if t.name == name => Some(t),
            _ => None,
        })
    }

    /// Check if any definition has this name
    #[must_use]
    pub fn has_type(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d.name() == name)
    }

    /// Append a definition unless a type of the same name exists; returns whether it was added
    pub fn add_if_missing(&mut self, definition: Definition) -> bool {
        if self.has_type(definition.name()) {
            return false;
        }
        self.definitions.push(definition);
        true
    }

    /// Remove a definition by name
    pub fn remove_type(&mut self, name: &str) -> Option<Definition> {
        let index = self.definitions.iter().position(|d| d.name() == name)?;
        Some(self.definitions.remove(index))
    }

    /// Names of object types carrying the given directive
    #[must_use]
    pub fn objects_with(&self, directive: &str) -> Vec<String> {
        self.objects()
            .filter(|t| t.has_directive(directive))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Every place the named directive is attached, in document order
    ///
    /// Type-level sites come before the type's field sites.
    #[must_use]
    pub fn directive_sites(&self, name: &str) -> Vec<DirectiveSite> {
        let mut sites = Vec::new();
        for object in self.objects() {
            for d in object.directives.iter().filter(|d| d.name == name) {
                sites.push(DirectiveSite {
                    type_name: object.name.clone(),
                    field_name: None,
                    directive: d.clone(),
                });
            }
            for field in &object.fields {
                for d in field.directives_named(name) {
                    sites.push(DirectiveSite {
                        type_name: object.name.clone(),
                        field_name: Some(field.name.clone()),
                        directive: d.clone(),
                    });
                }
            }
        }
        sites
    }

    /// Remove every application of the named directives from types and fields
    pub fn strip_directives(&mut self, names: &[&str]) {
        let keep = |d: &Directive| !names.contains(&d.name.as_str());
        for definition in &mut self.definitions {
            match definition {
                Definition::Object(t) | Definition::Interface(t) | Definition::ObjectExtension(t) => {
                    t.directives.retain(keep);
                    for field in &mut t.fields {
                        field.directives.retain(keep);
                        for arg in &mut field.arguments {
                            arg.directives.retain(keep);
                        }
                    }
                }
                Definition::Input(t) => {
                    t.directives.retain(keep);
                    for field in &mut t.fields {
                        field.directives.retain(keep);
                    }
                }
                Definition::Enum(t) => t.directives.retain(keep),
                Definition::Scalar(t) => t.directives.retain(keep),
                Definition::Union(t) => t.directives.retain(keep),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn todo() -> ObjectType {
        let mut t = ObjectType::new("Todo")
            .with_field(FieldDefinition::new("id", TypeRef::required("ID")))
            .with_field(FieldDefinition::new("tags", TypeRef::list_of(TypeRef::named("String"))));
        t.directives.push(Directive::new("model"));
        t
    }

    #[test]
    fn test_type_ref_helpers() {
        let ty = TypeRef::list_of(TypeRef::required("Comment")).non_null();
        assert_eq!(ty.to_string(), "[Comment!]!");
        assert_eq!(ty.base_name(), "Comment");
        assert!(ty.is_list());
        assert!(ty.is_non_null());
        assert_eq!(ty.clone().nullable().to_string(), "[Comment!]");
        assert_eq!(ty.with_base("PostTags").to_string(), "[PostTags!]!");
    }

    #[test]
    fn test_value_coercion() {
        let single = Value::String("aId".to_string());
        assert_eq!(single.as_string_list(), Some(vec!["aId".to_string()]));

        let list = Value::List(vec![Value::String("a".into()), Value::Enum("B".into())]);
        assert_eq!(list.as_string_list(), Some(vec!["a".to_string(), "B".to_string()]));

        let bad = Value::List(vec![Value::Int(1)]);
        assert_eq!(bad.as_string_list(), None);
        assert!(Value::Null.as_list().is_empty());
    }

    #[test]
    fn test_document_lookup() {
        let mut doc = SchemaDocument::new();
        doc.definitions.push(Definition::Object(todo()));

        assert!(doc.object("Todo").is_some());
        assert!(doc.has_type("Todo"));
        assert_eq!(doc.objects_with("model"), vec!["Todo".to_string()]);

        let query = doc.object_or_insert("Query");
        query.fields.push(FieldDefinition::new("getTodo", TypeRef::named("Todo")));
        assert_eq!(doc.object("Query").map(|q| q.fields.len()), Some(1));
        assert_eq!(doc.definitions.len(), 2);
    }

    #[test]
    fn test_directive_sites_and_strip() {
        let mut doc = SchemaDocument::new();
        let mut t = todo();
        t.fields[1].directives.push(Directive::new("default"));
        doc.definitions.push(Definition::Object(t));

        let sites = doc.directive_sites("default");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].field_name.as_deref(), Some("tags"));

        doc.strip_directives(&["model", "default"]);
        assert!(doc.directive_sites("model").is_empty());
        assert!(doc.directive_sites("default").is_empty());
    }

    #[test]
    fn test_add_if_missing() {
        let mut doc = SchemaDocument::new();
        assert!(doc.add_if_missing(Definition::Object(todo())));
        assert!(!doc.add_if_missing(Definition::Object(todo())));
        assert!(doc.remove_type("Todo").is_some());
        assert!(!doc.has_type("Todo"));
    }
}
