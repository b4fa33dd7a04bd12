//! SPIRE Schema
//!
//! Annotated SDL front end: logos lexer, recursive-descent parser, fragment
//! merging, default-authorization expansion, base semantic validation and a
//! deterministic printer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod printer;
pub mod validate;

pub use ast::{
    Definition, Directive, DirectiveSite, EnumType, EnumValue, FieldDefinition, InputObjectType,
    InputValue, ObjectType, ScalarType, SchemaDocument, Span, TypeRef, UnionType, Value,
};
pub use normalize::{check_directives, expand_default_auth, merge_fragments};
pub use parser::parse_fragment;
pub use printer::{print_document, print_value};
pub use validate::{BUILTIN_DIRECTIVES, BUILTIN_SCALARS, check_document, is_builtin_scalar};

use spire_core::CompileResult;

/// Parse fragments in caller order and merge them into one document
///
/// # Errors
///
/// Returns the first `ParseError`, or `SchemaValidation` if an extension
/// cannot be merged
pub fn parse_fragments<S: AsRef<str>>(fragments: &[S]) -> CompileResult<SchemaDocument> {
    let docs = fragments
        .iter()
        .enumerate()
        .map(|(index, source)| parse_fragment(source.as_ref(), index))
        .collect::<CompileResult<Vec<_>>>()?;
    merge_fragments(docs)
}
