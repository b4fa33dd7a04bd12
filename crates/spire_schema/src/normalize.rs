//! Fragment merging and schema-wide shorthand expansion.

use crate::ast::{Definition, Directive, SchemaDocument, Value};
use crate::validate::BUILTIN_DIRECTIVES;
use spire_core::{CompileError, CompileResult, Diagnostics, Location};
use tracing::debug;

/// Name of the input type carrying schema-wide settings
pub const GLOBAL_SETTINGS_INPUT: &str = "AMPLIFY";

/// Field of [`GLOBAL_SETTINGS_INPUT`] holding the default authorization rule
pub const GLOBAL_AUTH_FIELD: &str = "globalAuthRule";

/// Concatenate fragments in order and fold `extend type` into its declaration
///
/// An extension must follow the declaration it extends, either earlier in the
/// same fragment or in an earlier fragment.
///
/// # Errors
///
/// Returns `SchemaValidation` when an extension targets an undeclared type or
/// adds a field that already exists
pub fn merge_fragments(fragments: Vec<SchemaDocument>) -> CompileResult<SchemaDocument> {
    let mut merged = SchemaDocument::new();

    for fragment in fragments {
        for definition in fragment.definitions {
            let Definition::ObjectExtension(extension) = definition else {
                merged.definitions.push(definition);
                continue;
            };

            let Some(target) = merged.object_mut(&extension.name) else {
                return Err(CompileError::schema(
                    Location::of_type(&extension.name),
                    "extend type targets a type that is not declared before it",
                ));
            };

            for interface in extension.interfaces {
                if !target.interfaces.contains(&interface) {
                    target.interfaces.push(interface);
                }
            }
            target.directives.extend(extension.directives);
            for field in extension.fields {
                if target.has_field(&field.name) {
                    return Err(CompileError::schema(
                        Location::of_field(&extension.name, &field.name),
                        "extend type redeclares an existing field",
                    ));
                }
                target.fields.push(field);
            }
            debug!(type_name = %extension.name, "merged type extension");
        }
    }

    Ok(merged)
}

/// Apply the schema-wide default authorization rule
///
/// `input AMPLIFY { globalAuthRule: AuthRule = { allow: public } }` attaches
/// `@auth(rules: [<default>])` to every `@model` type without an `@auth`
/// directive. The settings input is removed from the document either way.
///
/// # Errors
///
/// Returns `SchemaValidation` when the settings input is malformed
pub fn expand_default_auth(
    mut doc: SchemaDocument,
    diagnostics: &mut Diagnostics,
) -> CompileResult<SchemaDocument> {
    let Some(settings) = doc.remove_type(GLOBAL_SETTINGS_INPUT) else {
        return Ok(doc);
    };
    let Definition::Input(settings) = settings else {
        return Err(CompileError::schema(
            Location::of_type(GLOBAL_SETTINGS_INPUT),
            "global settings must be declared as an input type",
        ));
    };

    let mut rule = None;
    for field in &settings.fields {
        if field.name == GLOBAL_AUTH_FIELD {
            match &field.default_value {
                Some(value @ Value::Object(_)) => rule = Some(value.clone()),
                _ => {
                    return Err(CompileError::schema(
                        Location::of_field(GLOBAL_SETTINGS_INPUT, GLOBAL_AUTH_FIELD),
                        "globalAuthRule needs an object default value",
                    ));
                }
            }
        } else {
            diagnostics.warn(
                "unknown-global-setting",
                format!("global setting '{}' is not recognized and was ignored", field.name),
                Some(Location::of_field(GLOBAL_SETTINGS_INPUT, &field.name)),
            );
        }
    }

    let Some(rule) = rule else {
        return Ok(doc);
    };

    let mut applied = 0usize;
    for object in doc.objects_mut() {
        if object.has_directive("model") && !object.has_directive("auth") {
            object.directives.push(
                Directive::new("auth").with_argument("rules", Value::List(vec![rule.clone()])),
            );
            applied += 1;
        }
    }

    if applied > 0 {
        diagnostics.warn(
            "global-auth-rule",
            format!(
                "the global authorization rule was applied to {applied} model(s); replace it with per-model @auth rules before production use"
            ),
            None,
        );
    }
    debug!(models = applied, "expanded global auth rule");
    Ok(doc)
}

/// Reject directives that no transformer owns
///
/// `known` lists the directive names owned by registered transformers. Built-in
/// pass-through directives are always accepted.
///
/// # Errors
///
/// Returns `UnknownDirective` for the first unrecognized directive
pub fn check_directives(doc: &SchemaDocument, known: &[&str]) -> CompileResult<()> {
    let accepted = |name: &str| known.contains(&name) || BUILTIN_DIRECTIVES.contains(&name);
    let unknown = |d: &Directive, location: Location| {
        Err(CompileError::UnknownDirective {
            directive: d.name.clone(),
            location,
        })
    };

    for definition in &doc.definitions {
        let type_name = definition.name();
        if let Some(d) = definition.directives().iter().find(|d| !accepted(&d.name)) {
            return unknown(d, Location::of_type(type_name));
        }

        match definition {
            Definition::Object(t) | Definition::Interface(t) | Definition::ObjectExtension(t) => {
                for field in &t.fields {
                    let on_field = field.directives.iter();
                    let on_args = field.arguments.iter().flat_map(|a| a.directives.iter());
                    if let Some(d) = on_field.chain(on_args).find(|d| !accepted(&d.name)) {
                        return unknown(d, Location::of_field(type_name, &field.name));
                    }
                }
            }
            Definition::Input(t) => {
                for field in &t.fields {
                    if let Some(d) = field.directives.iter().find(|d| !accepted(&d.name)) {
                        return unknown(d, Location::of_field(type_name, &field.name));
                    }
                }
            }
            Definition::Enum(t) => {
                for value in &t.values {
                    if let Some(d) = value.directives.iter().find(|d| !accepted(&d.name)) {
                        return unknown(d, Location::of_field(type_name, &value.name));
                    }
                }
            }
            Definition::Scalar(_) | Definition::Union(_) => {}
        }
    }
    Ok(())
}
