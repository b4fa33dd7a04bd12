//! Naming helpers for generated types, fields and resources.
//!
//! Generated names must be a pure function of schema content so that two
//! compiles of the same input produce byte-identical output.

use crate::hash::Hash;
use convert_case::{Case, Casing};
use once_cell::sync::Lazy;
use regex::Regex;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[_A-Za-z][_0-9A-Za-z]*$").expect("name pattern is valid")
});

/// Check if `name` is a valid SDL name
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Uppercase the first character, leaving the rest untouched
#[must_use]
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the first character, leaving the rest untouched
#[must_use]
pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Join words into one camelCase identifier, e.g. `["Post", "comments", "id"]` -> `postCommentsId`
#[must_use]
pub fn camel_join(parts: &[&str]) -> String {
    parts.join(" ").to_case(Case::Camel)
}

/// Join words into one PascalCase identifier
#[must_use]
pub fn pascal_join(parts: &[&str]) -> String {
    parts.join(" ").to_case(Case::Pascal)
}

/// English plural of a type name, as used in list query names
#[must_use]
pub fn plural(word: &str) -> String {
    const IRREGULAR: [(&str, &str); 4] = [
        ("Person", "People"),
        ("person", "people"),
        ("Child", "Children"),
        ("child", "children"),
    ];
    for (single, many) in IRREGULAR {
        if let Some(stem) = word.strip_suffix(single) {
            return format!("{stem}{many}");
        }
    }

    let lower = word.to_lowercase();
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if !matches!(before, Some('a' | 'e' | 'i' | 'o' | 'u') | None) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

/// Shorten `name` to at most `max_len` characters, keeping it unique by content
///
/// Names that fit are returned unchanged. Longer names keep a prefix and gain
/// an 8-character content hash suffix.
#[must_use]
pub fn truncate_name(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    let digest = Hash::compute(name.as_bytes()).short(8);
    let keep = max_len.saturating_sub(digest.len() + 1);
    let prefix: String = name.chars().take(keep).collect();
    format!("{prefix}_{digest}")
}
