//! `$ref` parsing and tree walking
//!
//! Fragments point at each other with file-path references; the assembled
//! document only uses `#<Id>` references into its `definitions` mapping.

use serde_json::Value;

use crate::error::Result;
use crate::fragment::{fragment_id, FragmentId};

pub const REF_KEY: &str = "$ref";
pub const ID_KEY: &str = "$id";
pub const SCHEMA_KEY: &str = "$schema";
pub const DEFINITIONS_KEY: &str = "definitions";
pub const ALL_OF_KEY: &str = "allOf";

/// Keywords holding instance data rather than subschemas
pub const DATA_KEYWORDS: [&str; 4] = ["enum", "const", "default", "examples"];

/// Keywords mapping names to subschemas
pub const SCHEMA_MAP_KEYWORDS: [&str; 4] = ["properties", "patternProperties", "definitions", "dependencies"];

const DEFINITIONS_POINTER: &str = "#/definitions/";

/// A parsed `$ref` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Another source unit: `./foo-bar.schema.yaml`
    External {
        path: String,
        target: FragmentId,
        /// Pointer after `#` in the path, if any (not supported by assembly)
        fragment: Option<String>,
    },
    /// An entry of the definitions mapping: `#FooBar` or `#/definitions/FooBar`
    Definition { target: FragmentId },
    /// Any other same-document pointer (`#`, `#/properties/x`)
    Pointer(String),
}

impl Reference {
    /// Parse a `$ref` value; `extension` is stripped from file names before
    /// deriving the target id.
    pub fn parse(value: &str, extension: &str) -> Self {
        if let Some(rest) = value.strip_prefix(DEFINITIONS_POINTER) {
            if !rest.is_empty() && !rest.contains('/') {
                return Reference::Definition { target: rest.to_string() };
            }
            return Reference::Pointer(value.to_string());
        }

        if let Some(rest) = value.strip_prefix('#') {
            if rest.is_empty() || rest.starts_with('/') {
                return Reference::Pointer(value.to_string());
            }
            return Reference::Definition { target: rest.to_string() };
        }

        let (path, fragment) = match value.split_once('#') {
            Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment.to_string())),
            Some((path, _)) => (path, None),
            None => (value, None),
        };

        Reference::External {
            path: path.to_string(),
            target: fragment_id(path, extension),
            fragment,
        }
    }

    /// Fragment id this reference names, if it names one
    pub fn target(&self) -> Option<&str> {
        match self {
            Reference::External { target, .. } | Reference::Definition { target } => Some(target),
            Reference::Pointer(_) => None,
        }
    }

}

/// Canonical internal form of a reference to `id`
pub fn definition_ref(id: &str) -> String {
    format!("#{}", id)
}

/// JSON pointer of `key` below `base`
pub fn child_pointer(base: &str, key: &str) -> String {
    format!("{}/{}", base, key.replace('~', "~0").replace('/', "~1"))
}

/// Call `f(location, ref)` for every `$ref` string in the tree
pub fn visit_refs<F>(value: &Value, location: &str, f: &mut F)
where
    F: FnMut(&str, &str),
{
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_location = child_pointer(location, key);
                match (key.as_str(), child) {
                    (REF_KEY, Value::String(reference)) => f(&child_location, reference),
                    _ => visit_refs(child, &child_location, f),
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                visit_refs(item, &child_pointer(location, &i.to_string()), f);
            }
        }
        _ => {}
    }
}

/// Rewrite `$ref` strings in place; `f` may fail and abort the walk
pub fn visit_refs_mut<F>(value: &mut Value, location: &str, f: &mut F) -> Result<()>
where
    F: FnMut(&str, &mut String) -> Result<()>,
{
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let child_location = child_pointer(location, key);
                match child {
                    Value::String(reference) if key == REF_KEY => f(&child_location, reference)?,
                    _ => visit_refs_mut(child, &child_location, f)?,
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                visit_refs_mut(item, &child_pointer(location, &i.to_string()), f)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Every `$ref` string in the tree, in document order
pub fn collect_refs(value: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    visit_refs(value, "", &mut |_, reference| refs.push(reference.to_string()));
    refs
}
