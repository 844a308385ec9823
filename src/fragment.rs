//! Fragment types and id derivation

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::LoadFailure;
use crate::reference::{ID_KEY, REF_KEY};

/// Canonical fragment identifier, PascalCase of the source base name
pub type FragmentId = String;

/// Keys that only make sense on a standalone fragment and are dropped when
/// an abstract fragment is spliced into a reference site.
const IDENTITY_KEYS: [&str; 4] = [ID_KEY, "title", "description", REF_KEY];

/// One loaded schema fragment
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Canonical id (e.g. "FooBar" for `foo-bar.schema.yaml`)
    pub id: FragmentId,
    /// Source path the fragment was loaded from
    pub path: PathBuf,
    /// Set once at load time from the source file name
    pub is_abstract: bool,
    /// Parsed tree, carrying `$id: "#<id>"`
    pub content: Value,
}

impl Fragment {
    /// Create a fragment, injecting its self-identifier into the tree
    pub fn new(
        id: impl Into<FragmentId>,
        path: impl Into<PathBuf>,
        is_abstract: bool,
        mut content: Value,
    ) -> Self {
        let id = id.into();
        if let Value::Object(map) = &mut content {
            map.insert(ID_KEY.to_string(), Value::String(format!("#{}", id)));
        }
        Self {
            id,
            path: path.into(),
            is_abstract,
            content,
        }
    }

    /// Parse a fragment from YAML source text
    pub fn from_yaml(
        path: &Path,
        source: &str,
        extension: &str,
        abstract_marker: &str,
    ) -> Result<Self, LoadFailure> {
        let content: Value = serde_yaml::from_str(source)?;
        if !content.is_object() {
            return Err(LoadFailure::NotAMapping);
        }

        Ok(Self::new(
            fragment_id(path, extension),
            path,
            is_abstract_source(path, abstract_marker),
            content,
        ))
    }

    /// Deep copy of the content with identity metadata stripped, ready to
    /// replace a reference node.
    pub fn inlinable_content(&self) -> Value {
        match &self.content {
            Value::Object(map) => {
                let rest: Map<String, Value> = map
                    .iter()
                    .filter(|(key, _)| !IDENTITY_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Value::Object(rest)
            }
            other => other.clone(),
        }
    }
}

/// Derive a fragment id from a source path or a `$ref` path.
///
/// `./schema/foo-bar.schema.yaml` with extension `.schema.yaml` gives `FooBar`.
pub fn fragment_id(path: impl AsRef<Path>, extension: &str) -> FragmentId {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let base = match file_name.strip_suffix(extension) {
        Some(base) if !extension.is_empty() => base.to_string(),
        _ => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or(file_name),
    };

    to_pascal_case(&base)
}

/// Whether a source is abstract, judged purely by its base name
pub fn is_abstract_source(path: &Path, marker: &str) -> bool {
    !marker.is_empty()
        && path
            .file_name()
            .map(|name| name.to_string_lossy().contains(marker))
            .unwrap_or(false)
}

/// Convert string to PascalCase, splitting on separators and case changes
pub fn to_pascal_case(s: &str) -> String {
    split_words(s)
        .into_iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn split_words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            // "fooBar" and the "P" of "XMLParser" both start a new word
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("foo-bar"), "FooBar");
        assert_eq!(to_pascal_case("file_format"), "FileFormat");
        assert_eq!(to_pascal_case("fooBar"), "FooBar");
        assert_eq!(to_pascal_case("XMLParser"), "XmlParser");
        assert_eq!(to_pascal_case("abstract-layer"), "AbstractLayer");
        assert_eq!(to_pascal_case("document"), "Document");
    }

    #[test]
    fn test_fragment_id_from_ref_path() {
        assert_eq!(fragment_id("./schema/foo-bar.schema.yaml", ".schema.yaml"), "FooBar");
        assert_eq!(fragment_id("../abstract-group.schema.yaml", ".schema.yaml"), "AbstractGroup");
        assert_eq!(fragment_id("color.yaml", ".schema.yaml"), "Color");
    }

    #[test]
    fn test_abstract_is_name_based() {
        assert!(is_abstract_source(Path::new("layers/abstract-layer.schema.yaml"), "abstract"));
        assert!(!is_abstract_source(Path::new("abstract/layer.schema.yaml"), "abstract"));
        assert!(!is_abstract_source(Path::new("layer.schema.yaml"), ""));
    }

    #[test]
    fn test_new_injects_self_id() {
        let fragment = Fragment::new("Color", "color.schema.yaml", false, json!({ "type": "object" }));
        assert_eq!(fragment.content["$id"], "#Color");
    }

    #[test]
    fn test_inlinable_content_strips_identity() {
        let fragment = Fragment::new(
            "AbstractLayer",
            "abstract-layer.schema.yaml",
            true,
            json!({
                "title": "Layer",
                "description": "Base layer",
                "type": "object",
                "properties": { "name": { "type": "string" } }
            }),
        );

        assert_eq!(
            fragment.inlinable_content(),
            json!({ "type": "object", "properties": { "name": { "type": "string" } } })
        );
    }

    #[test]
    fn test_from_yaml_rejects_scalar_root() {
        let result = Fragment::from_yaml(Path::new("x.schema.yaml"), "just a string", ".schema.yaml", "abstract");
        assert!(matches!(result, Err(LoadFailure::NotAMapping)));
    }
}
