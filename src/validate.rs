//! Meta-schema validation of assembled documents
//!
//! The draft-07 meta-schema ships with the crate, so validation never touches
//! the network. On top of it an optional local rule rejects validation
//! keywords written beside `$ref`, which draft-07 silently ignores.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::debug;

use crate::error::{AssemblyError, Result, Violation};
use crate::reference::{child_pointer, DATA_KEYWORDS, REF_KEY, SCHEMA_MAP_KEYWORDS};

/// `$schema` value of every assembled document
pub const DRAFT_07_URL: &str = "http://json-schema.org/draft-07/schema#";

const DRAFT_07_META_SCHEMA: &str = include_str!("../meta/draft-07.schema.json");

/// Rule name reported for `$ref` sibling violations
pub const REF_SIBLINGS_RULE: &str = "ref-siblings";

/// Draft-07 keywords that constrain instances
const VALIDATION_KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "const",
    "multipleOf",
    "maximum",
    "exclusiveMaximum",
    "minimum",
    "exclusiveMinimum",
    "maxLength",
    "minLength",
    "pattern",
    "format",
    "items",
    "additionalItems",
    "maxItems",
    "minItems",
    "uniqueItems",
    "contains",
    "maxProperties",
    "minProperties",
    "required",
    "properties",
    "patternProperties",
    "additionalProperties",
    "dependencies",
    "propertyNames",
    "if",
    "then",
    "else",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
];

/// Draft-07 meta-schema check plus the `$ref` siblings rule
pub struct MetaSchemaValidator {
    meta: JSONSchema,
    check_ref_siblings: bool,
}

impl MetaSchemaValidator {
    /// Compile the bundled draft-07 meta-schema
    pub fn draft7() -> Result<Self> {
        let meta: Value = serde_json::from_str(DRAFT_07_META_SCHEMA)?;
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&meta)
            .map_err(|e| AssemblyError::InvalidMetaSchema(e.to_string()))?;

        Ok(Self {
            meta: compiled,
            check_ref_siblings: true,
        })
    }

    pub fn with_ref_siblings(mut self, enabled: bool) -> Self {
        self.check_ref_siblings = enabled;
        self
    }

    /// Every violation in `document`, meta-schema failures first
    pub fn violations(&self, document: &Value) -> Vec<Violation> {
        let mut violations: Vec<Violation> = match self.meta.validate(document) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| Violation {
                    instance_path: error.instance_path.to_string(),
                    schema_path: error.schema_path.to_string(),
                    message: error.to_string(),
                })
                .collect(),
        };

        if self.check_ref_siblings {
            ref_sibling_violations(document, "", &mut violations);
        }
        violations
    }

    pub fn validate(&self, document: &Value) -> Result<()> {
        let violations = self.violations(document);
        debug!(violations = violations.len(), "meta-schema validation");
        if violations.is_empty() {
            Ok(())
        } else {
            Err(AssemblyError::MetaSchemaViolation(violations))
        }
    }
}

fn ref_sibling_violations(node: &Value, location: &str, out: &mut Vec<Violation>) {
    match node {
        Value::Object(map) => {
            if map.get(REF_KEY).is_some_and(Value::is_string) {
                for key in map.keys().filter(|k| VALIDATION_KEYWORDS.contains(&k.as_str())) {
                    out.push(Violation {
                        instance_path: location.to_string(),
                        schema_path: REF_SIBLINGS_RULE.to_string(),
                        message: format!("\"{}\" is ignored next to \"$ref\"", key),
                    });
                }
            }

            for (key, child) in map {
                if DATA_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                let child_location = child_pointer(location, key);
                if SCHEMA_MAP_KEYWORDS.contains(&key.as_str()) {
                    if let Value::Object(entries) = child {
                        for (name, schema) in entries {
                            ref_sibling_violations(schema, &child_pointer(&child_location, name), out);
                        }
                        continue;
                    }
                }
                ref_sibling_violations(child, &child_location, out);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                ref_sibling_violations(item, &child_pointer(location, &index.to_string()), out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_document_passes() {
        let validator = MetaSchemaValidator::draft7().unwrap();
        let doc = json!({
            "$schema": DRAFT_07_URL,
            "$id": "https://www.sketch.com/schemas/document.schema.json",
            "type": "object",
            "properties": { "color": { "$ref": "#Color", "description": "Fill" } },
            "definitions": { "Color": { "$id": "#Color", "type": "object" } }
        });

        assert!(validator.validate(&doc).is_ok());
    }

    #[test]
    fn test_collects_all_violations() {
        let validator = MetaSchemaValidator::draft7().unwrap();
        let doc = json!({
            "type": "colour",
            "minLength": -1
        });

        let err = validator.validate(&doc).unwrap_err();
        let violations = err.violations();
        assert!(violations.len() >= 2);
        assert!(violations.iter().any(|v| v.instance_path == "/type"));
        assert!(violations.iter().any(|v| v.instance_path == "/minLength"));
    }

    #[test]
    fn test_ref_siblings_rule() {
        let doc = json!({
            "properties": {
                "fill": { "$ref": "#Color", "type": "object", "title": "Fill" }
            }
        });

        let strict = MetaSchemaValidator::draft7().unwrap();
        let violations = strict.violations(&doc);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/properties/fill");
        assert_eq!(violations[0].schema_path, REF_SIBLINGS_RULE);

        let lenient = MetaSchemaValidator::draft7().unwrap().with_ref_siblings(false);
        assert!(lenient.violations(&doc).is_empty());
    }

    #[test]
    fn test_property_named_like_keyword_is_not_a_sibling() {
        let validator = MetaSchemaValidator::draft7().unwrap();
        let doc = json!({
            "properties": {
                "$ref": { "type": "string" },
                "type": { "type": "string" }
            }
        });
        assert!(validator.violations(&doc).is_empty());
    }

    #[test]
    fn test_ref_inside_instance_data_is_not_checked() {
        let validator = MetaSchemaValidator::draft7().unwrap();
        let doc = json!({
            "type": "object",
            "default": { "$ref": "#Color", "type": "color" },
            "examples": [{ "$ref": "./color.schema.yaml", "minimum": 1 }],
            "const": { "$ref": "#Color", "enum": [] }
        });
        assert!(validator.violations(&doc).is_empty());
    }
}
