//! Composition flattening
//!
//! Every `allOf` array is merged, together with the keywords sitting next to
//! it, into one schema accepting exactly the instances every member accepts.
//! Nodes are visited children first, so members are already flat when their
//! parent merges them.
//!
//! Constraints that have no combined form (two different `format`s, two
//! `if`/`then`/`else` groups, two different `$ref`s) are kept side by side:
//! the extra one is carried as `not: { not: <schema> }`, folded into any
//! existing `not`.

use std::collections::BTreeSet;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::{AssemblyError, Result};
use crate::reference::{
    child_pointer, Reference, ALL_OF_KEY, DATA_KEYWORDS, DEFINITIONS_KEY, ID_KEY, REF_KEY, SCHEMA_MAP_KEYWORDS,
};

const PROPERTIES: &str = "properties";
const PATTERN_PROPERTIES: &str = "patternProperties";
const ADDITIONAL_PROPERTIES: &str = "additionalProperties";
const NOT: &str = "not";

/// Keywords merged jointly by `merge_object_applicators`
const OBJECT_APPLICATORS: [&str; 3] = [PROPERTIES, PATTERN_PROPERTIES, ADDITIONAL_PROPERTIES];

/// `if`/`then`/`else` only mean something together
const CONDITIONAL: [&str; 3] = ["if", "then", "else"];

/// Annotations carry no constraint; the first operand's value is kept
const ANNOTATIONS: [&str; 8] = [
    "title",
    "description",
    "$comment",
    "default",
    "examples",
    ID_KEY,
    "$schema",
    DEFINITIONS_KEY,
];

/// Lower/upper bound pairs checked for contradictions after a merge
const BOUND_PAIRS: [(&str, &str); 4] = [
    ("minimum", "maximum"),
    ("minLength", "maxLength"),
    ("minItems", "maxItems"),
    ("minProperties", "maxProperties"),
];

/// Keywords whose subschemas apply to parts of the instance rather than to
/// the instance itself
const INSTANCE_APPLICATORS: [&str; 7] = [
    PROPERTIES,
    PATTERN_PROPERTIES,
    ADDITIONAL_PROPERTIES,
    "items",
    "additionalItems",
    "contains",
    "propertyNames",
];

/// Largest `anyOf`/`oneOf` cross product expanded during a merge
const MAX_ALTERNATIVES: usize = 64;

/// Flatten every `allOf` in `document`, returning how many were merged.
///
/// `$ref` members are resolved against the document's `definitions`.
pub fn flatten_compositions(document: &mut Value) -> Result<usize> {
    let definitions = document
        .get(DEFINITIONS_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut flattener = Flattener {
        definitions: &definitions,
        expanding: Vec::new(),
        merged: 0,
    };
    flattener.flatten(document, "", 0)?;
    Ok(flattener.merged)
}

struct Flattener<'a> {
    definitions: &'a Map<String, Value>,
    /// Definitions being expanded as `allOf` members, with the instance depth
    /// they were expanded at
    expanding: Vec<(String, usize)>,
    merged: usize,
}

impl Flattener<'_> {
    fn flatten(&mut self, node: &mut Value, location: &str, depth: usize) -> Result<()> {
        let replacement = match node {
            Value::Array(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    self.flatten(item, &child_pointer(location, &i.to_string()), depth)?;
                }
                None
            }
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if DATA_KEYWORDS.contains(&key.as_str()) {
                        continue;
                    }
                    let child_location = child_pointer(location, key);
                    let child_depth = if INSTANCE_APPLICATORS.contains(&key.as_str()) {
                        depth + 1
                    } else {
                        depth
                    };
                    match child {
                        Value::Object(entries) if SCHEMA_MAP_KEYWORDS.contains(&key.as_str()) => {
                            for (name, schema) in entries.iter_mut() {
                                self.flatten(schema, &child_pointer(&child_location, name), child_depth)?;
                            }
                        }
                        other => self.flatten(other, &child_location, child_depth)?,
                    }
                }
                match map.remove(ALL_OF_KEY) {
                    Some(members) => Some(self.merge_all_of(std::mem::take(map), members, location, depth)?),
                    None => None,
                }
            }
            _ => None,
        };

        if let Some(merged) = replacement {
            *node = merged;
            self.merged += 1;
        }
        Ok(())
    }

    fn merge_all_of(
        &mut self,
        siblings: Map<String, Value>,
        members: Value,
        location: &str,
        depth: usize,
    ) -> Result<Value> {
        let Value::Array(members) = members else {
            return Err(AssemblyError::merge(location, "allOf must be an array"));
        };

        let members_location = child_pointer(location, ALL_OF_KEY);
        let mut merged = Value::Object(siblings);
        for (i, member) in members.into_iter().enumerate() {
            let member = self.resolve(member, &child_pointer(&members_location, &i.to_string()), depth)?;
            merged = merge_schemas(merged, member, location)?;
        }
        Ok(merged)
    }

    /// Replace a `$ref` member by the (flattened) definition it names,
    /// conjoined with any keywords next to the `$ref`.
    ///
    /// A definition met again inside a property or item of its own expansion
    /// (a recursive type) is left as a reference. Met again on the same
    /// instance it composes only itself, which has no finite form.
    fn resolve(&mut self, member: Value, location: &str, depth: usize) -> Result<Value> {
        let Value::Object(mut map) = member else {
            return Ok(member);
        };
        let reference = match map.get(REF_KEY) {
            Some(Value::String(reference)) => reference.clone(),
            _ => return Ok(Value::Object(map)),
        };

        let target = match Reference::parse(&reference, "") {
            Reference::Definition { target } => target,
            _ => {
                return Err(AssemblyError::merge(
                    location,
                    format!("cannot merge a member referencing {:?}", reference),
                ))
            }
        };

        if let Some(&(_, expanded_at)) = self.expanding.iter().find(|(id, _)| *id == target) {
            if depth > expanded_at {
                return Ok(Value::Object(map));
            }
            return Err(AssemblyError::merge(
                location,
                format!("{} composes itself through allOf", target),
            ));
        }

        let Some(definition) = self.definitions.get(&target) else {
            return Err(AssemblyError::UnresolvedReference {
                reference,
                target,
                location: location.to_string(),
            });
        };
        map.remove(REF_KEY);

        let mut resolved = definition.clone();
        if let Value::Object(definition_map) = &mut resolved {
            definition_map.remove(ID_KEY);
        }

        self.expanding.push((target, depth));
        let result = match self.flatten(&mut resolved, location, depth) {
            Ok(()) => self.resolve(resolved, location, depth),
            Err(e) => Err(e),
        };
        self.expanding.pop();

        merge_schemas(result?, Value::Object(map), location)
    }
}

/// Conjunction of two schemas
pub fn merge_schemas(left: Value, right: Value, location: &str) -> Result<Value> {
    if left == right {
        return Ok(left);
    }
    match (left, right) {
        (Value::Bool(true), other) | (other, Value::Bool(true)) => Ok(other),
        (Value::Bool(false), _) | (_, Value::Bool(false)) => Ok(Value::Bool(false)),
        (Value::Object(a), Value::Object(b)) => merge_objects(a, b, location).map(Value::Object),
        (a, b) => Err(AssemblyError::merge(
            location,
            format!("{} and {} are not schemas", a, b),
        )),
    }
}

fn merge_objects(a: Map<String, Value>, b: Map<String, Value>, location: &str) -> Result<Map<String, Value>> {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    let mut out = Map::new();
    // Constraints of `b` kept beside `out` instead of merged into it
    let mut residual = Vec::new();

    for key in keys {
        if OBJECT_APPLICATORS.contains(&key.as_str())
            || CONDITIONAL.contains(&key.as_str())
            || key == REF_KEY
        {
            continue;
        }
        let value = match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => match merge_keyword(key, x, y, location)? {
                Some(merged) => merged,
                None => {
                    residual.push(json!({ key.as_str(): y }));
                    x.clone()
                }
            },
            (Some(x), None) | (None, Some(x)) => x.clone(),
            (None, None) => continue,
        };
        out.insert(key.clone(), value);
    }

    merge_object_applicators(&a, &b, &mut out, location)?;
    merge_conditionals(&a, &b, &mut out, &mut residual);
    merge_refs(&a, &b, &mut out, &mut residual);
    attach_residual(&mut out, residual);
    check_consistency(&out, location)?;
    Ok(out)
}

/// Merged value for `key`, or `None` when both constraints must be kept as is
fn merge_keyword(key: &str, x: &Value, y: &Value, location: &str) -> Result<Option<Value>> {
    if ANNOTATIONS.contains(&key) || x == y {
        return Ok(Some(x.clone()));
    }

    let merged = match key {
        "type" => intersect_types(x, y, location)?,
        "enum" => intersect_enums(x, y, location)?,
        "const" => {
            return Err(AssemblyError::merge(
                location,
                format!("const values {} and {} disagree", x, y),
            ))
        }
        "required" => union_arrays(x, y),
        "minimum" | "exclusiveMinimum" | "minLength" | "minItems" | "minProperties" => {
            tighter_bound(key, x, y, true, location)?
        }
        "maximum" | "exclusiveMaximum" | "maxLength" | "maxItems" | "maxProperties" => {
            tighter_bound(key, x, y, false, location)?
        }
        "multipleOf" => return merge_multiple_of(x, y, location),
        "uniqueItems" => Value::Bool(x.as_bool().unwrap_or(false) || y.as_bool().unwrap_or(false)),
        "pattern" => merge_patterns(x, y, location)?,
        "items" => return merge_items(x, y, location),
        "propertyNames" | "additionalItems" => merge_schemas(x.clone(), y.clone(), &child_pointer(location, key))?,
        // not A and not B == not (A or B)
        NOT => json!({ "anyOf": [x, y] }),
        "anyOf" | "oneOf" => return merge_alternatives(key, x, y, location),
        _ => return Ok(None),
    };
    Ok(Some(merged))
}

fn type_set(value: &Value) -> Option<Vec<&str>> {
    match value {
        Value::String(t) => Some(vec![t.as_str()]),
        Value::Array(items) => items.iter().map(Value::as_str).collect(),
        _ => None,
    }
}

fn intersect_types(x: &Value, y: &Value, location: &str) -> Result<Value> {
    let (Some(a), Some(b)) = (type_set(x), type_set(y)) else {
        return Err(AssemblyError::merge(location, "type must be a string or an array of strings"));
    };

    let mut types: Vec<&str> = Vec::new();
    for t in &a {
        let narrowed = if b.contains(t) {
            Some(*t)
        } else if (*t == "number" && b.contains(&"integer")) || (*t == "integer" && b.contains(&"number")) {
            Some("integer")
        } else {
            None
        };
        if let Some(t) = narrowed {
            if !types.contains(&t) {
                types.push(t);
            }
        }
    }

    match types.as_slice() {
        [] => Err(AssemblyError::merge(location, format!("disjoint types {} and {}", x, y))),
        [single] => Ok(Value::String(single.to_string())),
        many => Ok(Value::Array(many.iter().map(|t| Value::String(t.to_string())).collect())),
    }
}

fn intersect_enums(x: &Value, y: &Value, location: &str) -> Result<Value> {
    let (Some(a), Some(b)) = (x.as_array(), y.as_array()) else {
        return Err(AssemblyError::merge(location, "enum must be an array"));
    };

    let common: Vec<Value> = a.iter().filter(|v| b.contains(v)).cloned().collect();
    if common.is_empty() {
        return Err(AssemblyError::merge(
            location,
            format!("enums {} and {} have no value in common", x, y),
        ));
    }
    Ok(Value::Array(common))
}

fn union_arrays(x: &Value, y: &Value) -> Value {
    let mut items: Vec<Value> = x.as_array().cloned().unwrap_or_default();
    for item in y.as_array().into_iter().flatten() {
        if !items.contains(item) {
            items.push(item.clone());
        }
    }
    Value::Array(items)
}

fn tighter_bound(key: &str, x: &Value, y: &Value, lower: bool, location: &str) -> Result<Value> {
    let (Some(a), Some(b)) = (x.as_f64(), y.as_f64()) else {
        return Err(AssemblyError::merge(location, format!("{} must be numeric", key)));
    };
    let take_right = if lower { b > a } else { b < a };
    Ok(if take_right { y.clone() } else { x.clone() })
}

fn merge_multiple_of(x: &Value, y: &Value, location: &str) -> Result<Option<Value>> {
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        if a > 0 && b > 0 {
            return Ok(Some(Value::from(a / gcd(a, b) * b)));
        }
    }

    let (Some(a), Some(b)) = (x.as_f64(), y.as_f64()) else {
        return Err(AssemblyError::merge(location, "multipleOf must be numeric"));
    };
    if b != 0.0 && (a / b).fract() == 0.0 {
        Ok(Some(x.clone()))
    } else if a != 0.0 && (b / a).fract() == 0.0 {
        Ok(Some(y.clone()))
    } else {
        Ok(None)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn merge_patterns(x: &Value, y: &Value, location: &str) -> Result<Value> {
    let (Some(a), Some(b)) = (x.as_str(), y.as_str()) else {
        return Err(AssemblyError::merge(location, "pattern must be a string"));
    };
    Ok(Value::String(format!(
        "^(?=[\\s\\S]*(?:{}))(?=[\\s\\S]*(?:{}))",
        a, b
    )))
}

fn merge_items(x: &Value, y: &Value, location: &str) -> Result<Option<Value>> {
    let items_location = child_pointer(location, "items");
    match (x, y) {
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => a
            .iter()
            .zip(b)
            .map(|(l, r)| merge_schemas(l.clone(), r.clone(), &items_location))
            .collect::<Result<Vec<_>>>()
            .map(|items| Some(Value::Array(items))),
        // Tuples of different shapes interact with additionalItems
        (Value::Array(_), _) | (_, Value::Array(_)) => Ok(None),
        _ => merge_schemas(x.clone(), y.clone(), &items_location).map(Some),
    }
}

/// Cross product of two `anyOf`/`oneOf` lists. Pairs that cannot both hold
/// are dropped; exactly one pair holds iff exactly one member of each list
/// holds, so `oneOf` keeps its meaning.
fn merge_alternatives(key: &str, x: &Value, y: &Value, location: &str) -> Result<Option<Value>> {
    let (Some(a), Some(b)) = (x.as_array(), y.as_array()) else {
        return Err(AssemblyError::merge(location, format!("{} must be an array", key)));
    };

    if key == "anyOf" {
        if b.iter().all(|schema| a.contains(schema)) {
            return Ok(Some(y.clone()));
        }
        if a.iter().all(|schema| b.contains(schema)) {
            return Ok(Some(x.clone()));
        }
    }
    if a.len() * b.len() > MAX_ALTERNATIVES {
        return Ok(None);
    }

    let alternatives_location = child_pointer(location, key);
    let mut combined = Vec::new();
    for left in a {
        for right in b {
            match merge_schemas(left.clone(), right.clone(), &alternatives_location) {
                Ok(Value::Bool(false)) | Err(AssemblyError::SchemaMerge { .. }) => {}
                Ok(schema) => {
                    // A repeated oneOf member would make every match ambiguous
                    if key == "oneOf" || !combined.contains(&schema) {
                        combined.push(schema);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    if combined.is_empty() {
        return Err(AssemblyError::merge(
            location,
            format!("no pair of {} alternatives is satisfiable together", key),
        ));
    }
    Ok(Some(Value::Array(combined)))
}

/// Merge `properties`, `patternProperties` and `additionalProperties`.
///
/// A property named on only one side still has to satisfy whatever the other
/// side applies to it (a matching pattern, or its additional schema), and a
/// pattern from one side meets the other side's additional schema.
fn merge_object_applicators(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    out: &mut Map<String, Value>,
    location: &str,
) -> Result<()> {
    let names: BTreeSet<&String> = [a, b]
        .into_iter()
        .filter_map(|side| side.get(PROPERTIES).and_then(Value::as_object))
        .flat_map(|props| props.keys())
        .collect();

    if !names.is_empty() {
        let properties_location = child_pointer(location, PROPERTIES);
        let mut properties = Map::new();
        for name in names {
            let name_location = child_pointer(&properties_location, name);
            let merged = match (
                property_schema(a, name, &name_location)?,
                property_schema(b, name, &name_location)?,
            ) {
                (Some(l), Some(r)) => merge_schemas(l, r, &name_location)?,
                (Some(schema), None) | (None, Some(schema)) => schema,
                (None, None) => continue,
            };
            properties.insert(name.clone(), merged);
        }
        out.insert(PROPERTIES.to_string(), Value::Object(properties));
    }

    let empty = Map::new();
    let patterns_a = a.get(PATTERN_PROPERTIES).and_then(Value::as_object);
    let patterns_b = b.get(PATTERN_PROPERTIES).and_then(Value::as_object);
    if patterns_a.is_some() || patterns_b.is_some() {
        let (patterns_a, patterns_b) = (patterns_a.unwrap_or(&empty), patterns_b.unwrap_or(&empty));
        let patterns_location = child_pointer(location, PATTERN_PROPERTIES);
        let mut merged = Map::new();

        for (pattern, schema) in patterns_a {
            let pattern_location = child_pointer(&patterns_location, pattern);
            let value = match (patterns_b.get(pattern), b.get(ADDITIONAL_PROPERTIES)) {
                (Some(other), _) | (None, Some(other)) => merge_schemas(schema.clone(), other.clone(), &pattern_location)?,
                (None, None) => schema.clone(),
            };
            merged.insert(pattern.clone(), value);
        }
        for (pattern, schema) in patterns_b.iter().filter(|(p, _)| !patterns_a.contains_key(*p)) {
            let pattern_location = child_pointer(&patterns_location, pattern);
            let value = match a.get(ADDITIONAL_PROPERTIES) {
                Some(additional) => merge_schemas(additional.clone(), schema.clone(), &pattern_location)?,
                None => schema.clone(),
            };
            merged.insert(pattern.clone(), value);
        }
        out.insert(PATTERN_PROPERTIES.to_string(), Value::Object(merged));
    }

    match (a.get(ADDITIONAL_PROPERTIES), b.get(ADDITIONAL_PROPERTIES)) {
        (Some(x), Some(y)) => {
            let merged = merge_schemas(x.clone(), y.clone(), &child_pointer(location, ADDITIONAL_PROPERTIES))?;
            out.insert(ADDITIONAL_PROPERTIES.to_string(), merged);
        }
        (Some(x), None) | (None, Some(x)) => {
            out.insert(ADDITIONAL_PROPERTIES.to_string(), x.clone());
        }
        (None, None) => {}
    }

    Ok(())
}

/// The schema one side applies to property `name`: its own entry and every
/// matching pattern, or else its additional schema.
fn property_schema(side: &Map<String, Value>, name: &str, location: &str) -> Result<Option<Value>> {
    let mut schema = side
        .get(PROPERTIES)
        .and_then(|props| props.get(name))
        .cloned();

    if let Some(patterns) = side.get(PATTERN_PROPERTIES).and_then(Value::as_object) {
        for (pattern, pattern_schema) in patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                AssemblyError::merge(location, format!("invalid patternProperties key {:?}: {}", pattern, e))
            })?;
            if regex.is_match(name) {
                schema = Some(match schema {
                    Some(existing) => merge_schemas(existing, pattern_schema.clone(), location)?,
                    None => pattern_schema.clone(),
                });
            }
        }
    }

    Ok(schema.or_else(|| side.get(ADDITIONAL_PROPERTIES).cloned()))
}

fn merge_conditionals(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    out: &mut Map<String, Value>,
    residual: &mut Vec<Value>,
) {
    let group = |side: &Map<String, Value>| -> Map<String, Value> {
        side.iter()
            .filter(|(key, _)| CONDITIONAL.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    };
    let (first, second) = (group(a), group(b));

    let kept = if second.is_empty() || first == second {
        first
    } else if first.is_empty() {
        second
    } else {
        residual.push(Value::Object(second));
        first
    };
    out.extend(kept);
}

/// A `$ref` only stays in place when nothing but annotations sits beside it;
/// draft-07 ignores keywords next to a reference.
fn merge_refs(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    out: &mut Map<String, Value>,
    residual: &mut Vec<Value>,
) {
    let mut refs: Vec<&Value> = Vec::new();
    for reference in [a.get(REF_KEY), b.get(REF_KEY)].into_iter().flatten() {
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }

    let constrained = !residual.is_empty() || out.keys().any(|key| !ANNOTATIONS.contains(&key.as_str()));
    match refs.as_slice() {
        [] => {}
        [reference] if !constrained => {
            out.insert(REF_KEY.to_string(), (*reference).clone());
        }
        many => residual.extend(many.iter().map(|reference| json!({ REF_KEY: reference }))),
    }
}

/// Fold schemas that must also hold into `not`:
/// `not N` and `S` == `not (N or not S)`
fn attach_residual(out: &mut Map<String, Value>, residual: Vec<Value>) {
    if residual.is_empty() {
        return;
    }

    let mut negated: Vec<Value> = out.remove(NOT).into_iter().collect();
    negated.extend(residual.into_iter().map(|schema| json!({ NOT: schema })));
    let not = if negated.len() == 1 {
        negated.remove(0)
    } else {
        json!({ "anyOf": negated })
    };
    out.insert(NOT.to_string(), not);
}

fn check_consistency(schema: &Map<String, Value>, location: &str) -> Result<()> {
    if let (Some(constant), Some(Value::Array(values))) = (schema.get("const"), schema.get("enum")) {
        if !values.contains(constant) {
            return Err(AssemblyError::merge(
                location,
                format!("const {} is not among enum values", constant),
            ));
        }
    }

    for (min_key, max_key) in BOUND_PAIRS {
        let min = schema.get(min_key).and_then(Value::as_f64);
        let max = schema.get(max_key).and_then(Value::as_f64);
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(AssemblyError::merge(
                    location,
                    format!("{} {} exceeds {} {}", min_key, min, max_key, max),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn flatten(mut doc: Value) -> Result<Value> {
        flatten_compositions(&mut doc)?;
        Ok(doc)
    }

    #[test]
    fn test_enum_intersection() {
        let doc = flatten(json!({ "allOf": [{ "enum": ["a", "b"] }, { "enum": ["b", "c"] }] })).unwrap();
        assert_eq!(doc, json!({ "enum": ["b"] }));
    }

    #[test]
    fn test_disjoint_enums_fail() {
        let err = flatten(json!({ "allOf": [{ "enum": ["a"] }, { "enum": ["c"] }] })).unwrap_err();
        assert!(matches!(err, AssemblyError::SchemaMerge { .. }));
    }

    #[test]
    fn test_type_intersection() {
        let doc = flatten(json!({
            "allOf": [{ "type": ["string", "number", "null"] }, { "type": ["integer", "null"] }]
        }))
        .unwrap();
        assert_eq!(doc, json!({ "type": ["integer", "null"] }));

        let err = flatten(json!({ "allOf": [{ "type": "string" }, { "type": "object" }] })).unwrap_err();
        match err {
            AssemblyError::SchemaMerge { location, .. } => assert_eq!(location, "<root>"),
            other => panic!("Expected SchemaMerge, got {:?}", other),
        }
    }

    #[test]
    fn test_properties_union_and_recursive_merge() {
        let doc = flatten(json!({
            "type": "object",
            "required": ["x"],
            "properties": { "x": { "type": "number", "minimum": 0 } },
            "allOf": [
                { "required": ["y"], "properties": { "x": { "maximum": 10 }, "y": { "type": "string" } } }
            ]
        }))
        .unwrap();

        assert_eq!(
            doc,
            json!({
                "type": "object",
                "required": ["x", "y"],
                "properties": {
                    "x": { "type": "number", "minimum": 0, "maximum": 10 },
                    "y": { "type": "string" }
                }
            })
        );
    }

    #[test]
    fn test_closed_object_rejects_foreign_property() {
        let doc = flatten(json!({
            "allOf": [
                { "properties": { "x": { "type": "number" } }, "additionalProperties": false },
                { "properties": { "y": { "type": "string" } } }
            ]
        }))
        .unwrap();

        assert_eq!(doc["properties"]["y"], json!(false));
        assert_eq!(doc["additionalProperties"], json!(false));
    }

    #[test]
    fn test_pattern_properties_apply_to_named_properties() {
        let doc = flatten(json!({
            "allOf": [
                { "patternProperties": { "^x": { "type": "number" } } },
                { "properties": { "x1": { "minimum": 1 } } }
            ]
        }))
        .unwrap();

        assert_eq!(doc["properties"]["x1"], json!({ "type": "number", "minimum": 1 }));
        assert_eq!(doc["patternProperties"], json!({ "^x": { "type": "number" } }));
    }

    #[test]
    fn test_bounds_tighten() {
        let doc = flatten(json!({
            "allOf": [
                { "minLength": 1, "maxLength": 10, "multipleOf": 4 },
                { "minLength": 3, "maxLength": 20, "multipleOf": 6 }
            ]
        }))
        .unwrap();
        assert_eq!(doc, json!({ "minLength": 3, "maxLength": 10, "multipleOf": 12 }));

        let err = flatten(json!({ "allOf": [{ "minimum": 5 }, { "maximum": 1 }] })).unwrap_err();
        assert!(matches!(err, AssemblyError::SchemaMerge { .. }));
    }

    #[test]
    fn test_nested_all_of_flattened_first() {
        let doc = flatten(json!({
            "allOf": [
                { "allOf": [{ "type": "object" }, { "required": ["a"] }] },
                { "required": ["b"] }
            ]
        }))
        .unwrap();
        assert_eq!(doc, json!({ "type": "object", "required": ["a", "b"] }));
    }

    #[test]
    fn test_ref_members_resolve_against_definitions() {
        let doc = flatten(json!({
            "properties": {
                "frame": { "allOf": [{ "$ref": "#Rect" }, { "required": ["x"] }] }
            },
            "definitions": {
                "Rect": {
                    "$id": "#Rect",
                    "title": "Rect",
                    "type": "object",
                    "properties": { "x": { "type": "number" } }
                }
            }
        }))
        .unwrap();

        assert_eq!(
            doc["properties"]["frame"],
            json!({
                "title": "Rect",
                "type": "object",
                "required": ["x"],
                "properties": { "x": { "type": "number" } }
            })
        );
    }

    #[test]
    fn test_recursive_composition_fails() {
        let err = flatten(json!({
            "allOf": [{ "$ref": "#Loop" }],
            "definitions": { "Loop": { "$id": "#Loop", "allOf": [{ "$ref": "#Loop" }] } }
        }))
        .unwrap_err();
        assert!(matches!(err, AssemblyError::SchemaMerge { .. }));
    }

    #[test]
    fn test_boolean_members() {
        assert_eq!(flatten(json!({ "allOf": [true, { "type": "string" }] })).unwrap(), json!({ "type": "string" }));
        assert_eq!(flatten(json!({ "allOf": [{ "type": "string" }, false] })).unwrap(), json!(false));
    }

    #[test]
    fn test_not_becomes_negated_union() {
        let doc = flatten(json!({ "allOf": [{ "not": { "const": 1 } }, { "not": { "const": 2 } }] })).unwrap();
        assert_eq!(doc, json!({ "not": { "anyOf": [{ "const": 1 }, { "const": 2 }] } }));
    }

    #[test]
    fn test_recursive_type_keeps_its_reference() {
        let doc = flatten(json!({
            "$ref": "#Node",
            "definitions": {
                "Node": {
                    "$id": "#Node",
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "child": { "allOf": [{ "$ref": "#Node" }, { "required": ["id"] }] }
                    }
                }
            }
        }))
        .unwrap();

        let child = &doc["definitions"]["Node"]["properties"]["child"];
        assert!(child.get("allOf").is_none());
        assert_eq!(child["type"], "object");
        assert_eq!(child["required"], json!(["id"]));
        assert_eq!(
            child["properties"]["child"],
            json!({ "required": ["id"], "not": { "not": { "$ref": "#Node" } } })
        );
    }

    #[test]
    fn test_any_of_lists_cross_multiply() {
        let doc = flatten(json!({
            "allOf": [
                { "anyOf": [{ "type": "string" }, { "type": "number" }] },
                { "anyOf": [{ "minimum": 0 }, { "type": "string" }] }
            ]
        }))
        .unwrap();

        assert_eq!(
            doc,
            json!({
                "anyOf": [
                    { "type": "string", "minimum": 0 },
                    { "type": "string" },
                    { "type": "number", "minimum": 0 }
                ]
            })
        );
    }

    #[test]
    fn test_one_of_pairs_drop_contradictions() {
        let doc = flatten(json!({
            "properties": {
                "layers": {
                    "items": {
                        "allOf": [
                            { "oneOf": [{ "$ref": "#Group" }, { "$ref": "#Shape" }] },
                            { "oneOf": [{ "type": "object" }, { "type": "string" }] }
                        ]
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(
            doc["properties"]["layers"]["items"],
            json!({
                "oneOf": [
                    { "type": "object", "not": { "not": { "$ref": "#Group" } } },
                    { "type": "string", "not": { "not": { "$ref": "#Group" } } },
                    { "type": "object", "not": { "not": { "$ref": "#Shape" } } },
                    { "type": "string", "not": { "not": { "$ref": "#Shape" } } }
                ]
            })
        );

        let err = flatten(json!({
            "allOf": [{ "oneOf": [{ "type": "string" }] }, { "oneOf": [{ "type": "number" }] }]
        }))
        .unwrap_err();
        assert!(matches!(err, AssemblyError::SchemaMerge { .. }));
    }

    #[test]
    fn test_unmergeable_keywords_are_both_kept() {
        let doc = flatten(json!({
            "allOf": [
                { "type": "string", "format": "date-time" },
                { "format": "uri" }
            ]
        }))
        .unwrap();
        assert_eq!(
            doc,
            json!({ "type": "string", "format": "date-time", "not": { "not": { "format": "uri" } } })
        );

        let doc = flatten(json!({
            "allOf": [
                { "contains": { "type": "string" }, "not": { "maxItems": 0 } },
                { "contains": { "type": "number" } }
            ]
        }))
        .unwrap();
        assert_eq!(
            doc,
            json!({
                "contains": { "type": "string" },
                "not": {
                    "anyOf": [
                        { "maxItems": 0 },
                        { "not": { "contains": { "type": "number" } } }
                    ]
                }
            })
        );
    }

    #[test]
    fn test_conditionals_stay_grouped() {
        let first = json!({ "if": { "required": ["a"] }, "then": { "required": ["b"] } });
        let second = json!({ "if": { "required": ["c"] }, "else": { "required": ["d"] } });
        let doc = flatten(json!({ "allOf": [first.clone(), second.clone()] })).unwrap();

        assert_eq!(doc["if"], first["if"]);
        assert_eq!(doc["then"], first["then"]);
        assert!(doc.get("else").is_none());
        assert_eq!(doc["not"], json!({ "not": second }));
    }

    #[test]
    fn test_conflicting_references_are_both_kept() {
        let doc = flatten(json!({
            "properties": {
                "fill": { "allOf": [{ "$ref": "#Color" }, { "$ref": "#Gradient" }] },
                "border": { "allOf": [{ "$ref": "#Color" }, { "description": "Border colour" }] }
            }
        }))
        .unwrap();

        assert_eq!(
            doc["properties"]["fill"],
            json!({
                "not": {
                    "anyOf": [
                        { "not": { "$ref": "#Color" } },
                        { "not": { "$ref": "#Gradient" } }
                    ]
                }
            })
        );
        assert_eq!(
            doc["properties"]["border"],
            json!({ "$ref": "#Color", "description": "Border colour" })
        );
    }

    #[test]
    fn test_conflicting_consts_fail() {
        let err = flatten(json!({ "allOf": [{ "const": "a" }, { "const": "b" }] })).unwrap_err();
        assert!(matches!(err, AssemblyError::SchemaMerge { .. }));
    }

    #[test]
    fn test_patterns_meet_other_side_additional_properties() {
        let doc = flatten(json!({
            "allOf": [
                { "patternProperties": { "^x-": { "type": "string" } } },
                { "additionalProperties": { "maxLength": 3 } }
            ]
        }))
        .unwrap();

        assert_eq!(
            doc,
            json!({
                "patternProperties": { "^x-": { "type": "string", "maxLength": 3 } },
                "additionalProperties": { "maxLength": 3 }
            })
        );
    }

    #[test]
    fn test_data_and_property_names_are_not_compositions() {
        let doc = json!({
            "type": "object",
            "properties": {
                "allOf": { "type": "array" },
                "mode": {
                    "enum": [{ "allOf": [{ "a": 1 }, { "b": 2 }] }],
                    "default": { "allOf": [{ "const": 1 }, { "const": 2 }] }
                }
            }
        });
        assert_eq!(flatten(doc.clone()).unwrap(), doc);
    }
}
