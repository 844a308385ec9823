//! Schema Assembly
//!
//! Turns one entry fragment plus the shared fragment pool into a standalone
//! draft-07 schema. Stages run in order, each over the same generic tree:
//!
//! ```text
//! seed ─▶ inline abstract ─▶ canonicalize refs ─▶ flatten allOf ─▶ prune ─▶ validate
//! ```

pub mod canonicalize;
pub mod flatten;
pub mod inline;
pub mod prune;

pub use canonicalize::canonicalize_references;
pub use flatten::{flatten_compositions, merge_schemas};
pub use inline::inline_abstract;
pub use prune::{prune_unreachable, verify_references, PruneReport};

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::info;

use crate::checksum::Checksum;
use crate::config::OutputFormat;
use crate::error::{AssemblyError, Result};
use crate::fragment::{fragment_id, FragmentId};
use crate::reference::{DEFINITIONS_KEY, ID_KEY, SCHEMA_KEY};
use crate::registry::FragmentRegistry;
use crate::validate::{MetaSchemaValidator, DRAFT_07_URL};

/// Settings shared by every target of a run
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Prefix of each output's `$id`
    pub id_base_url: String,
    /// Run the meta-schema check as the last stage
    pub validate: bool,
    /// Also reject validation keywords beside `$ref`
    pub ref_siblings: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            id_base_url: "https://www.sketch.com/schemas/".to_string(),
            validate: true,
            ref_siblings: true,
        }
    }
}

/// One top-level schema to assemble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Entry fragment source, e.g. `schema/document.schema.yaml`
    pub entry: PathBuf,
}

impl Target {
    pub fn new(entry: impl Into<PathBuf>) -> Self {
        Self { entry: entry.into() }
    }

    /// Id of the entry fragment in the pool
    pub fn id(&self, extension: &str) -> FragmentId {
        fragment_id(&self.entry, extension)
    }

    /// Output file name: `document.schema.yaml` becomes `document.schema.json`
    pub fn file_name(&self) -> String {
        let name = self
            .entry
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name.strip_suffix(".yaml").or_else(|| name.strip_suffix(".yml")).unwrap_or(&name);
        format!("{}.json", stem)
    }
}

/// A finished, self-contained schema document
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSchema {
    /// Entry fragment id
    pub name: FragmentId,
    pub file_name: String,
    pub document: Value,
}

impl AssembledSchema {
    /// Ids left in `definitions`, sorted
    pub fn definition_ids(&self) -> Vec<&str> {
        self.document
            .get(DEFINITIONS_KEY)
            .and_then(Value::as_object)
            .map(|defs| defs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn to_json(&self, format: OutputFormat) -> Result<String> {
        let mut json = match format {
            OutputFormat::Pretty => serde_json::to_string_pretty(&self.document)?,
            OutputFormat::Compact => serde_json::to_string(&self.document)?,
        };
        json.push('\n');
        Ok(json)
    }

    pub fn checksum(&self, format: OutputFormat) -> Result<Checksum> {
        Ok(Checksum::from_str(&self.to_json(format)?))
    }

    pub fn write_to(&self, dir: &Path, format: OutputFormat) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, self.to_json(format)?)?;
        Ok(path)
    }
}

/// Runs the assembly pipeline against a borrowed fragment pool
pub struct Assembler<'a> {
    registry: &'a FragmentRegistry,
    options: AssemblyOptions,
    validator: Option<MetaSchemaValidator>,
}

impl<'a> Assembler<'a> {
    pub fn new(registry: &'a FragmentRegistry, options: AssemblyOptions) -> Result<Self> {
        let validator = if options.validate {
            Some(MetaSchemaValidator::draft7()?.with_ref_siblings(options.ref_siblings))
        } else {
            None
        };

        Ok(Self {
            registry,
            options,
            validator,
        })
    }

    /// Assemble one target
    pub fn assemble(&self, target: &Target) -> Result<AssembledSchema> {
        let name = target.id(self.registry.extension());
        let file_name = target.file_name();
        let mut document = self.seed(&name, &file_name)?;

        let passes = inline_abstract(&mut document, self.registry)?;
        let rewritten = canonicalize_references(&mut document, self.registry)?;
        let merged = flatten_compositions(&mut document)?;
        let pruned = prune_unreachable(&mut document)?;

        info!(
            schema = %name,
            passes,
            rewritten,
            merged,
            kept = pruned.kept,
            removed = pruned.removed.len(),
            "assembled schema"
        );

        if let Some(validator) = &self.validator {
            validator.validate(&document)?;
        }

        Ok(AssembledSchema {
            name,
            file_name,
            document,
        })
    }

    /// Assemble several targets in parallel; each result is independent
    pub fn assemble_all<'t>(&self, targets: &'t [Target]) -> Vec<(&'t Target, Result<AssembledSchema>)> {
        targets
            .par_iter()
            .map(|target| (target, self.assemble(target)))
            .collect()
    }

    /// Entry fragment with `$schema`, `$id` and every pool fragment as a
    /// definition.
    fn seed(&self, name: &str, file_name: &str) -> Result<Value> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| AssemblyError::UnknownTarget { id: name.to_string() })?;

        let mut root = entry.content.as_object().cloned().unwrap_or_default();
        root.insert(SCHEMA_KEY.to_string(), Value::String(DRAFT_07_URL.to_string()));
        root.insert(
            ID_KEY.to_string(),
            Value::String(format!("{}{}", self.options.id_base_url, file_name)),
        );

        let definitions: Map<String, Value> = self
            .registry
            .fragments()
            .map(|fragment| (fragment.id.clone(), fragment.content.clone()))
            .collect();
        root.insert(DEFINITIONS_KEY.to_string(), Value::Object(definitions));

        Ok(Value::Object(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use serde_json::json;

    fn pool() -> FragmentRegistry {
        FragmentRegistry::from_fragments(
            [
                Fragment::new(
                    "Document",
                    "schema/document.schema.yaml",
                    false,
                    json!({
                        "title": "Document",
                        "type": "object",
                        "properties": { "color": { "$ref": "./color.schema.yaml" } }
                    }),
                ),
                Fragment::new(
                    "Color",
                    "schema/color.schema.yaml",
                    false,
                    json!({ "type": "object", "properties": { "red": { "type": "number" } } }),
                ),
                Fragment::new("Unused", "schema/unused.schema.yaml", false, json!({ "type": "string" })),
            ],
            ".schema.yaml",
        )
        .unwrap()
    }

    #[test]
    fn test_target_naming() {
        let target = Target::new("schema/file-format.schema.yaml");
        assert_eq!(target.id(".schema.yaml"), "FileFormat");
        assert_eq!(target.file_name(), "file-format.schema.json");
    }

    #[test]
    fn test_assemble_sets_identity_and_prunes() {
        let registry = pool();
        let assembler = Assembler::new(&registry, AssemblyOptions::default()).unwrap();
        let schema = assembler.assemble(&Target::new("schema/document.schema.yaml")).unwrap();

        assert_eq!(schema.document["$schema"], DRAFT_07_URL);
        assert_eq!(schema.document["$id"], "https://www.sketch.com/schemas/document.schema.json");
        assert_eq!(schema.document["properties"]["color"]["$ref"], "#Color");
        assert_eq!(schema.definition_ids(), vec!["Color"]);
        assert_eq!(schema.document["definitions"]["Color"]["$id"], "#Color");
    }

    #[test]
    fn test_unknown_target() {
        let registry = pool();
        let assembler = Assembler::new(&registry, AssemblyOptions::default()).unwrap();
        let err = assembler.assemble(&Target::new("schema/page.schema.yaml")).unwrap_err();
        assert!(matches!(err, AssemblyError::UnknownTarget { ref id } if id == "Page"));
    }

    #[test]
    fn test_assemble_all_keeps_failures_separate() {
        let registry = pool();
        let assembler = Assembler::new(&registry, AssemblyOptions::default()).unwrap();
        let targets = vec![
            Target::new("schema/document.schema.yaml"),
            Target::new("schema/missing.schema.yaml"),
        ];

        let results = assembler.assemble_all(&targets);
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }
}
