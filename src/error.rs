//! Error types for schema assembly

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::fragment::FragmentId;

/// Result type for assembly operations
pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Schema assembly errors
///
/// Every variant is fatal for the target being assembled. Nothing is written
/// for a target whose pipeline returned one of these.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Failed to load fragment {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadFailure,
    },

    #[error("Duplicate fragment id {id}: {} and {}", first.display(), second.display())]
    DuplicateFragment {
        id: FragmentId,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Invalid fragment pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error("Unknown assembly target: {id}")]
    UnknownTarget { id: FragmentId },

    #[error("Abstract fragments reference each other in a cycle: {} ({passes} inlining passes run)", cycle.join(" -> "))]
    CyclicAbstractReference { passes: usize, cycle: Vec<FragmentId> },

    #[error("Unresolved reference {reference:?} to {target} at {location}")]
    UnresolvedReference {
        reference: String,
        target: FragmentId,
        location: String,
    },

    #[error("Cannot merge allOf at {location}: {reason}")]
    SchemaMerge { location: String, reason: String },

    #[error("Assembled schema violates the meta-schema ({} violation(s))", .0.len())]
    MetaSchemaViolation(Vec<Violation>),

    #[error("Meta-schema failed to compile: {0}")]
    InvalidMetaSchema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssemblyError {
    pub(crate) fn merge(location: &str, reason: impl Into<String>) -> Self {
        AssemblyError::SchemaMerge {
            location: display_location(location),
            reason: reason.into(),
        }
    }

    /// Violations carried by a meta-schema failure, empty for every other error
    pub fn violations(&self) -> &[Violation] {
        match self {
            AssemblyError::MetaSchemaViolation(violations) => violations,
            _ => &[],
        }
    }
}

/// Why a single fragment source could not be loaded
#[derive(Error, Debug)]
pub enum LoadFailure {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("top level must be a mapping")]
    NotAMapping,
}

/// One meta-schema conformance failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer into the assembled schema
    pub instance_path: String,
    /// JSON pointer into the meta-schema (or the rule name for local checks)
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            display_location(&self.instance_path),
            self.message,
            self.schema_path
        )
    }
}

pub(crate) fn display_location(pointer: &str) -> String {
    if pointer.is_empty() {
        String::from("<root>")
    } else {
        pointer.to_string()
    }
}
