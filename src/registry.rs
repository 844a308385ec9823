//! Fragment Registry
//!
//! Discovers fragment sources under a root directory, loads them in parallel
//! and indexes them by canonical id. Read-only once built.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{AssemblyError, LoadFailure, Result};
use crate::fragment::{Fragment, FragmentId};
use crate::reference::{visit_refs, Reference};

/// Configuration for fragment discovery
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Glob matched against paths relative to the root
    pub pattern: String,
    /// Suffix stripped from file names before id derivation
    pub extension: String,
    /// Base-name substring marking a fragment abstract
    pub abstract_marker: String,
    /// Skip paths (relative to the root) starting with these prefixes
    pub skip_prefixes: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            pattern: "**/*.schema.yaml".to_string(),
            extension: ".schema.yaml".to_string(),
            abstract_marker: "abstract".to_string(),
            skip_prefixes: vec![
                "node_modules/".to_string(),
                "target/".to_string(),
                ".git/".to_string(),
                "dist/".to_string(),
            ],
        }
    }
}

/// The in-memory fragment pool for one assembly run
#[derive(Debug, Clone)]
pub struct FragmentRegistry {
    fragments: BTreeMap<FragmentId, Fragment>,
    extension: String,
}

impl FragmentRegistry {
    /// Load every fragment under `root` matching the configured pattern.
    ///
    /// Any source that fails to parse aborts the whole load.
    pub fn load(root: &Path, options: &LoadOptions) -> Result<Self> {
        let paths = discover(root, options)?;
        info!(root = %root.display(), sources = paths.len(), "loading schema fragments");

        let fragments = paths
            .par_iter()
            .map(|path| load_fragment(path, options))
            .collect::<Result<Vec<_>>>()?;

        let registry = Self::from_fragments(fragments, &options.extension)?;
        for id in registry.unreferenced_abstract_ids() {
            warn!(fragment = %id, "abstract fragment is never referenced");
        }
        Ok(registry)
    }

    /// Build a registry from already-loaded fragments
    pub fn from_fragments(
        fragments: impl IntoIterator<Item = Fragment>,
        extension: &str,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for fragment in fragments {
            match map.entry(fragment.id.clone()) {
                Entry::Occupied(existing) => {
                    let existing: &Fragment = existing.get();
                    return Err(AssemblyError::DuplicateFragment {
                        id: fragment.id,
                        first: existing.path.clone(),
                        second: fragment.path,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(fragment);
                }
            }
        }

        Ok(Self {
            fragments: map,
            extension: extension.to_string(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Fragment> {
        self.fragments.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fragments.contains_key(id)
    }

    /// Whether `id` names a loaded abstract fragment
    pub fn is_abstract(&self, id: &str) -> bool {
        self.fragments.get(id).map(|f| f.is_abstract).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// File suffix used when deriving ids from reference paths
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// All fragments, ordered by id
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &FragmentId> {
        self.fragments.keys()
    }

    pub fn abstract_ids(&self) -> impl Iterator<Item = &FragmentId> {
        self.fragments.values().filter(|f| f.is_abstract).map(|f| &f.id)
    }

    /// Parse a `$ref` value with this pool's id rules
    pub fn parse_ref(&self, value: &str) -> Reference {
        Reference::parse(value, &self.extension)
    }

    /// Abstract fragments no fragment refers to
    pub fn unreferenced_abstract_ids(&self) -> Vec<FragmentId> {
        let mut referenced = BTreeSet::new();
        for fragment in self.fragments.values() {
            visit_refs(&fragment.content, "", &mut |_, value| {
                if let Some(target) = self.parse_ref(value).target() {
                    referenced.insert(target.to_string());
                }
            });
        }

        self.abstract_ids()
            .filter(|id| !referenced.contains(*id))
            .cloned()
            .collect()
    }
}

/// Find fragment sources, sorted for a stable load order
fn discover(root: &Path, options: &LoadOptions) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(&options.pattern)?;
    let match_options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    };

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| AssemblyError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative_str = relative.to_string_lossy().replace('\\', "/");

        if options.skip_prefixes.iter().any(|p| relative_str.starts_with(p)) {
            continue;
        }
        if pattern.matches_with(&relative_str, match_options) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

fn load_fragment(path: &Path, options: &LoadOptions) -> Result<Fragment> {
    let to_load_error = |source: LoadFailure| AssemblyError::Load {
        path: path.to_path_buf(),
        source,
    };

    let source = fs::read_to_string(path).map_err(|e| to_load_error(e.into()))?;
    let fragment = Fragment::from_yaml(path, &source, &options.extension, &options.abstract_marker)
        .map_err(to_load_error)?;

    debug!(fragment = %fragment.id, is_abstract = fragment.is_abstract, path = %path.display(), "loaded fragment");
    Ok(fragment)
}
