//! Configuration for schema assembly
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schemas.toml)
//! - Environment variables (SCHEMAS__*)
//!
//! ## Example config file (schemas.toml):
//! ```toml
//! targets = [
//!     "schema/file-format.schema.yaml",
//!     "schema/document.schema.yaml",
//! ]
//!
//! [assembly]
//! root = "."
//! pattern = "**/*.schema.yaml"
//! id_base_url = "https://www.sketch.com/schemas/"
//!
//! [output]
//! dir = "dist"
//! format = "pretty"
//! checksums = true
//!
//! [validation]
//! meta_schema = true
//! ref_siblings = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::assemble::{AssemblyOptions, Target};
use crate::registry::LoadOptions;

/// Main configuration for an assembly run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Entry fragments to assemble, relative to the assembly root
    #[serde(default = "default_targets")]
    pub targets: Vec<PathBuf>,

    /// Fragment discovery and identity settings
    #[serde(default)]
    pub assembly: SourceConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Fragment discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory fragments are discovered under
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Glob matched against paths relative to `root`
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Suffix stripped from file names to derive ids
    #[serde(default = "default_extension")]
    pub extension: String,

    /// File name substring marking an abstract fragment
    #[serde(default = "default_abstract_marker")]
    pub abstract_marker: String,

    /// Prefix of each assembled schema's `$id`
    #[serde(default = "default_id_base_url")]
    pub id_base_url: String,

    /// Relative path prefixes never scanned
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory assembled schemas are written to
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Output format (pretty or compact)
    #[serde(default = "default_output_format")]
    pub format: OutputFormat,

    /// Write checksums.sha256 beside the schemas
    #[serde(default = "default_true")]
    pub checksums: bool,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Validate every assembled schema against draft-07
    #[serde(default = "default_true")]
    pub meta_schema: bool,

    /// Reject validation keywords written beside `$ref`
    #[serde(default = "default_true")]
    pub ref_siblings: bool,
}

// Default value functions
fn default_targets() -> Vec<PathBuf> {
    ["file-format", "document", "meta", "user", "page"]
        .iter()
        .map(|name| PathBuf::from(format!("schema/{}.schema.yaml", name)))
        .collect()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_pattern() -> String {
    LoadOptions::default().pattern
}

fn default_extension() -> String {
    LoadOptions::default().extension
}

fn default_abstract_marker() -> String {
    LoadOptions::default().abstract_marker
}

fn default_skip_prefixes() -> Vec<String> {
    LoadOptions::default().skip_prefixes
}

fn default_id_base_url() -> String {
    AssemblyOptions::default().id_base_url
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            pattern: default_pattern(),
            extension: default_extension(),
            abstract_marker: default_abstract_marker(),
            id_base_url: default_id_base_url(),
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::Pretty,
            checksums: true,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            meta_schema: true,
            ref_siblings: true,
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            assembly: SourceConfig::default(),
            output: OutputConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl AssemblyConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["schemas.toml", ".schemas.toml", "config/schemas.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("com", "sketch", "file-format-schemas") {
            let xdg_config = config_dir.config_dir().join("schemas.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMAS__OUTPUT__DIR=out overrides output.dir
        builder = builder.add_source(
            Environment::with_prefix("SCHEMAS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Assembly root (resolves relative paths)
    pub fn root_path(&self) -> PathBuf {
        resolve(&self.assembly.root)
    }

    /// Output directory; relative paths are taken from the assembly root
    pub fn output_dir(&self) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            self.root_path().join(&self.output.dir)
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            pattern: self.assembly.pattern.clone(),
            extension: self.assembly.extension.clone(),
            abstract_marker: self.assembly.abstract_marker.clone(),
            skip_prefixes: self.assembly.skip_prefixes.clone(),
        }
    }

    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            id_base_url: self.assembly.id_base_url.clone(),
            validate: self.validation.meta_schema,
            ref_siblings: self.validation.ref_siblings,
        }
    }

    /// Configured targets with entries resolved against the assembly root
    pub fn targets(&self) -> Vec<Target> {
        let root = self.root_path();
        self.targets.iter().map(|entry| Target::new(root.join(entry))).collect()
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
