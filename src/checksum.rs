//! Checksum utilities for assembled schema output

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the checksum file written beside the schemas
pub const CHECKSUM_FILE_NAME: &str = "checksums.sha256";

/// SHA256 checksum for schema content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Contents of a `checksums.sha256` file, one `<hex>  <file>` line per
/// schema, in the format `sha256sum -c` reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumFile {
    entries: BTreeMap<String, Checksum>,
}

impl ChecksumFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, checksum: Checksum) {
        self.entries.insert(file_name.into(), checksum);
    }

    pub fn get(&self, file_name: &str) -> Option<&Checksum> {
        self.entries.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse file contents; blank lines and lines without two fields are skipped
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .filter_map(|line| {
                let (hash, file) = line.trim_end().split_once(char::is_whitespace)?;
                // sha256sum marks binary mode with a leading '*'
                let file = file.trim_start().trim_start_matches('*');
                (!hash.is_empty() && !file.is_empty()).then(|| (file.to_string(), Checksum::from(hash)))
            })
            .collect();
        Self { entries }
    }

    /// File names whose current content no longer matches
    pub fn mismatches<'a>(&'a self, current: &'a ChecksumFile) -> Vec<&'a str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(name, checksum)| current.get(name) != Some(*checksum))
            .map(|(name, _)| name.as_str())
            .collect();
        names.extend(
            current
                .entries
                .keys()
                .filter(|name| !self.entries.contains_key(*name))
                .map(String::as_str),
        );
        names.sort_unstable();
        names
    }
}

impl fmt::Display for ChecksumFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (file, checksum) in &self.entries {
            writeln!(f, "{}  {}", checksum, file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = r#"{"title": "Document"}"#;
        let checksum1 = Checksum::from_str(content);
        let checksum2 = Checksum::from_str(content);
        assert_eq!(checksum1, checksum2);
        assert_eq!(checksum1.as_str().len(), 64);
    }

    #[test]
    fn test_checksum_different_content() {
        let checksum1 = Checksum::from_str(r#"{"title": "Page"}"#);
        let checksum2 = Checksum::from_str(r#"{"title": "User"}"#);
        assert_ne!(checksum1, checksum2);
    }

    #[test]
    fn test_checksum_file_format() {
        let mut file = ChecksumFile::new();
        file.insert("page.schema.json", Checksum::from("bbbb"));
        file.insert("document.schema.json", Checksum::from("aaaa"));

        assert_eq!(
            file.to_string(),
            "aaaa  document.schema.json\nbbbb  page.schema.json\n"
        );
        assert_eq!(ChecksumFile::parse(&file.to_string()), file);
    }

    #[test]
    fn test_checksum_file_parse_tolerates_binary_marker() {
        let file = ChecksumFile::parse("aaaa *meta.schema.json\n\nnot-a-line\n");
        assert_eq!(file.len(), 1);
        assert_eq!(file.get("meta.schema.json"), Some(&Checksum::from("aaaa")));
    }

    #[test]
    fn test_mismatches() {
        let mut recorded = ChecksumFile::new();
        recorded.insert("document.schema.json", Checksum::from("aaaa"));
        recorded.insert("meta.schema.json", Checksum::from("cccc"));

        let mut current = ChecksumFile::new();
        current.insert("document.schema.json", Checksum::from("aaaa"));
        current.insert("meta.schema.json", Checksum::from("dddd"));
        current.insert("user.schema.json", Checksum::from("eeee"));

        assert_eq!(recorded.mismatches(&current), vec!["meta.schema.json", "user.schema.json"]);
    }
}
