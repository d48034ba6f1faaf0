//! Source manifest (manifest.yaml)
//!
//! The manifest lists every data source the downloaders fetch, grouped by
//! resource kind. The seed pipeline only reads each entry's `table_name` and
//! `type`; everything else belongs to the downloaders and is ignored here.
//!
//! ```yaml
//! resources:
//!   local-files:
//!     - table_name: mines
//!       type: primary
//!   remote-files:
//!     - table_name: leases
//!       type: supplementary
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Result, SeedError};

/// Visibility tier of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Loaded with the `p_` prefix and resolved into the clean schema
    #[default]
    Primary,
    /// Loaded with the `s_` prefix for reference only
    Supplementary,
    /// Consumed by the embeddings builder, never loaded into the raw schema
    Embeddings,
}

impl SourceType {
    /// Raw-table prefix, `None` when the source is not loaded
    pub fn table_prefix(self) -> Option<&'static str> {
        match self {
            SourceType::Primary => Some("p_"),
            SourceType::Supplementary => Some("s_"),
            SourceType::Embeddings => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::Primary => "primary",
            SourceType::Supplementary => "supplementary",
            SourceType::Embeddings => "embeddings",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    #[serde(default)]
    pub table_name: Option<String>,

    #[serde(rename = "type", default)]
    pub source_type: SourceType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(rename = "local-files", default)]
    pub local_files: Vec<SourceEntry>,

    #[serde(rename = "remote-files", default)]
    pub remote_files: Vec<SourceEntry>,

    #[serde(default)]
    pub apis: Vec<SourceEntry>,

    #[serde(default)]
    pub databases: Vec<SourceEntry>,

    #[serde(default)]
    pub scripts: Vec<SourceEntry>,
}

/// Number of configured entries per resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ManifestSummary {
    pub local_files: usize,
    pub remote_files: usize,
    pub apis: usize,
    pub databases: usize,
    pub scripts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Resources,
}

impl Manifest {
    /// Load the manifest from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SeedError::manifest(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Err(SeedError::manifest("manifest is empty"));
        }
        serde_yaml::from_str(content)
            .map_err(|e| SeedError::manifest(format!("failed to parse YAML: {}", e)))
    }

    /// Entries in lookup order
    pub fn entries(&self) -> impl Iterator<Item = &SourceEntry> {
        let r = &self.resources;
        r.local_files
            .iter()
            .chain(&r.remote_files)
            .chain(&r.apis)
            .chain(&r.scripts)
            .chain(&r.databases)
    }

    /// Tier of the source whose `table_name` equals a file stem; primary if unlisted
    pub fn tier_for(&self, stem: &str) -> SourceType {
        self.entries()
            .find(|entry| entry.table_name.as_deref() == Some(stem))
            .map(|entry| entry.source_type)
            .unwrap_or_default()
    }

    pub fn summary(&self) -> ManifestSummary {
        let r = &self.resources;
        ManifestSummary {
            local_files: r.local_files.len(),
            remote_files: r.remote_files.len(),
            apis: r.apis.len(),
            databases: r.databases.len(),
            scripts: r.scripts.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MANIFEST: &str = r#"
resources:
  local-files:
    - table_name: mines
      type: primary
      location: data/mines.csv
    - table_name: leases
      type: supplementary
  remote-files:
    - table_name: reports
      type: embeddings
      bucket: lucent-data
  apis:
    - table_name: places
  scripts:
    - title: Enrich places
      location: scripts/places.py
"#;

    #[test]
    fn test_tier_lookup() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();

        assert_eq!(manifest.tier_for("mines"), SourceType::Primary);
        assert_eq!(manifest.tier_for("leases"), SourceType::Supplementary);
        assert_eq!(manifest.tier_for("reports"), SourceType::Embeddings);
        // Entries without a type default to primary
        assert_eq!(manifest.tier_for("places"), SourceType::Primary);
        // Unlisted stems default to primary
        assert_eq!(manifest.tier_for("unknown"), SourceType::Primary);
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(SourceType::Primary.table_prefix(), Some("p_"));
        assert_eq!(SourceType::Supplementary.table_prefix(), Some("s_"));
        assert_eq!(SourceType::Embeddings.table_prefix(), None);
    }

    #[test]
    fn test_summary_counts() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(
            manifest.summary(),
            ManifestSummary {
                local_files: 2,
                remote_files: 1,
                apis: 1,
                databases: 0,
                scripts: 1,
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = Manifest::from_yaml("resources:\n  apis:\n    - table_name: x\n      type: secondary\n")
            .unwrap_err();
        assert!(matches!(err, SeedError::Manifest(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.resources.local_files.len(), 2);

        assert!(Manifest::load("/nonexistent/manifest.yaml").is_err());

        let empty = NamedTempFile::new().unwrap();
        assert!(Manifest::load(empty.path()).is_err());
    }
}
