//! Traces dataset manifest.
//!
//! The traces store declares its config partitions in the YAML front matter
//! of its README: a `dataset_info` sequence and a parallel `configs`
//! sequence, both keyed by `config_name`. Keys this crate does not model
//! round-trip unchanged, since the manifest carries arbitrary dataset-card
//! metadata alongside the parts we edit.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// One entry of the `dataset_info` or `configs` sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub config_name: String,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// The YAML front-matter block of the traces README.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub dataset_info: Vec<ConfigEntry>,
    #[serde(default)]
    pub configs: Vec<ConfigEntry>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

/// Parsed traces README: front matter plus the markdown body.
#[derive(Debug, Clone)]
pub struct TracesManifest {
    pub metadata: ManifestMetadata,
    pub content: String,
}

impl TracesManifest {
    /// Parse a README with YAML front matter delimited by `---` lines.
    pub fn parse(text: &str, path: &str) -> Result<Self, ReconcileError> {
        let invalid = |reason: &str| ReconcileError::InvalidManifest {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Err(invalid("empty file"));
        }
        if lines[0].trim_end() != "---" {
            return Err(invalid("expected --- at the beginning"));
        }
        let end = lines[1..]
            .iter()
            .position(|l| l.trim_end() == "---")
            .map(|i| i + 1)
            .ok_or_else(|| invalid("expected --- at the end of metadata section"))?;

        let yaml_block = lines[1..end].join("\n");
        let metadata: ManifestMetadata = serde_yaml::from_str(&yaml_block)
            .map_err(|e| invalid(&format!("invalid metadata block: {}", e)))?;
        let content = lines[end + 1..].join("\n");

        Ok(Self { metadata, content })
    }

    pub fn from_file(path: &Path) -> Result<Self, ReconcileError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, &path.to_string_lossy())
    }

    /// Render back to README form.
    pub fn render(&self) -> Result<String, ReconcileError> {
        let yaml = serde_yaml::to_string(&self.metadata)?;
        Ok(format!("---\n{}---\n{}\n", yaml, self.content))
    }

    /// Declared config names, in manifest order.
    pub fn config_names(&self) -> Vec<String> {
        self.metadata
            .dataset_info
            .iter()
            .map(|c| c.config_name.clone())
            .collect()
    }

    /// Drop a config from both manifest sequences.
    pub fn remove_config(&mut self, name: &str) {
        self.metadata.dataset_info.retain(|c| c.config_name != name);
        self.metadata.configs.retain(|c| c.config_name != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const README: &str = r#"---
license: mit
dataset_info:
- config_name: alpha-run-1000
  features: 12
- config_name: beta-run-2000
configs:
- config_name: alpha-run-1000
  data_files: alpha-run-1000/*
- config_name: beta-run-2000
  data_files: beta-run-2000/*
---
# COT eval traces
"#;

    #[test]
    fn test_parse_front_matter() {
        let manifest = TracesManifest::parse(README, "README.md").unwrap();
        assert_eq!(
            manifest.config_names(),
            vec!["alpha-run-1000", "beta-run-2000"]
        );
        assert_eq!(manifest.metadata.configs.len(), 2);
        assert!(manifest.content.contains("# COT eval traces"));
    }

    #[test]
    fn test_parse_rejects_malformed_files() {
        assert!(matches!(
            TracesManifest::parse("", "README.md"),
            Err(ReconcileError::InvalidManifest { .. })
        ));
        assert!(matches!(
            TracesManifest::parse("# no front matter\n", "README.md"),
            Err(ReconcileError::InvalidManifest { .. })
        ));
        assert!(matches!(
            TracesManifest::parse("---\nlicense: mit\n", "README.md"),
            Err(ReconcileError::InvalidManifest { .. })
        ));
        // dataset_info is required
        assert!(matches!(
            TracesManifest::parse("---\nlicense: mit\n---\nbody\n", "README.md"),
            Err(ReconcileError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn test_remove_config_edits_both_sequences() {
        let mut manifest = TracesManifest::parse(README, "README.md").unwrap();
        manifest.remove_config("alpha-run-1000");
        assert_eq!(manifest.config_names(), vec!["beta-run-2000"]);
        assert_eq!(manifest.metadata.configs.len(), 1);
    }

    #[test]
    fn test_render_round_trips_unknown_keys() {
        let manifest = TracesManifest::parse(README, "README.md").unwrap();
        let rendered = manifest.render().unwrap();
        assert!(rendered.starts_with("---\n"));
        assert!(rendered.contains("license: mit"));
        assert!(rendered.contains("features: 12"));
        assert!(rendered.contains("# COT eval traces"));

        // And the rendered form parses back to the same config set.
        let reparsed = TracesManifest::parse(&rendered, "README.md").unwrap();
        assert_eq!(reparsed.config_names(), manifest.config_names());
    }
}
