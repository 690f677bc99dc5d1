//! Collection Configuration
//!
//! Everything the pipeline needs to know up front. Loaded from a JSON file,
//! credentials come from the process environment only.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PINATA_API_KEY_VAR: &str = "PINATA_API_KEY";
pub const PINATA_API_SECRET_VAR: &str = "PINATA_API_SECRET";
pub const WEB3_STORAGE_TOKEN_VAR: &str = "WEB3_STORAGE_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Which pinning service receives uploads.
///
/// Passed explicitly to the publisher, never read from global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Pinata (API key + secret)
    Pinata,
    /// web3.storage (bearer token)
    #[value(name = "web3_storage")]
    Web3Storage,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Pinata
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pinata => f.write_str("pinata"),
            Self::Web3Storage => f.write_str("web3_storage"),
        }
    }
}

/// What to do when a freshly composed item repeats an earlier item's DNA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UniquenessPolicy {
    /// Keep the duplicate, log it and record it in the report
    Allow,
    /// Re-compose the item up to `max_attempts` times
    #[serde(rename_all = "camelCase")]
    Reroll { max_attempts: u32 },
}

impl Default for UniquenessPolicy {
    fn default() -> Self {
        Self::Allow
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_total_items")]
    pub total_items: u32,
    #[serde(default = "default_image_size")]
    pub image_size: [u32; 2],
    #[serde(default = "default_layer_order")]
    pub layer_order: Vec<String>,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_layers_dir")]
    pub layers_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub uniqueness: UniquenessPolicy,
}

fn default_name() -> String { "Generated Collection".to_string() }
fn default_description() -> String {
    "A unique collection assembled from layered traits.".to_string()
}
fn default_total_items() -> u32 { 10 }
fn default_image_size() -> [u32; 2] { [500, 500] }
fn default_layer_order() -> Vec<String> {
    ["background", "body", "eyes", "mouth", "accessories"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_layers_dir() -> PathBuf { PathBuf::from("layers") }
fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_upload_timeout() -> u64 { 60 }

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: default_description(),
            total_items: default_total_items(),
            image_size: default_image_size(),
            layer_order: default_layer_order(),
            backend: BackendKind::default(),
            layers_dir: default_layers_dir(),
            output_dir: default_output_dir(),
            upload_timeout_secs: default_upload_timeout(),
            seed: None,
            uniqueness: UniquenessPolicy::default(),
        }
    }
}

impl CollectionConfig {
    /// Load and validate a config file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_items == 0 {
            return Err(ConfigError::Invalid("totalItems must be at least 1".into()));
        }
        if self.image_size[0] == 0 || self.image_size[1] == 0 {
            return Err(ConfigError::Invalid(format!(
                "imageSize must be non-zero, got {}x{}",
                self.image_size[0], self.image_size[1]
            )));
        }
        if self.layer_order.is_empty() {
            return Err(ConfigError::Invalid("layerOrder is empty".into()));
        }
        let mut seen = HashSet::new();
        for layer in &self.layer_order {
            if layer.trim().is_empty() {
                return Err(ConfigError::Invalid("layerOrder contains a blank name".into()));
            }
            if !seen.insert(layer.as_str()) {
                return Err(ConfigError::Invalid(format!("layer '{}' listed twice", layer)));
            }
        }
        if self.upload_timeout_secs == 0 {
            return Err(ConfigError::Invalid("uploadTimeoutSecs must be positive".into()));
        }
        if let UniquenessPolicy::Reroll { max_attempts: 0 } = self.uniqueness {
            return Err(ConfigError::Invalid("reroll maxAttempts must be positive".into()));
        }
        Ok(())
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.output_dir)
    }
}

/// Where generated artifacts land.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join("report.json")
    }
}

/// Create `dir` if needed and delete the regular files an earlier run left
/// in it. Subdirectories are kept. Returns how many files were removed.
pub fn clear_artifacts(dir: &Path) -> std::io::Result<usize> {
    fs::create_dir_all(dir)?;
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Backend credentials. Never serialized.
#[derive(Clone, Default)]
pub struct Credentials {
    pub pinata_api_key: Option<String>,
    pub pinata_api_secret: Option<String>,
    pub web3_storage_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            pinata_api_key: env_var(PINATA_API_KEY_VAR),
            pinata_api_secret: env_var(PINATA_API_SECRET_VAR),
            web3_storage_token: env_var(WEB3_STORAGE_TOKEN_VAR),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("pinata_api_key", &self.pinata_api_key.as_ref().map(|_| "<set>"))
            .field("pinata_api_secret", &self.pinata_api_secret.as_ref().map(|_| "<set>"))
            .field("web3_storage_token", &self.web3_storage_token.as_ref().map(|_| "<set>"))
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CollectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layer_order.len(), 5);
        assert_eq!(config.backend, BackendKind::Pinata);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CollectionConfig = serde_json::from_str(
            r#"{"name": "Cats", "totalItems": 3, "backend": "web3_storage"}"#,
        ).unwrap();
        assert_eq!(config.name, "Cats");
        assert_eq!(config.total_items, 3);
        assert_eq!(config.backend, BackendKind::Web3Storage);
        assert_eq!(config.image_size, [500, 500]);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = serde_json::from_str::<CollectionConfig>(r#"{"backend": "s3"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reroll_policy_parses() {
        let config: CollectionConfig = serde_json::from_str(
            r#"{"uniqueness": {"reroll": {"maxAttempts": 5}}}"#,
        ).unwrap();
        assert_eq!(config.uniqueness, UniquenessPolicy::Reroll { max_attempts: 5 });
    }

    #[test]
    fn test_validate_rejects_duplicate_layers() {
        let config = CollectionConfig {
            layer_order: vec!["body".into(), "body".into()],
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("listed twice"));
    }

    #[test]
    fn test_validate_rejects_zero_items() {
        let config = CollectionConfig { total_items: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials {
            pinata_api_key: Some("secret-key".into()),
            ..Default::default()
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<set>"));
    }

    #[test]
    fn test_clear_artifacts_keeps_subdirectories() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("images");
        fs::create_dir_all(out.join("keep")).unwrap();
        fs::write(out.join("1.png"), b"old").unwrap();
        fs::write(out.join("notes.txt"), b"old").unwrap();

        assert_eq!(clear_artifacts(&out).unwrap(), 2);
        assert!(out.join("keep").is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
        assert_eq!(clear_artifacts(&dir.path().join("fresh")).unwrap(), 0);
    }
}
