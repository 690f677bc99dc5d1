//! Run Report - What Was Generated and Where It Lives
//!
//! Sealed with a manifest hash over its canonical JSON, computed with the
//! hash field itself left empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::generator::DuplicateGroup;
use crate::hashing::compute_manifest_hash;
use crate::publisher::PublishResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSummary {
    pub uploaded: usize,
    pub attempted: usize,
}

impl From<&PublishResult> for PublishSummary {
    fn from(result: &PublishResult) -> Self {
        Self {
            uploaded: result.len(),
            attempted: result.attempted,
        }
    }
}

impl std::fmt::Display for PublishSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.uploaded, self.attempted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: u32,
    pub dna: String,
    pub image_cid: Option<String>,
    pub metadata_cid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub generator_version: String,
    pub created_at: DateTime<Utc>,
    pub collection: String,
    pub backend: String,
    pub generated: usize,
    pub images: PublishSummary,
    pub metadata_built: usize,
    /// None when the metadata publish could not be attempted
    pub metadata: Option<PublishSummary>,
    #[serde(default)]
    pub metadata_publish_error: Option<String>,
    pub skipped_ids: Vec<u32>,
    pub duplicates: Vec<DuplicateGroup>,
    pub items: Vec<ItemRecord>,
    pub images_dir: String,
    pub metadata_dir: String,
    pub manifest_hash: String,
}

impl RunReport {
    /// Images are pinned but some or all metadata documents are not.
    pub fn is_degraded(&self) -> bool {
        match self.metadata {
            Some(summary) => summary.uploaded < self.metadata_built,
            None => true,
        }
    }

    pub fn seal(&mut self) -> Result<(), serde_json::Error> {
        self.manifest_hash = String::new();
        self.manifest_hash = compute_manifest_hash(self)?;
        Ok(())
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, json)
    }
}
