//! Metadata Builder
//!
//! One JSON document per item, named `{id}.json`. Records are written once
//! and never updated.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::config::clear_artifacts;
use crate::hashing::derive_dna;
use crate::layers::Attribute;

pub const IPFS_SCHEME: &str = "ipfs://";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata I/O error at {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata file name for an item ID.
pub fn metadata_file_name(id: u32) -> String {
    format!("{}.json", id)
}

/// Image reference for a content identifier.
pub fn ipfs_uri(cid: &str) -> String {
    format!("{}{}", IPFS_SCHEME, cid)
}

/// Published descriptive record. Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub name: String,
    pub description: String,
    pub image: String,
    pub dna: String,
    pub edition: u32,
    /// Unix milliseconds at build time
    pub date: i64,
    pub attributes: Vec<Attribute>,
}

pub struct MetadataBuilder {
    collection_name: String,
    description: String,
    output_dir: PathBuf,
}

impl MetadataBuilder {
    pub fn new(collection_name: &str, description: &str, output_dir: &Path) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            description: description.to_string(),
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Empty the output directory so only records built from now on get
    /// published. Returns how many old files were removed.
    pub fn prepare(&self) -> Result<usize, MetadataError> {
        let removed = clear_artifacts(&self.output_dir)
            .map_err(|e| MetadataError::Io(self.output_dir.clone(), e))?;
        if removed > 0 {
            info!(path = %self.output_dir.display(), removed, "Cleared previous metadata");
        }
        Ok(removed)
    }

    /// Assemble the record without touching disk.
    pub fn record(&self, id: u32, attributes: &[Attribute], image_uri: &str) -> MetadataRecord {
        MetadataRecord {
            name: format!("{} #{}", self.collection_name, id),
            description: self.description.clone(),
            image: image_uri.to_string(),
            dna: derive_dna(attributes),
            edition: id,
            date: Utc::now().timestamp_millis(),
            attributes: attributes.to_vec(),
        }
    }

    /// Build the record for one item and write it to `{id}.json`.
    pub fn build(
        &self,
        id: u32,
        attributes: &[Attribute],
        image_uri: &str,
    ) -> Result<(MetadataRecord, PathBuf), MetadataError> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| MetadataError::Io(self.output_dir.clone(), e))?;

        let record = self.record(id, attributes, image_uri);
        let path = self.output_dir.join(metadata_file_name(id));
        write_record(&path, &record)?;
        info!(id, path = %path.display(), "Metadata saved");
        Ok((record, path))
    }
}

pub fn write_record(path: &Path, record: &MetadataRecord) -> Result<(), MetadataError> {
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json).map_err(|e| MetadataError::Io(path.to_path_buf(), e))
}

pub fn read_record(path: &Path) -> Result<MetadataRecord, MetadataError> {
    let content = fs::read_to_string(path).map_err(|e| MetadataError::Io(path.to_path_buf(), e))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_attributes() -> Vec<Attribute> {
        vec![
            Attribute::new("Background", "Sky blue"),
            Attribute::new("Body", "Robot"),
        ]
    }

    #[test]
    fn test_record_fields() {
        let builder = MetadataBuilder::new("Cats", "Many cats", Path::new("unused"));
        let record = builder.record(7, &sample_attributes(), &ipfs_uri("bafyabc"));

        assert_eq!(record.name, "Cats #7");
        assert_eq!(record.description, "Many cats");
        assert_eq!(record.image, "ipfs://bafyabc");
        assert_eq!(record.edition, 7);
        assert_eq!(record.dna, "robot-skyblue");
        assert!(record.date > 0);
    }

    #[test]
    fn test_key_order_on_disk() {
        let dir = TempDir::new().unwrap();
        let builder = MetadataBuilder::new("Cats", "Many cats", dir.path());
        let (_, path) = builder.build(1, &sample_attributes(), "ipfs://x").unwrap();

        let text = fs::read_to_string(path).unwrap();
        let keys = ["\"name\"", "\"description\"", "\"image\"", "\"dna\"", "\"edition\"", "\"date\"", "\"attributes\""];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("\"trait_type\": \"Background\""));
    }

    #[test]
    fn test_prepare_removes_old_records() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("json");
        let builder = MetadataBuilder::new("Cats", "Many cats", &out);
        builder.build(2, &sample_attributes(), "ipfs://old").unwrap();

        assert_eq!(builder.prepare().unwrap(), 1);
        assert!(!out.join("2.json").exists());
        assert!(out.is_dir());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let builder = MetadataBuilder::new("Cats", "Many cats", dir.path());
        let (record, path) = builder.build(3, &sample_attributes(), "ipfs://x").unwrap();

        assert_eq!(path.file_name().unwrap(), "3.json");
        assert_eq!(read_record(&path).unwrap(), record);
    }
}
