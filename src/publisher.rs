//! Publisher - Folder Uploads with Partial Success
//!
//! Services upload one file (or one JSON document) at a time.
//! The publisher walks a folder in sorted order and keeps whatever succeeded.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub type ContentId = String;

/// Failure of a single upload. Only `MissingCredentials` aborts a folder.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0} credentials are not configured")]
    MissingCredentials(&'static str),

    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Response has no '{0}' field")]
    MissingCid(&'static str),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Nothing could be attempted. The partial-result case is `Ok`.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{0} is missing or not a directory")]
    NotADirectory(PathBuf),

    #[error("No eligible files in {0}")]
    NoEligibleFiles(PathBuf),

    #[error("{0} credentials are not configured, nothing uploaded")]
    MissingCredentials(&'static str),
}

/// A content-addressed upload backend.
pub trait PinningService {
    fn name(&self) -> &'static str;

    /// Err(MissingCredentials) when the service cannot authenticate.
    fn check_credentials(&self) -> Result<(), UploadError>;

    fn upload_file(&self, path: &Path) -> Result<ContentId, UploadError>;

    /// Upload a JSON document. Services without a native JSON endpoint
    /// use this default, which round-trips through a temporary file that
    /// is removed afterwards.
    fn upload_document(&self, name: &str, document: &Value) -> Result<ContentId, UploadError> {
        let mut tmp = tempfile::Builder::new()
            .prefix("temp_")
            .suffix(name)
            .tempfile()?;
        serde_json::to_writer(&mut tmp, document)?;
        tmp.flush()?;
        self.upload_file(tmp.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Every regular file, uploaded as bytes
    Files,
    /// Only `*.json`, parsed and sent through the document path
    Documents,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    /// filename -> content identifier, successes only
    pub cids: BTreeMap<String, ContentId>,
    pub attempted: usize,
    pub failed: Vec<String>,
}

impl PublishResult {
    pub fn get(&self, filename: &str) -> Option<&ContentId> {
        self.cids.get(filename)
    }

    pub fn len(&self) -> usize {
        self.cids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cids.is_empty()
    }

    /// e.g. "7/10"
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.cids.len(), self.attempted)
    }
}

pub struct Publisher<'a> {
    service: &'a dyn PinningService,
}

impl<'a> Publisher<'a> {
    pub fn new(service: &'a dyn PinningService) -> Self {
        Self { service }
    }

    /// Upload every eligible file in `dir`, one at a time, in name order.
    pub fn publish_folder(&self, dir: &Path, mode: PublishMode) -> Result<PublishResult, PublishError> {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "Upload folder missing or not a directory");
            return Err(PublishError::NotADirectory(dir.to_path_buf()));
        }

        let files = eligible_files(dir, mode);
        if files.is_empty() {
            warn!(path = %dir.display(), "No files to upload");
            return Err(PublishError::NoEligibleFiles(dir.to_path_buf()));
        }

        if let Err(e) = self.service.check_credentials() {
            warn!(service = self.service.name(), error = %e, "Aborting upload");
            return Err(PublishError::MissingCredentials(self.service.name()));
        }

        info!(
            path = %dir.display(),
            service = self.service.name(),
            files = files.len(),
            "Uploading folder"
        );

        let mut result = PublishResult::default();
        for filename in files {
            result.attempted += 1;
            let path = dir.join(&filename);
            match self.upload_one(&path, &filename, mode) {
                Ok(cid) => {
                    info!(file = %filename, cid = %cid, "Uploaded");
                    result.cids.insert(filename, cid);
                }
                Err(UploadError::MissingCredentials(service)) => {
                    warn!(service, "Credentials rejected mid-run, aborting upload");
                    return Err(PublishError::MissingCredentials(service));
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "Upload failed");
                    result.failed.push(filename);
                }
            }
        }

        if result.is_empty() {
            warn!(path = %dir.display(), "No file could be uploaded");
        } else {
            info!(uploaded = %result.ratio(), "Folder upload finished");
        }
        Ok(result)
    }

    fn upload_one(&self, path: &Path, filename: &str, mode: PublishMode) -> Result<ContentId, UploadError> {
        match mode {
            PublishMode::Files => self.service.upload_file(path),
            PublishMode::Documents => {
                let content = fs::read_to_string(path)?;
                let document: Value = serde_json::from_str(&content)?;
                self.service.upload_document(filename, &document)
            }
        }
    }
}

fn eligible_files(dir: &Path, mode: PublishMode) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return vec![];
    };
    let mut files: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter(|e| match mode {
            PublishMode::Files => true,
            PublishMode::Documents => e.path().extension().map_or(false, |x| x == "json"),
        })
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    files.sort();
    files
}
