//! Pinning Backends - Pinata and web3.storage
//!
//! Both speak HTTP through a blocking client with a request timeout.
//! Pinata has a native JSON endpoint; web3.storage only takes raw bytes.

use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::{BackendKind, Credentials};
use crate::publisher::{ContentId, PinningService, UploadError};

pub const PINATA_BASE_URL: &str = "https://api.pinata.cloud";
pub const WEB3_STORAGE_BASE_URL: &str = "https://api.web3.storage";

const PINATA_CID_FIELD: &str = "IpfsHash";
const WEB3_STORAGE_CID_FIELD: &str = "cid";

/// Build the service for the selected backend.
pub fn service_for(
    kind: BackendKind,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<Box<dyn PinningService>, UploadError> {
    let service: Box<dyn PinningService> = match kind {
        BackendKind::Pinata => Box::new(PinataService::new(credentials, timeout)?),
        BackendKind::Web3Storage => Box::new(Web3StorageService::new(credentials, timeout)?),
    };
    Ok(service)
}

fn http_client(timeout: Duration) -> Result<Client, UploadError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Pull the content identifier out of a success response.
fn extract_cid(response: Response, field: &'static str) -> Result<ContentId, UploadError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(UploadError::Rejected { status: status.as_u16(), body });
    }
    let body: Value = response.json()?;
    cid_field(&body, field)
}

fn cid_field(body: &Value, field: &'static str) -> Result<ContentId, UploadError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|cid| !cid.is_empty())
        .map(str::to_string)
        .ok_or(UploadError::MissingCid(field))
}

// --- Pinata ---

pub struct PinataService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl PinataService {
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self, UploadError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: PINATA_BASE_URL.to_string(),
            api_key: credentials.pinata_api_key.clone(),
            api_secret: credentials.pinata_api_secret.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn keys(&self) -> Result<(&str, &str), UploadError> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Ok((key.as_str(), secret.as_str())),
            _ => Err(UploadError::MissingCredentials(self.name())),
        }
    }
}

impl PinningService for PinataService {
    fn name(&self) -> &'static str { "pinata" }

    fn check_credentials(&self) -> Result<(), UploadError> {
        self.keys().map(|_| ())
    }

    fn upload_file(&self, path: &Path) -> Result<ContentId, UploadError> {
        let (key, secret) = self.keys()?;
        let bytes = fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        let form = multipart::Form::new().part("file", multipart::Part::bytes(bytes).file_name(filename));
        let response = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.base_url))
            .header("pinata_api_key", key)
            .header("pinata_secret_api_key", secret)
            .multipart(form)
            .send()?;
        extract_cid(response, PINATA_CID_FIELD)
    }

    fn upload_document(&self, name: &str, document: &Value) -> Result<ContentId, UploadError> {
        let (key, secret) = self.keys()?;
        let payload = json!({
            "pinataOptions": {"cidVersion": 1},
            "pinataMetadata": {"name": name},
            "pinataContent": document,
        });
        let response = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.base_url))
            .header("pinata_api_key", key)
            .header("pinata_secret_api_key", secret)
            .json(&payload)
            .send()?;
        extract_cid(response, PINATA_CID_FIELD)
    }
}

// --- web3.storage ---

pub struct Web3StorageService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl Web3StorageService {
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self, UploadError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: WEB3_STORAGE_BASE_URL.to_string(),
            token: credentials.web3_storage_token.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn token(&self) -> Result<&str, UploadError> {
        self.token.as_deref().ok_or(UploadError::MissingCredentials(self.name()))
    }
}

impl PinningService for Web3StorageService {
    fn name(&self) -> &'static str { "web3_storage" }

    fn check_credentials(&self) -> Result<(), UploadError> {
        self.token().map(|_| ())
    }

    // Documents go through the trait's temp-file default.
    fn upload_file(&self, path: &Path) -> Result<ContentId, UploadError> {
        let token = self.token()?;
        let bytes = fs::read(path)?;
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/car")
            .body(bytes)
            .send()?;
        extract_cid(response, WEB3_STORAGE_CID_FIELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_field_present() {
        let body = json!({"IpfsHash": "bafy123", "PinSize": 10});
        assert_eq!(cid_field(&body, "IpfsHash").unwrap(), "bafy123");
    }

    #[test]
    fn test_cid_field_missing_or_empty() {
        assert!(matches!(cid_field(&json!({"cid": ""}), "cid"), Err(UploadError::MissingCid("cid"))));
        assert!(matches!(cid_field(&json!({"IpfsHash": "x"}), "cid"), Err(UploadError::MissingCid("cid"))));
    }

    #[test]
    fn test_missing_credentials_detected_offline() {
        let timeout = Duration::from_secs(1);
        let pinata = PinataService::new(
            &Credentials { pinata_api_key: Some("k".into()), ..Default::default() },
            timeout,
        ).unwrap();
        assert!(matches!(pinata.check_credentials(), Err(UploadError::MissingCredentials("pinata"))));

        let web3 = Web3StorageService::new(&Credentials::default(), timeout).unwrap();
        assert!(matches!(web3.check_credentials(), Err(UploadError::MissingCredentials("web3_storage"))));
    }

    #[test]
    fn test_service_for_selects_backend() {
        let creds = Credentials::default();
        let timeout = Duration::from_secs(1);
        assert_eq!(service_for(BackendKind::Pinata, &creds, timeout).unwrap().name(), "pinata");
        assert_eq!(service_for(BackendKind::Web3Storage, &creds, timeout).unwrap().name(), "web3_storage");
    }
}
