//! Content-addressed storage for encrypted payloads

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage credentials are not configured")]
    Credentials,
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("pinning failed with status {status}: {message}")]
    Api { status: u16, message: String },
}

/// Bytes in, content identifier out
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pinata pinning API client
///
/// Payloads are pinned as `{"encrypted_data": "<base64>"}` JSON documents
/// with CID version 1. The payload handed to [`ContentStore::put`] is
/// already base64 text, so the pinned value carries two encodings.
pub struct PinataClient {
    endpoint: String,
    api_key: String,
    secret_api_key: String,
    client: reqwest::Client,
}

impl PinataClient {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.api_key.is_empty() || config.secret_api_key.is_empty() {
            return Err(StorageError::Credentials);
        }
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            secret_api_key: config.secret_api_key.clone(),
            client: reqwest::Client::new(),
        })
    }
}

/// JSON body for `pinJSONToIPFS`
pub fn pin_request(name: &str, bytes: &[u8]) -> serde_json::Value {
    json!({
        "pinataOptions": {"cidVersion": 1},
        "pinataMetadata": {"name": name},
        "pinataContent": {"encrypted_data": STANDARD.encode(bytes)}
    })
}

#[async_trait]
impl ContentStore for PinataClient {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let response = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.endpoint))
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.secret_api_key)
            .json(&pin_request(name, bytes))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let pinned: PinResponse = response.json().await?;
        info!(cid = %pinned.ipfs_hash, size = bytes.len(), "Encrypted data pinned");
        Ok(pinned.ipfs_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_request_shape() {
        let armored = crate::sharing::crypto::armor(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(armored, "3q2+7w==");
        let body = pin_request("encrypted-data", armored.as_bytes());
        assert_eq!(
            body,
            json!({
                "pinataOptions": {"cidVersion": 1},
                "pinataMetadata": {"name": "encrypted-data"},
                "pinataContent": {"encrypted_data": "M3EyKzd3PT0="}
            })
        );
    }

    #[test]
    fn test_missing_credentials() {
        assert!(matches!(
            PinataClient::new(&StorageConfig::default()),
            Err(StorageError::Credentials)
        ));
    }
}
