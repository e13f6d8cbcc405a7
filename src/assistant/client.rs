//! HTTP client for the hosted Assistants v2 API
//!
//! [`RunService`] is the seam the run driver talks through; the
//! [`AssistantsClient`] implements it over HTTPS and tests substitute an
//! in-memory fake.

use async_trait::async_trait;
use reqwest::multipart;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use super::types::{ListMessagesResponse, Run, ThreadMessage, ThreadObject, ToolOutput};

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("empty response from assistant service")]
    EmptyResponse,
}

/// Conversational run service: threads, messages and runs
#[async_trait]
pub trait RunService: Send + Sync {
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append a user message to the thread
    async fn add_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    /// Most recent message on the thread, if any
    async fn latest_message(&self, thread_id: &str)
        -> Result<Option<ThreadMessage>, AssistantError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, AssistantError>;
}

/// Store of regulation documents the regulation assistant searches
#[async_trait]
pub trait SourceLibrary: Send + Sync {
    async fn add_document(&self, name: &str, content: Vec<u8>) -> Result<String, AssistantError>;
}

/// Client for the Assistants v2 HTTP API
#[derive(Clone)]
pub struct AssistantsClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AssistantsClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g., "https://api.openai.com/v1")
    /// * `api_key` - Bearer token
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> Result<T, AssistantError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }
        if text.is_empty() {
            return Err(AssistantError::EmptyResponse);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Upload a file for assistant use and return its id
    pub async fn upload_file(
        &self,
        name: &str,
        content: Vec<u8>,
        purpose: &str,
    ) -> Result<String, AssistantError> {
        let part = multipart::Part::bytes(content).file_name(name.to_string());
        let form = multipart::Form::new()
            .text("purpose", purpose.to_string())
            .part("file", part);
        let response: ThreadObject = Self::send_json(
            self.client
                .post(self.url("/files"))
                .bearer_auth(&self.api_key)
                .multipart(form),
        )
        .await?;
        Ok(response.id)
    }

    /// Attach an uploaded file to a vector store
    pub async fn attach_to_vector_store(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), AssistantError> {
        let _: serde_json::Value = Self::send_json(
            self.request(
                reqwest::Method::POST,
                &format!("/vector_stores/{}/files", vector_store_id),
            )
            .json(&json!({ "file_id": file_id })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RunService for AssistantsClient {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let thread: ThreadObject =
            Self::send_json(self.request(reqwest::Method::POST, "/threads").json(&json!({})))
                .await?;
        debug!(thread_id = %thread.id, "Created thread");
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        let _: serde_json::Value = Self::send_json(
            self.request(
                reqwest::Method::POST,
                &format!("/threads/{}/messages", thread_id),
            )
            .json(&json!({ "role": "user", "content": content })),
        )
        .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        Self::send_json(
            self.request(reqwest::Method::POST, &format!("/threads/{}/runs", thread_id))
                .json(&json!({ "assistant_id": assistant_id })),
        )
        .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        Self::send_json(self.request(
            reqwest::Method::GET,
            &format!("/threads/{}/runs/{}", thread_id, run_id),
        ))
        .await
    }

    async fn latest_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<ThreadMessage>, AssistantError> {
        let list: ListMessagesResponse = Self::send_json(
            self.request(
                reqwest::Method::GET,
                &format!("/threads/{}/messages", thread_id),
            )
            .query(&[("order", "desc"), ("limit", "1")]),
        )
        .await?;
        Ok(list.data.into_iter().next())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, AssistantError> {
        Self::send_json(
            self.request(
                reqwest::Method::POST,
                &format!("/threads/{}/runs/{}/submit_tool_outputs", thread_id, run_id),
            )
            .json(&json!({ "tool_outputs": outputs })),
        )
        .await
    }
}

/// Vector-store-backed [`SourceLibrary`]
pub struct VectorStoreLibrary {
    client: AssistantsClient,
    vector_store_id: String,
}

impl VectorStoreLibrary {
    pub fn new(client: AssistantsClient, vector_store_id: impl Into<String>) -> Self {
        Self {
            client,
            vector_store_id: vector_store_id.into(),
        }
    }
}

#[async_trait]
impl SourceLibrary for VectorStoreLibrary {
    async fn add_document(&self, name: &str, content: Vec<u8>) -> Result<String, AssistantError> {
        let file_id = self.client.upload_file(name, content, "assistants").await?;
        self.client
            .attach_to_vector_store(&self.vector_store_id, &file_id)
            .await?;
        debug!(file_id = %file_id, vector_store = %self.vector_store_id, "Document added");
        Ok(file_id)
    }
}

/// Retrieves web pages so they can be stored as regulation sources
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssistantError>;
}

/// Plain HTTP GET [`PageFetcher`]
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssistantError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message: format!("GET {} failed", url),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Pull `error.message` out of an API error body, or return the body
pub(crate) fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_extraction() {
        let body = r#"{"error": {"message": "No thread found", "type": "invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "No thread found");
        assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = AssistantsClient::new("https://example.test/v1/", "sk");
        assert_eq!(client.url("/threads"), "https://example.test/v1/threads");
    }
}
