//! Search-augmented LLM call used to find regulation sources
//!
//! The hosted Responses API is asked (with its web-search tool forced on)
//! for a numbered list of URLs in the exact format `"<n>- https://..."`.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use super::client::{api_error_message, AssistantError};

/// Instruction + query in, free text out
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, instructions: &str, input: &str) -> Result<String, AssistantError>;
}

/// [`WebSearch`] over the Responses API with `web_search_preview`
#[derive(Clone)]
pub struct ResponsesSearch {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ResponsesSearch {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebSearch for ResponsesSearch {
    async fn search(&self, instructions: &str, input: &str) -> Result<String, AssistantError> {
        let body = json!({
            "model": self.model,
            "tools": [{"type": "web_search_preview"}],
            "tool_choice": "required",
            "input": input,
            "instructions": instructions,
            "temperature": 0
        });

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        output_text(&value).ok_or(AssistantError::EmptyResponse)
    }
}

/// Concatenate every `output_text` block of a Responses API payload
pub fn output_text(response: &serde_json::Value) -> Option<String> {
    if let Some(text) = response["output_text"].as_str() {
        return Some(text.to_string());
    }

    let text: String = response["output"]
        .as_array()?
        .iter()
        .filter(|item| item["type"] == "message")
        .filter_map(|item| item["content"].as_array())
        .flatten()
        .filter(|block| block["type"] == "output_text")
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

lazy_static! {
    static ref NUMBERED_URL: Regex =
        Regex::new(r"(?m)^\s*\d+\s*[-.)]\s*(https?://\S+)").expect("valid url regex");
}

/// Extract URLs from a `"<n>- https://..."` list, in order
pub fn parse_numbered_urls(text: &str) -> Vec<String> {
    NUMBERED_URL
        .captures_iter(text)
        .map(|c| c[1].trim_end_matches(['.', ',', ')']).to_string())
        .collect()
}

/// Render URLs back into the canonical numbered format
pub fn format_numbered_urls(urls: &[String]) -> String {
    urls.iter()
        .enumerate()
        .map(|(i, url)| format!("{}- {}\n", i + 1, url))
        .collect()
}

/// Instructions for the first regulation source search
pub fn regulation_search_instructions(query: &str) -> String {
    format!(
        r#"You are a compliance assistant helping search for global healthcare data-sharing regulations.

Please identify the official regulation documents for this case:

"""{query}"""

Return a list of trusted, official webpage URLs for these documents (e.g., from .gov, .edu, official law websites) that will be used later to answer these questions based on the receiver and sender countries:
- Can the data be shared?
- What types of data are restricted?
- Is patient consent required?
- Is anonymization required?
- Is additional government approval required?

If not enough official webpages are found you can use unofficial sources.
Do NOT provide summaries or any interpretation.
Return only a numbered list of URLs (not more than 10)!

Format your response as follows (EXACTLY):
1- https://...

2- https://...

3- https://..."#
    )
}

/// Instructions for a follow-up search after the user rejected sources
pub fn more_sources_instructions(query: &str, previous_urls: &str, user_response: &str) -> String {
    format!(
        r#"You are a compliance assistant helping search for global healthcare data-sharing regulations.

Please identify the official regulation documents for the sender and receiver countries in the following scenario:

"""{query}"""

You were originally provided these URLs:

"""{previous_urls}"""

And the user said this:

"""{user_response}"""

Provide new webpage URLs that are trusted and from official and government sources only.
If not enough official webpages are found you can use unofficial sources.
Return only a numbered list of URLs (not more than 10)!
Do NOT provide summaries or any interpretation.

Format your response as follows (EXACTLY):
1- https://...

2- https://...

3- https://..."#
    )
}

/// Fixed input sent alongside the search instructions
pub const SEARCH_INPUT: &str = "Search for official healthcare data-sharing laws of both receiver and sender countries and return a list of URLs that include the needed information. Do not include any explanation or interpretation.";
