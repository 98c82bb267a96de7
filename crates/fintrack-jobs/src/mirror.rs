//! Optional mirror of OCR text into a Notion page.

use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use fintrack_core::defaults::{NOTION_API_URL, NOTION_VERSION};
use fintrack_core::{Error, Result};

/// Creates a child page holding the OCR text under the job's page.
#[derive(Clone)]
pub struct NotionMirror {
    client: Client,
    base_url: String,
}

impl NotionMirror {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, NOTION_API_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Page-creation body for `text` under `page_id`.
    pub fn page_payload(page_id: &str, text: &str) -> JsonValue {
        json!({
            "parent": { "page_id": page_id },
            "properties": {
                "title": {
                    "title": [{ "text": { "content": text } }]
                }
            }
        })
    }

    pub async fn mirror(&self, token: &str, page_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/v1/pages", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&Self::page_payload(page_id, text))
            .send()
            .await
            .map_err(|e| Error::Mirror(format!("Page create request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Mirror(format!(
                "Page create answered {}: {}",
                status,
                body.trim()
            )));
        }

        debug!(page_id, "Mirrored OCR text");
        Ok(())
    }
}
