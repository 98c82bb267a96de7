//! RemoteOcrExtractor: forwards the job to an external OCR webhook (n8n).
//!
//! The whole job is POSTed as JSON; the answer's `text` field is the OCR
//! text. A missing or non-string `text` reads as the empty string.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::debug;

use fintrack_core::{Error, OcrJob, Result, TextExtractor};

pub struct RemoteOcrExtractor {
    client: Client,
}

impl RemoteOcrExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// POST `job` to `url` and read back its `text`.
    pub async fn fetch_text(&self, url: &str, job: &OcrJob) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(job)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("OCR forward to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Extraction(format!(
                "OCR webhook {} answered {}",
                url, status
            )));
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("OCR webhook returned invalid JSON: {}", e)))?;

        let text = body
            .get("text")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        debug!(url, text_len = text.len(), "Remote OCR returned text");
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for RemoteOcrExtractor {
    async fn extract(&self, job: &OcrJob) -> Result<String> {
        let url = job
            .n8n_url
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("Job has no n8n_url".to_string()))?;
        self.fetch_text(url, job).await
    }

    fn name(&self) -> &str {
        "remote_ocr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job(url: &str) -> OcrJob {
        OcrJob::new("http://hook", "s")
            .with_id("r1")
            .with_n8n_url(url)
    }

    #[tokio::test]
    async fn test_forwards_job_and_reads_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ocr"))
            .and(body_partial_json(json!({"id": "r1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "TOTAL 4.20"})))
            .expect(1)
            .mount(&server)
            .await;

        let extractor = RemoteOcrExtractor::new(Client::new());
        let text = extractor
            .extract(&job(&format!("{}/ocr", server.uri())))
            .await
            .unwrap();
        assert_eq!(text, "TOTAL 4.20");
    }

    #[tokio::test]
    async fn test_missing_text_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let extractor = RemoteOcrExtractor::new(Client::new());
        let text = extractor.extract(&job(&server.uri())).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_non_success_is_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let extractor = RemoteOcrExtractor::new(Client::new());
        let err = extractor.extract(&job(&server.uri())).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_missing_url_is_invalid_input() {
        let extractor = RemoteOcrExtractor::new(Client::new());
        let err = extractor
            .extract(&OcrJob::new("http://hook", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_name() {
        assert_eq!(RemoteOcrExtractor::new(Client::new()).name(), "remote_ocr");
    }
}
