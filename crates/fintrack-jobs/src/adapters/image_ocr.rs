//! ImageOcrExtractor: fetches a receipt image and OCRs it with tesseract.
//!
//! Pipeline: GET image → magic-byte check (must be an image) → temp file →
//! `tesseract <file> stdout -l <lang>`.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::process::Command;
use tracing::debug;

use fintrack_core::defaults::{OCR_CMD_TIMEOUT_SECS, OCR_LANGUAGE, TESSERACT_CMD};
use fintrack_core::{Error, OcrJob, Result, TextExtractor};

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Extraction(format!("OCR command timed out after {}s", timeout_secs))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute OCR command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "OCR command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub struct ImageOcrExtractor {
    client: Client,
    command: String,
    language: String,
    timeout_secs: u64,
}

impl ImageOcrExtractor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            command: TESSERACT_CMD.to_string(),
            language: OCR_LANGUAGE.to_string(),
            timeout_secs: OCR_CMD_TIMEOUT_SECS,
        }
    }

    /// Use a different tesseract executable.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Download the image at `url`.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("Image fetch from {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Extraction(format!(
                "Image fetch from {} answered {}",
                url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Extraction(format!("Image body read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// OCR raw image bytes.
    pub async fn recognize(&self, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(Error::Extraction("Cannot OCR empty image data".to_string()));
        }

        let kind = infer::get(data)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .ok_or_else(|| {
                Error::Extraction("Fetched data is not a recognizable image".to_string())
            })?;

        let mut tmpfile = tempfile::Builder::new()
            .suffix(&format!(".{}", kind.extension()))
            .tempfile()?;
        tmpfile.write_all(data)?;
        let image_path = tmpfile.path().to_string_lossy().to_string();

        debug!(
            mime = kind.mime_type(),
            bytes = data.len(),
            language = %self.language,
            "Running tesseract"
        );

        let text = run_cmd_with_timeout(
            Command::new(&self.command)
                .arg(&image_path)
                .arg("stdout")
                .arg("-l")
                .arg(&self.language)
                .kill_on_drop(true),
            self.timeout_secs,
        )
        .await?;

        Ok(text)
    }

    /// Whether the tesseract executable can be run.
    pub async fn health_check(&self) -> bool {
        match Command::new(&self.command).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl TextExtractor for ImageOcrExtractor {
    async fn extract(&self, job: &OcrJob) -> Result<String> {
        let url = job
            .image_url
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("Job has no image_url".to_string()))?;
        let data = self.fetch_image(url).await?;
        self.recognize(&data).await
    }

    fn name(&self) -> &str {
        "image_ocr"
    }
}
