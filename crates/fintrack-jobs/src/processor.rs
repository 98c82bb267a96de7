//! One attempt at an OCR job: extract, deliver, mirror, then settle the
//! retry bookkeeping.
//!
//! Retry state lives outside the job, in a counter at `retries:<job_id>`:
//!
//! | Outcome | Counter | Queue effect |
//! |---------|---------|--------------|
//! | success | deleted | none |
//! | failure, `attempt + 1 < max_retries` | set to `attempt + 1` | original job appended to main queue |
//! | failure, `attempt + 1 >= max_retries` | deleted | original job prepended to dead-letter queue |
//!
//! Every failure from extraction, delivery or mirroring takes the same path,
//! and the bookkeeping is written before the failure is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fintrack_core::defaults::{
    HTTP_TIMEOUT_SECS, NOTION_API_URL, OCR_CMD_TIMEOUT_SECS, OCR_DEAD_LETTER_QUEUE, OCR_LANGUAGE,
    OCR_QUEUE, TESSERACT_CMD,
};
use fintrack_core::{retry_key, Error, OcrJob, OcrResult, Result, RetryStore, TextExtractor};

use crate::adapters::{ImageOcrExtractor, RemoteOcrExtractor};
use crate::extraction::ExtractionSource;
use crate::mirror::NotionMirror;
use crate::webhook::WebhookNotifier;

// =============================================================================
// CONFIG
// =============================================================================

/// Configuration for the OCR processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Main queue failed jobs are re-appended to.
    pub queue: String,
    /// Queue exhausted jobs are pushed to.
    pub dead_letter_queue: String,
    /// Timeout applied to every outbound HTTP call.
    pub http_timeout_secs: u64,
    /// Base URL of the page-creation API.
    pub notion_api_url: String,
    /// Tesseract language for local OCR.
    pub ocr_language: String,
    /// Tesseract executable for local OCR.
    pub tesseract_cmd: String,
    /// Timeout for one tesseract run.
    pub ocr_timeout_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            queue: OCR_QUEUE.to_string(),
            dead_letter_queue: OCR_DEAD_LETTER_QUEUE.to_string(),
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            notion_api_url: NOTION_API_URL.to_string(),
            ocr_language: OCR_LANGUAGE.to_string(),
            tesseract_cmd: TESSERACT_CMD.to_string(),
            ocr_timeout_secs: OCR_CMD_TIMEOUT_SECS,
        }
    }
}

impl ProcessorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OCR_QUEUE` | `ocr` | Main job queue |
    /// | `OCR_DEAD_LETTER_QUEUE` | `ocr_dead` | Dead-letter queue |
    /// | `OCR_HTTP_TIMEOUT_SECS` | `30` | Per-request HTTP timeout |
    /// | `NOTION_API_URL` | `https://api.notion.com` | Page mirror base URL |
    /// | `OCR_LANGUAGE` | `eng` | Tesseract language |
    /// | `TESSERACT_CMD` | `tesseract` | Tesseract executable |
    /// | `OCR_CMD_TIMEOUT_SECS` | `60` | Tesseract run timeout |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let queue = std::env::var("OCR_QUEUE").unwrap_or(defaults.queue);
        let dead_letter_queue =
            std::env::var("OCR_DEAD_LETTER_QUEUE").unwrap_or(defaults.dead_letter_queue);

        let http_timeout_secs = std::env::var("OCR_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.http_timeout_secs)
            .max(1);

        let notion_api_url = std::env::var("NOTION_API_URL").unwrap_or(defaults.notion_api_url);
        let ocr_language = std::env::var("OCR_LANGUAGE").unwrap_or(defaults.ocr_language);
        let tesseract_cmd = std::env::var("TESSERACT_CMD").unwrap_or(defaults.tesseract_cmd);

        let ocr_timeout_secs = std::env::var("OCR_CMD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.ocr_timeout_secs)
            .max(1);

        Self {
            queue,
            dead_letter_queue,
            http_timeout_secs,
            notion_api_url,
            ocr_language,
            tesseract_cmd,
            ocr_timeout_secs,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_dead_letter_queue(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter_queue = queue.into();
        self
    }

    pub fn with_http_timeout(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    pub fn with_notion_api_url(mut self, url: impl Into<String>) -> Self {
        self.notion_api_url = url.into();
        self
    }

    pub fn with_ocr_language(mut self, language: impl Into<String>) -> Self {
        self.ocr_language = language.into();
        self
    }

    pub fn with_tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.tesseract_cmd = cmd.into();
        self
    }
}

// =============================================================================
// FAILURE
// =============================================================================

/// A failed attempt, carrying the error that triggered it and what was
/// recorded for the job afterwards.
#[derive(Debug, Error)]
pub enum JobFailure {
    /// Counter incremented and job re-appended to the main queue.
    #[error("job {job_id} failed on attempt {attempt}, requeued: {source}")]
    Requeued {
        job_id: String,
        attempt: u32,
        source: Error,
    },

    /// Retries exhausted; job pushed to the dead-letter queue, counter cleared.
    #[error("job {job_id} dead-lettered after {attempts} attempts: {source}")]
    DeadLettered {
        job_id: String,
        attempts: u32,
        source: Error,
    },

    /// The attempt failed and the retry bookkeeping could not be written.
    #[error("job {job_id} failed ({source}) and its retry state was not recorded: {store_error}")]
    Unrecorded {
        job_id: String,
        source: Error,
        store_error: Error,
    },

    /// The retry counter could not be read or cleared.
    #[error("retry store unavailable for job {job_id}: {source}")]
    Store { job_id: String, source: Error },
}

impl JobFailure {
    /// The error that made the attempt fail.
    pub fn cause(&self) -> &Error {
        match self {
            JobFailure::Requeued { source, .. }
            | JobFailure::DeadLettered { source, .. }
            | JobFailure::Unrecorded { source, .. }
            | JobFailure::Store { source, .. } => source,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobFailure::Requeued { job_id, .. }
            | JobFailure::DeadLettered { job_id, .. }
            | JobFailure::Unrecorded { job_id, .. }
            | JobFailure::Store { job_id, .. } => job_id,
        }
    }

    pub fn is_dead_lettered(&self) -> bool {
        matches!(self, JobFailure::DeadLettered { .. })
    }
}

// =============================================================================
// PROCESSOR
// =============================================================================

/// Processes one dequeued OCR job per call.
pub struct OcrProcessor {
    store: Arc<dyn RetryStore>,
    config: ProcessorConfig,
    extractor: Option<Arc<dyn TextExtractor>>,
    remote: RemoteOcrExtractor,
    image: ImageOcrExtractor,
    webhook: WebhookNotifier,
    mirror: NotionMirror,
}

impl OcrProcessor {
    pub fn builder(store: Arc<dyn RetryStore>) -> ProcessorBuilder {
        ProcessorBuilder::new(store)
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RetryStore> {
        &self.store
    }

    /// Run one attempt of `job`, returning the id it ran under.
    ///
    /// The id is the job's own (numbers in their decimal form) or a generated
    /// UUID when the job has none. On failure the retry counter and the
    /// requeue / dead-letter push are already persisted when the error is
    /// returned.
    pub async fn process_one(&self, job: &OcrJob) -> std::result::Result<String, JobFailure> {
        let start = Instant::now();
        let job_id = match job.id.as_ref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                warn!(
                    job_id = %id,
                    "Job has no id, generated one; retries of this payload will not share a counter"
                );
                id
            }
        };
        let max_retries = job.max_retries();
        let key = retry_key(&job_id);

        let attempt = match self.store.get(&key).await {
            Ok(raw) => parse_attempt(&job_id, raw.as_deref()),
            Err(source) => return Err(JobFailure::Store { job_id, source }),
        };

        debug!(%job_id, attempt, max_retries, "Processing OCR job");

        match self.run_pipeline(&job_id, job).await {
            Ok(()) => {
                if let Err(source) = self.store.delete(&key).await {
                    error!(%job_id, error = %source, "Job delivered but retry counter not cleared");
                    return Err(JobFailure::Store { job_id, source });
                }
                info!(
                    %job_id,
                    attempt,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "OCR job completed"
                );
                Ok(job_id)
            }
            Err(error) => Err(self
                .record_failure(job, job_id, &key, attempt, max_retries, error)
                .await),
        }
    }

    async fn run_pipeline(&self, job_id: &str, job: &OcrJob) -> Result<()> {
        let source = ExtractionSource::resolve(job, self.extractor.as_deref())?;
        debug!(job_id, extractor = source.name(), "Extracting text");

        let text = match source {
            ExtractionSource::Supplied(extractor) => extractor.extract(job).await?,
            ExtractionSource::Remote { url } => self.remote.fetch_text(url, job).await?,
            ExtractionSource::LocalImage { url } => {
                let data = self.image.fetch_image(url).await?;
                self.image.recognize(&data).await?
            }
        };

        let webhook_url = job
            .webhook_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::InvalidInput("Job has no webhook_url".to_string()))?;

        let result = OcrResult {
            id: job_id.to_string(),
            text,
        };
        self.webhook
            .deliver(webhook_url, job.webhook_secret(), &result)
            .await?;

        if let Some((token, page_id)) = job.notion_target() {
            self.mirror.mirror(token, page_id, &result.text).await?;
        }

        Ok(())
    }

    async fn record_failure(
        &self,
        job: &OcrJob,
        job_id: String,
        key: &str,
        attempt: u32,
        max_retries: u32,
        error: Error,
    ) -> JobFailure {
        let attempt = attempt.saturating_add(1);

        let payload = match serde_json::to_string(job) {
            Ok(payload) => payload,
            Err(e) => {
                return JobFailure::Unrecorded {
                    job_id,
                    source: error,
                    store_error: e.into(),
                }
            }
        };

        if attempt >= max_retries {
            let recorded = match self
                .store
                .lpush(&self.config.dead_letter_queue, &payload)
                .await
            {
                Ok(()) => self.store.delete(key).await,
                Err(e) => Err(e),
            };

            match recorded {
                Ok(()) => {
                    error!(
                        %job_id,
                        attempts = attempt,
                        max_retries,
                        queue = %self.config.dead_letter_queue,
                        error = %error,
                        "OCR job dead-lettered"
                    );
                    JobFailure::DeadLettered {
                        job_id,
                        attempts: attempt,
                        source: error,
                    }
                }
                Err(store_error) => {
                    error!(%job_id, error = %error, store_error = %store_error, "Failed to dead-letter OCR job");
                    JobFailure::Unrecorded {
                        job_id,
                        source: error,
                        store_error,
                    }
                }
            }
        } else {
            let recorded = match self.store.set(key, &attempt.to_string()).await {
                Ok(()) => self.store.rpush(&self.config.queue, &payload).await,
                Err(e) => Err(e),
            };

            match recorded {
                Ok(()) => {
                    warn!(
                        %job_id,
                        attempt,
                        max_retries,
                        queue = %self.config.queue,
                        error = %error,
                        "OCR job failed, requeued"
                    );
                    JobFailure::Requeued {
                        job_id,
                        attempt,
                        source: error,
                    }
                }
                Err(store_error) => {
                    error!(%job_id, error = %error, store_error = %store_error, "Failed to requeue OCR job");
                    JobFailure::Unrecorded {
                        job_id,
                        source: error,
                        store_error,
                    }
                }
            }
        }
    }
}

/// Attempts already made, from the stored counter. Garbage reads as 0.
fn parse_attempt(job_id: &str, raw: Option<&str>) -> u32 {
    match raw {
        None => 0,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(job_id, value, "Retry counter is not an integer, treating as 0");
            0
        }),
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for an [`OcrProcessor`].
pub struct ProcessorBuilder {
    store: Arc<dyn RetryStore>,
    config: ProcessorConfig,
    extractor: Option<Arc<dyn TextExtractor>>,
    client: Option<Client>,
}

impl ProcessorBuilder {
    pub fn new(store: Arc<dyn RetryStore>) -> Self {
        Self {
            store,
            config: ProcessorConfig::default(),
            extractor: None,
            client: None,
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `extractor` for every job, ahead of `n8n_url` / `image_url`.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Use a pre-built HTTP client instead of one built from the config timeout.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<OcrProcessor> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(Duration::from_secs(self.config.http_timeout_secs))
                .build()
                .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?,
        };

        let image = ImageOcrExtractor::new(client.clone())
            .with_command(self.config.tesseract_cmd.clone())
            .with_language(self.config.ocr_language.clone())
            .with_timeout_secs(self.config.ocr_timeout_secs);

        Ok(OcrProcessor {
            store: self.store,
            remote: RemoteOcrExtractor::new(client.clone()),
            image,
            webhook: WebhookNotifier::new(client.clone()),
            mirror: NotionMirror::with_base_url(client, self.config.notion_api_url.clone()),
            config: self.config,
            extractor: self.extractor,
        })
    }
}
