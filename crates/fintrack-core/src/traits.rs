//! Core traits for fintrack abstractions.
//!
//! These traits define the seams the OCR pipeline is built on, so the broker
//! and the OCR engine can be swapped (Redis or in-memory, remote or local).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::OcrJob;

// =============================================================================
// RETRY STORE
// =============================================================================

/// Key-value + list broker holding retry counters and job queues.
///
/// Each method must be atomic on its own. No multi-command transaction is
/// assumed; the processor relies on at-least-once redelivery instead.
#[async_trait]
pub trait RetryStore: Send + Sync {
    /// Read a value, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Append to the tail of a list.
    async fn rpush(&self, queue: &str, value: &str) -> Result<()>;

    /// Prepend to the head of a list.
    async fn lpush(&self, queue: &str, value: &str) -> Result<()>;

    /// Pop from the head of a list, waiting up to `timeout` for an item.
    ///
    /// Returns `None` when the timeout elapses with the list still empty.
    async fn blpop(&self, queue: &str, timeout: Duration) -> Result<Option<String>>;
}

// =============================================================================
// TEXT EXTRACTION
// =============================================================================

/// Produces OCR text for a job.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the text for `job`.
    async fn extract(&self, job: &OcrJob) -> Result<String>;

    /// Human-readable name of this extractor, used in logs.
    fn name(&self) -> &str;
}
