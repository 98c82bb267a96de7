//! # fintrack-jobs
//!
//! Receipt OCR job processing for fintrack.
//!
//! This crate provides:
//! - Single-attempt job processing with bounded retry and dead-lettering
//! - Pluggable text extraction (caller-supplied, remote OCR webhook, local tesseract)
//! - HMAC-signed result delivery and an optional Notion page mirror
//! - A Redis-backed queue runner with lifecycle events
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fintrack_jobs::{OcrProcessor, ProcessorConfig, QueueRunner, RedisStore, RunnerConfig};
//!
//! let store = RedisStore::connect("redis://localhost:6379/0").await?;
//!
//! let processor = OcrProcessor::builder(Arc::new(store))
//!     .with_config(ProcessorConfig::from_env())
//!     .build()?;
//!
//! let handle = QueueRunner::new(processor, RunnerConfig::from_env()).start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod adapters;
pub mod extraction;
pub mod mirror;
pub mod processor;
pub mod runner;
pub mod store;
pub mod webhook;

// Re-export core types
pub use fintrack_core::*;

pub use adapters::{ImageOcrExtractor, RemoteOcrExtractor};
pub use extraction::{ExtractionSource, FnExtractor};
pub use mirror::NotionMirror;
pub use processor::{JobFailure, OcrProcessor, ProcessorBuilder, ProcessorConfig};
pub use runner::{QueueRunner, RunnerConfig, RunnerEvent, RunnerHandle};
pub use store::{MemoryStore, RedisStore, RedisStoreConfig};
pub use webhook::{sign_payload, WebhookNotifier};
