//! # fintrack-core
//!
//! Core types, traits, and the rule matcher for fintrack.
//!
//! This crate provides the value types shared across the workspace, the
//! rule-based transaction classifier, and the seam traits (`RetryStore`,
//! `TextExtractor`) the OCR job pipeline is written against. It performs no
//! network I/O of its own.

pub mod defaults;
pub mod error;
pub mod models;
pub mod rules;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use rules::{classify, ClassificationSummary, RulePattern, RuleSet};
pub use traits::*;
