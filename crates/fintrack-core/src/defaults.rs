//! Centralized default constants for fintrack.
//!
//! **This module is the single source of truth** for shared default values.
//! Both crates and the worker binary reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// RULES
// =============================================================================

/// Priority given to a rule that does not specify one. Lower runs first.
pub const RULE_PRIORITY: i32 = 100;

/// Marker that switches a rule pattern from literal substring to regex search.
pub const REGEX_PATTERN_PREFIX: &str = "re:";

// =============================================================================
// JOBS
// =============================================================================

/// Attempts allowed for a job that does not carry `max_retries`.
pub const JOB_MAX_RETRIES: u32 = 3;

/// Main OCR queue name.
pub const OCR_QUEUE: &str = "ocr";

/// Dead-letter queue for jobs that exhausted their retries.
pub const OCR_DEAD_LETTER_QUEUE: &str = "ocr_dead";

/// Prefix of the per-job retry counter key (`retries:<job_id>`).
pub const RETRY_KEY_PREFIX: &str = "retries:";

/// Seconds a runner blocks on an empty queue before re-checking shutdown.
pub const RUNNER_POP_TIMEOUT_SECS: u64 = 5;

/// Back-off after a broker error in the runner loop (milliseconds).
pub const RUNNER_ERROR_BACKOFF_MS: u64 = 1_000;

/// Capacity of the runner event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// NETWORK
// =============================================================================

/// Per-request timeout for every outbound HTTP call (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Header carrying the hex HMAC-SHA256 of the webhook body.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Default broker URL.
pub const REDIS_URL: &str = "redis://localhost:6379/0";

/// How long a broker command may go unanswered before it fails (seconds).
pub const REDIS_RESPONSE_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// OCR
// =============================================================================

/// Tesseract language pack.
pub const OCR_LANGUAGE: &str = "eng";

/// Tesseract executable.
pub const TESSERACT_CMD: &str = "tesseract";

/// Timeout for a single tesseract invocation (seconds).
pub const OCR_CMD_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// PAGE MIRROR
// =============================================================================

/// Base URL of the page-creation API.
pub const NOTION_API_URL: &str = "https://api.notion.com";

/// API version pinned in the `Notion-Version` header.
pub const NOTION_VERSION: &str = "2022-06-28";
