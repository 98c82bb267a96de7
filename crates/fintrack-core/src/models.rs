//! Value types shared by the rule matcher and the OCR pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};

/// Opaque category identifier returned by a matching rule.
pub type CategoryId = i64;

/// Opaque account identifier used to scope rules.
pub type AccountId = i64;

// =============================================================================
// RULES
// =============================================================================

/// Transaction attribute a rule pattern is tested against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleField {
    #[default]
    Merchant,
    Note,
}

/// A user-defined classification rule.
///
/// `pattern` is a case-insensitive literal substring, or a case-insensitive
/// regex search when prefixed with `re:`. Amount bounds are inclusive and
/// compare against the signed transaction amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub pattern: String,
    #[serde(default)]
    pub field: RuleField,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    pub category_id: CategoryId,
    /// Account the rule is meant for. Only the scoped entry points
    /// (`RuleSet::classify_scoped`) filter on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_account_id: Option<AccountId>,
}

fn default_priority() -> i32 {
    crate::defaults::RULE_PRIORITY
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Create an active, unbounded merchant rule with the default priority.
    pub fn new(pattern: impl Into<String>, category_id: CategoryId) -> Self {
        Self {
            id: None,
            pattern: pattern.into(),
            field: RuleField::Merchant,
            min_amount: None,
            max_amount: None,
            priority: default_priority(),
            active: true,
            category_id,
            scope_account_id: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_field(mut self, field: RuleField) -> Self {
        self.field = field;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_amount(mut self, min: f64) -> Self {
        self.min_amount = Some(min);
        self
    }

    pub fn with_max_amount(mut self, max: f64) -> Self {
        self.max_amount = Some(max);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_scope_account(mut self, account_id: AccountId) -> Self {
        self.scope_account_id = Some(account_id);
        self
    }
}

/// The transaction fields a rule can look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub account_id: Option<AccountId>,
}

impl TransactionSnapshot {
    pub fn new(merchant: impl Into<String>, note: impl Into<String>, amount: f64) -> Self {
        Self {
            merchant: Some(merchant.into()),
            note: Some(note.into()),
            amount,
            account_id: None,
        }
    }

    pub fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Value of `field`, with an absent value read as the empty string.
    pub fn field_value(&self, field: RuleField) -> &str {
        let value = match field {
            RuleField::Merchant => self.merchant.as_deref(),
            RuleField::Note => self.note.as_deref(),
        };
        value.unwrap_or_default()
    }
}

// =============================================================================
// OCR JOBS
// =============================================================================

/// Job identifier as the producer sent it: a string or a JSON number.
///
/// Serializes back in the form it arrived in; `Display` gives the form used
/// in retry keys and webhook bodies (`42`, `"r-1"` → `r-1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Text(String),
    Number(Number),
}

impl JobId {
    pub fn is_empty(&self) -> bool {
        matches!(self, JobId::Text(text) if text.is_empty())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Text(text) => f.write_str(text),
            JobId::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        JobId::Text(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        JobId::Text(id.to_string())
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        JobId::Number(id.into())
    }
}

/// A unit of OCR work as placed on the queue by a producer.
///
/// Keys this type does not know about are kept in `extra`, so serializing a
/// job yields the producer's payload back (requeue and dead-letter push the
/// original job, not a normalized one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n8n_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_page_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl OcrJob {
    /// Create a job that delivers to `webhook_url`, signing with `webhook_secret`.
    pub fn new(webhook_url: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            id: None,
            max_retries: None,
            n8n_url: None,
            image_url: None,
            webhook_url: Some(webhook_url.into()),
            webhook_secret: Some(webhook_secret.into()),
            notion_token: None,
            notion_page_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_n8n_url(mut self, url: impl Into<String>) -> Self {
        self.n8n_url = Some(url.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_notion(mut self, token: impl Into<String>, page_id: impl Into<String>) -> Self {
        self.notion_token = Some(token.into());
        self.notion_page_id = Some(page_id.into());
        self
    }

    /// Attempts allowed before the job is dead-lettered.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
            .unwrap_or(crate::defaults::JOB_MAX_RETRIES)
    }

    /// Signing key for the webhook body; absent reads as the empty key.
    pub fn webhook_secret(&self) -> &str {
        self.webhook_secret.as_deref().unwrap_or_default()
    }

    /// Mirror credentials, present only when both token and page id are set.
    pub fn notion_target(&self) -> Option<(&str, &str)> {
        match (self.notion_token.as_deref(), self.notion_page_id.as_deref()) {
            (Some(token), Some(page_id)) if !token.is_empty() && !page_id.is_empty() => {
                Some((token, page_id))
            }
            _ => None,
        }
    }
}

/// Body posted to the result webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    pub id: String,
    pub text: String,
}

/// Key of the retry counter for `job_id`.
pub fn retry_key(job_id: &str) -> String {
    format!("{}{}", crate::defaults::RETRY_KEY_PREFIX, job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_deserialize_defaults() {
        let rule: Rule = serde_json::from_value(json!({
            "pattern": "coffee",
            "category_id": 1
        }))
        .unwrap();

        assert_eq!(rule.field, RuleField::Merchant);
        assert_eq!(rule.priority, 100);
        assert!(rule.active);
        assert!(rule.min_amount.is_none());
        assert!(rule.max_amount.is_none());
        assert!(rule.scope_account_id.is_none());
    }

    #[test]
    fn test_rule_field_lowercase() {
        let rule: Rule = serde_json::from_value(json!({
            "pattern": "re:taxi$",
            "field": "note",
            "category_id": 3,
            "min_amount": 10,
            "max_amount": 30.5
        }))
        .unwrap();

        assert_eq!(rule.field, RuleField::Note);
        assert_eq!(rule.min_amount, Some(10.0));
        assert_eq!(rule.max_amount, Some(30.5));
        assert_eq!(serde_json::to_value(RuleField::Note).unwrap(), json!("note"));
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new("uber", 7)
            .with_id(12)
            .with_field(RuleField::Note)
            .with_priority(5)
            .with_min_amount(1.0)
            .with_max_amount(2.0)
            .with_active(false)
            .with_scope_account(9);

        assert_eq!(rule.id, Some(12));
        assert_eq!(rule.field, RuleField::Note);
        assert_eq!(rule.priority, 5);
        assert_eq!(rule.min_amount, Some(1.0));
        assert_eq!(rule.max_amount, Some(2.0));
        assert!(!rule.active);
        assert_eq!(rule.scope_account_id, Some(9));
    }

    #[test]
    fn test_snapshot_missing_fields_are_empty() {
        let tx: TransactionSnapshot = serde_json::from_value(json!({"amount": 5})).unwrap();
        assert_eq!(tx.field_value(RuleField::Merchant), "");
        assert_eq!(tx.field_value(RuleField::Note), "");
        assert_eq!(tx.amount, 5.0);
    }

    #[test]
    fn test_job_defaults() {
        let job: OcrJob = serde_json::from_value(json!({
            "webhook_url": "http://x",
            "webhook_secret": "s"
        }))
        .unwrap();

        assert!(job.id.is_none());
        assert_eq!(job.max_retries(), 3);
        assert_eq!(job.webhook_secret(), "s");
        assert!(job.notion_target().is_none());
    }

    #[test]
    fn test_job_roundtrip_preserves_unknown_keys() {
        let original = json!({
            "id": "1",
            "max_retries": 2,
            "webhook_url": "http://x",
            "webhook_secret": "s",
            "attachment_id": 44,
            "source": "upload"
        });
        let job: OcrJob = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(job.extra.len(), 2);
        assert_eq!(serde_json::to_value(&job).unwrap(), original);
    }

    #[test]
    fn test_job_numeric_id_keeps_its_form() {
        let original = json!({
            "id": 42,
            "webhook_url": "http://x",
            "webhook_secret": "s"
        });
        let job: OcrJob = serde_json::from_value(original.clone()).unwrap();

        assert_eq!(job.id, Some(JobId::from(42_i64)));
        assert_eq!(job.id.as_ref().unwrap().to_string(), "42");
        assert_eq!(serde_json::to_value(&job).unwrap(), original);
    }

    #[test]
    fn test_job_string_id() {
        let job: OcrJob = serde_json::from_value(json!({"id": "r-1"})).unwrap();
        assert_eq!(job.id, Some(JobId::from("r-1")));
        assert_eq!(job.id.as_ref().unwrap().to_string(), "r-1");
        assert!(!job.id.as_ref().unwrap().is_empty());
        assert!(JobId::from("").is_empty());
    }

    #[test]
    fn test_job_id_rejects_non_scalar() {
        let parsed = serde_json::from_value::<OcrJob>(json!({"id": {"nested": true}}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_notion_target_requires_both_fields() {
        let mut job = OcrJob::new("http://x", "s");
        job.notion_token = Some("token".to_string());
        assert!(job.notion_target().is_none());

        let job = job.with_notion("token", "page");
        assert_eq!(job.notion_target(), Some(("token", "page")));
    }

    #[test]
    fn test_missing_secret_is_empty_key() {
        let mut job = OcrJob::new("http://x", "");
        job.webhook_secret = None;
        assert_eq!(job.webhook_secret(), "");
    }

    #[test]
    fn test_result_serializes_id_then_text() {
        let result = OcrResult {
            id: "1".to_string(),
            text: "hello".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"id":"1","text":"hello"}"#
        );
    }

    #[test]
    fn test_retry_key() {
        assert_eq!(retry_key("abc"), "retries:abc");
    }
}
