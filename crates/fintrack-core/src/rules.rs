//! Rule-based transaction classification.
//!
//! Rules are evaluated in ascending `priority` order (stable, so equal
//! priorities keep their input order) and the first rule whose pattern and
//! amount bounds both pass decides the category. Inactive rules are dropped
//! before ordering.
//!
//! `re:` patterns use the `regex` crate syntax, which has no look-around and
//! no backreferences. Such patterns compile to [`RulePattern::Invalid`] and
//! never match; [`ClassificationSummary::invalid_rules`] counts them.
//!
//! Account scoping is opt-in: [`classify`] and [`RuleSet::classify`] ignore
//! `scope_account_id`, [`RuleSet::classify_scoped`] honors it.
//!
//! # Example
//!
//! ```
//! use fintrack_core::{classify, Rule, TransactionSnapshot};
//!
//! let rules = vec![
//!     Rule::new("coffee", 1).with_priority(50),
//!     Rule::new("coffee", 2).with_priority(10).with_active(false),
//! ];
//! let tx = TransactionSnapshot::new("Coffee Shop", "", 5.0);
//!
//! assert_eq!(classify(&rules, &tx), Some(1));
//! ```

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::defaults::REGEX_PATTERN_PREFIX;
use crate::models::{CategoryId, Rule, RuleField, TransactionSnapshot};

/// Classify a transaction against `rules`, first match wins.
///
/// Pure: identical inputs always give the identical answer.
pub fn classify(rules: &[Rule], tx: &TransactionSnapshot) -> Option<CategoryId> {
    RuleSet::new(rules).classify(tx)
}

// =============================================================================
// PATTERNS
// =============================================================================

/// A rule pattern compiled for matching.
#[derive(Debug, Clone)]
pub enum RulePattern {
    /// Lowercased needle for case-insensitive containment.
    Literal(String),
    /// Case-insensitive, unanchored search.
    Regex(Regex),
    /// Malformed regex. Never matches.
    Invalid(String),
}

impl RulePattern {
    pub fn compile(pattern: &str) -> Self {
        match pattern.strip_prefix(REGEX_PATTERN_PREFIX) {
            Some(expr) => match RegexBuilder::new(expr).case_insensitive(true).build() {
                Ok(regex) => RulePattern::Regex(regex),
                Err(e) => RulePattern::Invalid(e.to_string()),
            },
            None => RulePattern::Literal(pattern.to_lowercase()),
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            RulePattern::Literal(needle) => value.to_lowercase().contains(needle.as_str()),
            RulePattern::Regex(regex) => regex.is_match(value),
            RulePattern::Invalid(_) => false,
        }
    }
}

impl Rule {
    /// Why this rule's regex pattern cannot be compiled, if it cannot.
    pub fn pattern_error(&self) -> Option<String> {
        match RulePattern::compile(&self.pattern) {
            RulePattern::Invalid(reason) => Some(reason),
            _ => None,
        }
    }

    fn amount_in_bounds(&self, amount: f64) -> bool {
        if self.min_amount.is_some_and(|min| amount < min) {
            return false;
        }
        if self.max_amount.is_some_and(|max| amount > max) {
            return false;
        }
        true
    }

    fn in_scope(&self, tx: &TransactionSnapshot) -> bool {
        match self.scope_account_id {
            Some(account) => tx.account_id == Some(account),
            None => true,
        }
    }
}

// =============================================================================
// RULE SET
// =============================================================================

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: Rule,
    pattern: RulePattern,
}

impl CompiledRule {
    fn matches(&self, tx: &TransactionSnapshot) -> bool {
        self.pattern.is_match(tx.field_value(self.rule.field))
            && self.rule.amount_in_bounds(tx.amount)
    }

    fn is_invalid(&self) -> bool {
        matches!(self.pattern, RulePattern::Invalid(_))
    }
}

/// Active rules, compiled once and held in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new(rules: &[Rule]) -> Self {
        let mut active: Vec<&Rule> = rules.iter().filter(|r| r.active).collect();
        // sort_by_key is stable: equal priorities keep input order
        active.sort_by_key(|r| r.priority);

        let rules = active
            .into_iter()
            .map(|rule| {
                let pattern = RulePattern::compile(&rule.pattern);
                if let RulePattern::Invalid(reason) = &pattern {
                    warn!(
                        rule_id = ?rule.id,
                        pattern = %rule.pattern,
                        %reason,
                        "Rule pattern is not a valid regex, rule will never match"
                    );
                }
                CompiledRule {
                    rule: rule.clone(),
                    pattern,
                }
            })
            .collect();

        Self { rules }
    }

    /// Number of rules that take part in evaluation.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Active rules whose pattern failed to compile.
    pub fn invalid_rules(&self) -> usize {
        self.rules.iter().filter(|compiled| compiled.is_invalid()).count()
    }

    /// The first matching rule, in evaluation order.
    pub fn first_match(&self, tx: &TransactionSnapshot) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|compiled| compiled.matches(tx))
            .map(|compiled| &compiled.rule)
    }

    pub fn classify(&self, tx: &TransactionSnapshot) -> Option<CategoryId> {
        self.first_match(tx).map(|rule| rule.category_id)
    }

    /// Like [`first_match`](Self::first_match), but a rule with a
    /// `scope_account_id` only applies to transactions on that account.
    pub fn first_scoped_match(&self, tx: &TransactionSnapshot) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|compiled| compiled.rule.in_scope(tx) && compiled.matches(tx))
            .map(|compiled| &compiled.rule)
    }

    pub fn classify_scoped(&self, tx: &TransactionSnapshot) -> Option<CategoryId> {
        self.first_scoped_match(tx).map(|rule| rule.category_id)
    }

    /// Keep `existing` when the transaction is already categorized,
    /// otherwise classify it.
    pub fn assign_category(
        &self,
        existing: Option<CategoryId>,
        tx: &TransactionSnapshot,
    ) -> Option<CategoryId> {
        existing.or_else(|| self.classify(tx))
    }

    /// Classify every transaction, reporting which ones matched.
    pub fn classify_batch(&self, txs: &[TransactionSnapshot]) -> ClassificationSummary {
        let assignments: Vec<Option<CategoryId>> = txs.iter().map(|tx| self.classify(tx)).collect();
        let categorized = assignments.iter().filter(|a| a.is_some()).count();
        let invalid_rules = self.invalid_rules();

        debug!(
            processed = txs.len(),
            categorized,
            invalid_rules,
            rule_count = self.rules.len(),
            "Classified transaction batch"
        );

        ClassificationSummary {
            processed: txs.len(),
            categorized,
            invalid_rules,
            assignments,
        }
    }
}

/// Outcome of [`RuleSet::classify_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    /// Transactions looked at.
    pub processed: usize,
    /// Transactions that matched a rule.
    pub categorized: usize,
    /// Active rules skipped because their pattern does not compile.
    pub invalid_rules: usize,
    /// Category per input transaction, in input order.
    pub assignments: Vec<Option<CategoryId>>,
}

impl RuleField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleField::Merchant => "merchant",
            RuleField::Note => "note",
        }
    }
}
