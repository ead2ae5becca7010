// Canonical transaction entity
// Identity is a content fingerprint, not a generated id

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::rules::UNCATEGORIZED;

/// Transaction after normalization.
///
/// `amount` is fixed-point and signed: debits are negative, credits positive,
/// whatever the source layout's sign convention was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content fingerprint (SHA-256 hex)
    pub id: String,

    pub date: NaiveDate,

    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    /// ISO-4217 code
    pub currency: String,

    /// Cleaned description (whitespace collapsed, reference noise stripped)
    pub description: String,

    /// Description exactly as extracted
    pub raw_description: String,

    /// Statement this copy was imported from (not part of the fingerprint)
    pub source_statement_id: String,

    /// Assigned by the categorizer; `None` until then
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Transaction {
    /// Fingerprint over date, amount and cleaned description.
    ///
    /// The statement id is excluded so re-imports of the same
    /// statement (or overlapping statements) collapse onto one entry.
    pub fn fingerprint(date: NaiveDate, amount: Decimal, description: &str) -> String {
        let key = description
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            date.format("%Y-%m-%d"),
            amount.normalize(),
            key
        ));
        format!("{:x}", hasher.finalize())
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    pub fn is_credit(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Category, or the explicit `Uncategorized` bucket
    pub fn category_name(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED)
    }

    /// Builder pattern: set category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}
