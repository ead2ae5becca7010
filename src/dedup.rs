// 🔍 Near-Duplicate Review - advisory only, never merges
// Three strategies: Same Day, Fuzzy Match, Transfer Pair

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::transaction::Transaction;

// ============================================================================
// MATCH STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Same date and amount, descriptions differ only slightly
    SameDay,

    /// Dates within tolerance, amount within tolerance, shared description word
    FuzzyMatch,

    /// Opposite amounts on both sides of an account transfer
    TransferPair,
}

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Fingerprint of the earlier transaction
    pub first_id: String,

    /// Fingerprint of the later transaction
    pub second_id: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// Which strategy detected this match
    pub strategy: MatchStrategy,

    /// Human-readable reason
    pub reason: String,
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct DeduplicationEngine {
    /// Confidence for same-day matches (default: 0.95)
    pub same_day_confidence: f64,

    /// Floor confidence for fuzzy matches (default: 0.70)
    pub fuzzy_match_threshold: f64,

    /// Confidence for transfer pairs (default: 0.90)
    pub transfer_confidence: f64,

    /// Amount tolerance for fuzzy matching (default: exact)
    pub fuzzy_amount_tolerance: Decimal,

    /// Date tolerance in days (default: 1)
    pub date_tolerance_days: i64,
}

impl DeduplicationEngine {
    /// Create engine with default thresholds
    pub fn new() -> Self {
        DeduplicationEngine {
            same_day_confidence: 0.95,
            fuzzy_match_threshold: 0.70,
            transfer_confidence: 0.90,
            fuzzy_amount_tolerance: Decimal::ZERO,
            date_tolerance_days: 1,
        }
    }

    /// Builder pattern: set date tolerance
    pub fn with_date_tolerance(mut self, days: i64) -> Self {
        self.date_tolerance_days = days.max(0);
        self
    }

    /// Builder pattern: set amount tolerance
    pub fn with_amount_tolerance(mut self, tolerance: Decimal) -> Self {
        self.fuzzy_amount_tolerance = tolerance.abs();
        self
    }

    /// Find candidate pairs among date-ordered transactions.
    ///
    /// Only pairs inside the date window are compared.
    pub fn find_duplicates(&self, transactions: &[&Transaction]) -> Vec<DuplicateMatch> {
        let mut matches = Vec::new();

        for (i, tx1) in transactions.iter().enumerate() {
            for tx2 in &transactions[i + 1..] {
                if (tx2.date - tx1.date).num_days().abs() > self.date_tolerance_days {
                    break;
                }

                if let Some(m) = self
                    .check_same_day(tx1, tx2)
                    .or_else(|| self.check_transfer_pair(tx1, tx2))
                    .or_else(|| self.check_fuzzy_match(tx1, tx2))
                {
                    matches.push(m);
                }
            }
        }

        matches
    }

    /// Strategy 1: Same Day
    /// Same date, same amount, one description contains the other
    fn check_same_day(&self, tx1: &Transaction, tx2: &Transaction) -> Option<DuplicateMatch> {
        if tx1.date != tx2.date || tx1.amount != tx2.amount {
            return None;
        }

        let d1 = tx1.description.to_lowercase();
        let d2 = tx2.description.to_lowercase();
        if !d1.contains(&d2) && !d2.contains(&d1) {
            return None;
        }

        Some(DuplicateMatch {
            first_id: tx1.id.clone(),
            second_id: tx2.id.clone(),
            confidence: self.same_day_confidence,
            strategy: MatchStrategy::SameDay,
            reason: format!(
                "Same day: {} | {} | '{}' ~ '{}'",
                tx1.date, tx1.amount, tx1.description, tx2.description
            ),
        })
    }

    /// Strategy 2: Transfer Pair
    /// Opposite amounts, both sides look like a transfer
    fn check_transfer_pair(&self, tx1: &Transaction, tx2: &Transaction) -> Option<DuplicateMatch> {
        if !is_transfer(tx1) || !is_transfer(tx2) {
            return None;
        }

        if tx1.amount.is_zero() || (tx1.amount + tx2.amount) != Decimal::ZERO {
            return None;
        }

        Some(DuplicateMatch {
            first_id: tx1.id.clone(),
            second_id: tx2.id.clone(),
            confidence: self.transfer_confidence,
            strategy: MatchStrategy::TransferPair,
            reason: format!(
                "Transfer pair: {} {} ↔ {} {}",
                tx1.date, tx1.amount, tx2.date, tx2.amount
            ),
        })
    }

    /// Strategy 3: Fuzzy Match
    /// Dates within tolerance, amounts within tolerance, shared significant word
    fn check_fuzzy_match(&self, tx1: &Transaction, tx2: &Transaction) -> Option<DuplicateMatch> {
        let date_diff = (tx1.date - tx2.date).num_days().abs();
        if date_diff > self.date_tolerance_days {
            return None;
        }

        let amount_diff = (tx1.amount - tx2.amount).abs();
        if amount_diff > self.fuzzy_amount_tolerance {
            return None;
        }

        let d1 = tx1.description.to_lowercase();
        let d2 = tx2.description.to_lowercase();

        let words1 = significant_words(&d1);
        let words2 = significant_words(&d2);
        let has_common_word = words1.iter().any(|w1| words2.iter().any(|w2| w1 == w2));

        if !has_common_word {
            return None;
        }

        // Closer dates and identical descriptions score higher
        let date_score = 1.0 - (date_diff as f64 / (self.date_tolerance_days as f64 + 1.0));
        let description_score = if d1 == d2 { 1.0 } else { 0.85 };

        let confidence = (date_score * 0.5 + description_score * 0.5).max(self.fuzzy_match_threshold);

        Some(DuplicateMatch {
            first_id: tx1.id.clone(),
            second_id: tx2.id.clone(),
            confidence,
            strategy: MatchStrategy::FuzzyMatch,
            reason: format!(
                "Fuzzy match: {} vs {} | {} | '{}' ~ '{}'",
                tx1.date, tx2.date, tx1.amount, tx1.description, tx2.description
            ),
        })
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Words of 4+ characters that are not pure numbers
fn significant_words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4 && !w.chars().all(|c| c.is_numeric()))
        .collect()
}

fn is_transfer(tx: &Transaction) -> bool {
    tx.category.as_deref() == Some("Transfer") || tx.description.to_lowercase().contains("transfer")
}

/// Report likely duplicates the fingerprint kept apart (dates within
/// `tolerance_days`, equal amounts, shared description word).
pub fn find_near_duplicates(ledger: &Ledger, tolerance_days: i64) -> Vec<DuplicateMatch> {
    let transactions: Vec<&Transaction> = ledger.iter().collect();
    DeduplicationEngine::new()
        .with_date_tolerance(tolerance_days)
        .find_duplicates(&transactions)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_test_transaction(day: u32, cents: i64, description: &str) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let amount = Decimal::new(cents, 2);
        Transaction {
            id: Transaction::fingerprint(date, amount, description),
            date,
            amount,
            currency: "USD".to_string(),
            description: description.to_string(),
            raw_description: description.to_string(),
            source_statement_id: "test".to_string(),
            category: None,
        }
    }

    #[test]
    fn test_same_day_match() {
        let ledger = Ledger::from_transactions(vec![
            create_test_transaction(5, -2399, "AMAZON"),
            create_test_transaction(5, -2399, "AMAZON MARKETPLACE"),
        ]);

        let matches = find_near_duplicates(&ledger, 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::SameDay);
        assert_eq!(matches[0].confidence, 0.95);
    }

    #[test]
    fn test_fuzzy_match_across_days() {
        let ledger = Ledger::from_transactions(vec![
            create_test_transaction(5, -4500, "SHELL OIL 1234"),
            create_test_transaction(6, -4500, "SHELL OIL STATION"),
        ]);

        let matches = find_near_duplicates(&ledger, 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::FuzzyMatch);
        assert!(matches[0].confidence >= 0.70);
    }

    #[test]
    fn test_transfer_pair() {
        let ledger = Ledger::from_transactions(vec![
            create_test_transaction(5, -50000, "TRANSFER TO SAVINGS"),
            create_test_transaction(5, 50000, "TRANSFER FROM CHECKING"),
        ]);

        let matches = find_near_duplicates(&ledger, 0);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::TransferPair);
    }

    #[test]
    fn test_outside_window_or_different_amount() {
        let ledger = Ledger::from_transactions(vec![
            create_test_transaction(1, -4500, "SHELL OIL"),
            create_test_transaction(9, -4500, "SHELL OIL"),
            create_test_transaction(9, -1000, "SHELL OIL STATION"),
        ]);

        assert!(find_near_duplicates(&ledger, 1).is_empty());
    }

    #[test]
    fn test_amount_tolerance() {
        let a = create_test_transaction(5, -4500, "SHELL OIL");
        let b = create_test_transaction(5, -4520, "SHELL OIL");

        let strict = DeduplicationEngine::new();
        assert!(strict.find_duplicates(&[&a, &b]).is_empty());

        let loose = DeduplicationEngine::new().with_amount_tolerance(Decimal::new(50, 2));
        assert_eq!(loose.find_duplicates(&[&a, &b]).len(), 1);
    }
}
