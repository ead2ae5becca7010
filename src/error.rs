// Error taxonomy for statement imports
// Statement-level errors abort one statement; record-level errors become SkippedRecords

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::tokenizer::LineRange;

// ============================================================================
// SKIP REASONS
// ============================================================================

/// Machine-readable reason code attached to every skipped record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The record did not match the selected layout's field pattern
    PatternMismatch,
    /// A CSV row lacks a column the mapping requires
    MissingColumn,
    /// Description field is empty
    MissingDescription,
    /// Debit/credit layout without a DR/CR marker
    MissingSignMarker,
    /// Date could not be converted to a calendar date
    InvalidDate,
    /// Year-less date and no statement period/year to resolve it
    MissingYear,
    /// Amount text is not numeric
    InvalidAmount,
    /// Amount text is empty
    EmptyAmount,
    /// Both the debit and the credit column carry a value
    AmbiguousSign,
    /// Currency text is not an ISO-4217 code
    UnsupportedCurrency,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::PatternMismatch => "pattern_mismatch",
            SkipReason::MissingColumn => "missing_column",
            SkipReason::MissingDescription => "missing_description",
            SkipReason::MissingSignMarker => "missing_sign_marker",
            SkipReason::InvalidDate => "invalid_date",
            SkipReason::MissingYear => "missing_year",
            SkipReason::InvalidAmount => "invalid_amount",
            SkipReason::EmptyAmount => "empty_amount",
            SkipReason::AmbiguousSign => "ambiguous_sign",
            SkipReason::UnsupportedCurrency => "unsupported_currency",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// RECORD-LEVEL ERRORS
// ============================================================================

/// One record's fields could not be pulled out under the selected layout.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("field extraction failed ({reason}): {detail}")]
pub struct FieldExtractionError {
    pub reason: SkipReason,
    pub detail: String,
}

impl FieldExtractionError {
    pub fn new(reason: SkipReason, detail: impl Into<String>) -> Self {
        FieldExtractionError {
            reason,
            detail: detail.into(),
        }
    }
}

/// Extracted fields could not be converted to canonical form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("unparseable date '{0}'")]
    InvalidDate(String),

    #[error("date '{0}' has no year and the statement supplies none")]
    MissingYear(String),

    #[error("non-numeric amount '{0}'")]
    InvalidAmount(String),

    #[error("amount '{0}' is outside the supported range")]
    AmountOutOfRange(String),

    #[error("empty amount")]
    EmptyAmount,

    #[error("amount present in both debit and credit columns")]
    AmbiguousSign,

    #[error("unsupported currency '{0}'")]
    UnsupportedCurrency(String),
}

impl NormalizationError {
    pub fn reason(&self) -> SkipReason {
        match self {
            NormalizationError::InvalidDate(_) => SkipReason::InvalidDate,
            NormalizationError::MissingYear(_) => SkipReason::MissingYear,
            NormalizationError::InvalidAmount(_) | NormalizationError::AmountOutOfRange(_) => SkipReason::InvalidAmount,
            NormalizationError::EmptyAmount => SkipReason::EmptyAmount,
            NormalizationError::AmbiguousSign => SkipReason::AmbiguousSign,
            NormalizationError::UnsupportedCurrency(_) => SkipReason::UnsupportedCurrency,
        }
    }
}

/// Diagnostic for a record that was skipped during an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub line_range: LineRange,
    pub reason: SkipReason,
    pub detail: String,
}

impl SkippedRecord {
    pub fn from_extraction(line_range: LineRange, err: &FieldExtractionError) -> Self {
        SkippedRecord {
            line_range,
            reason: err.reason,
            detail: err.detail.clone(),
        }
    }

    pub fn from_normalization(line_range: LineRange, err: &NormalizationError) -> Self {
        SkippedRecord {
            line_range,
            reason: err.reason(),
            detail: err.to_string(),
        }
    }
}

// ============================================================================
// STATEMENT-LEVEL ERRORS
// ============================================================================

/// Errors that abort a whole statement. Nothing from that statement reaches the ledger.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(
        "unrecognized statement format (best layout: {}, score {best_score:.2}, threshold {threshold:.2})",
        .best_layout.as_deref().unwrap_or("none")
    )]
    UnrecognizedFormat {
        best_layout: Option<String>,
        best_score: f64,
        threshold: f64,
    },

    #[error("failed to read CSV statement: {0}")]
    Csv(#[from] csv::Error),

    #[error("import of statement '{0}' cancelled")]
    Cancelled(String),
}

impl ImportError {
    pub fn unrecognized(best_layout: Option<String>, best_score: f64, threshold: f64) -> Self {
        ImportError::UnrecognizedFormat {
            best_layout,
            best_score,
            threshold,
        }
    }

    pub fn is_unrecognized_format(&self) -> bool {
        matches!(self, ImportError::UnrecognizedFormat { .. })
    }
}
