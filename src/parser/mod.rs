// 🏗️ Parser Registry
// Closed set of statement layouts, each owning its own field extraction

pub mod custom;
pub mod delimited;
pub mod detect;
pub mod text;

use serde::{Deserialize, Serialize};

use crate::error::{FieldExtractionError, SkipReason};
use crate::tokenizer::{CandidateRecord, LineRange};

pub use custom::{CustomLayout, CustomLayoutDef, SignConvention};
pub use delimited::{CsvColumnMapping, CsvColumns};
pub use detect::{detect, Detector, LayoutScore};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Amount text as found in the record, tagged with its sign convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountText {
    /// One signed column: minus or parentheses mean debit
    Signed(String),
    /// Unsigned charges are debits, `-` marks payments and credits
    DebitPositive(String),
    /// Separate debit and credit values; at most one should be present
    Columns {
        debit: Option<String>,
        credit: Option<String>,
    },
}

/// ParsedFields - Output of layout.parse()
/// Still strings; the normalizer turns them into a Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub date: String,
    pub posting_date: Option<String>,
    pub description: String,
    pub amount: AmountText,
    pub currency: Option<String>,
    pub balance: Option<String>,

    /// chrono formats tried before the generic date parser
    pub date_formats: Vec<String>,

    pub line_range: LineRange,
}

impl ParsedFields {
    pub fn new(date: impl Into<String>, description: impl Into<String>, amount: AmountText, line_range: LineRange) -> Self {
        ParsedFields {
            date: date.into().trim().to_string(),
            posting_date: None,
            description: description.into().trim().to_string(),
            amount,
            currency: None,
            balance: None,
            date_formats: Vec::new(),
            line_range,
        }
    }

    /// Builder pattern: add posting date
    pub fn with_posting_date(mut self, posting_date: impl Into<String>) -> Self {
        self.posting_date = Some(posting_date.into());
        self
    }

    /// Builder pattern: add running balance
    pub fn with_balance(mut self, balance: impl Into<String>) -> Self {
        self.balance = Some(balance.into());
        self
    }

    /// Builder pattern: add currency code
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Builder pattern: add explicit date formats
    pub fn with_date_formats(mut self, formats: &[String]) -> Self {
        self.date_formats = formats.to_vec();
        self
    }

    /// Append wrapped continuation text to the description
    fn with_continuation(mut self, continuation: &str) -> Self {
        if !continuation.is_empty() {
            self.description = format!("{} {}", self.description, continuation);
        }
        self
    }
}

// ============================================================================
// LAYOUTS
// ============================================================================

/// StatementLayout - one variant per known statement format.
///
/// Adding a format means adding a variant plus its extraction function; the
/// detector scores every variant the same way.
#[derive(Debug, Clone)]
pub enum StatementLayout {
    /// `DATE DESCRIPTION AMOUNT`, one signed amount column
    SignedAmount,
    /// `DATE DESCRIPTION AMOUNT DR|CR [BALANCE]`
    DebitCredit,
    /// `Mon DD  Mon DD  DESCRIPTION  [-]$AMOUNT` (card activity, charges positive)
    CardActivity,
    /// `MM/DD  DESCRIPTION  AMOUNT  [BALANCE]` (checking detail, year-less)
    CheckingDetail,
    /// Delimited rows with resolved column positions
    Csv(CsvColumns),
    /// User-supplied regex layout
    Custom(CustomLayout),
}

impl StatementLayout {
    /// Short code for diagnostics and reports
    pub fn name(&self) -> &str {
        match self {
            StatementLayout::SignedAmount => "signed_amount",
            StatementLayout::DebitCredit => "debit_credit",
            StatementLayout::CardActivity => "card_activity",
            StatementLayout::CheckingDetail => "checking_detail",
            StatementLayout::Csv(_) => "csv",
            StatementLayout::Custom(layout) => &layout.name,
        }
    }

    /// Built-in text layouts, most specific first (ties go to the earlier one)
    pub fn builtin() -> Vec<StatementLayout> {
        vec![
            StatementLayout::DebitCredit,
            StatementLayout::CardActivity,
            StatementLayout::CheckingDetail,
            StatementLayout::SignedAmount,
        ]
    }

    /// Pull raw field strings out of one candidate record.
    pub fn parse(&self, record: &CandidateRecord) -> Result<ParsedFields, FieldExtractionError> {
        let range = record.line_range();

        let fields = match self {
            StatementLayout::Csv(columns) => columns.parse_row(record)?,
            _ if record.is_row() => {
                return Err(FieldExtractionError::new(
                    SkipReason::PatternMismatch,
                    format!("layout '{}' cannot read delimited rows", self.name()),
                ))
            }
            _ => self.parse_text(record)?,
        };

        if fields.description.is_empty() {
            return Err(FieldExtractionError::new(
                SkipReason::MissingDescription,
                format!("no description on line(s) {}", range),
            ));
        }

        Ok(fields)
    }

    fn parse_line(&self, text: &str, range: LineRange) -> Result<ParsedFields, FieldExtractionError> {
        match self {
            StatementLayout::SignedAmount => text::parse_signed_amount(text, range),
            StatementLayout::DebitCredit => text::parse_debit_credit(text, range),
            StatementLayout::CardActivity => text::parse_card_activity(text, range),
            StatementLayout::CheckingDetail => text::parse_checking_detail(text, range),
            StatementLayout::Custom(layout) => layout.parse_text(text, range),
            StatementLayout::Csv(_) => Err(FieldExtractionError::new(
                SkipReason::PatternMismatch,
                "csv layout cannot read text lines",
            )),
        }
    }

    /// Anchor line first (wrapped lines extend the description); if the
    /// amount itself wrapped, retry on the joined text.
    fn parse_text(&self, record: &CandidateRecord) -> Result<ParsedFields, FieldExtractionError> {
        let range = record.line_range();

        match self.parse_line(record.anchor().text.trim(), range) {
            Ok(fields) => Ok(fields.with_continuation(&record.continuation_text())),
            Err(anchor_err) if !record.continuation().is_empty() => {
                match self.parse_line(&record.joined_text(), range) {
                    Ok(fields) => Ok(fields),
                    Err(joined_err) if anchor_err.reason == SkipReason::PatternMismatch => Err(joined_err),
                    Err(_) => Err(anchor_err),
                }
            }
            Err(err) => Err(err),
        }
    }
}

/// Free-function form of [`StatementLayout::parse`]
pub fn parse(record: &CandidateRecord, layout: &StatementLayout) -> Result<ParsedFields, FieldExtractionError> {
    layout.parse(record)
}

// ============================================================================
// TESTS
// ============================================================================
