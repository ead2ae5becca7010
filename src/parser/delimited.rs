// 📄 Delimited (CSV) statements
// Column mapping, header auto-mapping and row extraction

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::io::Read;

use super::{AmountText, ParsedFields};
use crate::error::{FieldExtractionError, ImportError, SkipReason};
use crate::tokenizer::{is_date_anchor, CandidateRecord};

// ============================================================================
// MAPPINGS
// ============================================================================

/// Column mapping declared in configuration, by header name.
///
/// Either `amount` (one signed column) or `debit`/`credit` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvColumnMapping {
    pub date: String,
    pub description: String,

    #[serde(default)]
    pub amount: Option<String>,

    #[serde(default)]
    pub debit: Option<String>,

    #[serde(default)]
    pub credit: Option<String>,

    #[serde(default)]
    pub currency: Option<String>,

    /// Card exports that report charges as positive numbers
    #[serde(default)]
    pub negate_amounts: bool,

    #[serde(default)]
    pub date_formats: Vec<String>,
}

impl CsvColumnMapping {
    pub fn has_amount_columns(&self) -> bool {
        self.amount.is_some() || self.debit.is_some() || self.credit.is_some()
    }

    /// Resolve header names to positions (case-insensitive).
    pub fn resolve(&self, headers: &[String]) -> Option<CsvColumns> {
        let position = |name: &str| {
            let found = headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name.trim()));
            if found.is_none() {
                log::warn!("CSV header has no column named '{}'", name);
            }
            found
        };
        let optional = |name: &Option<String>| match name {
            Some(n) => position(n).map(Some),
            None => Some(None),
        };

        if !self.has_amount_columns() {
            return None;
        }

        Some(CsvColumns {
            date: position(&self.date)?,
            description: position(&self.description)?,
            amount: optional(&self.amount)?,
            debit: optional(&self.debit)?,
            credit: optional(&self.credit)?,
            currency: optional(&self.currency)?,
            negate_amounts: self.negate_amounts,
            date_formats: self.date_formats.clone(),
        })
    }
}

/// Resolved column positions for one CSV statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvColumns {
    pub date: usize,
    pub description: usize,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub currency: Option<usize>,
    pub negate_amounts: bool,
    pub date_formats: Vec<String>,
}

impl CsvColumns {
    /// Headerless files: `date, description, amount`
    pub fn positional() -> Self {
        CsvColumns {
            date: 0,
            description: 1,
            amount: Some(2),
            debit: None,
            credit: None,
            currency: None,
            negate_amounts: false,
            date_formats: Vec::new(),
        }
    }

    /// Map a header row by keyword.
    ///
    /// Transaction date wins over posting date; a signed `amount` column wins
    /// over separate debit/credit columns. `None` when date, description or
    /// every amount column is missing.
    pub fn auto_map(headers: &[String]) -> Option<Self> {
        let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |pred: &dyn Fn(&str) -> bool| lower.iter().position(|h| pred(h));
        let any_of = |h: &str, keywords: &[&str]| keywords.iter().any(|k| h.contains(k));

        let date = find(&|h| any_of(h, &["transaction date", "trans date", "trans. date"]))
            .or_else(|| find(&|h| h.contains("date") && !h.contains("post")))
            .or_else(|| find(&|h| h.contains("date")))?;

        let description = find(&|h| any_of(h, &["description", "merchant", "payee", "memo", "details", "narrative"]))?;

        let amount = find(&|h| h.contains("amount") && !any_of(h, &["debit", "credit"]));
        let debit = find(&|h| any_of(h, &["debit", "withdrawal", "paid out", "money out"]));
        let credit = find(&|h| any_of(h, &["credit", "deposit", "paid in", "money in"]));
        let currency = find(&|h| h.contains("currency"));

        if amount.is_none() && debit.is_none() && credit.is_none() {
            return None;
        }

        Some(CsvColumns {
            date,
            description,
            amount,
            debit: if amount.is_some() { None } else { debit },
            credit: if amount.is_some() { None } else { credit },
            currency,
            negate_amounts: false,
            date_formats: Vec::new(),
        })
    }

    pub fn parse_row(&self, record: &CandidateRecord) -> Result<ParsedFields, FieldExtractionError> {
        let range = record.line_range();
        let cells = record.cells.as_deref().ok_or_else(|| {
            FieldExtractionError::new(SkipReason::PatternMismatch, format!("line {} is not a delimited row", range))
        })?;

        let cell = |index: usize, name: &str| {
            cells.get(index).map(|c| c.trim().to_string()).ok_or_else(|| {
                FieldExtractionError::new(
                    SkipReason::MissingColumn,
                    format!("row {} has no {} column (#{})", range, name, index + 1),
                )
            })
        };
        let optional = |index: Option<usize>| {
            index
                .and_then(|i| cells.get(i))
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        };

        let date = cell(self.date, "date")?;
        let description = cell(self.description, "description")?;

        let amount = match self.amount {
            Some(index) if self.negate_amounts => AmountText::DebitPositive(cell(index, "amount")?),
            Some(index) => AmountText::Signed(cell(index, "amount")?),
            None => AmountText::Columns {
                debit: optional(self.debit),
                credit: optional(self.credit),
            },
        };

        let fields = ParsedFields::new(date, description, amount, range).with_date_formats(&self.date_formats);
        Ok(match optional(self.currency) {
            Some(currency) => fields.with_currency(currency),
            None => fields,
        })
    }
}

// ============================================================================
// READING
// ============================================================================

/// Rows of one delimited statement, header split off when present.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvStatement {
    pub headers: Option<Vec<String>>,
    pub records: Vec<CandidateRecord>,
}

impl CsvStatement {
    /// Pick the column layout: explicit mapping, then header keywords, then
    /// positional for headerless files. A configured mapping never falls back
    /// to positions.
    pub fn columns(&self, mapping: Option<&CsvColumnMapping>) -> Option<CsvColumns> {
        match (&self.headers, mapping) {
            (Some(headers), Some(mapping)) => mapping.resolve(headers),
            (Some(headers), None) => CsvColumns::auto_map(headers),
            (None, Some(_)) => {
                log::warn!("CSV column mapping is configured but the file has no header row");
                None
            }
            (None, None) => {
                let width = self.records.first()?.cells.as_ref()?.len();
                (width >= 3).then(CsvColumns::positional)
            }
        }
    }
}

/// UTF-8 when valid, otherwise Windows-1252 (Excel and most bank exports)
fn decode_cell(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Read every row; blank rows are dropped. A first row that starts with a
/// date is data, not a header.
pub fn read_csv<R: Read>(reader: R) -> Result<CsvStatement, ImportError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (index, result) in csv_reader.byte_records().enumerate() {
        let record = result?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(index + 1);
        let cells: Vec<String> = record.iter().map(decode_cell).collect();

        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push((line, cells));
    }

    let has_header = rows
        .first()
        .map_or(false, |(_, first)| !first.first().map_or(false, |c| is_date_anchor(c)));
    let headers = if has_header { Some(rows.remove(0).1) } else { None };

    let records = rows
        .into_iter()
        .map(|(line, cells)| CandidateRecord::from_row(line, cells))
        .collect();

    Ok(CsvStatement { headers, records })
}
