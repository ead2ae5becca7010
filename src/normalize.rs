// 🧮 Transaction Normalizer
// Parsed field strings → canonical Transaction (date, fixed-point amount, clean description)

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::NormalizationError;
use crate::parser::{AmountText, ParsedFields};
use crate::period::StatementPeriod;
use crate::transaction::Transaction;

/// Trailing reference codes that carry no meaning for categorization or identity
static DEFAULT_NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\s+(?:ref(?:erence)?|conf(?:irmation)?|trace|auth)\s*(?:no\.?|number|#)?\s*[:#]?\s*[a-z0-9-]{4,}$",
        r"(?i)\s+web\s+id:?\s*\S+$",
        r"(?i),?\s+id:?\s*[a-z0-9-]{6,}$",
        r"(?i)\s+(?:\*{2,}|x{2,})\d{4}$",
        r"\s+#?\d{8,}$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("built-in noise pattern"))
    .collect()
});

// ============================================================================
// DATE ORDER & STATEMENT CONTEXT
// ============================================================================

/// Field order for numeric dates, declared per statement (never guessed per record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// 03/04/2024 = March 4th (US)
    #[default]
    MonthFirst,
    /// 03/04/2024 = 3rd April (UK/EU)
    DayFirst,
    /// 2024/03/04
    YearFirst,
}

/// Decimal separator for amounts, declared per statement like [`DateOrder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalMark {
    /// Guess from the text: the last of `.`/`,` is the decimal separator when
    /// both appear. A lone comma followed by exactly three digits groups
    /// thousands (`1,234`); a lone dot is always decimal (`1.234`).
    #[default]
    Auto,
    /// `1,234.56`
    Point,
    /// `1.234,56`
    Comma,
}

/// Statement-wide facts the normalizer needs to interpret a record.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementContext {
    pub statement_id: String,
    pub currency: String,
    pub date_order: DateOrder,
    pub decimal_mark: DecimalMark,
    pub period: Option<StatementPeriod>,
    /// Fallback year for year-less dates when no period was found
    pub year: Option<i32>,
}

impl StatementContext {
    pub fn new(statement_id: impl Into<String>) -> Self {
        StatementContext {
            statement_id: statement_id.into(),
            currency: "USD".to_string(),
            date_order: DateOrder::MonthFirst,
            decimal_mark: DecimalMark::Auto,
            period: None,
            year: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into().to_ascii_uppercase();
        self
    }

    pub fn with_date_order(mut self, order: DateOrder) -> Self {
        self.date_order = order;
        self
    }

    pub fn with_decimal_mark(mut self, mark: DecimalMark) -> Self {
        self.decimal_mark = mark;
        self
    }

    pub fn with_period(mut self, period: StatementPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Year used to place year-less and two-digit-year dates
    pub fn reference_year(&self) -> Option<i32> {
        self.period.map(|p| p.end.year()).or(self.year)
    }
}

// ============================================================================
// CURRENCY
// ============================================================================

/// Minor-unit digits for an ISO-4217 code
pub fn minor_units(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "PYG" | "UGX" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" | "LYD" | "IQD" => 3,
        _ => 2,
    }
}

/// Banker's (half-to-even) rounding to the currency's minor unit
pub fn round_to_minor(amount: Decimal, minor_units: u32) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(minor_units, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(minor_units);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

// ============================================================================
// AMOUNTS
// ============================================================================

/// Largest magnitude accepted for a single amount. Keeps ledger and summary
/// sums far from `Decimal`'s overflow point.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Parse amount text into a signed decimal, guessing the decimal separator.
///
/// Accepts thousands separators (`1,234.56`, `1.234,56`, `1'234.56`),
/// currency symbols or codes, a leading/trailing minus and parentheses as
/// negative.
pub fn parse_amount(text: &str) -> Result<Decimal, NormalizationError> {
    parse_amount_with(text, DecimalMark::Auto)
}

/// [`parse_amount`] under a declared decimal separator
pub fn parse_amount_with(text: &str, mark: DecimalMark) -> Result<Decimal, NormalizationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NormalizationError::EmptyAmount);
    }

    let invalid = || NormalizationError::InvalidAmount(trimmed.to_string());

    let (inner, mut negative) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (&trimmed[1..trimmed.len() - 1], true)
    } else {
        (trimmed, false)
    };

    let mut body = String::with_capacity(inner.len());
    let mut minus_signs = 0;
    let mut letters = 0;

    for c in inner.chars() {
        match c {
            '0'..='9' | '.' | ',' => body.push(c),
            '-' | '\u{2212}' => minus_signs += 1,
            '+' | '$' | '€' | '£' | '¥' | '\'' => {}
            c if c.is_whitespace() => {}
            c if c.is_ascii_alphabetic() => letters += 1,
            _ => return Err(invalid()),
        }
    }

    // Only a currency code may contribute letters
    if minus_signs > 1 || (letters != 0 && letters != 3) {
        return Err(invalid());
    }
    if !body.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if minus_signs == 1 {
        negative = !negative;
    }

    let normalized = normalize_separators(&body, mark).ok_or_else(invalid)?;
    let value = Decimal::from_str(&normalized).map_err(|_| invalid())?;

    if value.abs() >= Decimal::from(MAX_AMOUNT) {
        return Err(NormalizationError::AmountOutOfRange(trimmed.to_string()));
    }

    Ok(if negative { -value } else { value })
}

fn normalize_separators(body: &str, mark: DecimalMark) -> Option<String> {
    let (decimal, grouping) = match mark {
        DecimalMark::Auto => return Some(guess_separators(body)),
        DecimalMark::Point => ('.', ','),
        DecimalMark::Comma => (',', '.'),
    };

    let mut parts = body.split(decimal);
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    if parts.next().is_some() || fraction.map_or(false, |f| f.contains(grouping)) {
        return None;
    }

    let mut normalized: String = whole.chars().filter(|&c| c != grouping).collect();
    if let Some(fraction) = fraction {
        normalized.push('.');
        normalized.push_str(fraction);
    }
    Some(normalized)
}

fn guess_separators(body: &str) -> String {
    let last_dot = body.rfind('.');
    let last_comma = body.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            // Whichever comes last is the decimal separator
            if dot > comma {
                body.replace(',', "")
            } else {
                body.replace('.', "").replace(',', ".")
            }
        }
        (None, Some(comma)) => {
            let decimals = body.len() - comma - 1;
            if body.matches(',').count() == 1 && decimals != 3 {
                body.replace(',', ".")
            } else {
                body.replace(',', "")
            }
        }
        (Some(_), None) if body.matches('.').count() > 1 => body.replace('.', ""),
        _ => body.to_string(),
    }
}

fn parse_optional_amount(text: Option<&str>, mark: DecimalMark) -> Result<Option<Decimal>, NormalizationError> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => {
            let value = parse_amount_with(s, mark)?;
            Ok(if value.is_zero() { None } else { Some(value) })
        }
    }
}

/// Apply the layout's sign convention: debit-negative, credit-positive.
pub fn signed_amount(amount: &AmountText) -> Result<Decimal, NormalizationError> {
    signed_amount_with(amount, DecimalMark::Auto)
}

pub fn signed_amount_with(amount: &AmountText, mark: DecimalMark) -> Result<Decimal, NormalizationError> {
    match amount {
        AmountText::Signed(text) => parse_amount_with(text, mark),
        AmountText::DebitPositive(text) => Ok(-parse_amount_with(text, mark)?),
        AmountText::Columns { debit, credit } => {
            let debit = parse_optional_amount(debit.as_deref(), mark)?;
            let credit = parse_optional_amount(credit.as_deref(), mark)?;

            match (debit, credit) {
                (Some(_), Some(_)) => Err(NormalizationError::AmbiguousSign),
                (Some(d), None) => Ok(-d.abs()),
                (None, Some(c)) => Ok(c.abs()),
                (None, None) => Err(NormalizationError::EmptyAmount),
            }
        }
    }
}

// ============================================================================
// DATES
// ============================================================================

pub(crate) fn month_from_name(token: &str) -> Option<u32> {
    let t = token.trim_end_matches('.').to_ascii_lowercase();
    if t.len() < 3 {
        return None;
    }
    let month = match &t[..3] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Two-digit years land in the century closest to the statement's year
fn expand_year(year: i32, reference_year: Option<i32>) -> i32 {
    if year >= 100 {
        return year;
    }
    match reference_year {
        Some(reference) => {
            let century = reference / 100 * 100;
            [century - 100 + year, century + year, century + 100 + year]
                .into_iter()
                .min_by_key(|candidate| (candidate - reference).abs())
                .unwrap_or(century + year)
        }
        None if year < 70 => 2000 + year,
        None => 1900 + year,
    }
}

fn year_less(month: u32, day: u32, ctx: &StatementContext, text: &str) -> Result<NaiveDate, NormalizationError> {
    let invalid = || NormalizationError::InvalidDate(text.to_string());

    if let Some(period) = ctx.period {
        let year = period.end.year();
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
        // December rows on a January statement belong to the previous year
        if date > period.end {
            return NaiveDate::from_ymd_opt(year - 1, month, day).ok_or_else(invalid);
        }
        return Ok(date);
    }

    match ctx.year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid),
        None => Err(NormalizationError::MissingYear(text.to_string())),
    }
}

fn parse_number(token: &str) -> Option<u32> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Parse a statement date.
///
/// Explicit `formats` (chrono syntax) are tried first; otherwise numeric dates
/// follow the statement's declared [`DateOrder`], month names are recognised,
/// and year-less dates take their year from the statement context.
pub fn parse_date(text: &str, formats: &[String], ctx: &StatementContext) -> Result<NaiveDate, NormalizationError> {
    let cleaned = text.trim().trim_end_matches([',', '.']);
    let invalid = || NormalizationError::InvalidDate(text.trim().to_string());

    if cleaned.is_empty() {
        return Err(invalid());
    }

    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, format) {
            return Ok(date);
        }
    }

    let tokens: Vec<&str> = cleaned
        .split(|c: char| c.is_whitespace() || matches!(c, '/' | '-' | '.' | ','))
        .filter(|t| !t.is_empty())
        .collect();

    let month_pos = tokens.iter().position(|t| month_from_name(t).is_some());
    let reference = ctx.reference_year();

    match (tokens.len(), month_pos) {
        (3, None) => {
            let a = parse_number(tokens[0]).ok_or_else(invalid)?;
            let b = parse_number(tokens[1]).ok_or_else(invalid)?;
            let c = parse_number(tokens[2]).ok_or_else(invalid)?;

            let (y, m, d) = if tokens[0].len() == 4 {
                (a, b, c)
            } else {
                match ctx.date_order {
                    DateOrder::MonthFirst => (c, a, b),
                    DateOrder::DayFirst => (c, b, a),
                    DateOrder::YearFirst => (a, b, c),
                }
            };

            let year = expand_year(y as i32, reference);
            NaiveDate::from_ymd_opt(year, m, d).ok_or_else(invalid)
        }
        (3, Some(pos)) => {
            let month = month_from_name(tokens[pos]).ok_or_else(invalid)?;
            let rest: Vec<&str> = tokens
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pos)
                .map(|(_, t)| *t)
                .collect();

            // "Jan 05 2024", "05 Jan 2024", "2024 Jan 05"
            let (day_token, year_token) = if rest[0].len() == 4 {
                (rest[1], rest[0])
            } else {
                (rest[0], rest[1])
            };
            let day = parse_number(day_token).ok_or_else(invalid)?;
            let year = parse_number(year_token).ok_or_else(invalid)?;

            NaiveDate::from_ymd_opt(expand_year(year as i32, reference), month, day).ok_or_else(invalid)
        }
        (2, None) => {
            let a = parse_number(tokens[0]).ok_or_else(invalid)?;
            let b = parse_number(tokens[1]).ok_or_else(invalid)?;
            let (m, d) = match ctx.date_order {
                DateOrder::DayFirst => (b, a),
                DateOrder::MonthFirst | DateOrder::YearFirst => (a, b),
            };
            year_less(m, d, ctx, text.trim())
        }
        (2, Some(pos)) => {
            let month = month_from_name(tokens[pos]).ok_or_else(invalid)?;
            let day = parse_number(tokens[1 - pos]).ok_or_else(invalid)?;
            year_less(month, day, ctx, text.trim())
        }
        _ => Err(invalid()),
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Converts [`ParsedFields`] into canonical [`Transaction`]s.
///
/// Holds the compiled description-noise patterns; otherwise stateless, so one
/// instance is shared by every worker.
#[derive(Debug, Clone)]
pub struct Normalizer {
    noise: Vec<Regex>,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer {
            noise: DEFAULT_NOISE.clone(),
        }
    }

    /// Built-in noise patterns plus user-supplied ones
    pub fn with_noise_patterns(patterns: &[String]) -> Result<Self, regex::Error> {
        let mut normalizer = Normalizer::new();
        for pattern in patterns {
            normalizer.noise.push(Regex::new(pattern)?);
        }
        Ok(normalizer)
    }

    /// Collapse whitespace and strip trailing reference codes
    pub fn clean_description(&self, raw: &str) -> String {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut cleaned = collapsed.clone();

        loop {
            let before = cleaned.len();
            for pattern in &self.noise {
                cleaned = pattern.replace(&cleaned, "").trim_end().to_string();
            }
            if cleaned.len() == before {
                break;
            }
        }

        let cleaned = cleaned.trim_end_matches([',', ';', '-']).trim().to_string();
        if cleaned.is_empty() {
            collapsed
        } else {
            cleaned
        }
    }

    pub fn normalize(&self, fields: &ParsedFields, ctx: &StatementContext) -> Result<Transaction, NormalizationError> {
        let date = parse_date(&fields.date, &fields.date_formats, ctx)?;

        let currency = fields
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| ctx.currency.clone());

        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(NormalizationError::UnsupportedCurrency(currency));
        }

        let amount = round_to_minor(
            signed_amount_with(&fields.amount, ctx.decimal_mark)?,
            minor_units(&currency),
        );
        let description = self.clean_description(&fields.description);
        let id = Transaction::fingerprint(date, amount, &description);

        Ok(Transaction {
            id,
            date,
            amount,
            currency,
            description,
            raw_description: fields.description.clone(),
            source_statement_id: ctx.statement_id.clone(),
            category: None,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize with the built-in noise patterns
pub fn normalize(fields: &ParsedFields, ctx: &StatementContext) -> Result<Transaction, NormalizationError> {
    Normalizer::new().normalize(fields, ctx)
}

// ============================================================================
// TESTS
// ============================================================================
