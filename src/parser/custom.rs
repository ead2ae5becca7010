// User-defined regex layouts, loaded from configuration

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{AmountText, ParsedFields};
use crate::error::{FieldExtractionError, SkipReason};
use crate::tokenizer::LineRange;

/// How the captured amount encodes debit vs credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// `amount` group; negative means debit
    #[default]
    DebitNegative,
    /// `amount` group; positive means debit (card exports)
    DebitPositive,
    /// `debit` and `credit` groups
    Columns,
}

/// Layout definition as written in the config file.
///
/// ```json
/// { "name": "acme_bank",
///   "pattern": "^(?P<date>\\d{8}) (?P<description>.+?) (?P<amount>-?[\\d.]+)$",
///   "sign": "debit_negative",
///   "date_formats": ["%Y%m%d"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomLayoutDef {
    pub name: String,
    pub pattern: String,

    #[serde(default)]
    pub sign: SignConvention,

    #[serde(default)]
    pub date_formats: Vec<String>,
}

/// Compiled [`CustomLayoutDef`]. Optional groups: `currency`, `balance`, `posting_date`.
#[derive(Debug, Clone)]
pub struct CustomLayout {
    pub name: String,
    regex: Regex,
    /// Pattern up to the end of the `date` group; marks where a record starts
    anchor: Regex,
    sign: SignConvention,
    date_formats: Vec<String>,
}

/// Slice of `pattern` that ends with the `date` group's closing paren.
///
/// Escapes and character classes are skipped while balancing parentheses.
fn date_prefix(pattern: &str) -> Option<&str> {
    let start = pattern.find("(?P<date>").or_else(|| pattern.find("(?<date>"))?;
    let bytes = pattern.as_bytes();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => depth += 1,
            b')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(&pattern[..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

impl CustomLayout {
    pub fn compile(def: &CustomLayoutDef) -> Result<Self> {
        let regex = Regex::new(&def.pattern)
            .with_context(|| format!("Invalid pattern for layout '{}'", def.name))?;

        let groups: Vec<&str> = regex.capture_names().flatten().collect();
        let required: &[&str] = match def.sign {
            SignConvention::Columns => &["date", "description"],
            _ => &["date", "description", "amount"],
        };
        for group in required {
            if !groups.contains(group) {
                bail!("Layout '{}' pattern lacks the named group '{}'", def.name, group);
            }
        }
        if def.sign == SignConvention::Columns && !groups.contains(&"debit") && !groups.contains(&"credit") {
            bail!("Layout '{}' uses columns but has neither a 'debit' nor a 'credit' group", def.name);
        }

        // A prefix that does not compile on its own (date nested in an outer
        // group) falls back to the whole pattern
        let anchor = date_prefix(&def.pattern)
            .and_then(|prefix| Regex::new(prefix).ok())
            .unwrap_or_else(|| regex.clone());

        Ok(CustomLayout {
            name: def.name.clone(),
            regex,
            anchor,
            sign: def.sign,
            date_formats: def.date_formats.clone(),
        })
    }

    /// Regex matching the start of a record under this layout
    pub fn anchor(&self) -> &Regex {
        &self.anchor
    }

    pub fn parse_text(&self, text: &str, range: LineRange) -> Result<ParsedFields, FieldExtractionError> {
        let caps = self.regex.captures(text).ok_or_else(|| {
            FieldExtractionError::new(
                SkipReason::PatternMismatch,
                format!("'{}' does not match {} layout", text, self.name),
            )
        })?;

        let group = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let amount = match self.sign {
            SignConvention::DebitNegative => AmountText::Signed(group("amount").unwrap_or_default()),
            SignConvention::DebitPositive => AmountText::DebitPositive(group("amount").unwrap_or_default()),
            SignConvention::Columns => AmountText::Columns {
                debit: group("debit"),
                credit: group("credit"),
            },
        };

        let mut fields = ParsedFields::new(
            group("date").unwrap_or_default(),
            group("description").unwrap_or_default(),
            amount,
            range,
        )
        .with_date_formats(&self.date_formats);

        if let Some(currency) = group("currency") {
            fields = fields.with_currency(currency);
        }
        if let Some(balance) = group("balance") {
            fields = fields.with_balance(balance);
        }
        if let Some(posting) = group("posting_date") {
            fields = fields.with_posting_date(posting);
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(pattern: &str, sign: SignConvention) -> CustomLayoutDef {
        CustomLayoutDef {
            name: "acme".to_string(),
            pattern: pattern.to_string(),
            sign,
            date_formats: vec!["%Y%m%d".to_string()],
        }
    }

    #[test]
    fn test_compile_checks_groups() {
        assert!(CustomLayout::compile(&def(r"(?P<date>\d+) (?P<description>.+)", SignConvention::DebitNegative)).is_err());
        assert!(CustomLayout::compile(&def(r"(?P<date>\d+) (?P<description>.+)", SignConvention::Columns)).is_err());
        assert!(CustomLayout::compile(&def(r"(", SignConvention::DebitNegative)).is_err());
        assert!(CustomLayout::compile(&def(
            r"(?P<date>\d+) (?P<description>.+) (?P<amount>\S+)",
            SignConvention::DebitNegative
        ))
        .is_ok());
    }

    #[test]
    fn test_parse_with_currency_and_formats() {
        let layout = CustomLayout::compile(&def(
            r"^(?P<date>\d{8})\s+(?P<description>.+?)\s+(?P<amount>-?[\d.]+)\s+(?P<currency>[A-Z]{3})$",
            SignConvention::DebitPositive,
        ))
        .unwrap();

        let f = layout.parse_text("20240105 COFFEE 4.50 EUR", LineRange::single(3)).unwrap();
        assert_eq!(f.date, "20240105");
        assert_eq!(f.description, "COFFEE");
        assert_eq!(f.amount, AmountText::DebitPositive("4.50".into()));
        assert_eq!(f.currency.as_deref(), Some("EUR"));
        assert_eq!(f.date_formats, vec!["%Y%m%d".to_string()]);

        let err = layout.parse_text("nothing here", LineRange::single(4)).unwrap_err();
        assert_eq!(err.reason, SkipReason::PatternMismatch);
    }

    #[test]
    fn test_anchor_stops_after_date_group() {
        assert_eq!(
            date_prefix(r"^(?P<date>\d{8}) (?P<description>.+?) (?P<amount>-?[\d.]+)$"),
            Some(r"^(?P<date>\d{8})")
        );
        assert_eq!(date_prefix(r"^(?P<date>[(\d]+(?:\.\d+)?)\|rest"), Some(r"^(?P<date>[(\d]+(?:\.\d+)?)"));
        assert_eq!(date_prefix(r"(?P<description>.+)"), None);

        let layout = CustomLayout::compile(&def(
            r"^(?P<date>\d{8}) (?P<description>.+?) (?P<amount>-?[\d.]+)$",
            SignConvention::DebitNegative,
        ))
        .unwrap();
        assert!(layout.anchor().is_match("20240105 STARBUCKS"));
        assert!(!layout.anchor().is_match("STARBUCKS 20240105"));
    }

    #[test]
    fn test_anchor_falls_back_to_full_pattern() {
        let layout = CustomLayout::compile(&def(
            r"^(?:(?P<date>\d{8})\s+)(?P<description>.+?) (?P<amount>-?[\d.]+)$",
            SignConvention::DebitNegative,
        ))
        .unwrap();
        assert!(layout.anchor().is_match("20240105 STARBUCKS -4.50"));
        assert!(!layout.anchor().is_match("20240105 STARBUCKS"));
    }

    #[test]
    fn test_parse_columns() {
        let layout = CustomLayout::compile(&def(
            r"^(?P<date>\S+)\|(?P<description>[^|]+)\|(?P<debit>[^|]*)\|(?P<credit>[^|]*)$",
            SignConvention::Columns,
        ))
        .unwrap();
        let f = layout.parse_text("20240105|REFUND||12.00", LineRange::single(1)).unwrap();
        assert_eq!(f.amount, AmountText::Columns { debit: None, credit: Some("12.00".into()) });
    }
}
