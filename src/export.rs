// 📤 Export - ledger and summaries as CSV or JSON

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::aggregate::CategorySummary;
use crate::ledger::Ledger;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => f.write_str("csv"),
            ExportFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{}' (csv, json)", other)),
        }
    }
}

/// Tabular shape of one ledger entry: `id,date,amount,currency,category,description`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub date: String,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub description: String,
}

impl From<&Transaction> for TransactionRecord {
    fn from(tx: &Transaction) -> Self {
        TransactionRecord {
            id: tx.id.clone(),
            date: tx.date.format("%Y-%m-%d").to_string(),
            amount: tx.amount.to_string(),
            currency: tx.currency.clone(),
            category: tx.category_name().to_string(),
            description: tx.description.clone(),
        }
    }
}

pub fn transaction_records(ledger: &Ledger) -> Vec<TransactionRecord> {
    ledger.iter().map(TransactionRecord::from).collect()
}

fn write_csv<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row).context("Failed to write CSV row")?;
    }
    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

fn write_json<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<()> {
    serde_json::to_writer_pretty(writer, rows).context("Failed to write JSON output")
}

/// Write the ledger in date order
pub fn export_ledger<W: Write>(ledger: &Ledger, format: ExportFormat, writer: W) -> Result<()> {
    let records = transaction_records(ledger);
    match format {
        ExportFormat::Csv => write_csv(writer, records.as_slice()),
        ExportFormat::Json => write_json(writer, records.as_slice()),
    }
}

/// Write summaries as `category,period,total,count`
pub fn export_summaries<W: Write>(summaries: &[CategorySummary], format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Csv => write_csv(writer, summaries),
        ExportFormat::Json => write_json(writer, summaries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{summarize, Granularity};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn sample_ledger() -> Ledger {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let amount = Decimal::new(-450, 2);
        Ledger::from_transactions(vec![Transaction {
            id: "abc123".to_string(),
            date,
            amount,
            currency: "USD".to_string(),
            description: "STARBUCKS, DOWNTOWN".to_string(),
            raw_description: "STARBUCKS,  DOWNTOWN".to_string(),
            source_statement_id: "s1".to_string(),
            category: Some("Dining".to_string()),
        }])
    }

    #[test]
    fn test_ledger_csv() {
        let mut out = Vec::new();
        export_ledger(&sample_ledger(), ExportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,date,amount,currency,category,description"));
        assert_eq!(lines.next(), Some("abc123,2024-01-05,-4.50,USD,Dining,\"STARBUCKS, DOWNTOWN\""));
    }

    #[test]
    fn test_ledger_json() {
        let mut out = Vec::new();
        export_ledger(&sample_ledger(), ExportFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["amount"], "-4.50");
        assert_eq!(value[0]["category"], "Dining");
    }

    #[test]
    fn test_summaries_csv() {
        let summaries = summarize(&sample_ledger(), Granularity::Month);
        let mut out = Vec::new();
        export_summaries(&summaries, ExportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "category,period,total,count\nDining,2024-01,-4.50,1\n");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
