// 📊 Aggregator
// Per-category, per-period summaries plus the feeds the charts consume

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ledger::Ledger;
use crate::transaction::Transaction;

// ============================================================================
// GRANULARITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Granularity {
    /// Period label; labels sort chronologically as strings
    pub fn period_key(&self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => date.format("%Y-%m").to_string(),
            Granularity::Quarter => format!("{}-Q{}", date.year(), (date.month() - 1) / 3 + 1),
            Granularity::Year => date.year().to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            "quarter" | "quarterly" => Ok(Granularity::Quarter),
            "year" | "yearly" | "annual" => Ok(Granularity::Year),
            other => Err(format!("unknown granularity '{}' (day, week, month, quarter, year)", other)),
        }
    }
}

// ============================================================================
// SUMMARIES
// ============================================================================

/// Derived from the ledger on demand; never stored independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub period: String,
    /// Sum of signed amounts (debits negative)
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    pub count: usize,
}

/// Group by (period, category) and sum signed amounts.
///
/// Only non-empty groups are emitted, sorted by period then category.
/// Amounts are summed as recorded; a multi-currency ledger should be
/// summarized per currency by the caller.
pub fn summarize(ledger: &Ledger, granularity: Granularity) -> Vec<CategorySummary> {
    let mut groups: BTreeMap<(String, String), (Decimal, usize)> = BTreeMap::new();

    for tx in ledger.iter() {
        let key = (granularity.period_key(tx.date), tx.category_name().to_string());
        let entry = groups.entry(key).or_insert((Decimal::ZERO, 0));
        entry.0 += tx.amount;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|((period, category), (total, count))| CategorySummary {
            category,
            period,
            total,
            count,
        })
        .collect()
}

// ============================================================================
// OVERVIEW & CHART FEEDS
// ============================================================================

/// Income / expense totals over a set of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOverview {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Sum of credits
    #[serde(with = "rust_decimal::serde::str")]
    pub total_income: Decimal,
    /// Sum of debits, as a positive number
    #[serde(with = "rust_decimal::serde::str")]
    pub total_expenses: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub net: Decimal,
    pub transaction_count: usize,
}

impl StatementOverview {
    pub fn from_transactions<'a, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut overview = StatementOverview {
            start: None,
            end: None,
            total_income: Decimal::ZERO,
            total_expenses: Decimal::ZERO,
            net: Decimal::ZERO,
            transaction_count: 0,
        };

        for tx in transactions {
            overview.start = Some(overview.start.map_or(tx.date, |d| d.min(tx.date)));
            overview.end = Some(overview.end.map_or(tx.date, |d| d.max(tx.date)));
            if tx.is_credit() {
                overview.total_income += tx.amount;
            } else if tx.is_debit() {
                overview.total_expenses += tx.amount.abs();
            }
            overview.transaction_count += 1;
        }

        overview.net = overview.total_income - overview.total_expenses;
        overview
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
}

/// Net signed total per category across all periods, by category name
pub fn category_totals(ledger: &Ledger) -> Vec<CategoryTotal> {
    let mut totals: BTreeMap<&str, (Decimal, usize)> = BTreeMap::new();
    for tx in ledger.iter() {
        let entry = totals.entry(tx.category_name()).or_insert((Decimal::ZERO, 0));
        entry.0 += tx.amount;
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(category, (total, count))| CategoryTotal {
            category: category.to_string(),
            total,
            count,
        })
        .collect()
}

/// Categories with the largest net spend, largest first (spend as a positive number)
pub fn top_categories(summaries: &[CategorySummary], n: usize) -> Vec<CategoryTotal> {
    let mut totals: BTreeMap<&str, (Decimal, usize)> = BTreeMap::new();
    for summary in summaries {
        let entry = totals.entry(summary.category.as_str()).or_insert((Decimal::ZERO, 0));
        entry.0 += summary.total;
        entry.1 += summary.count;
    }

    let mut spending: Vec<CategoryTotal> = totals
        .into_iter()
        .filter(|(_, (total, _))| total.is_sign_negative() && !total.is_zero())
        .map(|(category, (total, count))| CategoryTotal {
            category: category.to_string(),
            total: total.abs(),
            count,
        })
        .collect();

    // Stable sort keeps alphabetical order among equal totals
    spending.sort_by(|a, b| b.total.cmp(&a.total));
    spending.truncate(n);
    spending
}

/// Per-day debit totals (positive), in date order
pub fn daily_expense_trend(ledger: &Ledger) -> Vec<DailyTotal> {
    let mut days: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for tx in ledger.iter().filter(|tx| tx.is_debit()) {
        *days.entry(tx.date).or_insert(Decimal::ZERO) += tx.amount.abs();
    }

    days.into_iter().map(|(date, total)| DailyTotal { date, total }).collect()
}

// ============================================================================
// TESTS
// ============================================================================
