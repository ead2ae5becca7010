// 📅 Statement Period Detection
// Finds the "Statement period: X - Y" header so year-less rows can be dated

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::normalize::{parse_date, StatementContext};
use crate::tokenizer::{RawLine, MONTH_NAME};

static PERIOD: Lazy<Regex> = Lazy::new(|| {
    let date = format!(
        r"\d{{4}}-\d{{1,2}}-\d{{1,2}}|\d{{1,2}}[/.-]\d{{1,2}}(?:[/.-]\d{{2,4}})?|{m}\s+\d{{1,2}}(?:,?\s+\d{{4}})?|\d{{1,2}}\s+{m}(?:\s+\d{{4}})?",
        m = MONTH_NAME
    );
    Regex::new(&format!(
        r"(?i)(?:statement\s+period|billing\s+period|statement\s+dates?|opening/closing\s+date|period)\s*:?\s*(?:from\s+)?(?P<start>{date})\s*(?:-|–|to|through|thru)\s*(?P<end>{date})",
        date = date
    ))
    .expect("statement period regex")
});

/// Inclusive date range covered by one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StatementPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            StatementPeriod { start, end }
        } else {
            StatementPeriod { start: end, end: start }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Scan extracted lines for a statement period header.
///
/// The end date must carry a year; a year-less start date is placed relative
/// to the end ("Dec 15 - Jan 14, 2024" starts in 2023).
pub fn detect_statement_period(lines: &[RawLine], ctx: &StatementContext) -> Option<StatementPeriod> {
    let base = StatementContext {
        period: None,
        year: None,
        ..ctx.clone()
    };

    for line in lines {
        let Some(caps) = PERIOD.captures(&line.text) else {
            continue;
        };

        let Ok(end) = parse_date(&caps["end"], &[], &base) else {
            continue;
        };

        let relative = base.clone().with_period(StatementPeriod { start: end, end });
        if let Ok(start) = parse_date(&caps["start"], &[], &relative) {
            log::debug!("statement period {} → {} (line {})", start, end, line.number);
            return Some(StatementPeriod::new(start, end));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DateOrder;
    use crate::tokenizer::raw_lines_from_text;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_detects_numeric_period() {
        let lines = raw_lines_from_text("ACME BANK\nStatement Period: 01/01/2024 - 01/31/2024\n01/05 COFFEE -4.50");
        let period = detect_statement_period(&lines, &StatementContext::new("s")).unwrap();
        assert_eq!(period, StatementPeriod::new(ymd(2024, 1, 1), ymd(2024, 1, 31)));
    }

    #[test]
    fn test_year_less_start_rolls_back() {
        let lines = raw_lines_from_text("Billing period Dec 15 to Jan 14, 2024");
        let period = detect_statement_period(&lines, &StatementContext::new("s")).unwrap();
        assert_eq!(period.start, ymd(2023, 12, 15));
        assert_eq!(period.end, ymd(2024, 1, 14));
    }

    #[test]
    fn test_respects_date_order() {
        let ctx = StatementContext::new("s").with_date_order(DateOrder::DayFirst);
        let lines = raw_lines_from_text("Statement period 01/02/2024 - 29/02/2024");
        let period = detect_statement_period(&lines, &ctx).unwrap();
        assert_eq!(period.start, ymd(2024, 2, 1));
        assert_eq!(period.end, ymd(2024, 2, 29));
    }

    #[test]
    fn test_no_period() {
        let lines = raw_lines_from_text("01/05/2024 COFFEE -4.50");
        assert!(detect_statement_period(&lines, &StatementContext::new("s")).is_none());
    }

    #[test]
    fn test_contains() {
        let p = StatementPeriod::new(ymd(2024, 1, 31), ymd(2024, 1, 1));
        assert_eq!(p.start, ymd(2024, 1, 1));
        assert!(p.contains(ymd(2024, 1, 15)));
        assert!(!p.contains(ymd(2024, 2, 1)));
    }
}
