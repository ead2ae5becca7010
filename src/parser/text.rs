// Field extraction for the built-in text layouts (PDF-extracted lines)

use once_cell::sync::Lazy;
use regex::Regex;

use super::{AmountText, ParsedFields};
use crate::error::{FieldExtractionError, SkipReason};
use crate::tokenizer::{LineRange, MONTH_NAME};

const AMOUNT: &str = r"\(?[-−]?[$€£]?[-−]?(?:\d{1,3}(?:[,.']\d{3})+|\d+)(?:[.,]\d{1,2})?\)?[-−]?";
const UNSIGNED: &str = r"[$€£]?(?:\d{1,3}(?:[,.']\d{3})+|\d+)(?:[.,]\d{1,2})?";
const SHORT_DATE: &str = r"\d{1,2}/\d{1,2}";

fn full_date() -> String {
    format!(
        r"\d{{4}}-\d{{1,2}}-\d{{1,2}}|\d{{1,2}}[/.-]\d{{1,2}}[/.-]\d{{2,4}}|{m}\s+\d{{1,2}},?\s+\d{{4}}|\d{{1,2}}\s+{m}\s+\d{{4}}",
        m = MONTH_NAME
    )
}

fn any_date() -> String {
    format!(r"{full}|{short}|{m}\s+\d{{1,2}}", full = full_date(), short = SHORT_DATE, m = MONTH_NAME)
}

static SIGNED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<date>{date})\s+(?P<desc>.+?)\s+(?P<amount>{amount})$",
        date = full_date(),
        amount = AMOUNT
    ))
    .expect("signed amount layout regex")
});

/// A description that itself ends in a decimal amount means the line carries
/// a balance column this layout does not expect.
static TRAILING_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s[-−(]?[$€£]?\d[\d,']*[.,]\d{2}\)?[-−]?(?:\s*(?:DR|CR))?$").expect("trailing amount regex"));

static DEBIT_CREDIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<date>{date})\s+(?P<desc>.+?)\s+(?P<amount>{unsigned})\s*(?P<marker>DR|CR|DEBIT|CREDIT|D|C)(?:\s+(?P<balance>{amount})(?:\s*(?:DR|CR))?)?$",
        date = any_date(),
        unsigned = UNSIGNED,
        amount = AMOUNT
    ))
    .expect("debit/credit layout regex")
});

static UNMARKED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:{date})\s+.+?\s+{amount}(?:\s+{amount})?$",
        date = any_date(),
        amount = AMOUNT
    ))
    .expect("unmarked amount regex")
});

static CARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<date>{m}\s+\d{{1,2}})\s+(?P<post>{m}\s+\d{{1,2}})\s+(?P<desc>.+?)\s+(?P<amount>[-−]?\s?\$?(?:\d{{1,3}}(?:,\d{{3}})+|\d+)\.\d{{2}})$",
        m = MONTH_NAME
    ))
    .expect("card activity layout regex")
});

static CHECKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<date>{short})\s+(?P<desc>.+?)\s+(?P<amount>{amount})(?:\s+(?P<balance>{amount}))?$",
        short = SHORT_DATE,
        amount = AMOUNT
    ))
    .expect("checking detail layout regex")
});

fn mismatch(layout: &str, text: &str) -> FieldExtractionError {
    FieldExtractionError::new(
        SkipReason::PatternMismatch,
        format!("'{}' does not match {} layout", text, layout),
    )
}

/// `01/05/2024 STARBUCKS -4.50`
pub fn parse_signed_amount(text: &str, range: LineRange) -> Result<ParsedFields, FieldExtractionError> {
    let caps = SIGNED.captures(text).ok_or_else(|| mismatch("signed_amount", text))?;

    if TRAILING_AMOUNT.is_match(&caps["desc"]) {
        return Err(FieldExtractionError::new(
            SkipReason::PatternMismatch,
            format!("'{}' carries a second amount column", text),
        ));
    }

    Ok(ParsedFields::new(
        &caps["date"],
        &caps["desc"],
        AmountText::Signed(caps["amount"].to_string()),
        range,
    ))
}

/// `05/01/2024 TESCO STORES 23.40 DR 1,200.00`
pub fn parse_debit_credit(text: &str, range: LineRange) -> Result<ParsedFields, FieldExtractionError> {
    let Some(caps) = DEBIT_CREDIT.captures(text) else {
        if UNMARKED.is_match(text) {
            return Err(FieldExtractionError::new(
                SkipReason::MissingSignMarker,
                format!("'{}' has no DR/CR marker", text),
            ));
        }
        return Err(mismatch("debit_credit", text));
    };

    let amount = caps["amount"].to_string();
    let amount = match caps["marker"].to_ascii_uppercase().as_str() {
        "DR" | "D" | "DEBIT" => AmountText::Columns {
            debit: Some(amount),
            credit: None,
        },
        _ => AmountText::Columns {
            debit: None,
            credit: Some(amount),
        },
    };

    let fields = ParsedFields::new(&caps["date"], &caps["desc"], amount, range);
    Ok(match caps.name("balance") {
        Some(balance) => fields.with_balance(balance.as_str()),
        None => fields,
    })
}

/// `Jul 20  Jul 22  H-E-B #123 AUSTIN TX  $5.82`
pub fn parse_card_activity(text: &str, range: LineRange) -> Result<ParsedFields, FieldExtractionError> {
    let caps = CARD.captures(text).ok_or_else(|| mismatch("card_activity", text))?;

    Ok(ParsedFields::new(
        &caps["date"],
        &caps["desc"],
        AmountText::DebitPositive(caps["amount"].to_string()),
        range,
    )
    .with_posting_date(&caps["post"]))
}

/// `04/22  Discover E-Payment 8148  -14.05  1,234.56`
pub fn parse_checking_detail(text: &str, range: LineRange) -> Result<ParsedFields, FieldExtractionError> {
    let caps = CHECKING.captures(text).ok_or_else(|| mismatch("checking_detail", text))?;

    let fields = ParsedFields::new(
        &caps["date"],
        &caps["desc"],
        AmountText::Signed(caps["amount"].to_string()),
        range,
    );
    Ok(match caps.name("balance") {
        Some(balance) => fields.with_balance(balance.as_str()),
        None => fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r() -> LineRange {
        LineRange::single(1)
    }

    #[test]
    fn test_signed_amount_layout() {
        let f = parse_signed_amount("01/05/2024 STARBUCKS #4521 -4.50", r()).unwrap();
        assert_eq!(f.date, "01/05/2024");
        assert_eq!(f.description, "STARBUCKS #4521");
        assert_eq!(f.amount, AmountText::Signed("-4.50".into()));

        let f = parse_signed_amount("Jan 6, 2024 PAYROLL ACME INC 1,500.00", r()).unwrap();
        assert_eq!(f.date, "Jan 6, 2024");
        assert_eq!(f.amount, AmountText::Signed("1,500.00".into()));

        let f = parse_signed_amount("2024-01-07 DENTIST (120.00)", r()).unwrap();
        assert_eq!(f.amount, AmountText::Signed("(120.00)".into()));
    }

    #[test]
    fn test_signed_amount_rejects_balance_column() {
        let err = parse_signed_amount("01/05/2024 STARBUCKS -4.50 1,234.00", r()).unwrap_err();
        assert_eq!(err.reason, SkipReason::PatternMismatch);
        assert!(parse_signed_amount("05/01/2024 TESCO 23.40 DR 976.60", r()).is_err());
        assert!(parse_signed_amount("01/05 STARBUCKS -4.50", r()).is_err());
    }

    #[test]
    fn test_debit_credit_layout() {
        let f = parse_debit_credit("05/01/2024 TESCO STORES 23.40 DR 1,200.00", r()).unwrap();
        assert_eq!(f.description, "TESCO STORES");
        assert_eq!(
            f.amount,
            AmountText::Columns { debit: Some("23.40".into()), credit: None }
        );
        assert_eq!(f.balance.as_deref(), Some("1,200.00"));

        let f = parse_debit_credit("06/01/2024 SALARY 2,000.00 CR", r()).unwrap();
        assert_eq!(
            f.amount,
            AmountText::Columns { debit: None, credit: Some("2,000.00".into()) }
        );
    }

    #[test]
    fn test_debit_credit_missing_marker() {
        let err = parse_debit_credit("05/01/2024 TESCO STORES 23.40", r()).unwrap_err();
        assert_eq!(err.reason, SkipReason::MissingSignMarker);

        let err = parse_debit_credit("garbage", r()).unwrap_err();
        assert_eq!(err.reason, SkipReason::PatternMismatch);
    }

    #[test]
    fn test_card_activity_layout() {
        let f = parse_card_activity("Jul 20  Jul 22  H-E-B #123 AUSTIN TX  $5.82", r()).unwrap();
        assert_eq!(f.date, "Jul 20");
        assert_eq!(f.posting_date.as_deref(), Some("Jul 22"));
        assert_eq!(f.description, "H-E-B #123 AUSTIN TX");
        assert_eq!(f.amount, AmountText::DebitPositive("$5.82".into()));

        let f = parse_card_activity("Jul 25 Jul 25 PAYMENT - THANK YOU -$500.00", r()).unwrap();
        assert_eq!(f.amount, AmountText::DebitPositive("-$500.00".into()));
    }

    #[test]
    fn test_checking_detail_layout() {
        let f = parse_checking_detail("04/22  Discover E-Payment 8148  -14.05  1,234.56", r()).unwrap();
        assert_eq!(f.date, "04/22");
        assert_eq!(f.description, "Discover E-Payment 8148");
        assert_eq!(f.amount, AmountText::Signed("-14.05".into()));
        assert_eq!(f.balance.as_deref(), Some("1,234.56"));

        let f = parse_checking_detail("04/23 ATM DEPOSIT 200.00", r()).unwrap();
        assert_eq!(f.amount, AmountText::Signed("200.00".into()));
        assert!(f.balance.is_none());

        assert!(parse_checking_detail("04/22/2024 X -1.00", r()).is_err());
    }
}
