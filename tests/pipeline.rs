// End-to-end pipeline scenarios through the public API

use rust_decimal::Decimal;
use statement_analyzer::{
    categorize, load_ledger, merge, open_database, save_ledger, summarize, verify_count, CategoryRuleSet,
    AnalyzerConfig, DateOrder, DecimalMark, Granularity, ImportError, ImportSession, Importer, Ledger, SkipReason,
    StatementSource, UNCATEGORIZED,
};
use std::collections::HashMap;

const STARBUCKS_CSV: &str = "2024-01-05,STARBUCKS,-4.50\n2024-01-05,STARBUCKS,-4.50\n";

const CHECKING_STATEMENT: &str = "\
FIRST COMMUNITY BANK
Statement Period: 01/01/2024 - 01/31/2024
Date   Description                     Amount     Balance
01/02  PAYROLL ACME CORP               2,500.00   3,700.00
01/05  STARBUCKS STORE 1234              -4.50    3,695.50
01/09  SHELL OIL 57442                  -45.00    3,650.50
01/15  RENT PAYMENT JANUARY          -1,200.00    2,450.50
       ONLINE TRANSFER REF 99812
Page 1 of 2
\x0c
Closing balance 2,435.51
01/28  NETFLIX.COM                      -14.99    2,435.51
";

const DEBIT_CREDIT_STATEMENT: &str = "\
2024-02-01 SALARY FEBRUARY 3,000.00 CR 4,000.00
2024-02-03 WHOLE FOODS MARKET 120.55 DR 3,879.45
2024-02-04 UBER TRIP 18.20 DR 3,861.25
";

fn ledger_after(session: &ImportSession) -> Ledger {
    session.ledger().snapshot()
}

#[test]
fn duplicate_rows_collapse_within_and_across_statements() {
    let importer = Importer::with_defaults();

    let once = importer.import_csv(STARBUCKS_CSV.as_bytes(), "a.csv").unwrap();
    assert_eq!(once.transactions.len(), 2);
    assert_eq!(once.collapsed_within_statement, 1);

    let ledger = merge(Ledger::new(), once.transactions);
    assert_eq!(ledger.len(), 1);

    // Same content under another statement id still collapses
    let session = ImportSession::default();
    session.import(&StatementSource::csv("a.csv", STARBUCKS_CSV)).unwrap();
    let second = session.import(&StatementSource::csv("b.csv", STARBUCKS_CSV)).unwrap();
    assert_eq!(second.merge.inserted, 0);
    assert_eq!(second.merge.duplicates, 2);
    assert_eq!(session.ledger().len(), 1);
}

#[test]
fn garbled_text_is_unrecognized_and_adds_nothing() {
    let session = ImportSession::default();
    let garbled = "%PDF-1.4 ÿØÿà\n<< /Type /Page >>\n@@@ ### !!!\nxref 0 12\n";

    let outcome = session.import(&StatementSource::text("garbled.pdf", garbled));
    match outcome {
        Err(ImportError::UnrecognizedFormat { threshold, .. }) => assert_eq!(threshold, 0.6),
        other => panic!("expected UnrecognizedFormat, got {:?}", other.map(|r| r.import.layout)),
    }
    assert!(session.ledger().is_empty());
}

#[test]
fn low_confidence_statement_is_rejected_whole() {
    // Only one of five anchored lines carries an amount
    let text = "01/02/2024 OPENING NOTE\n01/03/2024 SEE BACK\n01/04/2024 STARBUCKS -4.50\n01/05/2024 INFO\n01/06/2024 END\n";
    let session = ImportSession::default();

    let err = session.import(&StatementSource::text("weak.txt", text)).unwrap_err();
    assert!(err.is_unrecognized_format());
    assert!(session.ledger().is_empty());
}

#[test]
fn malformed_row_is_reported_not_dropped() {
    let csv = "Date,Description,Amount\n\
               2024-01-05,STARBUCKS,-4.50\n\
               2024-01-06,SHELL OIL,-45.00\n\
               2024-01-07,GROCERY OUTLET,twelve\n\
               2024-01-08,PAYROLL,2500.00\n";

    let result = Importer::with_defaults().import_csv(csv.as_bytes(), "jan.csv").unwrap();
    assert_eq!(result.transactions.len(), 3);
    assert_eq!(result.skipped.len(), 1);

    let skipped = &result.skipped[0];
    assert_eq!(skipped.reason, SkipReason::InvalidAmount);
    assert_eq!(skipped.line_range.start, 4);
    assert!(skipped.detail.contains("twelve"));
}

#[test]
fn oversized_amounts_are_skipped_and_summaries_stay_safe() {
    let csv = "Date,Description,Amount\n\
               2024-01-05,WIRE IN,50000000000000000000000000000\n\
               2024-01-06,WIRE IN AGAIN,50000000000000000000000000000\n\
               2024-01-07,STARBUCKS,-4.50\n\
               2024-01-08,SHELL OIL,-45.00\n\
               2024-01-09,NETFLIX,-15.99\n";

    let session = ImportSession::default();
    let report = session.import(&StatementSource::csv("huge.csv", csv)).unwrap();
    assert_eq!(report.import.transactions.len(), 3);
    assert_eq!(report.import.skipped.len(), 2);
    assert!(report.import.skipped.iter().all(|s| s.reason == SkipReason::InvalidAmount));
    assert_eq!(report.import.skipped[0].line_range.start, 2);

    let summaries = summarize(&ledger_after(&session), Granularity::Month);
    let total: Decimal = summaries.iter().map(|s| s.total).sum();
    assert_eq!(total, Decimal::new(-6549, 2));
}

#[test]
fn european_statement_reads_declared_decimal_comma() {
    let mut config = AnalyzerConfig::default();
    config.date_order = DateOrder::DayFirst;
    config.decimal_mark = DecimalMark::Comma;
    config.default_currency = "EUR".to_string();
    let importer = Importer::new(config, CategoryRuleSet::new()).unwrap();

    let csv = "Date,Description,Amount\n05.01.2024,REWE MARKT,\"-1.234\"\n06.01.2024,BAECKEREI,\"-3,50\"\n";
    let result = importer.import_csv(csv.as_bytes(), "eu.csv").unwrap();

    assert_eq!(result.transactions.len(), 2);
    assert_eq!(result.transactions[0].amount, Decimal::new(-123400, 2));
    assert_eq!(result.transactions[0].date.to_string(), "2024-01-05");
    assert_eq!(result.transactions[1].amount, Decimal::new(-350, 2));
}

#[test]
fn checking_statement_with_wrapped_description_and_page_break() {
    let result = Importer::with_defaults()
        .import_source(&StatementSource::text("checking-jan.txt", CHECKING_STATEMENT))
        .unwrap();

    assert_eq!(result.layout, "checking_detail");
    assert_eq!(result.transactions.len(), 5);
    assert!(result.skipped.is_empty());

    let rent = result
        .transactions
        .iter()
        .find(|tx| tx.description.starts_with("RENT PAYMENT"))
        .unwrap();
    assert_eq!(rent.amount, Decimal::new(-120000, 2));
    assert!(rent.description.contains("ONLINE TRANSFER"));
    assert_eq!(rent.date.to_string(), "2024-01-15");

    let netflix = result.transactions.last().unwrap();
    assert_eq!(netflix.date.to_string(), "2024-01-28");
    assert_eq!(netflix.category_name(), "Entertainment");
}

#[test]
fn reimport_is_idempotent() {
    let importer = Importer::with_defaults();
    let statement = importer
        .import_source(&StatementSource::text("checking-jan.txt", CHECKING_STATEMENT))
        .unwrap();

    let once = merge(Ledger::new(), statement.transactions.clone());
    let twice = merge(once.clone(), statement.transactions);
    assert_eq!(once, twice);
}

#[test]
fn debits_are_negative_under_every_layout() {
    let importer = Importer::with_defaults();

    let checking = importer
        .import_source(&StatementSource::text("checking", CHECKING_STATEMENT))
        .unwrap();
    let shell = checking.transactions.iter().find(|tx| tx.description.starts_with("SHELL")).unwrap();
    assert!(shell.is_debit());

    let dr_cr = importer
        .import_source(&StatementSource::text("drcr", DEBIT_CREDIT_STATEMENT))
        .unwrap();
    assert_eq!(dr_cr.layout, "debit_credit");
    let amounts: Vec<Decimal> = dr_cr.transactions.iter().map(|tx| tx.amount).collect();
    assert_eq!(
        amounts,
        vec![Decimal::new(300000, 2), Decimal::new(-12055, 2), Decimal::new(-1820, 2)]
    );

    let csv = "Date,Description,Debit,Credit\n2024-03-01,RENT,1200.00,\n2024-03-02,REFUND,,25.00\n";
    let columns = importer.import_csv(csv.as_bytes(), "cols.csv").unwrap();
    assert_eq!(columns.transactions[0].amount, Decimal::new(-120000, 2));
    assert_eq!(columns.transactions[1].amount, Decimal::new(2500, 2));
}

#[test]
fn every_transaction_gets_a_category_even_with_no_rules() {
    let importer = Importer::new(Default::default(), CategoryRuleSet::new()).unwrap();
    let result = importer
        .import_source(&StatementSource::text("checking", CHECKING_STATEMENT))
        .unwrap();

    assert!(result
        .transactions
        .iter()
        .all(|tx| tx.category.as_deref() == Some(UNCATEGORIZED)));

    // Re-running with new rules only changes categories
    let rules = CategoryRuleSet::defaults();
    let recategorized: Vec<_> = result.transactions.iter().cloned().map(|tx| categorize(tx, &rules)).collect();
    assert_eq!(recategorized.len(), result.transactions.len());
    assert!(recategorized.iter().any(|tx| tx.category_name() == "Income"));
    assert!(recategorized.iter().zip(&result.transactions).all(|(a, b)| a.id == b.id));
}

#[test]
fn summaries_conserve_period_totals() {
    let session = ImportSession::default();
    session.import(&StatementSource::text("checking", CHECKING_STATEMENT)).unwrap();
    session.import(&StatementSource::text("drcr", DEBIT_CREDIT_STATEMENT)).unwrap();
    let ledger = ledger_after(&session);

    let summaries = summarize(&ledger, Granularity::Month);
    let mut by_period: HashMap<String, Decimal> = HashMap::new();
    for summary in &summaries {
        *by_period.entry(summary.period.clone()).or_insert(Decimal::ZERO) += summary.total;
        assert!(summary.count > 0);
    }

    for (period, total) in by_period {
        let expected: Decimal = ledger
            .iter()
            .filter(|tx| tx.date.format("%Y-%m").to_string() == period)
            .map(|tx| tx.amount)
            .sum();
        assert_eq!(total, expected, "period {}", period);
    }

    let counted: usize = summaries.iter().map(|s| s.count).sum();
    assert_eq!(counted, ledger.len());
}

#[test]
fn parallel_import_matches_sequential() {
    let sources = vec![
        StatementSource::text("checking", CHECKING_STATEMENT),
        StatementSource::text("drcr", DEBIT_CREDIT_STATEMENT),
        StatementSource::csv("a.csv", STARBUCKS_CSV),
        StatementSource::csv("b.csv", STARBUCKS_CSV),
        StatementSource::text("checking-copy", CHECKING_STATEMENT),
    ];

    let parallel = ImportSession::default().with_workers(4);
    let outcomes = parallel.import_all(sources.clone());
    assert!(outcomes.iter().all(|o| o.is_ok()));

    let sequential = ImportSession::default();
    for source in &sources {
        sequential.import(source).unwrap();
    }

    // Which copy wins a collision may differ; the set of fingerprints may not
    let ids = |ledger: Ledger| ledger.iter().map(|tx| tx.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(ledger_after(&parallel)), ids(ledger_after(&sequential)));

    let inserted: usize = outcomes.iter().flatten().map(|r| r.merge.inserted).sum();
    assert_eq!(inserted, parallel.ledger().len());
}

#[test]
fn cancelled_session_imports_nothing_further() {
    let session = ImportSession::default().with_workers(2);
    session.cancel_flag().cancel();

    let outcomes = session.import_all(vec![
        StatementSource::csv("a.csv", STARBUCKS_CSV),
        StatementSource::text("checking", CHECKING_STATEMENT),
    ]);

    assert!(outcomes.iter().all(|o| matches!(o, Err(ImportError::Cancelled(_)))));
    assert!(session.ledger().is_empty());
}

#[test]
fn sqlite_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statements.db");

    let session = ImportSession::default();
    session.import(&StatementSource::text("checking", CHECKING_STATEMENT)).unwrap();
    let ledger = ledger_after(&session);

    let conn = open_database(&path).unwrap();
    let first = save_ledger(&conn, &ledger).unwrap();
    assert_eq!(first.inserted, ledger.len());

    let again = save_ledger(&conn, &ledger).unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(verify_count(&conn).unwrap() as usize, ledger.len());

    let loaded = load_ledger(&conn).unwrap();
    assert_eq!(loaded, ledger);
}
