// Statement Analyzer - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod aggregate;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod export;
pub mod import;
pub mod ledger;
pub mod normalize;
pub mod parser;
pub mod period;
pub mod rules;
pub mod tokenizer;
pub mod transaction;

// Re-export commonly used types
pub use aggregate::{
    category_totals, daily_expense_trend, summarize, top_categories, CategorySummary, CategoryTotal, DailyTotal,
    Granularity, StatementOverview,
};
pub use config::AnalyzerConfig;
pub use db::{
    get_events_for_entity, insert_event, load_ledger, open_database, record_import, save_ledger, setup_database,
    verify_count, Event,
};
pub use dedup::{find_near_duplicates, DeduplicationEngine, DuplicateMatch, MatchStrategy};
pub use error::{FieldExtractionError, ImportError, NormalizationError, SkipReason, SkippedRecord};
pub use export::{export_ledger, export_summaries, transaction_records, ExportFormat, TransactionRecord};
pub use import::{
    CancelFlag, ImportOutcome, ImportSession, Importer, StatementImport, StatementReport, StatementSource,
};
pub use ledger::{merge, Ledger, MergeReport, SharedLedger};
pub use normalize::{
    normalize, parse_amount, parse_amount_with, parse_date, DateOrder, DecimalMark, Normalizer, StatementContext,
};
pub use parser::{
    detect, parse, CsvColumnMapping, CustomLayoutDef, Detector, LayoutScore, ParsedFields, SignConvention,
    StatementLayout,
};
pub use period::{detect_statement_period, StatementPeriod};
pub use rules::{categorize, CategoryRule, CategoryRuleSet, PatternKind, UNCATEGORIZED};
pub use tokenizer::{raw_lines_from_text, tokenize, CandidateRecord, LineRange, RawLine};
pub use transaction::Transaction;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
