// 📥 Statement Import Pipeline
// Tokenize → Detect → Parse → Normalize → Categorize, then one merge per statement

use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::AnalyzerConfig;
use crate::error::{ImportError, SkippedRecord};
use crate::ledger::{MergeReport, SharedLedger};
use crate::normalize::{Normalizer, StatementContext};
use crate::parser::delimited::read_csv;
use crate::parser::{CustomLayout, Detector, StatementLayout};
use crate::period::{detect_statement_period, StatementPeriod};
use crate::rules::{categorize, CategoryRuleSet};
use crate::tokenizer::{raw_lines_from_text, tokenize, CandidateRecord, RawLine};
use crate::transaction::Transaction;

// ============================================================================
// INPUTS & RESULTS
// ============================================================================

/// One statement handed to the importer by an external reader.
#[derive(Debug, Clone)]
pub enum StatementSource {
    /// Text already extracted from a PDF (form feed = page break)
    Text { statement_id: String, text: String },
    /// Raw bytes of a delimited export
    Csv { statement_id: String, data: Vec<u8> },
}

impl StatementSource {
    pub fn text(statement_id: impl Into<String>, text: impl Into<String>) -> Self {
        StatementSource::Text {
            statement_id: statement_id.into(),
            text: text.into(),
        }
    }

    pub fn csv(statement_id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        StatementSource::Csv {
            statement_id: statement_id.into(),
            data: data.into(),
        }
    }

    pub fn statement_id(&self) -> &str {
        match self {
            StatementSource::Text { statement_id, .. } | StatementSource::Csv { statement_id, .. } => statement_id,
        }
    }
}

/// Partial success: what parsed and what was skipped, never one without the other.
#[derive(Debug, Clone, Serialize)]
pub struct StatementImport {
    pub statement_id: String,
    pub layout: String,
    pub period: Option<StatementPeriod>,
    pub transactions: Vec<Transaction>,
    pub skipped: Vec<SkippedRecord>,
    /// Records that shared a fingerprint with an earlier record of the same statement
    pub collapsed_within_statement: usize,
}

impl StatementImport {
    pub fn record_count(&self) -> usize {
        self.transactions.len() + self.skipped.len()
    }
}

// ============================================================================
// IMPORTER
// ============================================================================

/// Importer - the pure per-statement pipeline. Holds no ledger; safe to share
/// across worker threads.
#[derive(Debug, Clone)]
pub struct Importer {
    config: AnalyzerConfig,
    rules: CategoryRuleSet,
    normalizer: Normalizer,
    custom_layouts: Vec<CustomLayout>,
}

impl Importer {
    pub fn new(config: AnalyzerConfig, rules: CategoryRuleSet) -> anyhow::Result<Self> {
        config.validate()?;
        let custom_layouts = config.compile_layouts()?;
        let normalizer = Normalizer::with_noise_patterns(&config.noise_patterns)?;

        Ok(Importer {
            config,
            rules,
            normalizer,
            custom_layouts,
        })
    }

    /// Default configuration and built-in category rules
    pub fn with_defaults() -> Self {
        Importer {
            config: AnalyzerConfig::default(),
            rules: CategoryRuleSet::defaults(),
            normalizer: Normalizer::new(),
            custom_layouts: Vec::new(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn rules(&self) -> &CategoryRuleSet {
        &self.rules
    }

    fn context(&self, statement_id: &str) -> StatementContext {
        StatementContext::new(statement_id)
            .with_currency(self.config.default_currency.clone())
            .with_date_order(self.config.date_order)
            .with_decimal_mark(self.config.decimal_mark)
    }

    fn detector(&self, layouts: Vec<StatementLayout>) -> Detector {
        Detector::new(layouts)
            .with_min_confidence(self.config.min_confidence)
            .with_sample_size(self.config.detection_sample_size)
            .with_date_order(self.config.date_order)
            .with_decimal_mark(self.config.decimal_mark)
    }

    /// Custom layouts are declared ahead of the built-ins, so they win ties
    fn text_layouts(&self) -> Vec<StatementLayout> {
        self.custom_layouts
            .iter()
            .cloned()
            .map(StatementLayout::Custom)
            .chain(StatementLayout::builtin())
            .collect()
    }

    /// Import extracted text lines of one statement.
    pub fn import_text(&self, lines: Vec<RawLine>, statement_id: &str) -> Result<StatementImport, ImportError> {
        let mut ctx = self.context(statement_id);
        let period = detect_statement_period(&lines, &ctx);
        if let Some(period) = period {
            log::debug!("{}: statement period {} to {}", statement_id, period.start, period.end);
            ctx = ctx.with_period(period);
        }

        let anchors = self.custom_layouts.iter().map(|layout| layout.anchor().clone()).collect();
        let mut tokenizer = tokenize(lines).with_anchors(anchors);
        let records: Vec<CandidateRecord> = tokenizer.by_ref().collect();
        log::debug!(
            "{}: {} candidate records, {} lines dropped",
            statement_id,
            records.len(),
            tokenizer.dropped()
        );

        let layout = self.detect_layout(self.text_layouts(), &records, statement_id)?;
        Ok(self.run_records(&layout, &records, &ctx, period))
    }

    /// Import one delimited statement.
    pub fn import_csv<R: Read>(&self, reader: R, statement_id: &str) -> Result<StatementImport, ImportError> {
        let statement = read_csv(reader)?;

        let Some(columns) = statement.columns(self.config.csv.as_ref()) else {
            log::warn!("{}: CSV columns could not be mapped", statement_id);
            return Err(ImportError::unrecognized(Some("csv".to_string()), 0.0, self.config.min_confidence));
        };

        let layout = self.detect_layout(vec![StatementLayout::Csv(columns)], &statement.records, statement_id)?;
        let ctx = self.context(statement_id);
        Ok(self.run_records(&layout, &statement.records, &ctx, None))
    }

    pub fn import_source(&self, source: &StatementSource) -> Result<StatementImport, ImportError> {
        match source {
            StatementSource::Text { statement_id, text } => self.import_text(raw_lines_from_text(text), statement_id),
            StatementSource::Csv { statement_id, data } => self.import_csv(data.as_slice(), statement_id),
        }
    }

    fn detect_layout(
        &self,
        layouts: Vec<StatementLayout>,
        records: &[CandidateRecord],
        statement_id: &str,
    ) -> Result<StatementLayout, ImportError> {
        match self.detector(layouts).detect(records) {
            Ok(layout) => {
                log::info!("{}: detected layout {}", statement_id, layout.name());
                Ok(layout)
            }
            Err(err) => {
                log::warn!("{}: {}", statement_id, err);
                Err(err)
            }
        }
    }

    fn run_records(
        &self,
        layout: &StatementLayout,
        records: &[CandidateRecord],
        ctx: &StatementContext,
        period: Option<StatementPeriod>,
    ) -> StatementImport {
        let mut transactions = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        let mut collapsed = 0;

        for record in records {
            let range = record.line_range();

            let fields = match layout.parse(record) {
                Ok(fields) => fields,
                Err(err) => {
                    log::warn!("{}: skipped line(s) {}: {}", ctx.statement_id, range, err);
                    skipped.push(SkippedRecord::from_extraction(range, &err));
                    continue;
                }
            };

            let transaction = match self.normalizer.normalize(&fields, ctx) {
                Ok(tx) => categorize(tx, &self.rules),
                Err(err) => {
                    log::warn!("{}: skipped line(s) {}: {}", ctx.statement_id, range, err);
                    skipped.push(SkippedRecord::from_normalization(range, &err));
                    continue;
                }
            };

            if !seen.insert(transaction.id.clone()) {
                collapsed += 1;
            }
            transactions.push(transaction);
        }

        log::info!(
            "{}: {} transactions, {} skipped, {} collapsed",
            ctx.statement_id,
            transactions.len(),
            skipped.len(),
            collapsed
        );

        StatementImport {
            statement_id: ctx.statement_id.clone(),
            layout: layout.name().to_string(),
            period,
            transactions,
            skipped,
            collapsed_within_statement: collapsed,
        }
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Checked between statements; a statement already parsing runs to completion
/// or is discarded whole.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// IMPORT SESSION
// ============================================================================

/// Result of one statement after its merge.
#[derive(Debug, Clone, Serialize)]
pub struct StatementReport {
    pub import: StatementImport,
    pub merge: MergeReport,
}

pub type ImportOutcome = Result<StatementReport, ImportError>;

/// ImportSession - parallel workers over a shared ledger.
///
/// Parsing runs without locks; only the merge takes the ledger lock, once per
/// statement, so a statement enters the ledger whole or not at all.
#[derive(Debug, Clone)]
pub struct ImportSession {
    importer: Arc<Importer>,
    ledger: SharedLedger,
    cancel: CancelFlag,
    workers: usize,
}

impl ImportSession {
    pub fn new(importer: Importer) -> Self {
        ImportSession {
            importer: Arc::new(importer),
            ledger: SharedLedger::default(),
            cancel: CancelFlag::new(),
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }

    /// Builder pattern: continue an existing ledger
    pub fn with_ledger(mut self, ledger: SharedLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Builder pattern: set worker thread count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Import and merge one statement.
    pub fn import(&self, source: &StatementSource) -> ImportOutcome {
        if self.cancel.is_cancelled() {
            return Err(ImportError::Cancelled(source.statement_id().to_string()));
        }

        let import = self.importer.import_source(source)?;

        // Cancelled while parsing: drop the whole statement
        if self.cancel.is_cancelled() {
            return Err(ImportError::Cancelled(source.statement_id().to_string()));
        }

        let merge = self.ledger.merge(import.transactions.iter().cloned());
        log::info!(
            "{}: merged {} new, {} duplicates",
            import.statement_id,
            merge.inserted,
            merge.duplicates
        );

        Ok(StatementReport { import, merge })
    }

    /// Import several statements on worker threads; outcomes come back in
    /// input order.
    pub fn import_all(&self, sources: Vec<StatementSource>) -> Vec<ImportOutcome> {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<ImportOutcome>>> = sources.iter().map(|_| Mutex::new(None)).collect();
        let workers = self.workers.min(sources.len()).max(1);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(source) = sources.get(index) else {
                        break;
                    };
                    let outcome = self.import(source);
                    *slots[index].lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome);
                });
            }
        });

        slots
            .into_iter()
            .zip(&sources)
            .map(|(slot, source)| {
                slot.into_inner()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .unwrap_or_else(|| Err(ImportError::Cancelled(source.statement_id().to_string())))
            })
            .collect()
    }
}

impl Default for ImportSession {
    fn default() -> Self {
        Self::new(Importer::with_defaults())
    }
}

// ============================================================================
// TESTS
// ============================================================================
