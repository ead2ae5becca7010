// 🔎 Format Detector
// Scores every known layout against a sample of records and picks the best one

use serde::Serialize;

use super::StatementLayout;
use crate::error::ImportError;
use crate::normalize::{parse_date, signed_amount_with, DateOrder, DecimalMark, StatementContext};
use crate::tokenizer::CandidateRecord;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_SAMPLE_SIZE: usize = 25;

const DATE_WEIGHT: f64 = 0.4;
const FIELD_WEIGHT: f64 = 0.6;

/// How well one layout fits a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutScore {
    pub layout: String,
    /// Share of records whose date field parses as a calendar date
    pub date_rate: f64,
    /// Share of records whose fields extract and whose amount resolves
    pub field_rate: f64,
    pub score: f64,
}

/// Detector - chooses a layout or refuses with `UnrecognizedFormat`.
///
/// The threshold is configuration, not a constant: a false-positive layout
/// choice is fixed by raising `min_confidence`, not by editing code.
#[derive(Debug, Clone)]
pub struct Detector {
    layouts: Vec<StatementLayout>,
    min_confidence: f64,
    sample_size: usize,
    date_order: DateOrder,
    decimal_mark: DecimalMark,
}

impl Detector {
    pub fn new(layouts: Vec<StatementLayout>) -> Self {
        Detector {
            layouts,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            sample_size: DEFAULT_SAMPLE_SIZE,
            date_order: DateOrder::default(),
            decimal_mark: DecimalMark::default(),
        }
    }

    /// Built-in text layouts only
    pub fn builtin() -> Self {
        Self::new(StatementLayout::builtin())
    }

    /// Builder pattern: set minimum confidence
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Builder pattern: set sample size
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Builder pattern: set declared date order
    pub fn with_date_order(mut self, date_order: DateOrder) -> Self {
        self.date_order = date_order;
        self
    }

    /// Builder pattern: set declared decimal separator
    pub fn with_decimal_mark(mut self, decimal_mark: DecimalMark) -> Self {
        self.decimal_mark = decimal_mark;
        self
    }

    pub fn layouts(&self) -> &[StatementLayout] {
        &self.layouts
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn score(&self, layout: &StatementLayout, sample: &[CandidateRecord]) -> LayoutScore {
        let sample = &sample[..sample.len().min(self.sample_size)];

        // Year-less layouts are judged on shape; leap year keeps Feb 29 valid
        let ctx = StatementContext::new("detect")
            .with_date_order(self.date_order)
            .with_year(2000);

        let mut dates = 0usize;
        let mut fields = 0usize;

        for record in sample {
            if let Ok(parsed) = layout.parse(record) {
                if parse_date(&parsed.date, &parsed.date_formats, &ctx).is_ok() {
                    dates += 1;
                }
                if signed_amount_with(&parsed.amount, self.decimal_mark).is_ok() {
                    fields += 1;
                }
            }
        }

        let total = sample.len().max(1) as f64;
        let date_rate = dates as f64 / total;
        let field_rate = fields as f64 / total;

        LayoutScore {
            layout: layout.name().to_string(),
            date_rate,
            field_rate,
            score: DATE_WEIGHT * date_rate + FIELD_WEIGHT * field_rate,
        }
    }

    /// Scores in layout declaration order
    pub fn score_all(&self, sample: &[CandidateRecord]) -> Vec<LayoutScore> {
        self.layouts.iter().map(|layout| self.score(layout, sample)).collect()
    }

    /// Highest-scoring layout at or above the threshold; ties go to the
    /// layout declared first.
    pub fn detect(&self, sample: &[CandidateRecord]) -> Result<StatementLayout, ImportError> {
        let mut best: Option<(usize, LayoutScore)> = None;

        for (index, score) in self.score_all(sample).into_iter().enumerate() {
            log::debug!(
                "layout {} scored {:.2} (dates {:.2}, fields {:.2})",
                score.layout,
                score.score,
                score.date_rate,
                score.field_rate
            );
            if best.as_ref().map_or(true, |(_, b)| score.score > b.score) {
                best = Some((index, score));
            }
        }

        match best {
            Some((index, score)) if !sample.is_empty() && score.score >= self.min_confidence => {
                Ok(self.layouts[index].clone())
            }
            Some((_, score)) => Err(ImportError::unrecognized(
                Some(score.layout),
                score.score,
                self.min_confidence,
            )),
            None => Err(ImportError::unrecognized(None, 0.0, self.min_confidence)),
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Detect with the built-in layouts and default threshold
pub fn detect(sample: &[CandidateRecord]) -> Result<StatementLayout, ImportError> {
    Detector::builtin().detect(sample)
}
