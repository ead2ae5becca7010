// 🧾 Statement Tokenizer
// Groups extracted text lines into candidate transaction records

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Month names as they appear in statements ("Jan", "Sept.", "January")
pub(crate) const MONTH_NAME: &str =
    r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?";

/// Liberal date-prefix signature: any line starting with something date-like
/// opens a new candidate record.
static DATE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:\d{{4}}-\d{{1,2}}-\d{{1,2}}|\d{{1,2}}[/-]\d{{1,2}}(?:[/-]\d{{2,4}})?|\d{{1,2}}\.\d{{1,2}}\.\d{{2,4}}|{m}\s+\d{{1,2}}\b|\d{{1,2}}\s+{m}(?:\s|$))",
        m = MONTH_NAME
    ))
    .expect("date anchor regex")
});

/// Structural noise: page furniture, running totals, column headers.
static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*(?:
            page\s+\d+(?:\s+of\s+\d+)? |
            (?:opening|closing|previous|new|beginning|ending)\s+balance |
            balance\s+(?:forward|brought\s+forward|carried\s+forward) |
            (?:sub)?total\b |
            statement\s+(?:period|date) |
            account\s+(?:number|summary) |
            continued\s+on |
            (?:trans(?:action)?\s+)?date\s+(?:post(?:ing)?\s+date\s+)?description
        )",
    )
    .expect("noise regex")
});

/// Wrapped descriptions rarely span more than a few physical lines.
const MAX_CONTINUATION_LINES: usize = 3;

// ============================================================================
// RAW LINES
// ============================================================================

/// One line of extracted text plus its position in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLine {
    /// Zero-based page (PDF) index; always 0 for CSV rows
    pub page: usize,
    /// One-based line (or CSV row) number within the statement
    pub number: usize,
    pub text: String,
}

impl RawLine {
    pub fn new(page: usize, number: usize, text: impl Into<String>) -> Self {
        RawLine {
            page,
            number,
            text: text.into(),
        }
    }
}

/// Split the text extractor's output into raw lines.
///
/// A form feed (`\x0c`) marks a page break, which is how most PDF text
/// strippers separate pages.
pub fn raw_lines_from_text(text: &str) -> Vec<RawLine> {
    let mut lines = Vec::new();
    let mut number = 0;

    for (page, page_text) in text.split('\x0c').enumerate() {
        for line in page_text.lines() {
            number += 1;
            lines.push(RawLine::new(page, number, line));
        }
    }

    lines
}

// ============================================================================
// CANDIDATE RECORDS
// ============================================================================

/// Inclusive range of source lines a record was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn single(line: usize) -> Self {
        LineRange {
            start: line,
            end: line,
        }
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Lines believed to describe one transaction.
///
/// Text records hold an anchor line (with the date prefix) followed by
/// wrapped continuation lines. CSV records hold a single row and its cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub lines: Vec<RawLine>,
    pub cells: Option<Vec<String>>,
}

impl CandidateRecord {
    pub fn from_anchor(line: RawLine) -> Self {
        CandidateRecord {
            lines: vec![line],
            cells: None,
        }
    }

    /// A delimited row; `number` is the one-based row number in the file.
    pub fn from_row(number: usize, cells: Vec<String>) -> Self {
        let text = cells.join(",");
        CandidateRecord {
            lines: vec![RawLine::new(0, number, text)],
            cells: Some(cells),
        }
    }

    pub fn anchor(&self) -> &RawLine {
        &self.lines[0]
    }

    pub fn continuation(&self) -> &[RawLine] {
        &self.lines[1..]
    }

    pub fn is_row(&self) -> bool {
        self.cells.is_some()
    }

    pub fn line_range(&self) -> LineRange {
        LineRange {
            start: self.lines[0].number,
            end: self.lines[self.lines.len() - 1].number,
        }
    }

    /// Anchor and continuation text joined by single spaces
    pub fn joined_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Continuation lines only, joined by single spaces
    pub fn continuation_text(&self) -> String {
        self.continuation()
            .iter()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn is_date_anchor(text: &str) -> bool {
    DATE_ANCHOR.is_match(text)
}

pub fn is_noise(text: &str) -> bool {
    text.trim().is_empty() || NOISE.is_match(text)
}

// ============================================================================
// TOKENIZER
// ============================================================================

/// Lazy, single-pass grouping of raw lines into candidate records.
///
/// Nothing is emitted until a date-prefixed anchor line is seen. Lines that
/// are neither anchors nor plausible continuations are dropped.
pub struct Tokenizer<I: Iterator<Item = RawLine>> {
    lines: I,
    /// Record starts beyond the built-in date shapes (custom layouts)
    anchors: Vec<Regex>,
    pending: Option<CandidateRecord>,
    accepting_continuation: bool,
    dropped: usize,
}

impl<I: Iterator<Item = RawLine>> Tokenizer<I> {
    pub fn new(lines: I) -> Self {
        Tokenizer {
            lines,
            anchors: Vec::new(),
            pending: None,
            accepting_continuation: false,
            dropped: 0,
        }
    }

    /// Builder pattern: extra anchor signatures, matched against the line
    /// with leading whitespace removed
    pub fn with_anchors(mut self, anchors: Vec<Regex>) -> Self {
        self.anchors = anchors;
        self
    }

    /// Number of lines discarded as noise so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl<I: Iterator<Item = RawLine>> Iterator for Tokenizer<I> {
    type Item = CandidateRecord;

    fn next(&mut self) -> Option<CandidateRecord> {
        for line in self.lines.by_ref() {
            let custom_anchor = self.anchors.iter().any(|a| a.is_match(line.text.trim_start()));
            if custom_anchor || is_date_anchor(&line.text) {
                let finished = self.pending.replace(CandidateRecord::from_anchor(line));
                self.accepting_continuation = true;
                if finished.is_some() {
                    return finished;
                }
                continue;
            }

            if is_noise(&line.text) {
                // Page furniture ends any wrapped description
                self.accepting_continuation = false;
                self.dropped += 1;
                continue;
            }

            match self.pending.as_mut() {
                Some(record)
                    if self.accepting_continuation
                        && record.continuation().len() < MAX_CONTINUATION_LINES =>
                {
                    record.lines.push(line);
                }
                _ => {
                    self.dropped += 1;
                }
            }
        }

        self.pending.take()
    }
}

/// Convenience wrapper over [`Tokenizer`]
pub fn tokenize<I>(lines: I) -> Tokenizer<I::IntoIter>
where
    I: IntoIterator<Item = RawLine>,
{
    Tokenizer::new(lines.into_iter())
}

// ============================================================================
// TESTS
// ============================================================================
