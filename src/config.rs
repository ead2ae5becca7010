// ⚙️ Analyzer Configuration
// JSON file, every field defaulted; validated before any import runs

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::normalize::{DateOrder, DecimalMark};
use crate::parser::detect::{DEFAULT_MIN_CONFIDENCE, DEFAULT_SAMPLE_SIZE};
use crate::parser::{CsvColumnMapping, CustomLayout, CustomLayoutDef};

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Declared order for numeric dates
    #[serde(default)]
    pub date_order: DateOrder,

    /// Declared decimal separator; guessed per amount when `auto`
    #[serde(default)]
    pub decimal_mark: DecimalMark,

    /// Detection threshold in [0, 1]
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Leading records scored during detection
    #[serde(default = "default_sample_size")]
    pub detection_sample_size: usize,

    /// ISO-4217 code used when a record carries none
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Tried before the built-in layouts
    #[serde(default)]
    pub custom_layouts: Vec<CustomLayoutDef>,

    /// Explicit CSV mapping; header keywords are used when absent
    #[serde(default)]
    pub csv: Option<CsvColumnMapping>,

    /// Extra trailing-reference patterns stripped from descriptions
    #[serde(default)]
    pub noise_patterns: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            date_order: DateOrder::default(),
            decimal_mark: DecimalMark::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            detection_sample_size: DEFAULT_SAMPLE_SIZE,
            default_currency: default_currency(),
            custom_layouts: Vec::new(),
            csv: None,
            noise_patterns: Vec::new(),
        }
    }
}

impl AnalyzerConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AnalyzerConfig = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            bail!("min_confidence must be within [0, 1], got {}", self.min_confidence);
        }
        if self.detection_sample_size == 0 {
            bail!("detection_sample_size must be at least 1");
        }

        let currency = self.default_currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("default_currency must be a 3-letter ISO-4217 code, got '{}'", self.default_currency);
        }

        self.compile_layouts()?;

        if let Some(mapping) = &self.csv {
            if !mapping.has_amount_columns() {
                bail!("csv mapping needs an amount column or debit/credit columns");
            }
        }

        for pattern in &self.noise_patterns {
            Regex::new(pattern).with_context(|| format!("Invalid noise pattern: {}", pattern))?;
        }

        Ok(())
    }

    pub fn compile_layouts(&self) -> Result<Vec<CustomLayout>> {
        self.custom_layouts.iter().map(CustomLayout::compile).collect()
    }
}
