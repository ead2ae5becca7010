// 🏷️ Category Rules - Rules as Data
// Ordered pattern → category rules; first match wins, no match is "Uncategorized"

use anyhow::{Context as AnyhowContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::transaction::Transaction;

/// Terminal bucket for descriptions no rule matches
pub const UNCATEGORIZED: &str = "Uncategorized";

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Case-insensitive substring; `*` acts as a wildcard
    #[default]
    Contains,
    /// Case-insensitive whole word or phrase
    Word,
    /// Regular expression (case-insensitive)
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Rule ID for tracking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub pattern: String,

    pub category: String,

    #[serde(default)]
    pub kind: PatternKind,
}

impl CategoryRule {
    pub fn new(pattern: impl Into<String>, category: impl Into<String>) -> Self {
        CategoryRule {
            id: None,
            pattern: pattern.into(),
            category: category.into(),
            kind: PatternKind::Contains,
        }
    }

    pub fn word(pattern: impl Into<String>, category: impl Into<String>) -> Self {
        CategoryRule {
            kind: PatternKind::Word,
            ..CategoryRule::new(pattern, category)
        }
    }

    /// Builder pattern: set rule id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Substring match with `*` wildcards (prefix, suffix and ordered middle parts)
fn contains_match(pattern: &str, text: &str) -> bool {
    let pattern_lower = pattern.to_lowercase();
    let text_lower = text.to_lowercase();

    if !pattern_lower.contains('*') {
        return text_lower.contains(&pattern_lower);
    }

    let parts: Vec<&str> = pattern_lower.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !text_lower.starts_with(first) || !text_lower.ends_with(last) {
        return false;
    }
    if first.len() + last.len() > text_lower.len() {
        return false;
    }

    let mut current_pos = first.len();
    let end_limit = text_lower.len() - last.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text_lower[current_pos..end_limit].find(part) {
            Some(pos) => current_pos += pos + part.len(),
            None => return false,
        }
    }

    true
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: CategoryRule,
    regex: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: CategoryRule) -> Result<Self> {
        let regex = match rule.kind {
            PatternKind::Contains => None,
            PatternKind::Word => Some(
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(rule.pattern.trim())))
                    .with_context(|| format!("Invalid word pattern: {}", rule.pattern))?,
            ),
            PatternKind::Regex => Some(
                Regex::new(&format!("(?i){}", rule.pattern))
                    .with_context(|| format!("Invalid regex pattern: {}", rule.pattern))?,
            ),
        };
        Ok(CompiledRule { rule, regex })
    }

    fn matches(&self, text: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(text),
            None => contains_match(&self.rule.pattern, text),
        }
    }
}

// ============================================================================
// DEFAULT RULES
// ============================================================================

/// Built-in keyword rules. Order matters: income first, "gas bill" before
/// "gas", specific merchants before the generic "shop"/"store".
const DEFAULT_KEYWORDS: &[(&str, &str)] = &[
    ("salary", "Income"),
    ("payroll", "Income"),
    ("direct deposit", "Income"),
    ("payment received", "Income"),
    ("deposit", "Income"),
    ("refund", "Income"),
    ("gas bill", "Utilities"),
    ("electric", "Utilities"),
    ("water", "Utilities"),
    ("internet", "Utilities"),
    ("phone", "Utilities"),
    ("mobile", "Utilities"),
    ("utility", "Utilities"),
    ("restaurant", "Dining"),
    ("cafe", "Dining"),
    ("coffee", "Dining"),
    ("starbucks", "Dining"),
    ("mcdonald's", "Dining"),
    ("mcdonalds", "Dining"),
    ("burger", "Dining"),
    ("pizza", "Dining"),
    ("grocery", "Groceries"),
    ("supermarket", "Groceries"),
    ("food", "Groceries"),
    ("market", "Groceries"),
    ("gas", "Transportation"),
    ("uber", "Transportation"),
    ("lyft", "Transportation"),
    ("taxi", "Transportation"),
    ("transit", "Transportation"),
    ("parking", "Transportation"),
    ("auto", "Transportation"),
    ("rent", "Housing"),
    ("mortgage", "Housing"),
    ("apartment", "Housing"),
    ("home", "Housing"),
    ("movie", "Entertainment"),
    ("netflix", "Entertainment"),
    ("spotify", "Entertainment"),
    ("hulu", "Entertainment"),
    ("disney", "Entertainment"),
    ("theater", "Entertainment"),
    ("game", "Entertainment"),
    ("doctor", "Health"),
    ("medical", "Health"),
    ("pharmacy", "Health"),
    ("hospital", "Health"),
    ("clinic", "Health"),
    ("dental", "Health"),
    ("vision", "Health"),
    ("amazon", "Shopping"),
    ("walmart", "Shopping"),
    ("target", "Shopping"),
    ("ebay", "Shopping"),
    ("store", "Shopping"),
    ("shop", "Shopping"),
];

static DEFAULT_RULES: Lazy<CategoryRuleSet> = Lazy::new(|| {
    let rules = DEFAULT_KEYWORDS
        .iter()
        .map(|(pattern, category)| CategoryRule::word(*pattern, *category).with_id(format!("default:{}", pattern)))
        .collect();
    CategoryRuleSet::from_rules(rules).expect("default category rules compile")
});

// ============================================================================
// RULE SET
// ============================================================================

/// Ordered, user-editable rule list.
#[derive(Debug, Clone, Default)]
pub struct CategoryRuleSet {
    rules: Vec<CompiledRule>,
}

impl CategoryRuleSet {
    /// Empty rule set: everything is Uncategorized
    pub fn new() -> Self {
        CategoryRuleSet { rules: Vec::new() }
    }

    /// Built-in keyword rules
    pub fn defaults() -> Self {
        DEFAULT_RULES.clone()
    }

    /// Load rules from JSON file (array of rules, evaluated in file order)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<CategoryRule> = serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        CategoryRuleSet::from_rules(rules)
    }

    /// Create rule set from a list of rules, keeping their order
    pub fn from_rules(rules: Vec<CategoryRule>) -> Result<Self> {
        let rules = rules.into_iter().map(CompiledRule::compile).collect::<Result<Vec<_>>>()?;
        Ok(CategoryRuleSet { rules })
    }

    /// Append a rule (lowest precedence)
    pub fn add_rule(&mut self, rule: CategoryRule) -> Result<()> {
        self.rules.push(CompiledRule::compile(rule)?);
        Ok(())
    }

    /// First rule matching the description, in declared order
    pub fn matching_rule(&self, description: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.matches(description)).map(|r| &r.rule)
    }

    /// Category for a cleaned description; never fails
    pub fn classify(&self, description: &str) -> &str {
        self.matching_rule(description)
            .map(|r| r.category.as_str())
            .unwrap_or(UNCATEGORIZED)
    }

    pub fn rules(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter().map(|r| &r.rule)
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Assign a category from (description, rules) alone.
pub fn categorize(transaction: Transaction, rules: &CategoryRuleSet) -> Transaction {
    let category = rules.classify(&transaction.description).to_string();
    log::debug!("{} → {}", transaction.description, category);
    transaction.with_category(category)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn create_test_transaction(description: &str) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let amount = Decimal::new(-450, 2);
        Transaction {
            id: Transaction::fingerprint(date, amount, description),
            date,
            amount,
            currency: "USD".to_string(),
            description: description.to_string(),
            raw_description: description.to_string(),
            source_statement_id: "test".to_string(),
            category: None,
        }
    }

    #[test]
    fn test_contains_pattern_match() {
        assert!(contains_match("STARBUCKS", "STARBUCKS COFFEE"));
        assert!(contains_match("STARBUCKS", "starbucks"));
        assert!(!contains_match("STARBUCKS", "AMAZON"));
    }

    #[test]
    fn test_wildcard_pattern() {
        assert!(contains_match("STARBUCKS*", "STARBUCKS #4521"));
        assert!(contains_match("STARBUCKS*", "starbucks downtown"));
        assert!(!contains_match("STARBUCKS*", "COFFEE STARBUCKS"));
        assert!(contains_match("AMZN*MKTP*", "AMZN Mktp US*2K4"));
        assert!(!contains_match("AB*BA", "ABA"));
    }

    #[test]
    fn test_first_match_wins() {
        let rules = CategoryRuleSet::from_rules(vec![
            CategoryRule::new("AMAZON.COM MARKETPLACE", "Online Shopping"),
            CategoryRule::new("AMAZON*", "Shopping"),
        ])
        .unwrap();

        assert_eq!(rules.classify("AMAZON.COM MARKETPLACE"), "Online Shopping");
        assert_eq!(rules.classify("AMAZON PRIME"), "Shopping");
    }

    #[test]
    fn test_no_match_is_uncategorized() {
        let rules = CategoryRuleSet::new();
        assert_eq!(rules.classify("UNKNOWN MERCHANT"), UNCATEGORIZED);

        let tx = categorize(create_test_transaction("UNKNOWN MERCHANT"), &rules);
        assert_eq!(tx.category.as_deref(), Some("Uncategorized"));
    }

    #[test]
    fn test_default_rules() {
        let rules = CategoryRuleSet::defaults();
        assert_eq!(rules.classify("STARBUCKS #4521"), "Dining");
        assert_eq!(rules.classify("CITY GAS BILL"), "Utilities");
        assert_eq!(rules.classify("SHELL GAS STATION"), "Transportation");
        assert_eq!(rules.classify("PAYROLL ACME INC"), "Income");
        assert_eq!(rules.classify("COFFEE SHOP"), "Dining");
        // Whole words only
        assert_eq!(rules.classify("PARENT TEACHER ASSOC"), UNCATEGORIZED);
    }

    #[test]
    fn test_regex_rule_and_invalid_pattern() {
        let rules = CategoryRuleSet::from_rules(vec![CategoryRule {
            id: Some("r1".into()),
            pattern: r"^uber\s+(eats|trip)".into(),
            category: "Transportation".into(),
            kind: PatternKind::Regex,
        }])
        .unwrap();
        assert_eq!(rules.classify("UBER TRIP 123"), "Transportation");
        assert_eq!(rules.matching_rule("UBER TRIP").and_then(|r| r.id.as_deref()), Some("r1"));

        let bad = CategoryRuleSet::from_rules(vec![CategoryRule {
            id: None,
            pattern: "(".into(),
            category: "X".into(),
            kind: PatternKind::Regex,
        }]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_categorize_is_rerunnable() {
        let tx = create_test_transaction("NETFLIX.COM");
        let first = categorize(tx.clone(), &CategoryRuleSet::defaults());
        assert_eq!(first.category.as_deref(), Some("Entertainment"));

        let changed = CategoryRuleSet::from_rules(vec![CategoryRule::new("netflix", "Subscriptions")]).unwrap();
        let second = categorize(first, &changed);
        assert_eq!(second.category.as_deref(), Some("Subscriptions"));
        assert_eq!(second.id, tx.id);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"[{"pattern": "whole foods", "category": "Groceries"},
                {"pattern": "rent", "category": "Housing", "kind": "word"}]"#,
        )
        .unwrap();

        let rules = CategoryRuleSet::from_file(&path).unwrap();
        assert_eq!(rules.rule_count(), 2);
        assert_eq!(rules.classify("WHOLE FOODS MARKET"), "Groceries");
        assert_eq!(rules.classify("CURRENT ACCOUNT FEE"), UNCATEGORIZED);

        assert!(CategoryRuleSet::from_file(dir.path().join("missing.json")).is_err());
    }
}
