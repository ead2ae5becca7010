// 📒 Ledger & Merger
// Date-ordered set of transactions, unique by fingerprint

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::rules::{categorize, CategoryRuleSet};
use crate::transaction::Transaction;

/// What one merge call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub inserted: usize,
    /// Incoming transactions whose fingerprint was already present
    pub duplicates: usize,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.inserted + self.duplicates
    }
}

/// Ledger - canonical, deduplicated transactions ordered by date.
///
/// Ties on date are ordered by fingerprint so iteration order depends only on
/// the set of transactions, never on insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    entries: BTreeMap<(NaiveDate, String), Transaction>,
    index: HashMap<String, NaiveDate>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger {
            entries: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_transactions<I: IntoIterator<Item = Transaction>>(transactions: I) -> Self {
        let mut ledger = Ledger::new();
        ledger.merge(transactions);
        ledger
    }

    /// Insert unless the fingerprint is already present (existing entry wins).
    pub fn insert(&mut self, transaction: Transaction) -> bool {
        if self.index.contains_key(&transaction.id) {
            log::debug!("duplicate fingerprint {} ({})", &transaction.id[..12.min(transaction.id.len())], transaction.description);
            return false;
        }
        self.index.insert(transaction.id.clone(), transaction.date);
        self.entries.insert((transaction.date, transaction.id.clone()), transaction);
        true
    }

    /// Merge incoming transactions; re-merging the same input is a no-op.
    pub fn merge<I: IntoIterator<Item = Transaction>>(&mut self, incoming: I) -> MergeReport {
        let mut report = MergeReport::default();
        for transaction in incoming {
            if self.insert(transaction) {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
        }
        report
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        let date = self.index.get(id)?;
        self.entries.get(&(*date, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transactions in date order
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.values()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.entries.values().cloned().collect()
    }

    /// Transactions dated within `[start, end]`
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = &Transaction> {
        self.entries
            .range((start, String::new())..)
            .take_while(move |((date, _), _)| *date <= end)
            .map(|(_, tx)| tx)
    }

    /// Re-run the categorizer over every entry (rules changed)
    pub fn recategorize(&mut self, rules: &CategoryRuleSet) {
        for transaction in self.entries.values_mut() {
            *transaction = categorize(transaction.clone(), rules);
        }
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Transaction;
    type IntoIter = std::collections::btree_map::Values<'a, (NaiveDate, String), Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// Functional form: `merge(existing, incoming) -> ledger`
pub fn merge<I: IntoIterator<Item = Transaction>>(existing: Ledger, incoming: I) -> Ledger {
    let mut ledger = existing;
    ledger.merge(incoming);
    ledger
}

// ============================================================================
// SHARED LEDGER
// ============================================================================

/// Ledger shared by parallel import workers.
///
/// Each `merge` is one critical section, so two statements carrying the same
/// fingerprint cannot both insert it.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        SharedLedger {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// A panicked writer cannot leave a half-merged entry behind (inserts are
    /// single map operations), so a poisoned lock is still usable.
    pub fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn merge<I: IntoIterator<Item = Transaction>>(&self, incoming: I) -> MergeReport {
        self.lock().merge(incoming)
    }

    pub fn snapshot(&self) -> Ledger {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
