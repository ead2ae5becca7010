// 💾 SQLite Persistence
// Ledger store keyed by fingerprint + append-only event log

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::import::ImportOutcome;
use crate::ledger::{Ledger, MergeReport};
use crate::transaction::Transaction;

/// Event for audit trail: every insert and every statement import is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Open (or create) a database file and make sure the schema exists
pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())
        .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Transactions Table (fingerprint is the identity)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            description TEXT NOT NULL,
            raw_description TEXT NOT NULL,
            source_statement_id TEXT NOT NULL,
            category TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute("CREATE INDEX IF NOT EXISTS idx_date ON transactions(date)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_statement ON transactions(source_statement_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Persist every ledger entry; rows already stored are counted as duplicates.
///
/// Saving the same ledger twice leaves the table unchanged.
pub fn save_ledger(conn: &Connection, ledger: &Ledger) -> Result<MergeReport> {
    let tx = conn.unchecked_transaction().context("Failed to begin transaction")?;
    let mut report = MergeReport::default();

    for transaction in ledger.iter() {
        let result = tx.execute(
            "INSERT INTO transactions (
                fingerprint, date, amount, currency, description,
                raw_description, source_statement_id, category
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                transaction.id,
                transaction.date.format("%Y-%m-%d").to_string(),
                transaction.amount.to_string(),
                transaction.currency,
                transaction.description,
                transaction.raw_description,
                transaction.source_statement_id,
                transaction.category,
            ],
        );

        match result {
            Ok(_) => {
                report.inserted += 1;

                let event = Event::new(
                    "transaction_added",
                    "transaction",
                    &transaction.id,
                    serde_json::json!({
                        "amount": transaction.amount.to_string(),
                        "currency": transaction.currency,
                        "source_statement_id": transaction.source_statement_id,
                    }),
                    "ledger_store",
                );
                insert_event(&tx, &event)?;
            }
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                report.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tx.commit().context("Failed to commit ledger")?;
    log::info!("saved ledger: {} inserted, {} already stored", report.inserted, report.duplicates);

    Ok(report)
}

/// Rebuild a ledger from every stored row
pub fn load_ledger(conn: &Connection) -> Result<Ledger> {
    let mut stmt = conn.prepare(
        "SELECT fingerprint, date, amount, currency, description,
                raw_description, source_statement_id, category
         FROM transactions
         ORDER BY date, fingerprint",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut ledger = Ledger::new();
    for (id, date, amount, currency, description, raw_description, source_statement_id, category) in rows {
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("Invalid stored date '{}' for {}", date, id))?;
        let amount =
            Decimal::from_str(&amount).with_context(|| format!("Invalid stored amount '{}' for {}", amount, id))?;

        ledger.insert(Transaction {
            id,
            date,
            amount,
            currency,
            description,
            raw_description,
            source_statement_id,
            category,
        });
    }

    Ok(ledger)
}

/// Audit one statement import, successful or rejected
pub fn record_import(conn: &Connection, statement_id: &str, outcome: &ImportOutcome) -> Result<()> {
    let event = match outcome {
        Ok(report) => Event::new(
            "statement_imported",
            "statement",
            statement_id,
            serde_json::json!({
                "layout": report.import.layout,
                "transactions": report.import.transactions.len(),
                "skipped": report.import.skipped,
                "inserted": report.merge.inserted,
                "duplicates": report.merge.duplicates,
            }),
            "importer",
        ),
        Err(err) => Event::new(
            "statement_rejected",
            "statement",
            statement_id,
            serde_json::json!({ "error": err.to_string() }),
            "importer",
        ),
    };

    insert_event(conn, &event)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(conn: &Connection, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
            Ok(Event {
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .with_context(|| format!("Invalid event timestamp '{}'", timestamp))?
                    .with_timezone(&Utc),
                data: serde_json::from_str(&data).context("Invalid event data JSON")?,
                event_id,
                event_type,
                entity_type,
                entity_id,
                actor,
            })
        })
        .collect()
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;

    fn create_test_transaction(date: &str, description: &str, cents: i64, category: &str) -> Transaction {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let amount = Decimal::new(cents, 2);
        Transaction {
            id: Transaction::fingerprint(date, amount, description),
            date,
            amount,
            currency: "USD".to_string(),
            description: description.to_string(),
            raw_description: description.to_string(),
            source_statement_id: "test.csv".to_string(),
            category: Some(category.to_string()),
        }
    }

    fn sample_ledger() -> Ledger {
        Ledger::from_transactions(vec![
            create_test_transaction("2024-12-31", "STARBUCKS #12345", -4599, "Dining"),
            create_test_transaction("2024-12-30", "AMAZON PURCHASE", -12050, "Shopping"),
            create_test_transaction("2024-12-29", "SALARY DEPOSIT", 200000, "Income"),
        ])
    }

    #[test]
    fn test_idempotency_save_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let ledger = sample_ledger();

        let first = save_ledger(&conn, &ledger).unwrap();
        assert_eq!(first, MergeReport { inserted: 3, duplicates: 0 });
        assert_eq!(verify_count(&conn).unwrap(), 3);

        let second = save_ledger(&conn, &ledger).unwrap();
        assert_eq!(second, MergeReport { inserted: 0, duplicates: 3 });
        assert_eq!(verify_count(&conn).unwrap(), 3);
    }

    #[test]
    fn test_load_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let ledger = sample_ledger();
        save_ledger(&conn, &ledger).unwrap();

        let loaded = load_ledger(&conn).unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.iter().next().unwrap().description, "SALARY DEPOSIT");
        assert_eq!(loaded.iter().last().unwrap().amount, Decimal::new(-4599, 2));
    }

    #[test]
    fn test_open_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let conn = open_database(&path).unwrap();
            save_ledger(&conn, &sample_ledger()).unwrap();
        }

        let conn = open_database(&path).unwrap();
        assert_eq!(load_ledger(&conn).unwrap().len(), 3);
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "test_event",
            "transaction",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "transaction", "test_id_123").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data["test"], "data");
    }

    #[test]
    fn test_insert_and_rejection_are_audited() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let ledger = sample_ledger();
        save_ledger(&conn, &ledger).unwrap();
        let id = &ledger.iter().next().unwrap().id;
        let events = get_events_for_entity(&conn, "transaction", id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "transaction_added");

        let outcome: ImportOutcome = Err(ImportError::unrecognized(None, 0.0, 0.6));
        record_import(&conn, "garbled.txt", &outcome).unwrap();
        let events = get_events_for_entity(&conn, "statement", "garbled.txt").unwrap();
        assert_eq!(events[0].event_type, "statement_rejected");
    }
}
