//! SQLite-backed policy persistence with durable, transactional writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::store::{PolicyPersistence, PolicyStoreError, StoreResult, ValueRecord};

/// Persistent backend storing one row per `(state, action)` pair.
///
/// Rows round-trip exactly: a load followed by a save reproduces identical
/// content modulo the `last_updated` stamp of rows touched in between.
#[derive(Debug)]
pub struct SqlitePolicyStore {
    db_path: PathBuf,
}

impl SqlitePolicyStore {
    /// Creates a SQLite backend at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS policy_values (
                state TEXT NOT NULL,
                action TEXT NOT NULL,
                estimate REAL NOT NULL,
                visit_count INTEGER NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (state, action)
            );
            "#,
        )?;
        Ok(())
    }
}

impl PolicyPersistence for SqlitePolicyStore {
    /// Loads every valid row; malformed rows are skipped with a warning so
    /// startup never aborts on a damaged table.
    fn load(&self) -> StoreResult<Vec<ValueRecord>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT state, action, estimate, visit_count, last_updated
            FROM policy_values
            ORDER BY state, action
            "#,
        )?;

        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (state, action, estimate, visit_count, last_updated) = row?;
            match validate_row(state, action, estimate, visit_count, &last_updated) {
                Ok(record) => records.push(record),
                Err(error) => {
                    tracing::warn!(%error, "skipping malformed policy row");
                }
            }
        }
        Ok(records)
    }

    fn save_record(&self, record: &ValueRecord) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        upsert_record(&transaction, record)?;
        transaction.commit()?;
        Ok(())
    }

    fn save_all(&self, records: &[ValueRecord]) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        transaction.execute("DELETE FROM policy_values", [])?;
        for record in records {
            upsert_record(&transaction, record)?;
        }
        transaction.commit()?;
        Ok(())
    }
}

fn upsert_record(connection: &Connection, record: &ValueRecord) -> StoreResult<()> {
    connection.execute(
        r#"
        INSERT OR REPLACE INTO policy_values (state, action, estimate, visit_count, last_updated)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            record.state,
            record.action,
            record.estimate,
            i64::try_from(record.visit_count).unwrap_or(i64::MAX),
            timestamp_to_db(record.last_updated),
        ],
    )?;
    Ok(())
}

fn validate_row(
    state: String,
    action: String,
    estimate: f64,
    visit_count: i64,
    last_updated: &str,
) -> StoreResult<ValueRecord> {
    if !estimate.is_finite() {
        return Err(PolicyStoreError::InvalidPersistedValue {
            field: "estimate",
            value: estimate.to_string(),
        });
    }
    let visit_count = u64::try_from(visit_count).map_err(|_| {
        PolicyStoreError::InvalidPersistedValue {
            field: "visit_count",
            value: visit_count.to_string(),
        }
    })?;
    let last_updated = timestamp_from_db(last_updated)?;
    Ok(ValueRecord {
        state,
        action,
        estimate,
        visit_count,
        last_updated,
    })
}

fn timestamp_to_db(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn timestamp_from_db(raw: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
