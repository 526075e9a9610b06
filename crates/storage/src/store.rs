//! Frame Store
//!
//! The writer side of persistence. A single connection is owned by the batch
//! writer; every batch runs inside one explicit transaction.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use frame_decoder::{FieldValue, Measurement};
use frame_protocol::FrameVariant;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection, Sqlite, Transaction};
use tracing::{debug, info};

use crate::schema::{TableSchema, TABLES};
use crate::StorageError;

/// `received_time` format, identical to SQLite's `datetime()` output
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Connection settings for the writer
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub path: PathBuf,
    pub busy_timeout: Duration,
    pub wal: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lop1.db"),
            busy_timeout: Duration::from_millis(1000),
            wal: true,
        }
    }
}

impl StoreOptions {
    pub(crate) fn connect_options(&self) -> SqliteConnectOptions {
        let journal = if self.wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(journal)
            .busy_timeout(self.busy_timeout)
    }
}

/// Writer connection plus the prepared insert text of every table
pub struct FrameStore {
    conn: SqliteConnection,
    inserts: HashMap<FrameVariant, String>,
}

impl FrameStore {
    /// Open (creating if needed) the database file
    pub async fn open(options: &StoreOptions) -> Result<Self, StorageError> {
        info!(path = %options.path.display(), wal = options.wal, "Opening frame store");

        let conn = options.connect_options().connect().await?;
        let inserts = TABLES
            .iter()
            .map(|table| (table.variant, table.insert_sql()))
            .collect();

        Ok(Self { conn, inserts })
    }

    /// Create every table and time index that does not exist yet
    pub async fn bootstrap(&mut self) -> Result<(), StorageError> {
        for table in TABLES.iter() {
            sqlx::query(&table.create_table_sql())
                .execute(&mut self.conn)
                .await?;
            sqlx::query(&table.create_index_sql())
                .execute(&mut self.conn)
                .await?;
            debug!(table = table.name, "Table ready");
        }
        info!("Frame store bootstrapped ({} tables)", TABLES.len());
        Ok(())
    }

    /// Start a batch transaction
    pub async fn begin(&mut self) -> Result<FrameTransaction<'_>, StorageError> {
        let tx = self.conn.begin().await?;
        Ok(FrameTransaction {
            tx,
            inserts: &self.inserts,
        })
    }

    /// Number of stored rows of a variant
    pub async fn count(&mut self, variant: FrameVariant) -> Result<i64, StorageError> {
        let table = TableSchema::for_variant(variant);
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table.name))
            .fetch_one(&mut self.conn)
            .await?;
        Ok(count)
    }

    pub async fn close(self) -> Result<(), StorageError> {
        self.conn.close().await?;
        Ok(())
    }
}

/// One open batch. Dropping it without [`commit`](Self::commit) rolls back.
pub struct FrameTransaction<'c> {
    tx: Transaction<'c, Sqlite>,
    inserts: &'c HashMap<FrameVariant, String>,
}

impl FrameTransaction<'_> {
    /// Insert one measurement and return its row id
    pub async fn insert(
        &mut self,
        device_id: &str,
        measurement: &Measurement,
    ) -> Result<i64, StorageError> {
        let variant = measurement.variant();
        let sql = self
            .inserts
            .get(&variant)
            .ok_or_else(|| StorageError::SerializationError(format!("no insert for {}", variant)))?;
        let alarms = serde_json::to_string(&measurement.alarms)?;

        let mut query = sqlx::query(sql)
            .bind(device_id.to_string())
            .bind(measurement.raw.to_hex());
        for (_, value) in measurement.fields() {
            query = match value {
                FieldValue::Integer(v) => query.bind(v),
                FieldValue::Real(v) => query.bind(v),
            };
        }
        let result = query
            .bind(alarms)
            .bind(measurement.captured_at.format(TIME_FORMAT).to_string())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }
}
