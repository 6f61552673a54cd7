use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{PersistedRecord, PersistedSnapshot, PersistenceBackend};
use crate::error::GossipStoreError;

/// SQLite-backed snapshot. One row per entry, keyed by sequence, plus a
/// `meta` row holding the next sequence to issue.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GossipStoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, GossipStoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, GossipStoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS payloads (
                sequence INTEGER PRIMARY KEY,
                type_discriminant INTEGER NOT NULL,
                version INTEGER NOT NULL,
                body BLOB NOT NULL,
                received_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }
}

impl PersistenceBackend for SqliteBackend {
    fn load(&mut self) -> Result<PersistedSnapshot, GossipStoreError> {
        let next_sequence = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'next_sequence'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .unwrap_or(0) as u64;

        let mut stmt = self.conn.prepare(
            "SELECT sequence, type_discriminant, version, body, received_at
             FROM payloads ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PersistedRecord {
                sequence: row.get::<_, i64>(0)? as u64,
                type_discriminant: row.get(1)?,
                version: row.get(2)?,
                body: row.get(3)?,
                received_at: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(count = records.len(), next_sequence, "loaded persisted payloads");
        Ok(PersistedSnapshot {
            next_sequence,
            records,
        })
    }

    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<(), GossipStoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM payloads", [])?;
        tx.execute(
            "INSERT INTO meta (key, value) VALUES ('next_sequence', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![snapshot.next_sequence as i64],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO payloads (sequence, type_discriminant, version, body, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in &snapshot.records {
                stmt.execute(params![
                    record.sequence as i64,
                    record.type_discriminant,
                    record.version,
                    record.body,
                    record.received_at as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn compact(&mut self) -> Result<(), GossipStoreError> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}
