use crate::BoxError;
use crate::sheet::RowCollection;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

/// Local state: the last ticket sheet snapshot and which messages and form
/// rows have already been answered.
pub struct TicketStore {
    conn: Connection,
}

impl TicketStore {
    /// Open (or create) the SQLite store at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        // Single-row table holding the serialized sheet snapshot
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sheet_cache (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                fetched_at INTEGER NOT NULL,
                rows_json TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS processed_messages (
                uid TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                ticket TEXT,
                outcome TEXT NOT NULL,
                processed_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS processed_form_rows (
                row_id TEXT PRIMARY KEY,
                ticket TEXT,
                processed_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Generate a unique ID from message_id, received timestamp, and sender
    pub fn generate_uid(message_id: &str, received: &str, sender: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(message_id.as_bytes());
        hasher.update(received.as_bytes());
        hasher.update(sender.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Replace the cached sheet snapshot.
    pub fn save_rows(&self, rows: &RowCollection) -> Result<(), BoxError> {
        let json = serde_json::to_string(rows)?;
        self.conn.execute(
            "INSERT INTO sheet_cache (id, fetched_at, rows_json)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                fetched_at = excluded.fetched_at,
                rows_json = excluded.rows_json,
                updated_at = CURRENT_TIMESTAMP",
            params![rows.fetched_at, json],
        )?;
        info!(rows = rows.len(), fetched_at = rows.fetched_at, "Sheet cache saved");
        Ok(())
    }

    /// Last saved snapshot. A corrupt cache is treated as no cache.
    pub fn load_rows(&self) -> SqliteResult<Option<RowCollection>> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT rows_json FROM sheet_cache WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(json.and_then(|j| match serde_json::from_str(&j) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable sheet cache");
                None
            }
        }))
    }

    pub fn mark_message_processed(
        &self,
        uid: &str,
        message_id: &str,
        ticket: Option<&str>,
        outcome: &str,
    ) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO processed_messages (uid, message_id, ticket, outcome)
             VALUES (?1, ?2, ?3, ?4)",
            params![uid, message_id, ticket, outcome],
        )?;
        info!(uid = %uid, outcome = %outcome, "Message marked as processed");
        Ok(())
    }

    pub fn is_message_processed(&self, uid: &str) -> SqliteResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processed_messages WHERE uid = ?1",
            params![uid],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn mark_form_row_processed(&self, row_id: &str, ticket: &str) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO processed_form_rows (row_id, ticket) VALUES (?1, ?2)",
            params![row_id, ticket],
        )?;
        info!(row_id = %row_id, ticket = %ticket, "Form row marked as processed");
        Ok(())
    }

    pub fn is_form_row_processed(&self, row_id: &str) -> SqliteResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processed_form_rows WHERE row_id = ?1",
            params![row_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// (cached sheet rows, processed messages, processed form rows)
    pub fn get_counts(&self) -> Result<(usize, i64, i64), BoxError> {
        let cached = self.load_rows()?.map(|r| r.len()).unwrap_or(0);
        let messages: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM processed_messages", [], |row| row.get(0))?;
        let forms: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM processed_form_rows", [], |row| row.get(0))?;
        Ok((cached, messages, forms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetRow;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> RowCollection {
        RowCollection::new(
            vec!["ticket number".into(), "site".into()],
            vec![
                SheetRow::new(Some(11))
                    .with("ticket number", json!(123456.0))
                    .with("site", "Depot"),
                SheetRow::new(Some(12)).with("ticket number", "654321"),
            ],
            1_700_000_000,
        )
    }

    #[test]
    fn test_uid_is_stable() {
        let a = TicketStore::generate_uid("id1", "2025-01-01T00:00:00Z", "x@y");
        let b = TicketStore::generate_uid("id1", "2025-01-01T00:00:00Z", "x@y");
        let c = TicketStore::generate_uid("id2", "2025-01-01T00:00:00Z", "x@y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_rows_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = TicketStore::new(&path).unwrap();
            assert!(store.load_rows().unwrap().is_none());
            store.save_rows(&sample()).unwrap();
        }
        let store = TicketStore::new(&path).unwrap();
        let loaded = store.load_rows().unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.find("123456").unwrap().site(), "Depot");
    }

    #[test]
    fn test_save_replaces_snapshot() {
        let store = TicketStore::in_memory().unwrap();
        store.save_rows(&sample()).unwrap();
        store.save_rows(&RowCollection::default()).unwrap();
        assert!(store.load_rows().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_processed_tracking() {
        let store = TicketStore::in_memory().unwrap();
        assert!(!store.is_message_processed("u1").unwrap());
        store.mark_message_processed("u1", "m1", Some("123456"), "report").unwrap();
        assert!(store.is_message_processed("u1").unwrap());

        assert!(!store.is_form_row_processed("7").unwrap());
        store.mark_form_row_processed("7", "123456").unwrap();
        store.mark_form_row_processed("7", "123456").unwrap();
        assert!(store.is_form_row_processed("7").unwrap());

        let (cached, messages, forms) = store.get_counts().unwrap();
        assert_eq!((cached, messages, forms), (0, 1, 1));
    }
}
