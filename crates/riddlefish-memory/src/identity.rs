//! Identity store.
//!
//! Persists every enrolled visitor together with the face encoding used to
//! recognise them again.  Identities are loaded back in the order they were
//! first inserted, which is the order the presence tracker matches them in.
//!
//! # Storage layout
//!
//! | column      | type    | description                                    |
//! |-------------|---------|------------------------------------------------|
//! | seq         | INTEGER | insertion order                                |
//! | id          | TEXT    | UUID v4, unique                                |
//! | age_bucket  | TEXT    | age label from the attribute classifier        |
//! | confidence  | REAL    | face detection confidence at enrollment        |
//! | encoding    | BLOB    | Little-endian f32 vector (4 × N bytes)         |
//! | created_at  | TEXT    | RFC-3339 creation time (UTC)                   |
//!
//! # Example
//!
//! ```rust
//! use riddlefish_memory::identity::{IdentityStore, SqliteIdentityStore};
//! use riddlefish_types::{Attributes, Identity};
//!
//! let mut store = SqliteIdentityStore::open_in_memory().unwrap();
//! let who = Identity::new(
//!     Attributes { age_bucket: "(8-12)".into(), confidence: 0.5 },
//!     vec![0.1, 0.2, 0.3],
//! );
//! store.put(&who).unwrap();
//! assert_eq!(store.load_all().unwrap(), vec![who]);
//! ```

use std::path::Path;

use chrono::Utc;
use riddlefish_types::{Attributes, Identity};
use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::StoreError;

/// Keyed record store for [`Identity`] values.
pub trait IdentityStore: Send {
    /// Every stored identity, oldest first.
    fn load_all(&self) -> Result<Vec<Identity>, StoreError>;

    /// Insert `identity`, or overwrite the record with the same id in place.
    ///
    /// # Errors
    ///
    /// [`StoreError::EmptyEncoding`] if the identity carries no encoding.
    fn put(&mut self, identity: &Identity) -> Result<(), StoreError>;
}

pub(crate) fn encoding_to_bytes(encoding: &[f32]) -> Vec<u8> {
    encoding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn bytes_to_encoding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed identity store.
pub struct SqliteIdentityStore {
    conn: Connection,
}

impl SqliteIdentityStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.as_ref().display(), "identity store opened");
        Ok(store)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identities (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT NOT NULL UNIQUE,
                age_bucket TEXT NOT NULL,
                confidence REAL NOT NULL,
                encoding   BLOB NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn load_all(&self) -> Result<Vec<Identity>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, age_bucket, confidence, encoding
             FROM identities
             ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let age_bucket: String = row.get(1)?;
            let confidence: f64 = row.get(2)?;
            let blob: Vec<u8> = row.get(3)?;
            Ok((id, age_bucket, confidence, blob))
        })?;

        let mut identities = Vec::new();
        for row in rows {
            let (id_str, age_bucket, confidence, blob) = row?;
            let id = Uuid::parse_str(&id_str).map_err(|e| StoreError::Corrupt {
                key: id_str.clone(),
                details: e.to_string(),
            })?;
            identities.push(Identity {
                id,
                attributes: Attributes {
                    age_bucket,
                    confidence: confidence as f32,
                },
                encoding: bytes_to_encoding(&blob),
            });
        }
        Ok(identities)
    }

    fn put(&mut self, identity: &Identity) -> Result<(), StoreError> {
        if !identity.is_matchable() {
            return Err(StoreError::EmptyEncoding(identity.id));
        }
        self.conn.execute(
            "INSERT INTO identities (id, age_bucket, confidence, encoding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 age_bucket = excluded.age_bucket,
                 confidence = excluded.confidence,
                 encoding   = excluded.encoding",
            params![
                identity.id.to_string(),
                identity.attributes.age_bucket,
                identity.attributes.confidence as f64,
                encoding_to_bytes(&identity.encoding),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Volatile identity store, for tests and simulation runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryIdentityStore {
    identities: Vec<Identity>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load_all(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.identities.clone())
    }

    fn put(&mut self, identity: &Identity) -> Result<(), StoreError> {
        if !identity.is_matchable() {
            return Err(StoreError::EmptyEncoding(identity.id));
        }
        match self.identities.iter_mut().find(|i| i.id == identity.id) {
            Some(existing) => *existing = identity.clone(),
            None => self.identities.push(identity.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_identity(age: &str, encoding: Vec<f32>) -> Identity {
        Identity::new(
            Attributes {
                age_bucket: age.to_string(),
                confidence: 0.75,
            },
            encoding,
        )
    }

    #[test]
    fn encoding_bytes_roundtrip() {
        let original = vec![1.5f32, -0.25, 0.0, 42.0];
        assert_eq!(bytes_to_encoding(&encoding_to_bytes(&original)), original);
    }

    #[test]
    fn load_preserves_insertion_order() {
        let mut store = SqliteIdentityStore::open_in_memory().unwrap();
        let ids: Vec<Identity> = (0..4)
            .map(|i| make_identity("(25-32)", vec![i as f32, 1.0]))
            .collect();
        for identity in &ids {
            store.put(identity).unwrap();
        }
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, ids);
    }

    #[test]
    fn put_same_id_keeps_position() {
        let mut store = SqliteIdentityStore::open_in_memory().unwrap();
        let mut first = make_identity("(4-6)", vec![1.0, 0.0]);
        let second = make_identity("(8-12)", vec![0.0, 1.0]);
        store.put(&first).unwrap();
        store.put(&second).unwrap();
        first.attributes.age_bucket = "(8-12)".to_string();
        store.put(&first).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[0].attributes.age_bucket, "(8-12)");
    }

    #[test]
    fn empty_encoding_is_rejected() {
        let mut store = SqliteIdentityStore::open_in_memory().unwrap();
        let err = store.put(&make_identity("(4-6)", vec![])).unwrap_err();
        assert!(matches!(err, StoreError::EmptyEncoding(_)));
        assert!(store.load_all().unwrap().is_empty());

        let mut mem = MemoryIdentityStore::new();
        assert!(mem.put(&make_identity("(4-6)", vec![])).is_err());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fish.db");
        let who = make_identity("(60-100)", vec![0.5, 0.25, 0.125]);
        {
            let mut store = SqliteIdentityStore::open(&path).unwrap();
            store.put(&who).unwrap();
        }
        let store = SqliteIdentityStore::open(&path).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![who]);
    }

    #[test]
    fn memory_store_upserts_in_place() {
        let mut store = MemoryIdentityStore::new();
        let mut a = make_identity("(4-6)", vec![1.0]);
        let b = make_identity("(8-12)", vec![2.0]);
        store.put(&a).unwrap();
        store.put(&b).unwrap();
        a.encoding = vec![3.0];
        store.put(&a).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded[0].encoding, vec![3.0]);
        assert_eq!(loaded[1].id, b.id);
    }
}
