//! Preference store: language and voice per visitor, keyed by identity id.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use riddlefish_types::{Language, Preference};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::StoreError;

/// Keyed record store for [`Preference`] values.
pub trait PreferenceStore: Send {
    /// Preferences recorded for `id`, if any.
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] if a record exists but cannot be decoded.
    fn get(&self, id: Uuid) -> Result<Option<Preference>, StoreError>;

    /// Insert or replace the preferences for `preference.id`.
    fn put(&mut self, preference: &Preference) -> Result<(), StoreError>;
}

/// SQLite-backed preference store.
pub struct SqlitePreferenceStore {
    conn: Connection,
}

impl SqlitePreferenceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.as_ref().display(), "preference store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS preferences (
                id         TEXT NOT NULL PRIMARY KEY,
                lang       TEXT NOT NULL,
                voice      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn get(&self, id: Uuid) -> Result<Option<Preference>, StoreError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT lang, voice FROM preferences WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((lang, voice)) => {
                let language = Language::from_code(&lang).ok_or_else(|| StoreError::Corrupt {
                    key: id.to_string(),
                    details: format!("unknown language code '{lang}'"),
                })?;
                Ok(Some(Preference {
                    id,
                    language,
                    voice,
                }))
            }
        }
    }

    fn put(&mut self, preference: &Preference) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO preferences (id, lang, voice, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 lang       = excluded.lang,
                 voice      = excluded.voice,
                 updated_at = excluded.updated_at",
            params![
                preference.id.to_string(),
                preference.language.code(),
                preference.voice,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Volatile preference store, for tests and simulation runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferenceStore {
    records: HashMap<Uuid, Preference>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, id: Uuid) -> Result<Option<Preference>, StoreError> {
        Ok(self.records.get(&id).cloned())
    }

    fn put(&mut self, preference: &Preference) -> Result<(), StoreError> {
        self.records.insert(preference.id, preference.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref(id: Uuid, language: Language, voice: &str) -> Preference {
        Preference {
            id,
            language,
            voice: voice.to_string(),
        }
    }

    #[test]
    fn missing_record_is_none() {
        let store = SqlitePreferenceStore::open_in_memory().unwrap();
        assert_eq!(store.get(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn put_then_get() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.put(&pref(id, Language::Dutch, "female_01.wav")).unwrap();
        assert_eq!(
            store.get(id).unwrap(),
            Some(pref(id, Language::Dutch, "female_01.wav"))
        );
    }

    #[test]
    fn put_upserts() {
        let mut store = SqlitePreferenceStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.put(&pref(id, Language::Dutch, "a.wav")).unwrap();
        store.put(&pref(id, Language::English, "b.wav")).unwrap();
        let got = store.get(id).unwrap().unwrap();
        assert_eq!(got.language, Language::English);
        assert_eq!(got.voice, "b.wav");
    }

    #[test]
    fn unknown_language_is_corrupt() {
        let store = SqlitePreferenceStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store
            .conn
            .execute(
                "INSERT INTO preferences (id, lang, voice, updated_at) VALUES (?1, 'xx', 'v', 'now')",
                params![id.to_string()],
            )
            .unwrap();
        assert!(matches!(store.get(id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fish.db");
        let id = Uuid::new_v4();
        {
            let mut store = SqlitePreferenceStore::open(&path).unwrap();
            store.put(&pref(id, Language::Russian, "male_02.wav")).unwrap();
        }
        let store = SqlitePreferenceStore::open(&path).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().language, Language::Russian);
    }

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryPreferenceStore::new();
        let id = Uuid::new_v4();
        assert!(store.get(id).unwrap().is_none());
        store.put(&pref(id, Language::English, "v.wav")).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().voice, "v.wav");
    }
}
