use rusqlite::{OptionalExtension, Result as SqlResult, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::database::Database;

/// Persistent string key/value store, the desktop counterpart of browser
/// `localStorage`.
#[derive(Clone)]
pub struct LocalStorage {
    db: Arc<Mutex<Database>>,
}

impl LocalStorage {
    /// Open local storage at a custom path
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::with_database(Database::open(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::with_database(Database::in_memory()?)
    }

    fn with_database(db: Database) -> SqlResult<Self> {
        db.connection().execute(
            "CREATE TABLE IF NOT EXISTS local_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_item(&self, key: &str) -> SqlResult<Option<String>> {
        let db = self.lock();
        db.connection()
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn set_item(&self, key: &str, value: &str) -> SqlResult<()> {
        let db = self.lock();
        db.connection().execute(
            "INSERT OR REPLACE INTO local_storage (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> SqlResult<()> {
        let db = self.lock();
        db.connection()
            .execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local.db");

        let storage = LocalStorage::open(&path).unwrap();
        assert_eq!(storage.get_item("alumniUser").unwrap(), None);
        storage.set_item("alumniUser", "{\"id\":1}").unwrap();
        storage.set_item("alumniUser", "{\"id\":2}").unwrap();
        drop(storage);

        let storage = LocalStorage::open(&path).unwrap();
        assert_eq!(
            storage.get_item("alumniUser").unwrap().as_deref(),
            Some("{\"id\":2}")
        );
        storage.remove_item("alumniUser").unwrap();
        assert_eq!(storage.get_item("alumniUser").unwrap(), None);
    }
}
