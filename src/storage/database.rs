use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;

use super::ensure_parent_dir;

/// Base database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let path = path.as_ref();
        if let Err(err) = ensure_parent_dir(path) {
            log::warn!("Unable to create directory for {}: {err}", path.display());
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
