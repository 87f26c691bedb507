mod load;
mod read;
mod schema;

use std::path::Path;

use anyhow::{bail, Context};
use rusqlite::Connection;

pub use load::LoadReport;
pub use read::TripSegment;

/// The relational copy of a cleaned feed. Owned by a single stage for the length of one run.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens or creates the database file. Used by the loader, which replaces any existing
    /// tables.
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to create database {}", path.display()))?;
        Ok(Self { conn })
    }

    /// Opens an existing database. A missing file is an error, not an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!(
                "Database {} not found. Run the load stage first.",
                path.display()
            );
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn count(&self, table: &str) -> anyhow::Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("Failed to count rows of {table}"))?;
        Ok(n as usize)
    }
}
