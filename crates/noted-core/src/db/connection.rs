use std::path::Path;

use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::migrations;
use crate::error::Result;

const IN_MEMORY: &str = ":memory:";

/// A migrated libSQL connection. The database handle is kept alive alongside
/// the connection.
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open or create the database file, then migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let location = path.as_ref().to_string_lossy().into_owned();
        Self::open_at(&location).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open_at(IN_MEMORY).await
    }

    async fn open_at(location: &str) -> Result<Self> {
        let db = Builder::new_local(location).build().await?;
        let conn = db.connect()?;
        if location != IN_MEMORY {
            // Tuning only; unsupported pragmas are ignored.
            for pragma in ["PRAGMA journal_mode = WAL;", "PRAGMA synchronous = NORMAL;"] {
                if let Err(error) = conn.execute(pragma, ()).await {
                    tracing::debug!("Ignoring pragma failure ({pragma}): {error}");
                }
            }
        }
        migrations::run(&conn).await?;
        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
