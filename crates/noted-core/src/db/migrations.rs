//! Versioned schema migrations for the local note database.

use libsql::Connection;

use crate::error::Result;

struct Migration {
    version: i32,
    statements: &'static [&'static str],
}

/// Applied in order; each migration runs in its own transaction.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[
        // Values are whole-collection JSON blobs keyed by storage key
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    ],
}];

pub async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        (),
    )
    .await?;

    let current = schema_version(conn).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration).await?;
        tracing::info!(version = migration.version, "Applied local database migration");
    }
    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute("BEGIN", ()).await?;
    let result = apply_statements(conn, migration).await;
    match result {
        Ok(()) => {
            conn.execute("COMMIT", ()).await?;
            Ok(())
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}

async fn apply_statements(conn: &Connection, migration: &Migration) -> Result<()> {
    for statement in migration.statements {
        conn.execute(statement, ()).await?;
    }
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [migration.version],
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn memory_connection() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    fn latest_version() -> i32 {
        MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_brings_schema_to_latest_version_once() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(schema_version(&conn).await.unwrap(), latest_version());

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let applied: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(applied, i64::try_from(MIGRATIONS.len()).unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kv_table_accepts_upserts() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();

        for value in ["first", "second"] {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('k', ?1, 0)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [value],
            )
            .await
            .unwrap();
        }

        let mut rows = conn
            .query("SELECT value FROM kv WHERE key = 'k'", ())
            .await
            .unwrap();
        let value: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(value, "second");
    }
}
