//! Schema migration runner.
//!
//! Migrations are embedded at compile time via [`include_str!`] and applied
//! in version order, each inside its own transaction. The `schema_version`
//! table tracks applied versions; rerunning the migrator is idempotent.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Chat sessions and messages with active-session uniqueness",
    sql: include_str!("v001_schema.sql"),
}];

/// Run all pending migrations on the given connection.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = current;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(
                version = migration.version,
                "migration already applied, skipping"
            );
            continue;
        }
        apply(conn, migration)?;
        applied = migration.version;
        info!(
            version = migration.version,
            description = migration.description,
            "applied migration"
        );
    }
    Ok(applied)
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL
         );",
    )?;
    Ok(())
}

fn current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0))
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let in_tx = format!(
        "BEGIN;\n{}\nINSERT INTO schema_version (version, applied_at) VALUES ({}, '{}');\nCOMMIT;",
        migration.sql,
        migration.version,
        chrono::Utc::now().to_rfc3339(),
    );
    conn.execute_batch(&in_tx).map_err(|e| StoreError::Migration {
        message: format!("v{:03} failed: {e}", migration.version),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn migrations_apply_from_scratch() {
        let c = conn();
        let version = run_migrations(&c).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migrations_are_idempotent() {
        let c = conn();
        let _ = run_migrations(&c).unwrap();
        let version = run_migrations(&c).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn schema_has_expected_tables() {
        let c = conn();
        let _ = run_migrations(&c).unwrap();
        for table in ["chat_sessions", "chat_messages", "schema_version"] {
            let exists: bool = c
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }

    #[test]
    fn active_session_uniqueness_enforced() {
        let c = conn();
        let _ = run_migrations(&c).unwrap();
        c.execute(
            "INSERT INTO chat_sessions (id, user_id, created_at, is_active) VALUES ('a','u1','t',1)",
            [],
        )
        .unwrap();
        let dup = c.execute(
            "INSERT INTO chat_sessions (id, user_id, created_at, is_active) VALUES ('b','u1','t',1)",
            [],
        );
        assert!(dup.is_err());
        // An inactive second session is allowed.
        c.execute(
            "INSERT INTO chat_sessions (id, user_id, created_at, is_active) VALUES ('c','u1','t',0)",
            [],
        )
        .unwrap();
    }
}
