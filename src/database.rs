use std::collections::BTreeSet;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::LibSchemaError;

const CREATE_TRACKING_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app TEXT NOT NULL,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL,   -- UTC, RFC 3339
    UNIQUE (app, name)
);
"#;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self, LibSchemaError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!(
                        "Database folder '{}' does not exist or is not a directory",
                        parent.display()
                    ),
                )
                .into());
            }
        }

        let conn = Connection::open(db_path)?;
        info!("Database opened at: {}", db_path.display());

        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, LibSchemaError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on error.
    pub fn immediate_transaction<T, F>(conn: &Connection, f: F) -> Result<T, LibSchemaError>
    where
        F: FnOnce(&Connection) -> Result<T, LibSchemaError>,
    {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    log::error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    pub fn ensure_tracking_table(conn: &Connection) -> Result<(), LibSchemaError> {
        conn.execute_batch(CREATE_TRACKING_TABLE_SQL)?;
        Ok(())
    }

    pub fn applied_migrations(conn: &Connection) -> Result<BTreeSet<(String, String)>, LibSchemaError> {
        let mut stmt = conn.prepare("SELECT app, name FROM schema_migrations")?;
        let applied = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(applied)
    }

    pub fn is_applied(conn: &Connection, app: &str, name: &str) -> Result<bool, LibSchemaError> {
        Ok(Self::applied_at(conn, app, name)?.is_some())
    }

    pub fn applied_at(
        conn: &Connection,
        app: &str,
        name: &str,
    ) -> Result<Option<String>, LibSchemaError> {
        let applied_at = conn
            .query_row(
                "SELECT applied_at FROM schema_migrations WHERE app = ? AND name = ?",
                params![app, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(applied_at)
    }

    pub fn record_applied(conn: &Connection, app: &str, name: &str) -> Result<(), LibSchemaError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        conn.execute(
            "INSERT INTO schema_migrations (app, name, applied_at) VALUES (?, ?, ?)",
            params![app, name, now],
        )?;
        Ok(())
    }

    /// `(name, sql)` of every schema object except SQLite internals, ordered by
    /// name. Two databases with equal snapshots have the same schema.
    #[cfg(test)]
    pub fn schema_snapshot(conn: &Connection) -> Result<Vec<(String, String)>, LibSchemaError> {
        let mut stmt = conn.prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let snapshot = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_query_applied() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        Database::ensure_tracking_table(conn).unwrap();
        Database::ensure_tracking_table(conn).unwrap();

        assert!(!Database::is_applied(conn, "library", "0001_initial").unwrap());
        Database::record_applied(conn, "library", "0001_initial").unwrap();
        assert!(Database::is_applied(conn, "library", "0001_initial").unwrap());

        let applied = Database::applied_migrations(conn).unwrap();
        assert_eq!(applied.len(), 1);
        assert!(applied.contains(&("library".to_owned(), "0001_initial".to_owned())));

        let applied_at = Database::applied_at(conn, "library", "0001_initial")
            .unwrap()
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&applied_at).is_ok());
    }

    #[test]
    fn test_record_twice_fails() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        Database::ensure_tracking_table(conn).unwrap();
        Database::record_applied(conn, "library", "0001_initial").unwrap();
        assert!(Database::record_applied(conn, "library", "0001_initial").is_err());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        Database::ensure_tracking_table(conn).unwrap();

        let result: Result<(), LibSchemaError> = Database::immediate_transaction(conn, |c| {
            Database::record_applied(c, "library", "0001_initial")?;
            Err(LibSchemaError::Error("boom".to_owned()))
        });

        assert!(result.is_err());
        assert!(!Database::is_applied(conn, "library", "0001_initial").unwrap());
    }

    #[test]
    fn test_open_in_missing_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("library.db");
        assert!(matches!(
            Database::open(&path),
            Err(LibSchemaError::IoError(_))
        ));
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let db = Database::open(&path).unwrap();
        Database::ensure_tracking_table(db.conn()).unwrap();
        assert!(path.exists());
        assert_eq!(
            Database::schema_snapshot(db.conn()).unwrap()[0].0,
            "schema_migrations"
        );
    }
}
