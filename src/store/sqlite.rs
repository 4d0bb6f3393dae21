use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::KeyValueStore;
use crate::util::{ensure_directory, now_utc_string};

pub const STORE_SCHEMA_VERSION: &str = "0.1.0";

pub const DEVICE_NAMESPACE: &str = "device_local";
pub const SESSION_NAMESPACE: &str = "session";

pub struct SqliteStore<'c> {
    connection: &'c Connection,
    namespace: &'static str,
}

impl<'c> SqliteStore<'c> {
    pub fn new(connection: &'c Connection, namespace: &'static str) -> Self {
        Self {
            connection,
            namespace,
        }
    }
}

impl KeyValueStore for SqliteStore<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read {}/{key}", self.namespace))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.connection
            .execute(
                "
                INSERT INTO kv_entries(namespace, key, value, updated_at)
                VALUES(?1, ?2, ?3, ?4)
                ON CONFLICT(namespace, key) DO UPDATE SET
                  value=excluded.value,
                  updated_at=excluded.updated_at
                ",
                params![self.namespace, key, value, now_utc_string()],
            )
            .with_context(|| format!("failed to write {}/{key}", self.namespace))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.connection
            .execute(
                "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                params![self.namespace, key],
            )
            .with_context(|| format!("failed to remove {}/{key}", self.namespace))?;
        Ok(())
    }
}

pub fn open_store_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open store database: {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv_entries (
              namespace TEXT NOT NULL,
              key TEXT NOT NULL,
              value TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              PRIMARY KEY(namespace, key)
            );
            ",
        )
        .context("failed to create store schema")?;

    connection
        .execute(
            "
            INSERT INTO metadata(key, value) VALUES('schema_version', ?1)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            ",
            params![STORE_SCHEMA_VERSION],
        )
        .context("failed to record store schema version")?;

    Ok(())
}

pub fn namespace_counts(connection: &Connection) -> Result<Vec<(String, i64)>> {
    let mut statement = connection.prepare(
        "
        SELECT namespace, COUNT(*)
        FROM kv_entries
        GROUP BY namespace
        ORDER BY namespace ASC
        ",
    )?;

    let mut rows = statement.query([])?;
    let mut out = Vec::<(String, i64)>::new();

    while let Some(row) = rows.next()? {
        out.push((row.get(0)?, row.get(1)?));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_connection() -> Connection {
        let connection = Connection::open_in_memory().expect("open in-memory sqlite");
        ensure_schema(&connection).expect("create schema");
        connection
    }

    #[test]
    fn namespaces_do_not_share_keys() {
        let connection = memory_connection();
        let device = SqliteStore::new(&connection, DEVICE_NAMESPACE);
        let session = SqliteStore::new(&connection, SESSION_NAMESPACE);

        device.set("prescriptions", "[]").expect("device set");
        assert_eq!(session.get("prescriptions").expect("session get"), None);
        assert_eq!(
            device.get("prescriptions").expect("device get").as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn set_is_last_write_wins_and_counts_by_namespace() {
        let connection = memory_connection();
        let device = SqliteStore::new(&connection, DEVICE_NAMESPACE);
        let session = SqliteStore::new(&connection, SESSION_NAMESPACE);

        device.set("prescriptions", "[1]").expect("first write");
        device.set("prescriptions", "[2]").expect("second write");
        session.set("productFlow", "{}").expect("flow write");
        session.set("productPrescriptions", "{}").expect("session write");

        assert_eq!(
            device.get("prescriptions").expect("get").as_deref(),
            Some("[2]")
        );
        assert_eq!(
            namespace_counts(&connection).expect("counts"),
            vec![
                (DEVICE_NAMESPACE.to_string(), 1),
                (SESSION_NAMESPACE.to_string(), 2)
            ]
        );

        session.remove("productFlow").expect("remove");
        assert_eq!(session.get("productFlow").expect("get"), None);
    }
}
