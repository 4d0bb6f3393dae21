use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::{
    DEVICE_NAMESPACE, DEVICE_PRESCRIPTIONS_KEY, SqliteStore, load_device_prescriptions,
    namespace_counts,
};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args.store.db_path();

    info!(cache_root = %args.store.cache_root().display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "store database missing");
        return Ok(());
    }

    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let schema_version = query_schema_version(&conn).unwrap_or_default();
    info!(
        path = %db_path.display(),
        schema_version = %schema_version.unwrap_or_default(),
        "database status"
    );

    for (namespace, entries) in namespace_counts(&conn).unwrap_or_default() {
        info!(namespace = %namespace, entries, "store namespace");
    }

    let device_prescriptions =
        load_device_prescriptions(&SqliteStore::new(&conn, DEVICE_NAMESPACE));
    info!(
        key = DEVICE_PRESCRIPTIONS_KEY,
        records = device_prescriptions.len(),
        "device prescriptions"
    );

    Ok(())
}

fn query_schema_version(conn: &Connection) -> Result<Option<String>> {
    let version = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}
