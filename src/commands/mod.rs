pub mod checkout;
pub mod coalesce;
pub mod resolve;
pub mod save;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cli::StoreArgs;
use crate::model::{CartLine, JsonMap, PrescriptionRecord};
use crate::store::{
    DEVICE_NAMESPACE, KeyValueStore, MemoryStore, SESSION_NAMESPACE, SqliteStore,
    open_store_connection,
};
use crate::util::read_json_file;

pub enum OpenedStores {
    Sqlite(Connection),
    Memory {
        device: MemoryStore,
        session: MemoryStore,
    },
}

impl OpenedStores {
    pub fn open_existing(args: &StoreArgs) -> Result<Self> {
        let db_path = args.db_path();
        if !db_path.exists() {
            warn!(path = %db_path.display(), "store database missing; using empty stores");
            return Ok(Self::Memory {
                device: MemoryStore::new(),
                session: MemoryStore::new(),
            });
        }

        Self::open_or_create(args)
    }

    pub fn open_or_create(args: &StoreArgs) -> Result<Self> {
        let db_path = args.db_path();
        let connection = open_store_connection(&db_path)?;
        debug!(path = %db_path.display(), "opened store database");
        Ok(Self::Sqlite(connection))
    }

    pub fn device(&self) -> StoreHandle<'_> {
        match self {
            Self::Sqlite(connection) => {
                StoreHandle::Sqlite(SqliteStore::new(connection, DEVICE_NAMESPACE))
            }
            Self::Memory { device, .. } => StoreHandle::Memory(device),
        }
    }

    pub fn session(&self) -> StoreHandle<'_> {
        match self {
            Self::Sqlite(connection) => {
                StoreHandle::Sqlite(SqliteStore::new(connection, SESSION_NAMESPACE))
            }
            Self::Memory { session, .. } => StoreHandle::Memory(session),
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Sqlite(_))
    }
}

pub enum StoreHandle<'a> {
    Sqlite(SqliteStore<'a>),
    Memory(&'a MemoryStore),
}

impl KeyValueStore for StoreHandle<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Self::Sqlite(store) => store.get(key),
            Self::Memory(store) => store.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.set(key, value),
            Self::Memory(store) => store.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.remove(key),
            Self::Memory(store) => store.remove(key),
        }
    }
}

pub fn load_cart_lines(path: &Path) -> Result<Vec<CartLine>> {
    let document = read_json_file::<Value>(path)?;
    let Some(entries) = cart_entries(document) else {
        bail!(
            "cart file has no line list (expected an array or a `cart` field): {}",
            path.display()
        );
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<CartLine>(entry)
                .with_context(|| format!("invalid cart line #{index} in {}", path.display()))
        })
        .collect()
}

pub fn load_remote_history(path: &Path) -> Result<Vec<PrescriptionRecord>> {
    let document = read_json_file::<Value>(path)?;
    let Some(entries) = history_entries(document) else {
        bail!("history file has no prescription list: {}", path.display());
    };

    let total = entries.len();
    let records = entries
        .into_iter()
        .filter_map(PrescriptionRecord::from_value)
        .collect::<Vec<PrescriptionRecord>>();
    if records.len() < total {
        warn!(
            path = %path.display(),
            skipped = total - records.len(),
            "ignored non-object history entries"
        );
    }
    Ok(records)
}

pub fn load_record(path: &Path) -> Result<PrescriptionRecord> {
    let document = read_json_file::<Value>(path)?;
    match PrescriptionRecord::from_value(document) {
        Some(record) => Ok(record),
        None => bail!("prescription record must be a json object: {}", path.display()),
    }
}

pub fn load_object(path: &Path) -> Result<JsonMap> {
    match read_json_file::<Value>(path)? {
        Value::Object(fields) => Ok(fields),
        _ => bail!("expected a json object: {}", path.display()),
    }
}

fn cart_entries(document: Value) -> Option<Vec<Value>> {
    match document {
        Value::Array(entries) => Some(entries),
        Value::Object(mut fields) => match fields.remove("cart") {
            Some(Value::Array(entries)) => Some(entries),
            _ => match fields.remove("data") {
                Some(Value::Array(entries)) => Some(entries),
                Some(data @ Value::Object(_)) => cart_entries(data),
                _ => None,
            },
        },
        _ => None,
    }
}

fn history_entries(document: Value) -> Option<Vec<Value>> {
    match document {
        Value::Array(entries) => Some(entries),
        Value::Object(mut fields) => match fields.remove("prescriptions") {
            Some(Value::Array(entries)) => Some(entries),
            _ => match fields.remove("data") {
                Some(Value::Array(entries)) => Some(entries),
                Some(data @ Value::Object(_)) => history_entries(data),
                _ => None,
            },
        },
        _ => None,
    }
}
