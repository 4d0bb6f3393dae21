use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::coalescer::PdMode;
use crate::engine::identity::{
    DEVICE_LOCAL_LINE_PATHS, PRODUCT_SKU_PATHS, declared_id, names_id,
};
use crate::model::{JsonMap, PrescriptionRecord};
use crate::util::now_epoch_millis;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{
    DEVICE_NAMESPACE, SESSION_NAMESPACE, SqliteStore, namespace_counts, open_store_connection,
};

pub const DEVICE_PRESCRIPTIONS_KEY: &str = "prescriptions";
pub const SESSION_PRESCRIPTIONS_KEY: &str = "productPrescriptions";
pub const SELECTION_FLOW_KEY: &str = "productFlow";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub fn load_device_prescriptions(store: &dyn KeyValueStore) -> Vec<PrescriptionRecord> {
    match read_document(store, DEVICE_PRESCRIPTIONS_KEY) {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(PrescriptionRecord::from_value)
            .collect(),
        Some(_) => {
            warn!(
                key = DEVICE_PRESCRIPTIONS_KEY,
                "store document is not a list; treating as empty"
            );
            Vec::new()
        }
        None => Vec::new(),
    }
}

pub fn save_device_prescriptions(
    store: &dyn KeyValueStore,
    records: &[PrescriptionRecord],
) -> Result<()> {
    write_document(store, DEVICE_PRESCRIPTIONS_KEY, &records)
}

pub fn load_session_prescriptions(store: &dyn KeyValueStore) -> JsonMap {
    load_map(store, SESSION_PRESCRIPTIONS_KEY)
}

pub fn save_session_prescriptions(store: &dyn KeyValueStore, entries: &JsonMap) -> Result<()> {
    write_document(store, SESSION_PRESCRIPTIONS_KEY, entries)
}

pub fn load_selection_flow(store: &dyn KeyValueStore) -> JsonMap {
    load_map(store, SELECTION_FLOW_KEY)
}

pub fn record_device_prescription(
    store: &dyn KeyValueStore,
    record: &PrescriptionRecord,
    line_id: Option<&str>,
    sku: Option<&str>,
) -> Result<PrescriptionRecord> {
    let stamped = stamp_record(record, line_id, sku);

    let mut entries = load_device_prescriptions(store);
    let before = entries.len();
    entries.retain(|entry| {
        let same_sku = sku.is_some_and(|sku| names_id(entry.fields(), PRODUCT_SKU_PATHS, sku));
        let same_line =
            line_id.is_some_and(|line| names_id(entry.fields(), DEVICE_LOCAL_LINE_PATHS, line));
        !same_sku && !same_line
    });
    debug!(
        replaced = before - entries.len(),
        "dropped superseded device prescriptions"
    );

    entries.push(stamped.clone());
    save_device_prescriptions(store, &entries)?;
    Ok(stamped)
}

pub fn record_session_prescription(
    store: &dyn KeyValueStore,
    sku: &str,
    record: &PrescriptionRecord,
) -> Result<()> {
    let mut entries = load_session_prescriptions(store);
    entries.insert(sku.to_string(), record.clone().into_value());
    save_session_prescriptions(store, &entries)
}

pub fn forget_line(store: &dyn KeyValueStore, line_id: &str) -> Result<usize> {
    let mut entries = load_device_prescriptions(store);
    let before = entries.len();
    entries.retain(|entry| {
        declared_id(entry.fields(), DEVICE_LOCAL_LINE_PATHS).as_deref() != Some(line_id)
    });

    let removed = before - entries.len();
    if removed > 0 {
        save_device_prescriptions(store, &entries)?;
    }
    Ok(removed)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdSelection {
    pub right: Option<String>,
    pub left: Option<String>,
    pub single: Option<String>,
    pub mode: Option<PdMode>,
}

pub fn record_selection_pd(
    store: &dyn KeyValueStore,
    sku: &str,
    selection: &PdSelection,
) -> Result<()> {
    let mut flows = load_selection_flow(store);
    let mut entry = flows
        .get(sku)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    entry.insert("productId".to_string(), Value::from(sku));
    for (key, value) in [
        ("pdRight", &selection.right),
        ("pdLeft", &selection.left),
        ("pdSingle", &selection.single),
    ] {
        if let Some(value) = value {
            entry.insert(key.to_string(), Value::from(value.as_str()));
        }
    }
    if let Some(mode) = selection.mode {
        entry.insert("pdType".to_string(), Value::from(mode.as_str()));
    }
    entry.insert("updatedAt".to_string(), Value::from(now_epoch_millis()));

    flows.insert(sku.to_string(), Value::Object(entry));
    write_document(store, SELECTION_FLOW_KEY, &flows)
}

fn stamp_record(
    record: &PrescriptionRecord,
    line_id: Option<&str>,
    sku: Option<&str>,
) -> PrescriptionRecord {
    let mut stamped = record.clone();
    let fields = stamped.fields_mut();

    let association = fields
        .entry("associatedProduct")
        .or_insert_with(|| Value::Object(JsonMap::new()));
    if !association.is_object() {
        *association = Value::Object(JsonMap::new());
    }
    if let Some(association) = association.as_object_mut() {
        if let Some(line_id) = line_id {
            association.insert("cartId".to_string(), Value::from(line_id));
        }
        if let Some(sku) = sku {
            association
                .entry("productSku")
                .or_insert_with(|| Value::from(sku));
        }
    }

    if stamped.created_at().is_none() {
        stamped
            .fields_mut()
            .insert("createdAt".to_string(), Value::from(now_epoch_millis()));
    }

    stamped
}

fn load_map(store: &dyn KeyValueStore, key: &str) -> JsonMap {
    match read_document(store, key) {
        Some(Value::Object(entries)) => entries,
        Some(_) => {
            warn!(key, "store document is not a map; treating as empty");
            JsonMap::new()
        }
        None => JsonMap::new(),
    }
}

fn read_document(store: &dyn KeyValueStore, key: &str) -> Option<Value> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(key, error = %err, "store read failed; treating as empty");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "store document is not valid json; treating as empty");
            None
        }
    }
}

fn write_document<T: serde::Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize store document: {key}"))?;
    store
        .set(key, &raw)
        .with_context(|| format!("failed to write store document: {key}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> PrescriptionRecord {
        PrescriptionRecord::from_value(value).expect("fixture must be an object")
    }

    #[test]
    fn corrupt_documents_read_as_empty() {
        let store = MemoryStore::new()
            .with_entry(DEVICE_PRESCRIPTIONS_KEY, "{not json")
            .with_entry(SESSION_PRESCRIPTIONS_KEY, "[1, 2]");

        assert!(load_device_prescriptions(&store).is_empty());
        assert!(load_session_prescriptions(&store).is_empty());
        assert!(load_selection_flow(&store).is_empty());
    }

    #[test]
    fn device_list_skips_non_object_entries() {
        let store = MemoryStore::new().with_entry(
            DEVICE_PRESCRIPTIONS_KEY,
            r#"[{"type":"photo"}, "junk", null, {"type":"upload"}]"#,
        );
        assert_eq!(load_device_prescriptions(&store).len(), 2);
    }

    #[test]
    fn recording_a_prescription_replaces_entries_for_same_sku_or_line() {
        let store = MemoryStore::new();
        save_device_prescriptions(
            &store,
            &[
                record(json!({ "associatedProduct": { "cartId": "1", "productSku": "A" } })),
                record(json!({ "associatedProduct": { "cartId": "2", "productSku": "B" } })),
                record(json!({ "associatedProduct": { "cartId": "3", "productSku": "C" } })),
            ],
        )
        .expect("seed device store");

        let saved = record_device_prescription(
            &store,
            &record(json!({ "type": "photo", "pdSingle": "63" })),
            Some("2"),
            Some("A"),
        )
        .expect("record prescription");

        assert_eq!(
            saved.fields()["associatedProduct"],
            json!({ "cartId": "2", "productSku": "A" })
        );
        assert!(saved.created_at().is_some());

        let entries = load_device_prescriptions(&store);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fields()["associatedProduct"]["cartId"], json!("3"));
        assert_eq!(entries[1], saved);
    }

    #[test]
    fn forget_line_removes_only_that_line() {
        let store = MemoryStore::new();
        save_device_prescriptions(
            &store,
            &[
                record(json!({ "associatedProduct": { "cartId": 5 } })),
                record(json!({ "data": { "associatedProduct": { "cartId": "6" } } })),
            ],
        )
        .expect("seed device store");

        assert_eq!(forget_line(&store, "5").expect("forget"), 1);
        assert_eq!(forget_line(&store, "5").expect("forget again"), 0);
        assert_eq!(load_device_prescriptions(&store).len(), 1);
    }

    #[test]
    fn selection_pd_merges_into_existing_flow_entry() {
        let store = MemoryStore::new().with_entry(
            SELECTION_FLOW_KEY,
            r#"{"SKU1":{"productId":"SKU1","lensType":"progressive","pdSingle":"60"}}"#,
        );

        record_selection_pd(
            &store,
            "SKU1",
            &PdSelection {
                right: Some("31".to_string()),
                left: Some("32".to_string()),
                single: None,
                mode: Some(PdMode::Dual),
            },
        )
        .expect("record selection");

        let flows = load_selection_flow(&store);
        let entry = &flows["SKU1"];
        assert_eq!(entry["lensType"], json!("progressive"));
        assert_eq!(entry["pdSingle"], json!("60"));
        assert_eq!(entry["pdRight"], json!("31"));
        assert_eq!(entry["pdLeft"], json!("32"));
        assert_eq!(entry["pdType"], json!("Dual"));
        assert!(entry["updatedAt"].is_i64());
    }
}
