use serde_json::Value;
use tracing::{debug, warn};

use super::identity::{
    DEVICE_LOCAL_LINE_PATHS, INLINE_LINE_PATHS, PRODUCT_SKU_PATHS, REMOTE_HISTORY_LINE_PATHS,
    SESSION_LINE_PATHS, declared_id, names_id,
};
use crate::model::{
    ActiveLineSet, Association, CandidateRecord, CandidateSource, CartLine, JsonMap, MatchKind,
    PrescriptionRecord,
};
use crate::store::{
    KeyValueStore, load_device_prescriptions, load_session_prescriptions,
    save_session_prescriptions,
};

#[derive(Clone, Copy)]
pub struct CandidateStores<'a> {
    pub device_local: &'a dyn KeyValueStore,
    pub session: &'a dyn KeyValueStore,
    pub remote_history: &'a [PrescriptionRecord],
}

pub fn collect(
    line: &CartLine,
    active: &ActiveLineSet,
    stores: &CandidateStores<'_>,
) -> Vec<CandidateRecord> {
    let mut candidates = Vec::new();

    collect_inline(line, active, &mut candidates);
    collect_device_local(line, active, stores.device_local, &mut candidates);
    collect_session(line, active, stores.session, &mut candidates);
    collect_remote_history(line, active, stores.remote_history, &mut candidates);

    debug!(
        line_id = %line.line_id,
        candidates = candidates.len(),
        "collected prescription candidates"
    );
    candidates
}

fn collect_inline(line: &CartLine, active: &ActiveLineSet, out: &mut Vec<CandidateRecord>) {
    let Some(record) = line.embedded_prescription() else {
        return;
    };

    let declared = declared_id(record.fields(), INLINE_LINE_PATHS);
    let match_kind = match declared.as_deref() {
        None => MatchKind::Unassociated,
        Some(id) if id == line.line_id && active.contains(id) => MatchKind::LineId,
        Some(id) => {
            debug!(line_id = %line.line_id, declared = id, "inline prescription names another line");
            return;
        }
    };

    let association = association_for(&record, declared);
    out.push(CandidateRecord::new(
        CandidateSource::Inline,
        match_kind,
        association,
        record,
    ));
}

fn collect_device_local(
    line: &CartLine,
    active: &ActiveLineSet,
    store: &dyn KeyValueStore,
    out: &mut Vec<CandidateRecord>,
) {
    for record in load_device_prescriptions(store) {
        let Some(declared) = declared_id(record.fields(), DEVICE_LOCAL_LINE_PATHS) else {
            continue;
        };
        if declared != line.line_id || !active.contains(&declared) {
            continue;
        }

        let association = association_for(&record, Some(declared));
        out.push(CandidateRecord::new(
            CandidateSource::DeviceLocal,
            MatchKind::LineId,
            association,
            record,
        ));
    }
}

fn collect_session(
    line: &CartLine,
    active: &ActiveLineSet,
    store: &dyn KeyValueStore,
    out: &mut Vec<CandidateRecord>,
) {
    let Some(sku) = line.product_sku() else {
        return;
    };

    let entries = load_session_prescriptions(store);
    let Some(Value::Object(stored)) = entries.get(sku) else {
        return;
    };

    let mut fields = stored.clone();
    let match_kind = match declared_id(&fields, SESSION_LINE_PATHS) {
        Some(declared) if declared == line.line_id && active.contains(&declared) => {
            MatchKind::LineId
        }
        Some(declared) => {
            debug!(line_id = %line.line_id, declared = %declared, sku, "session draft belongs elsewhere");
            return;
        }
        None => {
            claim_for_line(&mut fields, &line.line_id);
            MatchKind::SessionSku
        }
    };

    let record = PrescriptionRecord::new(fields);
    let association = association_for(&record, Some(line.line_id.clone()));
    out.push(CandidateRecord::new(
        CandidateSource::SessionEphemeral,
        match_kind,
        association,
        record,
    ));
}

// The claim is written only once the session draft actually wins for `line`.
pub fn commit_session_claim(line: &CartLine, chosen: &CandidateRecord, store: &dyn KeyValueStore) {
    if chosen.source != CandidateSource::SessionEphemeral
        || chosen.match_kind != MatchKind::SessionSku
    {
        return;
    }
    let Some(sku) = line.product_sku() else {
        return;
    };

    let mut entries = load_session_prescriptions(store);
    let Some(Value::Object(fields)) = entries.get_mut(sku) else {
        return;
    };
    if declared_id(fields, SESSION_LINE_PATHS).is_some() {
        return;
    }

    claim_for_line(fields, &line.line_id);
    match save_session_prescriptions(store, &entries) {
        Ok(()) => debug!(line_id = %line.line_id, sku, "claimed session draft"),
        Err(err) => {
            warn!(line_id = %line.line_id, sku, error = %err, "failed to persist session claim")
        }
    }
}

fn claim_for_line(fields: &mut JsonMap, line_id: &str) {
    let association = fields
        .entry("associatedProduct")
        .or_insert_with(|| Value::Object(JsonMap::new()));
    if !association.is_object() {
        *association = Value::Object(JsonMap::new());
    }
    if let Some(association) = association.as_object_mut() {
        association.insert("cartId".to_string(), Value::from(line_id));
    }
}

fn collect_remote_history(
    line: &CartLine,
    active: &ActiveLineSet,
    history: &[PrescriptionRecord],
    out: &mut Vec<CandidateRecord>,
) {
    let mut matched = history
        .iter()
        .filter(|record| names_id(record.fields(), REMOTE_HISTORY_LINE_PATHS, &line.line_id))
        .filter_map(|record| {
            let declared = declared_id(record.fields(), REMOTE_HISTORY_LINE_PATHS)?;
            active
                .contains(&declared)
                .then(|| CandidateRecord::new(
                    CandidateSource::RemoteHistory,
                    MatchKind::LineId,
                    association_for(record, Some(declared)),
                    record.clone(),
                ))
        })
        .collect::<Vec<CandidateRecord>>();

    if matched.is_empty() {
        if let Some(sku) = line.product_sku() {
            matched = sku_fallback(sku, active, history);
            if !matched.is_empty() {
                debug!(
                    line_id = %line.line_id,
                    sku,
                    matches = matched.len(),
                    "remote history matched by sku only"
                );
            }
        }
    }

    out.extend(matched);
}

fn sku_fallback(
    sku: &str,
    active: &ActiveLineSet,
    history: &[PrescriptionRecord],
) -> Vec<CandidateRecord> {
    history
        .iter()
        .filter(|record| names_id(record.fields(), PRODUCT_SKU_PATHS, sku))
        .filter_map(|record| {
            let declared = declared_id(record.fields(), REMOTE_HISTORY_LINE_PATHS);
            if declared.as_deref().is_some_and(|id| !active.contains(id)) {
                return None;
            }
            Some(CandidateRecord::new(
                CandidateSource::RemoteHistory,
                MatchKind::SkuFallback,
                association_for(record, declared),
                record.clone(),
            ))
        })
        .collect()
}

fn association_for(record: &PrescriptionRecord, line_id: Option<String>) -> Association {
    Association {
        line_id,
        product_sku: declared_id(record.fields(), PRODUCT_SKU_PATHS),
    }
}
