use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::engine::identity::{normalize_id, record_timestamp, value_at};

pub type JsonMap = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrescriptionRecord(JsonMap);

impl PrescriptionRecord {
    pub fn new(fields: JsonMap) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &JsonMap {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut JsonMap {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn kind(&self) -> Option<RecordKind> {
        KIND_PATHS
            .iter()
            .filter_map(|path| value_at(&self.0, path))
            .find_map(|value| value.as_str().and_then(RecordKind::parse))
    }

    pub fn created_at(&self) -> Option<i64> {
        record_timestamp(&self.0)
    }
}

const KIND_PATHS: &[&[&str]] = &[&["type"], &["prescriptionDetails", "type"], &["data", "type"]];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Manual,
    Upload,
    Photo,
}

impl RecordKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "upload" => Some(Self::Upload),
            "photo" => Some(Self::Photo),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Upload => "upload",
            Self::Photo => "photo",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(
        rename = "lineId",
        alias = "cart_id",
        alias = "cartId",
        alias = "line_id",
        deserialize_with = "deserialize_id"
    )]
    pub line_id: String,

    #[serde(
        rename = "productId",
        alias = "product_id",
        default,
        deserialize_with = "deserialize_optional_id"
    )]
    pub product_id: Option<String>,

    #[serde(alias = "skuid", default, deserialize_with = "deserialize_optional_id")]
    pub sku: Option<String>,

    #[serde(default)]
    pub prescription: Option<Value>,

    #[serde(default = "default_quantity")]
    pub quantity: u32,

    #[serde(alias = "product_details", default)]
    pub options: Option<JsonMap>,
}

impl CartLine {
    pub fn product_sku(&self) -> Option<&str> {
        self.sku.as_deref().or(self.product_id.as_deref())
    }

    pub fn embedded_prescription(&self) -> Option<PrescriptionRecord> {
        let record = PrescriptionRecord::from_value(self.prescription.clone()?)?;
        if record.is_empty() { None } else { Some(record) }
    }
}

fn default_quantity() -> u32 {
    1
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    normalize_id(&value).ok_or_else(|| {
        serde::de::Error::custom("line identifier must be a non-empty string or number")
    })
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(normalize_id))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActiveLineSet(BTreeSet<String>);

impl ActiveLineSet {
    pub fn from_lines(lines: &[CartLine]) -> Self {
        Self::from_ids(lines.iter().map(|line| line.line_id.clone()))
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, line_id: &str) -> bool {
        self.0.contains(line_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Inline,
    DeviceLocal,
    SessionEphemeral,
    RemoteHistory,
    SelectionFlow,
}

impl CandidateSource {
    pub fn precedence(self) -> Option<u8> {
        match self {
            Self::Inline => Some(0),
            Self::DeviceLocal => Some(1),
            Self::SessionEphemeral => Some(2),
            Self::RemoteHistory => Some(3),
            Self::SelectionFlow => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::DeviceLocal => "device_local",
            Self::SessionEphemeral => "session_ephemeral",
            Self::RemoteHistory => "remote_history",
            Self::SelectionFlow => "selection_flow",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    LineId,
    Unassociated,
    SessionSku,
    SkuFallback,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LineId => "line_id",
            Self::Unassociated => "unassociated",
            Self::SessionSku => "session_sku",
            Self::SkuFallback => "sku_fallback",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Association {
    pub line_id: Option<String>,
    pub product_sku: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub source: CandidateSource,
    pub match_kind: MatchKind,
    pub association: Association,
    pub created_at: Option<i64>,
    pub record: PrescriptionRecord,
}

impl CandidateRecord {
    pub fn new(
        source: CandidateSource,
        match_kind: MatchKind,
        association: Association,
        record: PrescriptionRecord,
    ) -> Self {
        Self {
            source,
            match_kind,
            association,
            created_at: record.created_at(),
            record,
        }
    }

    // Missing or unparseable timestamps sort as the earliest possible write.
    pub fn recency(&self) -> i64 {
        self.created_at.unwrap_or(i64::MIN)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn cart_line_accepts_numeric_ids_and_legacy_field_names() {
        let line: CartLine = serde_json::from_value(json!({
            "cart_id": 42,
            "product_id": "E45A8506",
            "product_details": { "pd_single_mm": "63" },
            "prescription": {}
        }))
        .expect("cart line should deserialize");

        assert_eq!(line.line_id, "42");
        assert_eq!(line.product_sku(), Some("E45A8506"));
        assert_eq!(line.quantity, 1);
        assert!(line.embedded_prescription().is_none());
        assert!(line.options.is_some());
    }

    #[test]
    fn cart_line_prefers_explicit_sku_over_product_id() {
        let line: CartLine = serde_json::from_value(json!({
            "lineId": "7",
            "productId": 99,
            "skuid": "SKU-7"
        }))
        .expect("cart line should deserialize");

        assert_eq!(line.product_id.as_deref(), Some("99"));
        assert_eq!(line.product_sku(), Some("SKU-7"));
    }

    #[test]
    fn cart_line_rejects_missing_identifier_value() {
        let result = serde_json::from_value::<CartLine>(json!({ "cart_id": "  " }));
        assert!(result.is_err());
    }

    #[test]
    fn record_kind_checks_nested_shapes() {
        let record = PrescriptionRecord::from_value(json!({
            "data": { "type": "PHOTO" }
        }))
        .expect("object record");
        assert_eq!(record.kind(), Some(RecordKind::Photo));
    }

    #[test]
    fn selection_flow_has_no_resolution_precedence() {
        assert_eq!(CandidateSource::SelectionFlow.precedence(), None);
        assert!(CandidateSource::Inline.precedence() < CandidateSource::DeviceLocal.precedence());
        assert!(
            CandidateSource::SessionEphemeral.precedence()
                < CandidateSource::RemoteHistory.precedence()
        );
    }
}
