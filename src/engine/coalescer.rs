use serde::Serialize;
use serde_json::Value;

use super::fields::{
    CANONICAL_LEFT, CANONICAL_MODE, CANONICAL_RIGHT, CANONICAL_SINGLE, Lookup, PD_LEFT, PD_MODE,
    PD_RIGHT, PD_SINGLE, Scope,
};
use super::identity::{number_text, object_at};
use crate::model::{JsonMap, PrescriptionRecord};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum PdMode {
    #[default]
    Single,
    Dual,
}

impl PdMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "dual" => Some(Self::Dual),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "Single",
            Self::Dual => "Dual",
        }
    }

    fn derive(values: &PdValues) -> Self {
        if values.right.is_some() && values.left.is_some() {
            Self::Dual
        } else {
            Self::Single
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PdValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single: Option<String>,
    pub mode: PdMode,
}

impl PdValues {
    fn patch(&self) -> JsonMap {
        let mut patch = JsonMap::new();
        patch.insert(CANONICAL_MODE.to_string(), Value::from(self.mode.as_str()));
        for (key, value) in [
            (CANONICAL_SINGLE, &self.single),
            (CANONICAL_RIGHT, &self.right),
            (CANONICAL_LEFT, &self.left),
        ] {
            if let Some(value) = value {
                patch.insert(key.to_string(), Value::from(value.as_str()));
            }
        }
        patch
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CoalesceExtras<'a> {
    pub line_options: Option<&'a JsonMap>,
    pub selection_flow: Option<&'a JsonMap>,
    pub sku: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalPrescription {
    record: PrescriptionRecord,
    #[serde(skip)]
    pd: PdValues,
}

impl CanonicalPrescription {
    pub fn record(&self) -> &PrescriptionRecord {
        &self.record
    }

    pub fn pd(&self) -> &PdValues {
        &self.pd
    }

    pub fn has_pd(&self) -> bool {
        (self.pd.right.is_some() && self.pd.left.is_some()) || self.pd.single.is_some()
    }

    pub fn pd_display(&self) -> Option<String> {
        let single = self.pd.single.as_deref().filter(|value| !value.trim().is_empty());
        let pair = match (self.pd.right.as_deref(), self.pd.left.as_deref()) {
            (Some(right), Some(left)) if !right.trim().is_empty() && !left.trim().is_empty() => {
                Some(format!("R {right} / L {left} mm"))
            }
            _ => None,
        };

        match self.pd.mode {
            PdMode::Dual => pair.or_else(|| single.map(|value| format!("{value} mm"))),
            PdMode::Single => single.map(|value| format!("{value} mm")).or(pair),
        }
    }
}

struct Sources<'a> {
    root: &'a JsonMap,
    details: Option<&'a JsonMap>,
    nested_details: Option<&'a JsonMap>,
    data_details: Option<&'a JsonMap>,
    data: Option<&'a JsonMap>,
    line_options: Option<&'a JsonMap>,
    selection_flow: Option<&'a JsonMap>,
}

impl<'a> Sources<'a> {
    fn new(root: &'a JsonMap, extras: &CoalesceExtras<'a>) -> Self {
        let selection_flow = match (extras.selection_flow, extras.sku) {
            (Some(flows), Some(sku)) => flows.get(sku).and_then(Value::as_object),
            _ => None,
        };

        Self {
            root,
            details: object_at(root, &["prescriptionDetails"]),
            nested_details: object_at(root, &["prescriptionDetails", "prescriptionDetails"]),
            data_details: object_at(root, &["data", "prescriptionDetails"]),
            data: object_at(root, &["data"]),
            line_options: extras.line_options,
            selection_flow,
        }
    }

    fn scope(&self, scope: Scope) -> Option<&'a JsonMap> {
        match scope {
            Scope::Root => Some(self.root),
            Scope::Details => self.details,
            Scope::NestedDetails => self.nested_details,
            Scope::DataDetails => self.data_details,
            Scope::Data => self.data,
            Scope::LineOptions => self.line_options,
            Scope::SelectionFlow => self.selection_flow,
        }
    }

    fn candidates<'t>(&'t self, table: &'static [Lookup]) -> impl Iterator<Item = &'a Value> + 't {
        table.iter().flat_map(move |lookup| {
            let scope = self.scope(lookup.scope);
            lookup
                .keys
                .iter()
                .filter_map(move |key| scope.and_then(|fields| fields.get(*key)))
                .filter(|value| !value.is_null())
        })
    }

    fn first_value(&self, table: &'static [Lookup]) -> Option<String> {
        self.candidates(table).find_map(pd_text)
    }

    fn first_mode(&self) -> Option<PdMode> {
        self.candidates(PD_MODE)
            .find_map(|value| value.as_str().and_then(PdMode::parse))
    }
}

// Scalars only. An empty string is a deliberate blank, not an absence.
fn pd_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number_text(number)),
        _ => None,
    }
}

pub fn coalesce(record: &PrescriptionRecord, extras: &CoalesceExtras<'_>) -> CanonicalPrescription {
    let sources = Sources::new(record.fields(), extras);

    let mut pd = PdValues {
        right: sources.first_value(PD_RIGHT),
        left: sources.first_value(PD_LEFT),
        single: sources.first_value(PD_SINGLE),
        mode: PdMode::Single,
    };
    pd.mode = sources.first_mode().unwrap_or_else(|| PdMode::derive(&pd));

    let fields = write_back(record.fields(), &pd);
    CanonicalPrescription {
        record: PrescriptionRecord::new(fields),
        pd,
    }
}

fn write_back(fields: &JsonMap, pd: &PdValues) -> JsonMap {
    let patch = pd.patch();

    let mut data = object_at(fields, &["data"]).cloned().unwrap_or_default();
    let mut details = object_at(&data, &["prescriptionDetails"])
        .cloned()
        .unwrap_or_default();
    if let Some(base) = object_at(fields, &["prescriptionDetails"]) {
        details.extend(base.clone());
    }
    details.extend(patch.clone());
    data.extend(patch.clone());

    let mut out = fields.clone();
    out.extend(patch);
    out.insert("prescriptionDetails".to_string(), Value::Object(details));
    out.insert("data".to_string(), Value::Object(data));
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> PrescriptionRecord {
        PrescriptionRecord::from_value(value).expect("fixture must be an object")
    }

    fn map(value: Value) -> JsonMap {
        value.as_object().cloned().expect("fixture must be an object")
    }

    #[test]
    fn millimetre_aliases_fill_root_fields() {
        let canonical = coalesce(
            &record(json!({ "pd_right_mm": "32", "pd_left_mm": "34" })),
            &CoalesceExtras::default(),
        );

        let fields = canonical.record().fields();
        assert_eq!(fields["pdRight"], json!("32"));
        assert_eq!(fields["pdLeft"], json!("34"));
        assert_eq!(fields["pdType"], json!("Dual"));
        assert!(!fields.contains_key("pdSingle"));
        assert_eq!(canonical.pd().mode, PdMode::Dual);
        assert_eq!(canonical.pd_display().as_deref(), Some("R 32 / L 34 mm"));
    }

    #[test]
    fn total_pd_in_details_becomes_single() {
        let canonical = coalesce(
            &record(json!({ "prescriptionDetails": { "totalPD": "64" } })),
            &CoalesceExtras::default(),
        );

        let pd = canonical.pd();
        assert_eq!(pd.single.as_deref(), Some("64"));
        assert_eq!(pd.right, None);
        assert_eq!(pd.left, None);
        assert_eq!(pd.mode, PdMode::Single);

        let fields = canonical.record().fields();
        assert_eq!(fields["pdSingle"], json!("64"));
        assert_eq!(fields["prescriptionDetails"]["pdSingle"], json!("64"));
        assert_eq!(fields["prescriptionDetails"]["totalPD"], json!("64"));
        assert_eq!(fields["data"]["pdSingle"], json!("64"));
    }

    #[test]
    fn line_options_fill_only_missing_fields() {
        let options = map(json!({ "pd_single_mm": "65", "pd_right_mm": "30" }));
        let extras = CoalesceExtras {
            line_options: Some(&options),
            ..CoalesceExtras::default()
        };

        let from_options = coalesce(&record(json!({ "type": "upload" })), &extras);
        assert_eq!(from_options.pd().single.as_deref(), Some("65"));
        assert_eq!(from_options.pd().right.as_deref(), Some("30"));
        assert_eq!(from_options.pd().mode, PdMode::Single);

        let from_record = coalesce(&record(json!({ "data": { "pd_single": 61 } })), &extras);
        assert_eq!(from_record.pd().single.as_deref(), Some("61"));
    }

    #[test]
    fn selection_flow_is_the_last_resort() {
        let flows = map(json!({
            "SKU1": { "pdRight": "31", "pdLeft": "33", "pdType": "dual" },
            "SKU2": { "pdSingle": "99" }
        }));
        let extras = CoalesceExtras {
            selection_flow: Some(&flows),
            sku: Some("SKU1"),
            ..CoalesceExtras::default()
        };

        let canonical = coalesce(&record(json!({ "pdLeft": "35" })), &extras);
        assert_eq!(canonical.pd().right.as_deref(), Some("31"));
        assert_eq!(canonical.pd().left.as_deref(), Some("35"));
        assert_eq!(canonical.pd().single, None);
        assert_eq!(canonical.pd().mode, PdMode::Dual);
    }

    #[test]
    fn explicit_mode_is_title_cased() {
        let canonical = coalesce(
            &record(json!({ "pdSingle": "62", "data": { "pdType": "DUAL" } })),
            &CoalesceExtras::default(),
        );
        assert_eq!(canonical.pd().mode, PdMode::Dual);
        assert_eq!(canonical.record().fields()["pdType"], json!("Dual"));
        assert_eq!(canonical.pd_display().as_deref(), Some("62 mm"));
    }

    #[test]
    fn unknown_mode_falls_back_to_derivation() {
        let canonical = coalesce(
            &record(json!({ "pdType": "both", "pdRight": 31, "pdLeft": 32.5 })),
            &CoalesceExtras::default(),
        );
        assert_eq!(canonical.pd().mode, PdMode::Dual);
        assert_eq!(canonical.pd().right.as_deref(), Some("31"));
        assert_eq!(canonical.pd().left.as_deref(), Some("32.5"));
    }

    #[test]
    fn empty_string_is_present_and_blocks_later_sources() {
        let options = map(json!({ "pd_single_mm": "65" }));
        let extras = CoalesceExtras {
            line_options: Some(&options),
            ..CoalesceExtras::default()
        };

        let canonical = coalesce(&record(json!({ "pdSingle": "" })), &extras);
        assert_eq!(canonical.pd().single.as_deref(), Some(""));
        assert!(canonical.has_pd());
        assert_eq!(canonical.pd_display(), None);
    }

    #[test]
    fn nulls_and_objects_are_skipped() {
        let canonical = coalesce(
            &record(json!({
                "pdRight": null,
                "right": { "sph": "-1.00" },
                "prescriptionDetails": { "pdOD": "30" }
            })),
            &CoalesceExtras::default(),
        );
        assert_eq!(canonical.pd().right.as_deref(), Some("30"));
    }

    #[test]
    fn nothing_found_yields_absent_fields_and_single_mode() {
        let input = record(json!({ "type": "photo", "image_url": "https://cdn/rx.jpg" }));
        let canonical = coalesce(&input, &CoalesceExtras::default());

        assert_eq!(canonical.pd().right, None);
        assert_eq!(canonical.pd().left, None);
        assert_eq!(canonical.pd().single, None);
        assert_eq!(canonical.pd().mode, PdMode::Single);
        assert!(!canonical.has_pd());
        assert_eq!(canonical.pd_display(), None);

        let fields = canonical.record().fields();
        assert_eq!(fields["image_url"], json!("https://cdn/rx.jpg"));
        assert_eq!(fields["pdType"], json!("Single"));
        assert!(!fields.contains_key("pdRight"));
        assert!(!fields.contains_key("pdSingle"));
    }

    #[test]
    fn write_back_merges_nested_details_and_keeps_other_fields() {
        let canonical = coalesce(
            &record(json!({
                "name": "Captured Prescription",
                "prescriptionDetails": { "sphOD": "-1.25", "pdRight": "30" },
                "data": {
                    "image_url": "https://cdn/rx.jpg",
                    "prescriptionDetails": { "axisOD": "90", "pdLeft": "31" }
                }
            })),
            &CoalesceExtras::default(),
        );

        let fields = canonical.record().fields();
        assert_eq!(fields["name"], json!("Captured Prescription"));
        assert_eq!(
            fields["prescriptionDetails"],
            json!({
                "sphOD": "-1.25",
                "axisOD": "90",
                "pdRight": "30",
                "pdLeft": "31",
                "pdType": "Dual"
            })
        );
        assert_eq!(fields["data"]["image_url"], json!("https://cdn/rx.jpg"));
        assert_eq!(fields["data"]["pdRight"], json!("30"));
        assert_eq!(
            fields["data"]["prescriptionDetails"],
            json!({ "axisOD": "90", "pdLeft": "31" })
        );
    }

    #[test]
    fn coalescing_is_idempotent() {
        let options = map(json!({ "pd_type": "single", "pd_single_mm": 63 }));
        let flows = map(json!({ "SKU": { "pdRight": "30" } }));
        let extras = CoalesceExtras {
            line_options: Some(&options),
            selection_flow: Some(&flows),
            sku: Some("SKU"),
        };

        let inputs = [
            json!({ "pd_right_mm": "32", "pd_left_mm": "34" }),
            json!({ "prescriptionDetails": { "prescriptionDetails": { "pdOS": "29" } } }),
            json!({ "pdType": "nonsense", "data": { "pdType": "dual", "pdLeft": "" } }),
            json!({ "pdRight": null, "prescriptionDetails": "corrupt", "data": [1, 2] }),
            json!({}),
        ];

        for input in inputs {
            let once = coalesce(&record(input), &extras);
            let twice = coalesce(once.record(), &extras);
            assert_eq!(once, twice);
        }
    }
}
