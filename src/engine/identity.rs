use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use crate::model::JsonMap;

pub type FieldPath = &'static [&'static str];

pub const INLINE_LINE_PATHS: &[FieldPath] = &[
    &["associatedProduct", "cartId"],
    &["data", "associatedProduct", "cartId"],
    &["cartId"],
    &["data", "cartId"],
];

pub const DEVICE_LOCAL_LINE_PATHS: &[FieldPath] = &[
    &["associatedProduct", "cartId"],
    &["data", "associatedProduct", "cartId"],
    &["prescriptionDetails", "associatedProduct", "cartId"],
];

pub const SESSION_LINE_PATHS: &[FieldPath] = &[
    &["associatedProduct", "cartId"],
    &["data", "associatedProduct", "cartId"],
];

pub const REMOTE_HISTORY_LINE_PATHS: &[FieldPath] = &[
    &["associatedProduct", "cartId"],
    &["data", "associatedProduct", "cartId"],
    &["data", "cartId"],
    &["cartId"],
    &["data", "data", "associatedProduct", "cartId"],
];

pub const PRODUCT_SKU_PATHS: &[FieldPath] = &[
    &["associatedProduct", "productSku"],
    &["data", "associatedProduct", "productSku"],
    &["data", "data", "associatedProduct", "productSku"],
];

const TIMESTAMP_PATHS: &[FieldPath] = &[
    &["created_at"],
    &["data", "created_at"],
    &["createdAt"],
    &["data", "createdAt"],
    &["updated_at"],
    &["data", "uploadedAt"],
    &["prescriptionDetails", "createdAt"],
];

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn value_at<'a>(fields: &'a JsonMap, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = fields.get(*first)?;
    for segment in rest {
        current = current.as_object()?.get(*segment)?;
    }

    if current.is_null() { None } else { Some(current) }
}

pub fn object_at<'a>(fields: &'a JsonMap, path: &[&str]) -> Option<&'a JsonMap> {
    value_at(fields, path).and_then(Value::as_object)
}

pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(number) => Some(number_text(number)),
        _ => None,
    }
}

// Integral floats render without a fraction so `42.0` and `42` compare equal.
pub fn number_text(number: &Number) -> String {
    if number.is_f64() {
        if let Some(float) = number.as_f64() {
            if float.fract() == 0.0 && float.abs() < 9.0e15 {
                return format!("{}", float as i64);
            }
        }
    }

    number.to_string()
}

pub fn declared_id(fields: &JsonMap, paths: &[FieldPath]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| value_at(fields, path))
        .find_map(normalize_id)
}

pub fn names_id(fields: &JsonMap, paths: &[FieldPath], id: &str) -> bool {
    paths
        .iter()
        .filter_map(|path| value_at(fields, path))
        .filter_map(normalize_id)
        .any(|candidate| candidate == id)
}

pub fn record_timestamp(fields: &JsonMap) -> Option<i64> {
    let raw = TIMESTAMP_PATHS
        .iter()
        .find_map(|path| value_at(fields, path))?;
    parse_timestamp(raw)
}

pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float as i64)
        }),
        Value::String(raw) => parse_timestamp_text(raw.trim()),
        _ => None,
    }
}

fn parse_timestamp_text(raw: &str) -> Option<i64> {
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_millis());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> JsonMap {
        value.as_object().cloned().expect("fixture must be an object")
    }

    #[test]
    fn normalize_id_treats_numbers_and_strings_alike() {
        assert_eq!(normalize_id(&json!(42)), Some("42".to_string()));
        assert_eq!(normalize_id(&json!(42.0)), Some("42".to_string()));
        assert_eq!(normalize_id(&json!(" 42 ")), Some("42".to_string()));
        assert_eq!(normalize_id(&json!("")), None);
        assert_eq!(normalize_id(&json!(null)), None);
        assert_eq!(normalize_id(&json!({ "id": 1 })), None);
    }

    #[test]
    fn declared_id_uses_first_present_shape() {
        let fields = map(json!({
            "cartId": "9",
            "data": { "associatedProduct": { "cartId": 3 } }
        }));

        assert_eq!(
            declared_id(&fields, REMOTE_HISTORY_LINE_PATHS),
            Some("3".to_string())
        );
        assert!(names_id(&fields, REMOTE_HISTORY_LINE_PATHS, "9"));
        assert!(!names_id(&fields, REMOTE_HISTORY_LINE_PATHS, "4"));
    }

    #[test]
    fn value_at_skips_nulls_and_non_objects() {
        let fields = map(json!({ "data": "flat", "associatedProduct": { "cartId": null } }));
        assert!(value_at(&fields, &["data", "cartId"]).is_none());
        assert!(value_at(&fields, &["associatedProduct", "cartId"]).is_none());
    }

    #[test]
    fn timestamps_parse_numbers_and_common_date_strings() {
        assert_eq!(parse_timestamp(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
        assert_eq!(
            parse_timestamp(&json!("2024-03-01T10:00:00Z")),
            Some(1_709_287_200_000)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-03-01 10:00:00")),
            Some(1_709_287_200_000)
        );
        assert_eq!(parse_timestamp(&json!("2024-03-01")), Some(1_709_251_200_000));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn record_timestamp_stops_at_first_present_alias() {
        let fields = map(json!({
            "created_at": "not a date",
            "createdAt": 5
        }));
        assert_eq!(record_timestamp(&fields), None);
    }
}
