//! Row values in flight between storage and the wire format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// One dynamically typed cell. Closed set of variants so every boundary
/// (column validation, SQL binding, JSON encoding) matches exhaustively.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Eq for ScalarValue {}

impl std::hash::Hash for ScalarValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            ScalarValue::Null => 0u8.hash(state),
            ScalarValue::Integer(n) => {
                1u8.hash(state);
                n.hash(state);
            }
            ScalarValue::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            ScalarValue::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            ScalarValue::Bool(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            ScalarValue::Timestamp(t) => {
                5u8.hash(state);
                t.timestamp_nanos_opt().unwrap_or_default().hash(state);
            }
            ScalarValue::Bytes(b) => {
                6u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Wire representation. Byte sequences are normalized to a display-safe
    /// string form; the encoding layer cannot represent raw bytes as JSON.
    pub fn to_json(&self) -> Json {
        match self {
            ScalarValue::Null => Json::Null,
            ScalarValue::Integer(n) => Json::Number((*n).into()),
            ScalarValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            ScalarValue::Text(s) => Json::String(s.clone()),
            ScalarValue::Bool(b) => Json::Bool(*b),
            ScalarValue::Timestamp(t) => {
                Json::String(t.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            ScalarValue::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Human-readable form for error messages and URL-ish contexts.
    pub fn display(&self) -> String {
        match self {
            ScalarValue::Text(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A name-to-scalar mapping representing one row of a relation.
pub type Values = BTreeMap<String, ScalarValue>;

/// Convert a storage row to its wire object.
pub fn to_json_object(values: &Values) -> serde_json::Map<String, Json> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bytes_become_display_safe_strings() {
        let v = ScalarValue::Bytes(b"hello".to_vec());
        assert_eq!(v.to_json(), Json::String("hello".into()));
    }

    #[test]
    fn timestamps_encode_as_rfc3339() {
        let t = Utc.with_ymd_and_hms(2020, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            ScalarValue::Timestamp(t).to_json(),
            Json::String("2020-05-01T12:00:00.000000Z".into())
        );
    }

    #[test]
    fn rows_serialize_in_column_name_order() {
        let mut row = Values::new();
        row.insert("name".into(), ScalarValue::Text("admin".into()));
        row.insert("id".into(), ScalarValue::Integer(1));
        let obj = to_json_object(&row);
        let keys: Vec<_> = obj.keys().collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn scalar_equality_covers_floats() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ScalarValue::Float(1.5));
        assert!(set.contains(&ScalarValue::Float(1.5)));
        assert!(!set.contains(&ScalarValue::Float(2.5)));
    }
}
