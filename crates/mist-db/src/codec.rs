//! Mapping between attribute [`Value`]s and storage [`Cell`]s.

use mist_crypto::canonicalize;
use mist_store::Cell;
use mist_types::Value;

use crate::error::{MistError, MistResult};

/// Encode an attribute value. Arrays and maps become canonical JSON text
/// with the `is_json` flag set.
pub fn encode_attribute(value: &Value) -> (Cell, bool) {
    match value {
        Value::Null => (Cell::Null, false),
        Value::Bool(b) => (Cell::Bool(*b), false),
        Value::Number(n) => (Cell::Number(*n), false),
        Value::String(s) => (Cell::Text(s.clone()), false),
        Value::Array(_) | Value::Map(_) => (Cell::Text(canonicalize(value)), true),
    }
}

pub fn decode_attribute(cell: &Cell, is_json: bool) -> MistResult<Value> {
    Ok(match cell {
        Cell::Text(text) if is_json => {
            let json: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| MistError::Serialization(format!("attribute value: {e}")))?;
            Value::from(json)
        }
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Number(n) => Value::Number(*n),
        Cell::Text(text) => Value::String(text.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn scalars_are_stored_natively() {
        assert_eq!(encode_attribute(&Value::from(3.5)), (Cell::Number(3.5), false));
        assert_eq!(encode_attribute(&Value::from("x")), (Cell::Text("x".into()), false));
        assert_eq!(encode_attribute(&Value::Null), (Cell::Null, false));
    }

    #[test]
    fn structured_values_become_canonical_json() {
        let mut map = BTreeMap::new();
        map.insert("z".to_string(), Value::from(1i64));
        map.insert("a".to_string(), Value::from(vec!["p", "q"]));
        let value = Value::Map(map);
        let (cell, is_json) = encode_attribute(&value);
        assert!(is_json);
        assert_eq!(cell, Cell::Text(r#"{"a":["p","q"],"z":1}"#.into()));
        assert_eq!(decode_attribute(&cell, is_json).unwrap(), value);
    }

    #[test]
    fn json_looking_string_stays_a_string() {
        let value = Value::from("[1,2]");
        let (cell, is_json) = encode_attribute(&value);
        assert!(!is_json);
        assert_eq!(decode_attribute(&cell, is_json).unwrap(), value);
    }

    #[test]
    fn corrupt_json_cell_is_a_serialization_error() {
        let err = decode_attribute(&Cell::Text("{oops".into()), true).unwrap_err();
        assert_eq!(err.code(), MistError::SERIALIZATION);
    }
}
