use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Named attribute values attached to an object.
pub type Attributes = BTreeMap<String, Value>;

/// Tagged attribute value.
///
/// Maps are `BTreeMap`s, so iteration is already in the lexicographic key
/// order canonical serialization needs. Numbers are IEEE-754 doubles; the
/// non-finite ones have no JSON form and canonicalize as `null`.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Arrays and maps are stored JSON-encoded; everything else as a scalar.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert into a `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion_preserves_structure() {
        let raw = json!({"a": "hej", "b": ["a", "b"], "c": 17, "d": 17.8, "e": null});
        let value = Value::from(raw.clone());
        assert_eq!(value.to_json(), raw);
    }

    #[test]
    fn integral_numbers_become_integers() {
        assert_eq!(Value::Number(17.0).to_json(), json!(17));
        assert_eq!(Value::Number(-0.0).to_json(), json!(0));
        assert_eq!(Value::Number(0.5).to_json(), json!(0.5));
    }

    #[test]
    fn non_finite_numbers_become_null() {
        assert_eq!(Value::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Number(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn structured_flag() {
        assert!(Value::from(vec!["a", "b"]).is_structured());
        assert!(Value::Map(BTreeMap::new()).is_structured());
        assert!(!Value::from("scalar").is_structured());
        assert!(!Value::Null.is_structured());
    }

    #[test]
    fn serde_roundtrip_through_json() {
        let value = Value::from(json!({"nested": {"list": [1, true, "x"]}}));
        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }
}
