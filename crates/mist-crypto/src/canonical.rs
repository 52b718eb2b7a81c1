//! Deterministic serialization of tagged values.
//!
//! The canonical form is compact JSON with map keys sorted lexicographically
//! (by UTF-8 bytes) at every depth, arrays in their original order, and
//! integral numbers printed without a fractional part. Two logically equal
//! inputs always produce byte-identical output, which is what lets peers
//! recompute digests without trusting the sender.

use std::fmt::Write;

use mist_types::Value;

/// Canonical serialization of an attribute value.
pub fn canonicalize(value: &Value) -> String {
    canonical_json(&value.to_json())
}

/// Canonical serialization of an arbitrary JSON value.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_canonical(out, &map[key]);
            }
            out.push('}');
        }
        serde_json::Value::String(s) => write_string(out, s),
        scalar => {
            // Null, bool and number render identically under any key order.
            let _ = write!(out, "{scalar}");
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    let _ = write!(out, "{}", serde_json::Value::String(s.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_at_every_depth() {
        let value = json!({"b": 1, "a": {"z": true, "m": null}});
        assert_eq!(canonical_json(&value), r#"{"a":{"m":null,"z":true},"b":1}"#);
    }

    #[test]
    fn arrays_keep_order() {
        assert_eq!(canonical_json(&json!([3, 1, 2])), "[3,1,2]");
    }

    #[test]
    fn empty_containers() {
        assert_eq!(canonical_json(&json!([])), "[]");
        assert_eq!(canonical_json(&json!({})), "{}");
    }

    #[test]
    fn numbers_and_strings() {
        let value = Value::from(json!({"c": 17, "d": 17.8, "e": "h\"j"}));
        assert_eq!(canonicalize(&value), r#"{"c":17,"d":17.8,"e":"h\"j"}"#);
        assert_eq!(canonicalize(&Value::Number(1.0 / 3.0)), "0.3333333333333333");
        assert_eq!(canonicalize(&Value::Number(f64::NAN)), "null");
    }

    #[test]
    fn unicode_is_not_escaped() {
        assert_eq!(canonicalize(&Value::from("åäö")), "\"åäö\"");
    }

    fn arb_value() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(serde_json::Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_form_is_valid_json_of_same_value(value in arb_value()) {
            let text = canonical_json(&value);
            let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(parsed, value);
        }

        #[test]
        fn canonical_form_is_stable_across_reparse(value in arb_value()) {
            let first = canonical_json(&value);
            let reparsed: serde_json::Value = serde_json::from_str(&first).unwrap();
            prop_assert_eq!(canonical_json(&reparsed), first);
        }
    }
}
