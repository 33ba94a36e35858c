//! Content canonicalization and hashing.
//!
//! Two card contents that mean the same thing must hash the same, no matter
//! how they were serialized on the way in. The canonical form is compact JSON
//! with object keys sorted by byte order at every depth, array order kept,
//! and one spelling per number (an integral float prints as an integer).

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

/// Render `value` in canonical form.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Lowercase hex SHA-256 of the canonical form of `content`.
pub fn compute_content_hash(content: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(content).as_bytes());
    hex::encode(hasher.finalize())
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(val, out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
        return;
    }
    if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
        return;
    }
    if let Some(f) = n.as_f64() {
        // i64::MIN is exact in f64; i64::MAX is not, so the upper bound is exclusive.
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            out.push_str(&(f as i64).to_string());
            return;
        }
    }
    out.push_str(&n.to_string());
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Rendering the same entries in reverse textual order must not change the hash.
        #[test]
        fn prop_hash_independent_of_key_order(
            entries in proptest::collection::btree_map("[a-z]{1,8}", arb_leaf(), 0..8)
        ) {
            let forward: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), v))
                .collect();
            let mut backward = forward.clone();
            backward.reverse();

            let a: Value = serde_json::from_str(&format!("{{{}}}", forward.join(","))).unwrap();
            let b: Value = serde_json::from_str(&format!("{{{}}}", backward.join(","))).unwrap();

            prop_assert_eq!(compute_content_hash(&a), compute_content_hash(&b));
        }

        /// Canonical output is itself valid JSON describing the same value.
        #[test]
        fn prop_canonical_form_reparses(
            entries in proptest::collection::btree_map("[a-z]{1,8}", arb_leaf(), 0..8)
        ) {
            let value = Value::Object(entries.into_iter().collect());
            let reparsed: Value = serde_json::from_str(&canonicalize(&value)).unwrap();
            prop_assert_eq!(reparsed, value);
        }
    }
}
