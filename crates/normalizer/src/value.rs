//! Recursive stringification of JSON values.

use serde_json::{Map, Value};

/// Rewrite every leaf of `value` as a string.
///
/// Objects and arrays are rebuilt with their children normalized. Floats are
/// rendered with zero decimal places, so `1.0e21` becomes
/// `"1000000000000000000000"` and never scientific notation. Integers,
/// booleans and strings use their plain textual form. `null` has no textual
/// form and is kept as `null`.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_map(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Number(n) => Value::String(number_to_string(&n)),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::String(s) => Value::String(s),
        Value::Null => Value::Null,
    }
}

/// Normalize every value of a field map.
pub fn normalize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (k, normalize(v))).collect()
}

fn number_to_string(n: &serde_json::Number) -> String {
    if n.is_f64() {
        // Magnitudes are integral base units; no fraction is lost here.
        match n.as_f64() {
            Some(f) => format!("{:.0}", f),
            None => n.to_string(),
        }
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_large_float_has_no_exponent() {
        let value: Value = serde_json::from_str(r#"{"amount": 1.0e21}"#).unwrap();
        assert_eq!(normalize(value), json!({"amount": "1000000000000000000000"}));
    }

    #[test]
    fn test_integer_beyond_u64_is_exact_decimal() {
        // Parsed as f64 by serde_json; still rendered without exponent.
        let value: Value = serde_json::from_str(r#"[10000000000000000000000]"#).unwrap();
        assert_eq!(normalize(value), json!(["10000000000000000000000"]));
    }

    #[test]
    fn test_u64_integers_keep_every_digit() {
        let value = json!({"nonce": 18446744073709551615u64, "small": -7});
        assert_eq!(
            normalize(value),
            json!({"nonce": "18446744073709551615", "small": "-7"})
        );
    }

    #[test]
    fn test_nested_structures() {
        let value = json!({
            "order": {
                "makerAmount": 2.5e20,
                "fees": [{"amount": 10}, [1, true], "x"],
                "expired": false
            }
        });

        let expected = json!({
            "order": {
                "makerAmount": "250000000000000000000",
                "fees": [{"amount": "10"}, ["1", "true"], "x"],
                "expired": "false"
            }
        });

        assert_eq!(normalize(value), expected);
    }

    #[test]
    fn test_null_is_kept() {
        assert_eq!(normalize(json!({"a": null})), json!({"a": null}));
    }

    #[test]
    fn test_normalize_map_top_level() {
        let map = json!({"deleted": true, "orderHash": "0x1"})
            .as_object()
            .cloned()
            .unwrap();

        let normalized = normalize_map(map);
        assert_eq!(normalized.get("deleted"), Some(&json!("true")));
        assert_eq!(normalized.get("orderHash"), Some(&json!("0x1")));
    }
}
