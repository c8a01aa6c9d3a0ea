//! Order record and its on-chain enrichment.
//!
//! Wire names match what other producers and consumers of the streams use
//! (`orderHash`, `orderBookName`, `offChainData`, `onChainData`, ...).

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One replicated order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique, immutable key.
    pub order_hash: String,
    /// Family discriminator selecting the on-chain source (e.g. "zrx").
    #[serde(default)]
    pub order_book_name: String,
    /// Producer-supplied payload, `Null` until the first update carries one.
    #[serde(default)]
    pub off_chain_data: Value,
    /// Set by enrichment only. All-or-nothing.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_complete_on_chain_data"
    )]
    pub on_chain_data: Option<OnChainData>,
}

impl Order {
    /// Create an empty order with the given key.
    pub fn new(order_hash: impl Into<String>) -> Self {
        Self {
            order_hash: order_hash.into(),
            ..Default::default()
        }
    }

    /// Whether all on-chain fields are present.
    pub fn is_enriched(&self) -> bool {
        self.on_chain_data
            .as_ref()
            .is_some_and(|data| !data.order_info.is_null())
    }

    /// Whether the order carries producer data.
    pub fn has_off_chain_data(&self) -> bool {
        !self.off_chain_data.is_null()
    }
}

/// Result of an on-chain lookup for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainData {
    /// Family-specific order status, opaque to the replica.
    #[serde(rename = "orderInfo")]
    pub order_info: Value,
    /// Maker's token balance in base units.
    #[serde(rename = "makerBalance_weiUnits", with = "biguint_string")]
    pub maker_balance: BigUint,
    /// Allowance granted by the maker to the exchange, in base units.
    #[serde(rename = "makerAllowance_weiUnits", with = "biguint_string")]
    pub maker_allowance: BigUint,
}

/// On-chain data as other writers may have serialized it, with any field
/// possibly missing or null.
#[derive(Debug, Deserialize)]
struct PartialOnChainData {
    #[serde(rename = "orderInfo", default)]
    order_info: Option<Value>,
    #[serde(
        rename = "makerBalance_weiUnits",
        default,
        deserialize_with = "biguint_string::deserialize_option"
    )]
    maker_balance: Option<BigUint>,
    #[serde(
        rename = "makerAllowance_weiUnits",
        default,
        deserialize_with = "biguint_string::deserialize_option"
    )]
    maker_allowance: Option<BigUint>,
}

fn deserialize_complete_on_chain_data<'de, D>(deserializer: D) -> Result<Option<OnChainData>, D::Error>
where
    D: Deserializer<'de>,
{
    let partial = Option::<PartialOnChainData>::deserialize(deserializer)?;

    Ok(partial.and_then(|p| match (p.order_info, p.maker_balance, p.maker_allowance) {
        (Some(order_info), Some(maker_balance), Some(maker_allowance)) => Some(OnChainData {
            order_info,
            maker_balance,
            maker_allowance,
        }),
        _ => None,
    }))
}

/// Serialize [`BigUint`] as a decimal string.
///
/// Deserialization accepts decimal strings and JSON numbers; numbers too
/// large for `u64` are recovered through the value normalizer.
pub mod biguint_string {
    use num_bigint::BigUint;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse(value).map_err(D::Error::custom)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<BigUint>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            Some(value) => parse(value).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }

    fn parse(value: Value) -> Result<BigUint, String> {
        match normalizer::normalize(value) {
            Value::String(text) => text
                .parse::<BigUint>()
                .map_err(|e| format!("invalid unsigned integer '{}': {}", text, e)),
            other => Err(format!("expected unsigned integer, got {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enriched_order() -> Order {
        Order {
            order_hash: "0xabc".to_string(),
            order_book_name: "zrx".to_string(),
            off_chain_data: json!({"maker": "0x1"}),
            on_chain_data: Some(OnChainData {
                order_info: json!({"status": "fillable"}),
                maker_balance: "1000000000000000000000000".parse().unwrap(),
                maker_allowance: BigUint::from(10u32),
            }),
        }
    }

    #[test]
    fn test_serialize_uses_wire_names_and_decimal_strings() {
        let value = serde_json::to_value(enriched_order()).unwrap();
        assert_eq!(
            value,
            json!({
                "orderHash": "0xabc",
                "orderBookName": "zrx",
                "offChainData": {"maker": "0x1"},
                "onChainData": {
                    "orderInfo": {"status": "fillable"},
                    "makerBalance_weiUnits": "1000000000000000000000000",
                    "makerAllowance_weiUnits": "10"
                }
            })
        );
    }

    #[test]
    fn test_unenriched_order_omits_on_chain_data() {
        let value = serde_json::to_value(Order::new("0x1")).unwrap();
        assert!(value.get("onChainData").is_none());
    }

    #[test]
    fn test_deserialize_numeric_amounts() {
        let order: Order = serde_json::from_str(
            r#"{
                "orderHash": "0xabc",
                "orderBookName": "zrx",
                "offChainData": {},
                "onChainData": {
                    "orderInfo": {"status": 3},
                    "makerBalance_weiUnits": 1e21,
                    "makerAllowance_weiUnits": 42
                }
            }"#,
        )
        .unwrap();

        let data = order.on_chain_data.unwrap();
        assert_eq!(data.maker_balance.to_string(), "1000000000000000000000");
        assert_eq!(data.maker_allowance, BigUint::from(42u32));
    }

    #[test]
    fn test_partial_on_chain_data_is_absent() {
        let order: Order = serde_json::from_str(
            r#"{
                "orderHash": "0xabc",
                "onChainData": {
                    "orderInfo": null,
                    "makerBalance_weiUnits": null,
                    "makerAllowance_weiUnits": "5"
                }
            }"#,
        )
        .unwrap();

        assert!(order.on_chain_data.is_none());
        assert!(!order.is_enriched());
        assert!(!order.has_off_chain_data());
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let result = serde_json::from_str::<OnChainData>(
            r#"{"orderInfo": {}, "makerBalance_weiUnits": "-1", "makerAllowance_weiUnits": "0"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_is_enriched() {
        assert!(enriched_order().is_enriched());

        let mut order = enriched_order();
        if let Some(data) = order.on_chain_data.as_mut() {
            data.order_info = Value::Null;
        }
        assert!(!order.is_enriched());
    }
}
