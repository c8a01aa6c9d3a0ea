//! Typed update entries decoded from the update stream.

use crate::error::{DecodeError, Result};
use crate::value::normalize_map;
use serde_json::{Map, Value};

/// Record key.
pub const FIELD_ORDER_HASH: &str = "orderHash";
/// Family discriminator selecting the on-chain source.
pub const FIELD_ORDER_BOOK_NAME: &str = "orderBookName";
/// Producer-supplied payload.
pub const FIELD_OFF_CHAIN_DATA: &str = "offChainData";
/// Deletion marker ("true", case-insensitive).
pub const FIELD_DELETED: &str = "deleted";
/// Enrichment result, only ever written by the enrichment pipeline.
pub const FIELD_ON_CHAIN_DATA: &str = "onChainData";

/// One decoded update entry.
///
/// Absence of a field is represented by `None`; the raw map is never probed
/// after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEntry {
    /// Key of the record this entry targets.
    pub order_hash: String,
    /// New family discriminator, if the entry carried one.
    pub order_book_name: Option<String>,
    /// New off-chain payload (normalized), if the entry carried one.
    pub off_chain_data: Option<Value>,
    /// Whether the entry marks the record as deleted.
    pub deleted: bool,
}

/// What the consumer should do with an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Remove the record. Every other field of the entry is ignored.
    Delete { order_hash: String },
    /// Create or update the record, then enrich it.
    Upsert {
        order_hash: String,
        order_book_name: Option<String>,
        off_chain_data: Value,
    },
    /// Nothing actionable (e.g. an enrichment delta without off-chain data).
    Skip { order_hash: String },
}

impl UpdateEntry {
    /// Parse and decode a raw JSON payload.
    pub fn decode(payload: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(payload)? {
            Value::Object(map) => Self::from_map(map),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    /// Normalize a field map and decode the recognized fields.
    ///
    /// Unrecognized fields (including `onChainData`) are ignored.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let mut fields = normalize_map(map);

        let order_hash = match fields.remove(FIELD_ORDER_HASH) {
            Some(Value::String(hash)) if !hash.is_empty() => hash,
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(DecodeError::MissingOrderHash)
            }
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: FIELD_ORDER_HASH,
                    expected: "string",
                })
            }
        };

        let deleted = match fields.remove(FIELD_DELETED) {
            Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
            Some(Value::Null) | None => false,
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: FIELD_DELETED,
                    expected: "string or boolean",
                })
            }
        };

        // Deletion short-circuits the rest of the entry.
        if deleted {
            return Ok(Self {
                order_hash,
                order_book_name: None,
                off_chain_data: None,
                deleted,
            });
        }

        let order_book_name = match fields.remove(FIELD_ORDER_BOOK_NAME) {
            Some(Value::String(name)) if !name.is_empty() => Some(name),
            Some(Value::String(_)) | Some(Value::Null) | None => None,
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    field: FIELD_ORDER_BOOK_NAME,
                    expected: "string",
                })
            }
        };

        let off_chain_data = fields
            .remove(FIELD_OFF_CHAIN_DATA)
            .filter(|value| !value.is_null());

        Ok(Self {
            order_hash,
            order_book_name,
            off_chain_data,
            deleted,
        })
    }

    /// Classify the entry.
    pub fn into_action(self) -> UpdateAction {
        if self.deleted {
            return UpdateAction::Delete {
                order_hash: self.order_hash,
            };
        }

        match self.off_chain_data {
            Some(off_chain_data) => UpdateAction::Upsert {
                order_hash: self.order_hash,
                order_book_name: self.order_book_name,
                off_chain_data,
            },
            None => UpdateAction::Skip {
                order_hash: self.order_hash,
            },
        }
    }
}
