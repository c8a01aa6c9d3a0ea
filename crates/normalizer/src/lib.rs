//! Value normalization and typed decoding for order update entries.
//!
//! Update payloads reach this process as JSON objects written by many
//! producers. A generic JSON decoder represents integers beyond `u64` as
//! `f64`, which would render amounts in base units as `1e21` and break any
//! big-integer parsing downstream. This crate rewrites every leaf into its
//! exact textual form before the payload is interpreted.
//!
//! # Pipeline
//!
//! ```text
//! raw "data" field --> serde_json::Map --> normalize_map --> UpdateEntry --> UpdateAction
//!                      (parse)             (stringify leaves) (typed decode)   (what to do)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use normalizer::{UpdateAction, UpdateEntry};
//!
//! let entry = UpdateEntry::decode(r#"{"orderHash":"0xabc","offChainData":{"price":1}}"#)?;
//! match entry.into_action() {
//!     UpdateAction::Delete { order_hash } => { /* remove */ }
//!     UpdateAction::Upsert { order_hash, .. } => { /* apply and enrich */ }
//!     UpdateAction::Skip { .. } => {}
//! }
//! ```

pub mod error;
pub mod schema;
pub mod value;

pub use error::{DecodeError, Result};
pub use schema::{
    UpdateAction, UpdateEntry, FIELD_DELETED, FIELD_OFF_CHAIN_DATA, FIELD_ON_CHAIN_DATA,
    FIELD_ORDER_BOOK_NAME, FIELD_ORDER_HASH,
};
pub use value::{normalize, normalize_map};
