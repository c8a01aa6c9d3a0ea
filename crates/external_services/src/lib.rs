//! External service clients for the order replica.
//!
//! This library provides access to the systems the replica depends on:
//! - Redis Streams: the append-only update and snapshot logs
//! - Ethereum JSON-RPC: on-chain balance/allowance lookups and readiness checks
//!
//! # Example
//!
//! ```ignore
//! use external_services::{EntryId, RedisStreamLog, SharedRedisClient, StreamLog};
//!
//! let redis = SharedRedisClient::new("redis://localhost:6379")?;
//! let updates = RedisStreamLog::new(redis, "updateStream", "data");
//! let batch = updates.read_after(EntryId::ZERO, 100).await?;
//!
//! let rpc = EthRpcClient::new("http://localhost:8545");
//! let block = rpc.block_number().await?;
//! ```

pub mod error;
pub mod redis_client;
pub mod rpc;
pub mod stream;

pub use error::{Error, Result};
pub use redis_client::{RedisStreamLog, SharedRedisClient, DEFAULT_BLOCK_MS};
pub use rpc::EthRpcClient;
pub use stream::{EntryId, LogEntry, StreamLog};
