//! Redis Streams backed log client.
//!
//! The update log and the snapshot log are plain Redis streams:
//! - appends use `XADD <stream> * <field> <payload>`
//! - consumption uses `XREAD BLOCK <ms> COUNT <n> STREAMS <stream> <cursor>`
//! - the newest snapshot is read with `XREVRANGE <stream> + - COUNT 1`

use crate::error::Result;
use crate::stream::{EntryId, LogEntry, StreamLog};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default `XREAD BLOCK` timeout in milliseconds.
pub const DEFAULT_BLOCK_MS: usize = 5_000;

/// Shared Redis client wrapper.
#[derive(Clone)]
pub struct SharedRedisClient {
    client: Arc<redis::Client>,
}

impl SharedRedisClient {
    /// Create a new shared Redis client.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Open a new async connection.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Check connectivity with `PING`.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// One Redis stream used as an append-only log.
///
/// Blocking reads get their own connection so that an `XREAD BLOCK` in
/// flight never delays appends issued by other tasks.
pub struct RedisStreamLog {
    client: SharedRedisClient,
    stream: String,
    field: String,
    block_ms: usize,
    reader: Mutex<Option<MultiplexedConnection>>,
    writer: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStreamLog {
    /// Create a log over `stream`, storing payloads under `field`.
    pub fn new(client: SharedRedisClient, stream: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            client,
            stream: stream.into(),
            field: field.into(),
            block_ms: DEFAULT_BLOCK_MS,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Set the `XREAD BLOCK` timeout. `0` blocks until an entry arrives.
    pub fn with_block_ms(mut self, block_ms: usize) -> Self {
        self.block_ms = block_ms;
        self
    }

    /// Get the cached connection in `slot`, connecting if needed.
    async fn connection(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
    ) -> Result<MultiplexedConnection> {
        let mut guard = slot.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_connection().await?;
        info!("Opened Redis connection for stream '{}'", self.stream);
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects.
    async fn reset(&self, slot: &Mutex<Option<MultiplexedConnection>>) {
        warn!("Dropping Redis connection for stream '{}'", self.stream);
        *slot.lock().await = None;
    }

    fn to_entry(&self, raw: StreamId) -> Result<LogEntry> {
        let id: EntryId = raw.id.parse()?;
        let payload = raw.get::<String>(&self.field);
        Ok(LogEntry::new(id, payload))
    }
}

#[async_trait]
impl StreamLog for RedisStreamLog {
    fn name(&self) -> &str {
        &self.stream
    }

    async fn append(&self, payload: &str) -> Result<EntryId> {
        let mut conn = self.connection(&self.writer).await?;

        let result: redis::RedisResult<String> = conn
            .xadd(&self.stream, "*", &[(self.field.as_str(), payload)])
            .await;

        let id = match result {
            Ok(id) => id,
            Err(e) => {
                self.reset(&self.writer).await;
                return Err(e.into());
            }
        };

        debug!(
            "Appended {} bytes to stream '{}' as {}",
            payload.len(),
            self.stream,
            id
        );
        id.parse()
    }

    async fn read_after(&self, after: EntryId, count: usize) -> Result<Vec<LogEntry>> {
        let mut conn = self.connection(&self.reader).await?;
        let options = StreamReadOptions::default()
            .block(self.block_ms)
            .count(count);

        // A timed-out XREAD BLOCK replies nil.
        let result: redis::RedisResult<Option<StreamReadReply>> = conn
            .xread_options(&[self.stream.as_str()], &[after.to_string()], &options)
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.reset(&self.reader).await;
                return Err(e.into());
            }
        };

        reply
            .map(|r| r.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids)
            .map(|raw| self.to_entry(raw))
            .collect()
    }

    async fn latest(&self) -> Result<Option<LogEntry>> {
        let mut conn = self.connection(&self.writer).await?;

        let result: redis::RedisResult<StreamRangeReply> =
            conn.xrevrange_count(&self.stream, "+", "-", 1).await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.reset(&self.writer).await;
                return Err(e.into());
            }
        };

        reply
            .ids
            .into_iter()
            .next()
            .map(|raw| self.to_entry(raw))
            .transpose()
    }
}
