//! In-memory stand-ins for the streams and on-chain sources, used by tests.

use crate::error::{Error, Result};
use crate::order::{OnChainData, Order};
use crate::traits::OnChainSource;
use async_trait::async_trait;
use external_services::{EntryId, LogEntry, StreamLog};
use num_bigint::BigUint;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// How long an empty `read_after` waits before returning nothing.
const BLOCK: Duration = Duration::from_millis(50);

/// Stream log held in memory. IDs are `<n>-0` with `n` starting at 1.
pub(crate) struct MemoryLog {
    name: String,
    entries: Mutex<Vec<LogEntry>>,
    notify: Notify,
    failing_reads: AtomicU32,
}

impl MemoryLog {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Mutex::new(Vec::new()),
            notify: Notify::new(),
            failing_reads: AtomicU32::new(0),
        }
    }

    /// Append an entry, with or without a payload field.
    pub(crate) fn push(&self, payload: Option<&str>) -> EntryId {
        let id = {
            let mut entries = self.entries.lock().unwrap();
            let id = EntryId::new(entries.len() as u64 + 1, 0);
            entries.push(LogEntry::new(id, payload.map(str::to_string)));
            id
        };
        self.notify.notify_waiters();
        id
    }

    /// Append a JSON payload.
    pub(crate) fn push_json(&self, value: Value) -> EntryId {
        self.push(Some(&value.to_string()))
    }

    pub(crate) fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Make the next `count` reads fail.
    pub(crate) fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    fn collect_after(&self, after: EntryId, count: usize) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.id > after)
            .take(count)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StreamLog for MemoryLog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, payload: &str) -> external_services::Result<EntryId> {
        Ok(self.push(Some(payload)))
    }

    async fn read_after(
        &self,
        after: EntryId,
        count: usize,
    ) -> external_services::Result<Vec<LogEntry>> {
        let failing = self.failing_reads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_reads.store(failing - 1, Ordering::SeqCst);
            return Err(external_services::Error::InvalidResponse(
                "injected read failure".to_string(),
            ));
        }

        let notified = self.notify.notified();
        let found = self.collect_after(after, count);
        if !found.is_empty() {
            return Ok(found);
        }

        let _ = tokio::time::timeout(BLOCK, notified).await;
        Ok(self.collect_after(after, count))
    }

    async fn latest(&self) -> external_services::Result<Option<LogEntry>> {
        Ok(self.entries.lock().unwrap().last().cloned())
    }
}

/// On-chain source returning fixed data, or failing when built without any.
pub(crate) struct StubSource {
    family: String,
    data: Option<OnChainData>,
    calls: AtomicUsize,
}

impl StubSource {
    pub(crate) fn new(family: &str, data: OnChainData) -> Self {
        Self {
            family: family.to_string(),
            data: Some(data),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(family: &str) -> Self {
        Self {
            family: family.to_string(),
            data: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnChainSource for StubSource {
    fn family(&self) -> &str {
        &self.family
    }

    async fn fetch_on_chain_data(&self, order: &Order) -> Result<OnChainData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.data
            .clone()
            .ok_or_else(|| Error::Conversion(format!("stub lookup failed for {}", order.order_hash)))
    }
}

pub(crate) fn on_chain(balance: u32, allowance: u32) -> OnChainData {
    OnChainData {
        order_info: json!({"status": "fillable"}),
        maker_balance: BigUint::from(balance),
        maker_allowance: BigUint::from(allowance),
    }
}
