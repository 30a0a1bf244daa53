//! Pending request table.
//!
//! Maps request IDs to the callers blocked on them. Each entry owns the
//! sending half of a typed one-shot channel; the blocked caller holds the
//! receiving half. Delivering a reply moves the decoded value through that
//! channel, which is both the single write into the result slot and the
//! completion signal.
//!
//! Flow:
//! 1. Caller builds a `PendingRequest` from a fresh `oneshot` sender
//! 2. Caller calls `insert()` before the request is transmitted
//! 3. Delivery thread calls `lookup_and_remove()` when the reply arrives
//! 4. Delivery thread calls `PendingRequest::complete()` with the payload
//! 5. Caller's receiver resolves

use crate::error::{DispatchError, FilterError};
use crate::id::RequestId;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

/// Destination for one reply value.
///
/// Implemented by [`TypedSlot`]; boxed so the table can hold calls expecting
/// different result types side by side.
pub trait ResultSlot: Send {
    /// Decode `result` into the registered type and hand it to the caller.
    ///
    /// Consumes the slot: a result is written at most once. On a decode error
    /// the slot is dropped, which wakes the caller without a value.
    fn fill(self: Box<Self>, result: serde_json::Value) -> Result<(), DispatchError>;
}

/// One-shot result cell for a caller expecting a `T`.
pub struct TypedSlot<T> {
    sender: oneshot::Sender<T>,
}

impl<T> TypedSlot<T> {
    pub fn new(sender: oneshot::Sender<T>) -> Self {
        Self { sender }
    }
}

impl<T> ResultSlot for TypedSlot<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn fill(self: Box<Self>, result: serde_json::Value) -> Result<(), DispatchError> {
        let value: T = serde_json::from_value(result)?;
        self.sender.send(value).map_err(|_| DispatchError::CallerGone)
    }
}

/// A call waiting for its reply.
pub struct PendingRequest {
    id: RequestId,
    /// Method name (for logging)
    method: String,
    /// When the entry was created
    created_at: Instant,
    slot: Box<dyn ResultSlot>,
}

impl PendingRequest {
    pub fn new(id: RequestId, method: impl Into<String>, slot: Box<dyn ResultSlot>) -> Self {
        Self {
            id,
            method: method.into(),
            created_at: Instant::now(),
            slot,
        }
    }

    /// Convenience constructor for a typed one-shot sender.
    pub fn with_sender<T>(
        id: RequestId,
        method: impl Into<String>,
        sender: oneshot::Sender<T>,
    ) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self::new(id, method, Box::new(TypedSlot::new(sender)))
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Time since the entry was created.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Write the reply into the slot and wake the caller.
    pub fn complete(self, result: serde_json::Value) -> Result<(), DispatchError> {
        self.slot.fill(result)
    }

    /// Drop the slot without a value; the caller wakes and returns its default.
    pub fn abandon(self) {
        drop(self.slot);
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("elapsed", &self.elapsed())
            .finish_non_exhaustive()
    }
}

/// Counters for the pending table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total entries registered
    pub total_registered: AtomicU64,
    /// Total replies handed to a waiting caller
    pub total_completed: AtomicU64,
    /// Total replies that matched no entry
    pub total_stale: AtomicU64,
    /// Total entries removed by their own caller (shutdown, send failure), or
    /// whose caller had left by the time the reply arrived
    pub total_cancelled: AtomicU64,
    /// Total replies that did not decode to the caller's type
    pub total_failed: AtomicU64,
    /// Total entries dropped by `clear_all`
    pub total_drained: AtomicU64,
    /// Total inserts refused (duplicate id, table full)
    pub total_rejected: AtomicU64,
}

/// Plain copy of [`PendingStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub stale: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub drained: u64,
    pub rejected: u64,
}

impl PendingStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.total_registered.load(Ordering::Relaxed),
            completed: self.total_completed.load(Ordering::Relaxed),
            stale: self.total_stale.load(Ordering::Relaxed),
            cancelled: self.total_cancelled.load(Ordering::Relaxed),
            failed: self.total_failed.load(Ordering::Relaxed),
            drained: self.total_drained.load(Ordering::Relaxed),
            rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Concurrent table of outstanding calls.
///
/// The mutex guards the map only. Result values never pass through it: they
/// travel over each entry's one-shot channel after the entry has been removed.
pub struct PendingRequestTable {
    entries: Mutex<HashMap<RequestId, PendingRequest>>,
    /// Maximum entries, `None` for unbounded
    capacity: Option<usize>,
    stats: PendingStats,
}

impl PendingRequestTable {
    /// Create an unbounded table
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            stats: PendingStats::default(),
        }
    }

    /// Register `entry` under `id`.
    ///
    /// An outstanding entry with the same ID is left untouched and the new one
    /// is refused.
    pub fn insert(&self, id: RequestId, entry: PendingRequest) -> Result<(), FilterError> {
        let mut entries = self.entries.lock();

        if entries.contains_key(&id) {
            self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(FilterError::DuplicateRequestId(id));
        }

        if let Some(capacity) = self.capacity {
            if entries.len() >= capacity {
                self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(FilterError::TableFull { capacity });
            }
        }

        debug!(request_id = %id, method = entry.method(), "Registered pending request");
        entries.insert(id, entry);
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Find and remove the entry for `id`.
    ///
    /// `None` means there is nothing to deliver to: the ID was never
    /// registered, already completed, or drained. A found entry is counted
    /// once its delivery outcome is known, see [`record_delivery`](Self::record_delivery).
    pub fn lookup_and_remove(&self, id: RequestId) -> Option<PendingRequest> {
        let removed = self.entries.lock().remove(&id);
        if removed.is_none() {
            self.stats.total_stale.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Count the outcome of `PendingRequest::complete` on a looked-up entry.
    pub fn record_delivery(&self, outcome: &Result<(), DispatchError>) {
        let counter = match outcome {
            Ok(()) => &self.stats.total_completed,
            Err(DispatchError::CallerGone) => &self.stats.total_cancelled,
            Err(DispatchError::Decode(_)) => &self.stats.total_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove an entry on behalf of its own caller.
    pub fn remove(&self, id: RequestId) -> bool {
        if self.entries.lock().remove(&id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove and return every remaining entry.
    pub fn clear_all(&self) -> Vec<PendingRequest> {
        let drained: Vec<_> = self.entries.lock().drain().map(|(_, entry)| entry).collect();
        self.stats
            .total_drained
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    /// Number of outstanding entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Check if an ID is outstanding
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}
