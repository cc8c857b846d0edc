//! Partition storage: one append-only ordered sub-log of a topic
//!
//! A partition owns a strictly increasing next-offset counter and the
//! in-memory record sequence. Offsets are contiguous integers starting at 0,
//! assigned at append time, and never reused or reordered. The only
//! mutations are append and expiry of a contiguous oldest-first prefix.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use crate::record::{Message, Record};

/// A single partition of a topic
pub struct Partition {
    /// Topic this partition belongs to
    pub topic: String,

    /// Partition index within the topic
    pub id: i32,

    /// Next offset to assign
    next_offset: AtomicI64,

    /// Records in append order; retention pops only from the front
    records: VecDeque<Record>,

    /// Sum of record sizes currently held
    size_bytes: u64,
}

/// Statistics for a single partition
#[derive(Debug, Clone, Serialize)]
pub struct PartitionStats {
    /// Partition index
    pub id: i32,

    /// Number of records currently held
    pub message_count: usize,

    /// Next offset to be assigned
    pub current_offset: i64,

    /// Bytes currently held
    pub size_bytes: u64,
}

impl Partition {
    /// Create a new empty partition with next-offset 0
    pub fn new(topic: impl Into<String>, id: i32) -> Self {
        Self {
            topic: topic.into(),
            id,
            next_offset: AtomicI64::new(0),
            records: VecDeque::new(),
            size_bytes: 0,
        }
    }

    /// Append a message, assigning the next offset
    ///
    /// Returns the stored record's `(offset, timestamp)`.
    pub fn append(&mut self, message: Message, size: usize, timestamp: i64) -> (i64, i64) {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);

        let record = Record {
            topic: self.topic.clone(),
            partition: self.id,
            offset,
            timestamp,
            size,
            key: message.key,
            value: message.value,
            headers: message.headers,
        };

        self.records.push_back(record);
        self.size_bytes += size as u64;

        debug!(
            topic = %self.topic,
            partition = self.id,
            offset,
            size,
            "Record appended"
        );

        (offset, timestamp)
    }

    /// Return clones of all records with `offset >= from_offset`, in order
    pub fn records_from(&self, from_offset: i64) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.offset >= from_offset)
            .cloned()
            .collect()
    }

    /// Drop the longest prefix of records whose age meets or exceeds
    /// `retention_ms` at `now_ms`
    ///
    /// A record with age strictly below `retention_ms` is inside the
    /// retention window and is never removed. With `retention_ms == 0`
    /// every already-ingested record is eligible.
    ///
    /// Returns `(removed_count, removed_bytes)`.
    pub fn expire_prefix(&mut self, retention_ms: i64, now_ms: i64) -> (u64, u64) {
        let mut removed_count = 0u64;
        let mut removed_bytes = 0u64;

        while let Some(front) = self.records.front() {
            if now_ms.saturating_sub(front.timestamp) < retention_ms {
                break;
            }
            removed_bytes += front.size as u64;
            removed_count += 1;
            self.records.pop_front();
        }

        if removed_count > 0 {
            self.size_bytes -= removed_bytes;
            debug!(
                topic = %self.topic,
                partition = self.id,
                removed_count,
                removed_bytes,
                "Expired record prefix"
            );
        }

        (removed_count, removed_bytes)
    }

    /// Next offset to be assigned (also the log-end offset)
    pub fn next_offset(&self) -> i64 {
        self.next_offset.load(Ordering::SeqCst)
    }

    /// Number of records currently held
    pub fn message_count(&self) -> usize {
        self.records.len()
    }

    /// Statistics snapshot for this partition
    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            id: self.id,
            message_count: self.records.len(),
            current_offset: self.next_offset(),
            size_bytes: self.size_bytes,
        }
    }
}
