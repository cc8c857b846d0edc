//! Consumer handles and offset tracking
//!
//! A consumer is a named client handle scoped to a group id. It tracks its
//! own committed offset per (topic, partition); two consumers sharing a
//! group id are logically independent — there is no partition-ownership
//! arbitration or rebalancing in this engine. That is a deliberate
//! simplification of consumer groups, not a bug.
//!
//! Commit policy: commits are monotonic. A commit entry lower than the
//! current committed offset is clamped (the stored value is unchanged), so
//! a consumer can never move backwards and re-deliver records it already
//! acknowledged.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Where a consumer starts reading a partition it has no commit for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OffsetReset {
    /// Start from offset 0
    Earliest,
    /// Start from the partition's next offset at subscribe time
    Latest,
}

/// Consumer configuration
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerConfig {
    /// Starting position for partitions with no committed offset
    pub auto_offset_reset: OffsetReset,

    /// Commit on the caller's behalf after each poll
    ///
    /// The engine implements the per-poll variant: when enabled, every
    /// record returned by a poll is committed (`last offset + 1` per
    /// touched partition) before the poll returns to the caller.
    pub enable_auto_commit: bool,

    /// Accepted for compatibility; unused by the per-poll commit variant
    pub auto_commit_interval_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            auto_offset_reset: OffsetReset::Latest,
            enable_auto_commit: true,
            auto_commit_interval_ms: 5000,
        }
    }
}

impl ConsumerConfig {
    /// Set the offset reset policy
    pub fn with_offset_reset(mut self, reset: OffsetReset) -> Self {
        self.auto_offset_reset = reset;
        self
    }

    /// Enable or disable per-poll auto-commit
    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.enable_auto_commit = enabled;
        self
    }
}

/// A registered consumer handle
pub struct Consumer {
    /// Client id (unique key in the engine)
    pub id: String,

    /// Group id; an offset-tracking scope only
    pub group_id: String,

    /// Configuration
    pub config: ConsumerConfig,

    /// Subscribed topic names
    pub(crate) subscriptions: HashSet<String>,

    /// Committed offset per (topic, partition)
    pub(crate) committed: HashMap<(String, i32), i64>,

    /// For `Latest` consumers: the next-offset observed at subscribe time,
    /// pinned so records appended afterwards are still delivered
    pub(crate) reset_baselines: HashMap<(String, i32), i64>,

    /// Whether the consumer accepts polls
    pub(crate) connected: bool,

    /// Records returned by polls so far
    pub(crate) messages_consumed: u64,

    /// Bytes returned by polls so far
    pub(crate) bytes_consumed: u64,
}

/// Statistics snapshot for a consumer
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerStats {
    /// Client id
    pub id: String,

    /// Group id
    pub group_id: String,

    /// Subscribed topic names
    pub subscriptions: Vec<String>,

    /// Records returned by polls so far
    pub messages_consumed: u64,

    /// Bytes returned by polls so far
    pub bytes_consumed: u64,

    /// Whether the consumer accepts polls
    pub connected: bool,

    /// Committed offsets keyed as `"topic-partition"`
    pub committed_offsets: HashMap<String, i64>,
}

impl Consumer {
    /// Create a connected consumer with an empty offset map
    pub fn new(id: impl Into<String>, group_id: impl Into<String>, config: ConsumerConfig) -> Self {
        Self {
            id: id.into(),
            group_id: group_id.into(),
            config,
            subscriptions: HashSet::new(),
            committed: HashMap::new(),
            reset_baselines: HashMap::new(),
            connected: true,
            messages_consumed: 0,
            bytes_consumed: 0,
        }
    }

    /// Whether the consumer accepts polls
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The offset this consumer should read from on a (topic, partition)
    ///
    /// Committed offset wins; otherwise the reset policy applies, with the
    /// `Latest` baseline pinned on first use.
    pub(crate) fn position(&mut self, topic: &str, partition: i32, next_offset: i64) -> i64 {
        let key = (topic.to_string(), partition);
        if let Some(&committed) = self.committed.get(&key) {
            return committed;
        }
        match self.config.auto_offset_reset {
            OffsetReset::Earliest => 0,
            OffsetReset::Latest => *self.reset_baselines.entry(key).or_insert(next_offset),
        }
    }

    /// Pin the `Latest` baseline for a partition if no commit exists yet
    pub(crate) fn pin_latest_baseline(&mut self, topic: &str, partition: i32, next_offset: i64) {
        let key = (topic.to_string(), partition);
        if !self.committed.contains_key(&key) {
            self.reset_baselines.entry(key).or_insert(next_offset);
        }
    }

    /// Apply a commit map with the monotonic clamp policy
    pub(crate) fn commit(&mut self, offsets: &HashMap<(String, i32), i64>) {
        for (key, &offset) in offsets {
            self.committed
                .entry(key.clone())
                .and_modify(|current| {
                    if offset > *current {
                        *current = offset;
                    }
                })
                .or_insert(offset);
        }
    }

    /// Record records returned by a poll
    pub(crate) fn record_poll(&mut self, messages: u64, bytes: u64) {
        self.messages_consumed += messages;
        self.bytes_consumed += bytes;
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            id: self.id.clone(),
            group_id: self.group_id.clone(),
            subscriptions: self.subscriptions.iter().cloned().collect(),
            messages_consumed: self.messages_consumed,
            bytes_consumed: self.bytes_consumed,
            connected: self.connected,
            committed_offsets: self
                .committed
                .iter()
                .map(|((topic, partition), &offset)| (format!("{}-{}", topic, partition), offset))
                .collect(),
        }
    }
}
