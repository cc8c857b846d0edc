//! Topic registry and partitioned log store
//!
//! # Locking rules
//!
//! 1. `topics` (DashMap) — topic registry, use DashMap methods for safe access
//! 2. Each `Topic` contains `Vec<RwLock<Partition>>`. Lock partitions
//!    individually and never hold two partition locks at once; operations on
//!    different partitions proceed concurrently.
//!
//! The append path here is the only mutation path for record data. Consumers
//! and processors read partitions through `records_from` snapshots and never
//! touch the record sequence directly.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, StreamBusError};
use crate::record::{now_ms, Message, Record, RecordMetadata};
use crate::storage::partition::{Partition, PartitionStats};

/// Configuration for a topic, immutable after creation
#[derive(Debug, Clone, Serialize)]
pub struct TopicConfig {
    /// Number of partitions (>= 1); the unit of ordering and parallelism
    pub partitions: i32,

    /// Replication factor; stored but not enforced in a single process
    pub replication_factor: i32,

    /// Maximum record age in milliseconds before it becomes eligible for
    /// removal (>= 0)
    pub retention_ms: i64,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            replication_factor: 1,
            retention_ms: 7 * 24 * 60 * 60 * 1000, // 7 days
        }
    }
}

impl TopicConfig {
    /// Set the number of partitions
    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    /// Set the retention duration in milliseconds
    pub fn with_retention_ms(mut self, retention_ms: i64) -> Self {
        self.retention_ms = retention_ms;
        self
    }

    /// Set the advisory replication factor
    pub fn with_replication_factor(mut self, replication_factor: i32) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.partitions < 1 {
            return Err(StreamBusError::InvalidConfig(format!(
                "partitions must be >= 1, got {}",
                self.partitions
            )));
        }
        if self.retention_ms < 0 {
            return Err(StreamBusError::InvalidConfig(format!(
                "retention_ms must be >= 0, got {}",
                self.retention_ms
            )));
        }
        Ok(())
    }
}

/// A named, partitioned message stream
///
/// Each partition has its own `RwLock` for fine-grained concurrency.
pub struct Topic {
    /// Topic name (unique key in the registry)
    pub name: String,

    /// Immutable configuration
    pub config: TopicConfig,

    /// Creation timestamp (milliseconds since epoch)
    pub created_at: i64,

    /// Partitions, indexed by partition id
    partitions: Vec<RwLock<Partition>>,

    /// Total records currently held across partitions
    message_count: AtomicU64,

    /// Total bytes currently held across partitions
    bytes_count: AtomicU64,
}

/// Statistics for a topic and its partitions
#[derive(Debug, Clone, Serialize)]
pub struct TopicStats {
    /// Topic name
    pub name: String,

    /// Records currently held across all partitions
    pub message_count: u64,

    /// Bytes currently held across all partitions
    pub bytes_count: u64,

    /// Number of partitions
    pub partition_count: i32,

    /// Per-partition statistics
    pub partitions: Vec<PartitionStats>,

    /// Creation timestamp (milliseconds since epoch)
    pub created_at: i64,
}

impl Topic {
    fn new(name: impl Into<String>, config: TopicConfig) -> Self {
        let name = name.into();
        let partitions = (0..config.partitions)
            .map(|id| RwLock::new(Partition::new(name.clone(), id)))
            .collect();

        Self {
            name,
            config,
            created_at: now_ms(),
            partitions,
            message_count: AtomicU64::new(0),
            bytes_count: AtomicU64::new(0),
        }
    }

    /// Number of partitions
    pub fn partition_count(&self) -> i32 {
        self.partitions.len() as i32
    }

    /// Choose a partition for a message
    ///
    /// Keyed messages hash to a stable partition; keyless messages are
    /// spread uniformly at random.
    pub fn select_partition(&self, key: Option<&str>) -> i32 {
        match key {
            Some(key) => {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.partitions.len() as u64) as i32
            }
            None => rand::thread_rng().gen_range(0..self.partitions.len() as i32),
        }
    }

    /// Append a message to the given partition (or a selected one)
    pub fn append(
        &self,
        partition: Option<i32>,
        message: Message,
        size: usize,
    ) -> Result<RecordMetadata> {
        let partition_id = match partition {
            Some(id) => {
                if id < 0 || id >= self.partition_count() {
                    return Err(StreamBusError::PartitionNotFound(self.name.clone(), id));
                }
                id
            }
            None => self.select_partition(message.key.as_deref()),
        };

        let timestamp = now_ms();
        let (offset, timestamp) = self.partitions[partition_id as usize]
            .write()
            .append(message, size, timestamp);

        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_count.fetch_add(size as u64, Ordering::Relaxed);

        Ok(RecordMetadata {
            topic: self.name.clone(),
            partition: partition_id,
            offset,
            timestamp,
        })
    }

    /// Read all records with `offset >= from_offset` from one partition
    pub fn records_from(&self, partition: i32, from_offset: i64) -> Result<Vec<Record>> {
        let lock = self
            .partitions
            .get(partition as usize)
            .ok_or_else(|| StreamBusError::PartitionNotFound(self.name.clone(), partition))?;
        Ok(lock.read().records_from(from_offset))
    }

    /// Next offset to be assigned on one partition
    pub fn next_offset(&self, partition: i32) -> Result<i64> {
        let lock = self
            .partitions
            .get(partition as usize)
            .ok_or_else(|| StreamBusError::PartitionNotFound(self.name.clone(), partition))?;
        Ok(lock.read().next_offset())
    }

    /// Drop expired record prefixes on every partition
    ///
    /// Returns `(removed_count, removed_bytes)` across the topic. A record
    /// still within the retention window is never removed.
    pub fn enforce_retention(&self, now_ms: i64) -> (u64, u64) {
        let mut removed_count = 0u64;
        let mut removed_bytes = 0u64;

        for lock in &self.partitions {
            let (count, bytes) = lock.write().expire_prefix(self.config.retention_ms, now_ms);
            removed_count += count;
            removed_bytes += bytes;
        }

        if removed_count > 0 {
            self.message_count.fetch_sub(removed_count, Ordering::Relaxed);
            self.bytes_count.fetch_sub(removed_bytes, Ordering::Relaxed);
            debug!(
                topic = %self.name,
                removed_count,
                removed_bytes,
                "Retention removed expired records"
            );
        }

        (removed_count, removed_bytes)
    }

    /// Statistics snapshot for this topic
    pub fn stats(&self) -> TopicStats {
        TopicStats {
            name: self.name.clone(),
            message_count: self.message_count.load(Ordering::Relaxed),
            bytes_count: self.bytes_count.load(Ordering::Relaxed),
            partition_count: self.partition_count(),
            partitions: self.partitions.iter().map(|p| p.read().stats()).collect(),
            created_at: self.created_at,
        }
    }
}

/// Registry of topics, each backed by a partitioned in-memory log
pub struct TopicManager {
    /// Map of topic name to topic
    topics: DashMap<String, Arc<Topic>>,
}

impl TopicManager {
    /// Create an empty topic registry
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Create a topic
    ///
    /// Fails with `TopicAlreadyExists` if the name is taken and
    /// `InvalidConfig` if the configuration is out of range.
    pub fn create_topic(&self, name: &str, config: TopicConfig) -> Result<()> {
        config.validate()?;

        // The entry API makes check-and-insert atomic; racing creates
        // must never replace a live topic and reset its offsets.
        match self.topics.entry(name.to_string()) {
            Entry::Occupied(_) => {
                return Err(StreamBusError::TopicAlreadyExists(name.to_string()));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Topic::new(name, config)));
            }
        }

        info!(topic = %name, "Created topic");
        Ok(())
    }

    /// Look up a topic by name
    pub fn get(&self, name: &str) -> Result<Arc<Topic>> {
        self.topics
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StreamBusError::TopicNotFound(name.to_string()))
    }

    /// Whether a topic exists
    pub fn contains(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// Names of all topics
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    /// Append a message to a topic, assigning partition and offset
    ///
    /// After the append, expired records on the topic are swept lazily so
    /// retention holds even without the periodic background pass.
    pub fn append(
        &self,
        topic_name: &str,
        partition: Option<i32>,
        message: Message,
    ) -> Result<RecordMetadata> {
        let size = message.serialized_size()?;
        self.append_sized(topic_name, partition, message, size)
    }

    /// Append with a pre-computed serialized size
    pub(crate) fn append_sized(
        &self,
        topic_name: &str,
        partition: Option<i32>,
        message: Message,
        size: usize,
    ) -> Result<RecordMetadata> {
        let topic = self.get(topic_name)?;
        let metadata = topic.append(partition, message, size)?;

        // Lazy sweep keeps retention current between background passes
        topic.enforce_retention(now_ms());

        Ok(metadata)
    }

    /// Statistics for one topic
    pub fn topic_stats(&self, name: &str) -> Result<TopicStats> {
        Ok(self.get(name)?.stats())
    }

    /// Statistics for every topic
    pub fn all_stats(&self) -> Vec<TopicStats> {
        self.topics.iter().map(|e| e.value().stats()).collect()
    }

    /// Sweep expired records on every topic
    ///
    /// Returns the total number of removed records.
    pub fn sweep_expired(&self, now_ms: i64) -> u64 {
        let mut removed = 0u64;
        for entry in self.topics.iter() {
            let (count, _) = entry.value().enforce_retention(now_ms);
            removed += count;
        }
        removed
    }
}

impl Default for TopicManager {
    fn default() -> Self {
        Self::new()
    }
}
