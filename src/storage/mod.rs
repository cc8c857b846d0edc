//! In-memory partitioned log storage
//!
//! The storage layer owns topics, partitions, offsets, and retention. It
//! knows nothing about producers, consumers, or processors; those client
//! concepts live in the engine facade on top of this module.

pub mod partition;
pub mod retention;
pub mod topic;

pub use partition::{Partition, PartitionStats};
pub use retention::{RetentionEnforcer, DEFAULT_SWEEP_INTERVAL_SECS};
pub use topic::{Topic, TopicConfig, TopicManager, TopicStats};
