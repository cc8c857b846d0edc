//! Retention enforcement for the in-memory log store
//!
//! Retention runs in two places: a lazy sweep after each append (see
//! `TopicManager::append`) and the periodic pass driven by this enforcer
//! from the engine's background task. Both delete only a contiguous
//! oldest-first prefix per partition; a record still inside its topic's
//! retention window is never removed.

use std::time::Duration;
use tracing::{debug, info};

use crate::record::now_ms;
use crate::storage::topic::TopicManager;

/// Default interval between periodic retention sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Periodic retention sweeper
pub struct RetentionEnforcer {
    /// Interval between sweeps
    interval: Duration,
}

impl RetentionEnforcer {
    /// Create an enforcer with the default interval
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }

    /// Create an enforcer with a custom interval
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Interval between sweeps
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep expired records on every topic
    pub fn enforce(&self, topics: &TopicManager) {
        let removed = topics.sweep_expired(now_ms());
        if removed > 0 {
            info!(removed, "Retention sweep removed expired records");
        } else {
            debug!("Retention sweep found nothing to remove");
        }
    }
}

impl Default for RetentionEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Message;
    use crate::storage::topic::TopicConfig;
    use serde_json::json;

    #[test]
    fn test_enforcer_interval() {
        let enforcer = RetentionEnforcer::new();
        assert_eq!(
            enforcer.interval(),
            Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)
        );

        let enforcer = RetentionEnforcer::with_interval(Duration::from_millis(50));
        assert_eq!(enforcer.interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_enforce_sweeps_only_expired_topics() {
        let topics = TopicManager::new();
        topics
            .create_topic("keep", TopicConfig::default())
            .unwrap();
        topics
            .create_topic("drop", TopicConfig::default().with_retention_ms(0))
            .unwrap();

        let keep = topics.get("keep").unwrap();
        let drop = topics.get("drop").unwrap();
        keep.append(Some(0), Message::new(json!(1)), 8).unwrap();
        drop.append(Some(0), Message::new(json!(1)), 8).unwrap();

        let enforcer = RetentionEnforcer::new();
        enforcer.enforce(&topics);

        assert_eq!(keep.stats().message_count, 1, "in-window record survives");
        assert_eq!(drop.stats().message_count, 0);

        // A second sweep with no appends in between is a no-op
        assert_eq!(topics.sweep_expired(now_ms()), 0);
    }
}
