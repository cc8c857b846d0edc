//! Producer handles
//!
//! A producer is a named client handle that appends messages to topics
//! through the engine. The configuration knobs mirror the usual producer
//! tuning surface but are advisory only; sends complete synchronously and
//! correctness never depends on batching or linger timing.

use serde::Serialize;

/// Advisory producer tuning options
#[derive(Debug, Clone, Serialize)]
pub struct ProducerConfig {
    /// Advisory batch size
    pub batch_size: usize,

    /// Advisory linger time in milliseconds
    pub linger_ms: u64,

    /// Advisory retry count
    pub retries: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            linger_ms: 10,
            retries: 3,
        }
    }
}

/// A registered producer handle
pub struct Producer {
    /// Client id (unique key in the engine)
    pub id: String,

    /// Advisory configuration
    pub config: ProducerConfig,

    /// Whether the producer accepts sends
    pub(crate) connected: bool,

    /// Messages sent so far
    pub(crate) messages_sent: u64,

    /// Bytes sent so far
    pub(crate) bytes_sent: u64,
}

/// Statistics snapshot for a producer
#[derive(Debug, Clone, Serialize)]
pub struct ProducerStats {
    /// Client id
    pub id: String,

    /// Whether the producer accepts sends
    pub connected: bool,

    /// Messages sent so far
    pub messages_sent: u64,

    /// Bytes sent so far
    pub bytes_sent: u64,
}

impl Producer {
    /// Create a connected producer with zeroed counters
    pub fn new(id: impl Into<String>, config: ProducerConfig) -> Self {
        Self {
            id: id.into(),
            config,
            connected: true,
            messages_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Whether the producer accepts sends
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Record a successful send
    pub(crate) fn record_send(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            id: self.id.clone(),
            connected: self.connected,
            messages_sent: self.messages_sent,
            bytes_sent: self.bytes_sent,
        }
    }
}
