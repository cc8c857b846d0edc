//! Message and record envelope types
//!
//! A [`Message`] is what producers hand to the engine: an optional routing
//! key, a JSON payload, and optional string headers. Once appended to a
//! partition it becomes an immutable [`Record`] carrying the engine-assigned
//! coordinates (topic, partition, offset), the ingestion timestamp, and the
//! serialized size used for byte accounting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// A message as handed to the engine by a producer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Optional key; drives stable hash partitioning when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Arbitrary JSON payload
    pub value: serde_json::Value,

    /// Optional headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl Message {
    /// Create a keyless message
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            key: None,
            value,
            headers: None,
        }
    }

    /// Create a keyed message
    pub fn with_key(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: Some(key.into()),
            value,
            headers: None,
        }
    }

    /// Attach a header to this message
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Serialized size of this message in bytes
    ///
    /// This is the size recorded on the appended [`Record`] and counted
    /// against producer/consumer/topic byte statistics.
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }
}

/// A message record as stored in a partition
///
/// Immutable once appended; the only mutation a partition ever performs on
/// its record sequence besides append is dropping an expired prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Topic this record belongs to
    pub topic: String,

    /// Partition index within the topic
    pub partition: i32,

    /// Offset of this record within the partition
    pub offset: i64,

    /// Ingestion timestamp (milliseconds since epoch)
    pub timestamp: i64,

    /// Serialized size of the original message in bytes
    pub size: usize,

    /// Optional key from the original message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Payload from the original message
    pub value: serde_json::Value,

    /// Optional headers from the original message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Metadata returned to the producer after a successful append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Topic the record was appended to
    pub topic: String,

    /// Partition the record landed on
    pub partition: i32,

    /// Assigned offset
    pub offset: i64,

    /// Ingestion timestamp (milliseconds since epoch)
    pub timestamp: i64,
}

/// Current wall-clock time in milliseconds since epoch
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
