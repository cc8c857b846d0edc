//! Stream processor state machine and transform types
//!
//! A processor owns one internal consumer and one internal producer and
//! runs a poll/transform/forward loop until stopped. Its lifecycle is a
//! small explicit state machine:
//!
//! ```text
//! Created -> Running -> Stopped
//!              ^  |
//!              +--+  (one poll cycle per self-loop)
//! ```
//!
//! A stopped processor cannot be resumed; create a new one instead. A
//! transform failure is recoverable: the record is wrapped in a
//! [`FailureEnvelope`] and published to the reserved `errors` topic, and the
//! loop continues. Only an explicit `stop` ends the loop.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::record::{Message, Record};

/// Error type a transform may return
pub type TransformError = Box<dyn std::error::Error + Send + Sync>;

/// A user-supplied transform: record in, optional output message out
///
/// Returning `Ok(None)` counts the record as processed with no output.
pub type Transform =
    Arc<dyn Fn(&Record) -> std::result::Result<Option<Message>, TransformError> + Send + Sync>;

/// Processor configuration
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Topics the internal consumer subscribes to (non-empty)
    pub input_topics: Vec<String>,

    /// Topic transform outputs are forwarded to, if any
    pub output_topic: Option<String>,

    /// The transform applied to every polled record
    pub transform: Transform,
}

impl ProcessorConfig {
    /// Create a processor configuration with no output topic
    pub fn new(input_topics: Vec<String>, transform: Transform) -> Self {
        Self {
            input_topics,
            output_topic: None,
            transform,
        }
    }

    /// Set the output topic
    pub fn with_output_topic(mut self, topic: impl Into<String>) -> Self {
        self.output_topic = Some(topic.into());
        self
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("input_topics", &self.input_topics)
            .field("output_topic", &self.output_topic)
            .finish_non_exhaustive()
    }
}

/// Processor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessorState {
    /// Allocated but never started; owns no consumer or producer yet
    Created,
    /// Loop is running
    Running,
    /// Terminal; the loop has been told to exit and cannot be resumed
    Stopped,
}

/// A managed stream processor
pub struct StreamProcessor {
    /// Processor id (unique key in the engine)
    pub id: String,

    /// Configuration
    pub config: ProcessorConfig,

    /// Lifecycle state; the loop reads this at each iteration boundary
    state: RwLock<ProcessorState>,

    /// Records transformed successfully
    processed_count: AtomicU64,

    /// Records whose transform (or forward) failed
    error_count: AtomicU64,

    /// Timestamp of the last successful processing, 0 when never
    last_processed_ms: AtomicI64,
}

/// Statistics snapshot for a processor
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorStats {
    /// Processor id
    pub id: String,

    /// Lifecycle state
    pub state: ProcessorState,

    /// Records transformed successfully
    pub processed_count: u64,

    /// Records whose transform failed
    pub error_count: u64,

    /// Timestamp of the last successful processing, if any
    pub last_processed_ms: Option<i64>,

    /// processed / (processed + errors), 0 when idle
    pub success_rate: f64,
}

impl StreamProcessor {
    /// Allocate a processor in the `Created` state
    pub fn new(id: impl Into<String>, config: ProcessorConfig) -> Self {
        Self {
            id: id.into(),
            config,
            state: RwLock::new(ProcessorState::Created),
            processed_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            last_processed_ms: AtomicI64::new(0),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessorState {
        *self.state.read()
    }

    /// Attempt the `Created -> Running` transition
    ///
    /// Returns `Ok(true)` when the caller should launch the loop,
    /// `Ok(false)` when already running (no-op), and an error when the
    /// processor is stopped.
    pub(crate) fn try_start(&self) -> Result<bool> {
        let mut state = self.state.write();
        match *state {
            ProcessorState::Running => Ok(false),
            ProcessorState::Stopped => Err(crate::error::StreamBusError::ProcessorStopped(
                self.id.clone(),
            )),
            ProcessorState::Created => {
                *state = ProcessorState::Running;
                Ok(true)
            }
        }
    }

    /// Transition to `Stopped`; the loop exits at its next iteration boundary
    pub(crate) fn stop(&self) {
        *self.state.write() = ProcessorState::Stopped;
    }

    /// Roll back `Running -> Created` after a failed launch
    ///
    /// Only meaningful before the loop task exists; `Stopped` stays
    /// terminal.
    pub(crate) fn revert_start(&self) {
        let mut state = self.state.write();
        if *state == ProcessorState::Running {
            *state = ProcessorState::Created;
        }
    }

    /// Record one successfully processed record
    pub(crate) fn record_success(&self, now_ms: i64) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        self.last_processed_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Record one failed record
    pub(crate) fn record_failure(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ProcessorStats {
        let processed = self.processed_count.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        let last = self.last_processed_ms.load(Ordering::Relaxed);
        let total = processed + errors;

        ProcessorStats {
            id: self.id.clone(),
            state: self.state(),
            processed_count: processed,
            error_count: errors,
            last_processed_ms: (last > 0).then_some(last),
            success_rate: if total > 0 {
                processed as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Structured failure record published to the reserved `errors` topic
///
/// Exactly one envelope is produced per failed input record, carrying the
/// full original record so a downstream consumer can replay or inspect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEnvelope {
    /// Processor that failed to handle the record
    pub processor_id: String,

    /// The input record as polled
    pub original_record: Record,

    /// Transform error message
    pub error: String,

    /// When the failure was recorded (milliseconds since epoch)
    pub timestamp: i64,
}

impl FailureEnvelope {
    /// Encode this envelope as a message for the `errors` topic
    pub fn to_message(&self) -> Result<Message> {
        Ok(Message::with_key(
            format!("processor-error-{}", self.processor_id),
            serde_json::to_value(self)?,
        ))
    }
}
