#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # StreamBus
//!
//! StreamBus is an in-process, partitioned publish/subscribe log with
//! consumer-group semantics and a composable stream-processing pipeline.
//! It models broker semantics — topics, partitions, offsets, retention,
//! producers, consumers, and chained processors — faithfully enough to work
//! as an embedded event bus inside a larger application, without any of a
//! real broker's operational surface.
//!
//! ## Features
//!
//! - **Partitioned topics**: per-partition ordering with contiguous offsets
//! - **Producers**: keyed (stable hash) or random partition selection
//! - **Consumers**: explicit or per-poll auto commit, earliest/latest reset
//! - **Stream processors**: poll/transform/forward loops on tokio tasks,
//!   with failures routed to a reserved `errors` topic
//! - **Retention**: age-based sweep, lazy on append plus a periodic task
//!
//! StreamBus is deliberately not a durable or distributed broker: no disk
//! persistence, no replication, no network protocol, no exactly-once
//! delivery. Everything lives in one process and dies with it.
//!
//! ## Quick start
//!
//! ```no_run
//! use streambus::{Message, OffsetReset, ConsumerConfig, ProducerConfig, StreamEngine, TopicConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> streambus::Result<()> {
//!     let engine = StreamEngine::new()?;
//!     engine.start();
//!
//!     engine.create_topic("events", TopicConfig::default().with_partitions(3))?;
//!
//!     engine.create_producer("app", ProducerConfig::default())?;
//!     let meta = engine.send("app", "events", Message::with_key("user-1", json!({"n": 1})), None)?;
//!     println!("appended at offset {}", meta.offset);
//!
//!     let config = ConsumerConfig::default().with_offset_reset(OffsetReset::Earliest);
//!     engine.create_consumer("reader", "dashboard", config)?;
//!     engine.subscribe("reader", &["events"])?;
//!     for record in engine.poll("reader", 100)? {
//!         println!("{} @ {}: {}", record.topic, record.offset, record.value);
//!     }
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`engine`]: the `StreamEngine` facade owning all state
//! - [`storage`]: topics, partitions, offsets, and retention
//! - [`producer`] / [`consumer`]: client handles and offset tracking
//! - [`processor`]: the stream-processor state machine and transform types
//! - [`record`]: message and record envelope types
//! - [`error`]: error types and the `Result` alias

pub mod consumer;
pub mod engine;
pub mod error;
pub mod processor;
pub mod producer;
pub mod record;
pub mod storage;

pub use consumer::{ConsumerConfig, ConsumerStats, OffsetReset};
pub use engine::{EngineStats, StreamEngine, ERRORS_TOPIC};
pub use error::{Result, StreamBusError};
pub use processor::{
    FailureEnvelope, ProcessorConfig, ProcessorState, ProcessorStats, Transform, TransformError,
};
pub use producer::{ProducerConfig, ProducerStats};
pub use record::{Message, Record, RecordMetadata};
pub use storage::{PartitionStats, TopicConfig, TopicStats};
