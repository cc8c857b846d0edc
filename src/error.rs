//! Error types for StreamBus
//!
//! This module defines the single error enum used throughout the crate and
//! the `Result` alias every fallible operation returns. All engine-facade
//! calls report failures through these variants; nothing inside the engine
//! panics on a bad caller-supplied reference.

use thiserror::Error;

/// Result type alias for StreamBus operations
pub type Result<T> = std::result::Result<T, StreamBusError>;

/// Errors returned by the StreamBus engine
#[derive(Debug, Error)]
pub enum StreamBusError {
    /// A topic with this name already exists
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// A producer, consumer, or processor with this id already exists
    #[error("Client already exists: {0}")]
    ClientAlreadyExists(String),

    /// The referenced topic does not exist
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// The referenced partition is out of range for the topic
    #[error("Partition not found: topic={0}, partition={1}")]
    PartitionNotFound(String, i32),

    /// The referenced producer does not exist
    #[error("Producer not found: {0}")]
    ProducerNotFound(String),

    /// The referenced consumer does not exist
    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    /// The referenced processor does not exist
    #[error("Processor not found: {0}")]
    ProcessorNotFound(String),

    /// Operation attempted on a disconnected producer or consumer
    #[error("Client not connected: {0}")]
    NotConnected(String),

    /// A stopped processor cannot be restarted
    #[error("Processor already stopped: {0}")]
    ProcessorStopped(String),

    /// Invalid topic, producer, consumer, or processor configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
