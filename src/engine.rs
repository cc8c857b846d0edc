//! The StreamBus engine facade
//!
//! One `StreamEngine` per process owns the topic registry and every
//! producer, consumer, and processor handle. All callers reach the
//! messaging core through this facade; nothing else holds mutable state.
//!
//! The engine is always constructed behind an `Arc`. Processors each run
//! on their own tokio task holding a weak handle back to the engine; the
//! periodic retention sweep is a single background task per engine,
//! started by [`StreamEngine::start`] and cancelled at
//! [`StreamEngine::shutdown`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::consumer::{Consumer, ConsumerConfig, ConsumerStats, OffsetReset};
use crate::error::{Result, StreamBusError};
use crate::processor::{
    FailureEnvelope, ProcessorConfig, ProcessorState, ProcessorStats, StreamProcessor,
};
use crate::producer::{Producer, ProducerConfig, ProducerStats};
use crate::record::{now_ms, Message, Record, RecordMetadata};
use crate::storage::{RetentionEnforcer, TopicConfig, TopicManager, TopicStats};

/// Reserved topic receiving processor failure envelopes
///
/// Created automatically by the engine at startup; never created by
/// callers.
pub const ERRORS_TOPIC: &str = "errors";

const ERRORS_TOPIC_PARTITIONS: i32 = 2;
const ERRORS_TOPIC_RETENTION_MS: i64 = 90 * 24 * 60 * 60 * 1000; // 90 days

/// Advisory poll timeout used by processor loops
const PROCESSOR_POLL_TIMEOUT_MS: u64 = 1000;

/// Pause between processor loop iterations
const PROCESSOR_IDLE_SLEEP_MS: u64 = 100;

/// Backoff after a transient poll/commit failure in a processor loop
const PROCESSOR_ERROR_BACKOFF_MS: u64 = 5000;

/// Aggregate statistics across the whole engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Per-topic statistics
    pub topics: Vec<TopicStats>,

    /// Per-producer statistics
    pub producers: Vec<ProducerStats>,

    /// Per-consumer statistics
    pub consumers: Vec<ConsumerStats>,

    /// Per-processor statistics
    pub processors: Vec<ProcessorStats>,
}

/// The top-level engine owning all messaging state
pub struct StreamEngine {
    /// Topic registry and log store
    topics: TopicManager,

    /// Registered producers by id
    producers: DashMap<String, Producer>,

    /// Registered consumers by id
    consumers: DashMap<String, Consumer>,

    /// Registered processors by id
    processors: DashMap<String, Arc<StreamProcessor>>,

    /// Periodic retention sweeper
    retention: RetentionEnforcer,

    /// Handle of the background retention task, if started
    retention_task: Mutex<Option<JoinHandle<()>>>,

    /// Whether the background task is running
    running: AtomicBool,

    /// Weak handle back to this engine's own `Arc`, for spawned tasks
    self_ref: Weak<StreamEngine>,
}

impl StreamEngine {
    /// Create an engine with the reserved `errors` topic in place
    pub fn new() -> Result<Arc<Self>> {
        Self::with_retention(RetentionEnforcer::new())
    }

    /// Create an engine with a custom retention sweep interval
    pub fn with_sweep_interval(interval: Duration) -> Result<Arc<Self>> {
        Self::with_retention(RetentionEnforcer::with_interval(interval))
    }

    fn with_retention(retention: RetentionEnforcer) -> Result<Arc<Self>> {
        let topics = TopicManager::new();
        topics.create_topic(
            ERRORS_TOPIC,
            TopicConfig::default()
                .with_partitions(ERRORS_TOPIC_PARTITIONS)
                .with_retention_ms(ERRORS_TOPIC_RETENTION_MS),
        )?;

        Ok(Arc::new_cyclic(|self_ref| Self {
            topics,
            producers: DashMap::new(),
            consumers: DashMap::new(),
            processors: DashMap::new(),
            retention,
            retention_task: Mutex::new(None),
            running: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    // ---- topics ----

    /// Create a topic
    pub fn create_topic(&self, name: &str, config: TopicConfig) -> Result<()> {
        self.topics.create_topic(name, config)
    }

    /// Names of all topics, including the reserved `errors` topic
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.topic_names()
    }

    /// Statistics for one topic
    pub fn topic_stats(&self, name: &str) -> Result<TopicStats> {
        self.topics.topic_stats(name)
    }

    // ---- producers ----

    /// Register a producer handle
    pub fn create_producer(&self, id: &str, config: ProducerConfig) -> Result<()> {
        match self.producers.entry(id.to_string()) {
            Entry::Occupied(_) => {
                return Err(StreamBusError::ClientAlreadyExists(id.to_string()));
            }
            Entry::Vacant(entry) => {
                entry.insert(Producer::new(id, config));
            }
        }
        info!(producer = %id, "Created producer");
        Ok(())
    }

    /// Append a message to a topic through a producer
    ///
    /// This is the only mutation path for message data. Returns the append
    /// metadata synchronously.
    pub fn send(
        &self,
        producer_id: &str,
        topic: &str,
        message: Message,
        partition: Option<i32>,
    ) -> Result<RecordMetadata> {
        let mut entry = self
            .producers
            .get_mut(producer_id)
            .ok_or_else(|| StreamBusError::ProducerNotFound(producer_id.to_string()))?;
        let producer = entry.value_mut();

        if !producer.is_connected() {
            return Err(StreamBusError::NotConnected(producer_id.to_string()));
        }

        let size = message.serialized_size()?;
        let metadata = self.topics.append_sized(topic, partition, message, size)?;
        producer.record_send(size);

        Ok(metadata)
    }

    /// Disconnect a producer; further sends fail with `NotConnected`
    pub fn disconnect_producer(&self, id: &str) -> Result<()> {
        let mut entry = self
            .producers
            .get_mut(id)
            .ok_or_else(|| StreamBusError::ProducerNotFound(id.to_string()))?;
        entry.value_mut().connected = false;
        info!(producer = %id, "Disconnected producer");
        Ok(())
    }

    /// Statistics for one producer
    pub fn producer_stats(&self, id: &str) -> Result<ProducerStats> {
        self.producers
            .get(id)
            .map(|entry| entry.value().stats())
            .ok_or_else(|| StreamBusError::ProducerNotFound(id.to_string()))
    }

    // ---- consumers ----

    /// Register a consumer handle with its own offset map
    pub fn create_consumer(&self, id: &str, group_id: &str, config: ConsumerConfig) -> Result<()> {
        match self.consumers.entry(id.to_string()) {
            Entry::Occupied(_) => {
                return Err(StreamBusError::ClientAlreadyExists(id.to_string()));
            }
            Entry::Vacant(entry) => {
                entry.insert(Consumer::new(id, group_id, config));
            }
        }
        info!(consumer = %id, group = %group_id, "Created consumer");
        Ok(())
    }

    /// Subscribe a consumer to topics
    ///
    /// All names are validated before any is added, so a bad name leaves
    /// the subscription set untouched. For `Latest` consumers the current
    /// next-offset of every partition is pinned as the starting position.
    pub fn subscribe(&self, consumer_id: &str, topic_names: &[&str]) -> Result<()> {
        for name in topic_names {
            if !self.topics.contains(name) {
                return Err(StreamBusError::TopicNotFound(name.to_string()));
            }
        }

        let mut entry = self
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| StreamBusError::ConsumerNotFound(consumer_id.to_string()))?;
        let consumer = entry.value_mut();

        let pin_latest = consumer.config.auto_offset_reset == OffsetReset::Latest;
        for name in topic_names {
            consumer.subscriptions.insert(name.to_string());
            if pin_latest {
                let topic = self.topics.get(name)?;
                for partition in 0..topic.partition_count() {
                    let next = topic.next_offset(partition)?;
                    consumer.pin_latest_baseline(name, partition, next);
                }
            }
        }

        debug!(consumer = %consumer_id, topics = ?topic_names, "Subscribed");
        Ok(())
    }

    /// Return all records at or past the consumer's position on every
    /// subscribed (topic, partition)
    ///
    /// The timeout is advisory: this engine polls and returns immediately;
    /// loop callers sleep between polls. Polling never advances committed
    /// offsets unless `enable_auto_commit` is set, in which case every
    /// returned record is committed before this call returns.
    pub fn poll(&self, consumer_id: &str, _timeout_ms: u64) -> Result<Vec<Record>> {
        let mut entry = self
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| StreamBusError::ConsumerNotFound(consumer_id.to_string()))?;
        let consumer = entry.value_mut();

        if !consumer.is_connected() {
            return Err(StreamBusError::NotConnected(consumer_id.to_string()));
        }

        let subscriptions: Vec<String> = consumer.subscriptions.iter().cloned().collect();
        let mut out = Vec::new();

        for topic_name in subscriptions {
            let topic = match self.topics.get(&topic_name) {
                Ok(topic) => topic,
                Err(_) => {
                    warn!(consumer = %consumer_id, topic = %topic_name, "Subscribed topic missing, skipping");
                    continue;
                }
            };

            for partition in 0..topic.partition_count() {
                let next = topic.next_offset(partition)?;
                let position = consumer.position(&topic_name, partition, next);
                let records = topic.records_from(partition, position)?;
                if records.is_empty() {
                    continue;
                }

                let bytes: u64 = records.iter().map(|r| r.size as u64).sum();
                consumer.record_poll(records.len() as u64, bytes);
                out.extend(records);
            }
        }

        if consumer.config.enable_auto_commit && !out.is_empty() {
            let commits = batch_commit_map(&out);
            consumer.commit(&commits);
            debug!(consumer = %consumer_id, entries = commits.len(), "Auto-committed after poll");
        }

        Ok(out)
    }

    /// Commit offsets for a consumer
    ///
    /// Entries lower than the current committed offset are clamped; equal
    /// or higher entries are stored. Committing the same map twice leaves
    /// the consumer unchanged.
    pub fn commit(&self, consumer_id: &str, offsets: &HashMap<(String, i32), i64>) -> Result<()> {
        let mut entry = self
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| StreamBusError::ConsumerNotFound(consumer_id.to_string()))?;
        entry.value_mut().commit(offsets);
        Ok(())
    }

    /// Disconnect a consumer; further polls fail with `NotConnected`
    pub fn disconnect_consumer(&self, id: &str) -> Result<()> {
        let mut entry = self
            .consumers
            .get_mut(id)
            .ok_or_else(|| StreamBusError::ConsumerNotFound(id.to_string()))?;
        entry.value_mut().connected = false;
        info!(consumer = %id, "Disconnected consumer");
        Ok(())
    }

    /// Statistics for one consumer
    pub fn consumer_stats(&self, id: &str) -> Result<ConsumerStats> {
        self.consumers
            .get(id)
            .map(|entry| entry.value().stats())
            .ok_or_else(|| StreamBusError::ConsumerNotFound(id.to_string()))
    }

    // ---- processors ----

    /// Allocate a processor in the `Created` state
    ///
    /// Owns no consumer or producer until started.
    pub fn create_processor(&self, id: &str, config: ProcessorConfig) -> Result<()> {
        if config.input_topics.is_empty() {
            return Err(StreamBusError::InvalidConfig(
                "processor requires at least one input topic".to_string(),
            ));
        }
        match self.processors.entry(id.to_string()) {
            Entry::Occupied(_) => {
                return Err(StreamBusError::ClientAlreadyExists(id.to_string()));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(StreamProcessor::new(id, config)));
            }
        }
        info!(processor = %id, "Created processor");
        Ok(())
    }

    /// Start a processor's loop
    ///
    /// No-op when already running; fails with `ProcessorStopped` once
    /// stopped. Lazily creates the internal consumer (subscribed to the
    /// input topics under the processor's own group, reading from
    /// earliest) and internal producer, then spawns the loop task. Must be
    /// called from within a tokio runtime.
    pub fn start_processor(&self, id: &str) -> Result<()> {
        let processor = self
            .processors
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StreamBusError::ProcessorNotFound(id.to_string()))?;

        // Validate topology before any state changes
        for topic in &processor.config.input_topics {
            if !self.topics.contains(topic) {
                return Err(StreamBusError::TopicNotFound(topic.clone()));
            }
        }
        if let Some(output) = processor.config.output_topic.as_deref() {
            if !self.topics.contains(output) {
                return Err(StreamBusError::TopicNotFound(output.to_string()));
            }
        }

        if !processor.try_start()? {
            return Ok(()); // already running
        }

        if let Err(e) = self.attach_processor_clients(&processor) {
            // Launch failed before the loop existed: back to `Created`
            // so the caller can resolve the collision and retry.
            processor.revert_start();
            return Err(e);
        }

        let consumer_id = internal_consumer_id(id);
        let producer_id = internal_producer_id(id);
        let weak = self.self_ref.clone();
        let task_processor = Arc::clone(&processor);
        tokio::spawn(async move {
            if let Some(engine) = weak.upgrade() {
                engine
                    .run_processor_loop(task_processor, consumer_id, producer_id)
                    .await;
            }
        });

        info!(processor = %id, "Started processor");
        Ok(())
    }

    /// Create and wire the processor's internal consumer and producer
    fn attach_processor_clients(&self, processor: &StreamProcessor) -> Result<()> {
        let consumer_id = internal_consumer_id(&processor.id);
        let producer_id = internal_producer_id(&processor.id);

        // The loop commits explicitly after each batch, so auto-commit
        // must stay off; earliest reset makes pre-start records visible.
        self.create_consumer(
            &consumer_id,
            &format!("{}-group", processor.id),
            ConsumerConfig::default()
                .with_offset_reset(OffsetReset::Earliest)
                .with_auto_commit(false),
        )?;

        let inputs: Vec<&str> = processor
            .config
            .input_topics
            .iter()
            .map(String::as_str)
            .collect();

        // The producer is created even without an output topic: failure
        // envelopes must still reach the errors topic through the
        // producer append path. Failures past this point unregister the
        // consumer created above so the registry stays clean for a retry.
        let attached = self
            .subscribe(&consumer_id, &inputs)
            .and_then(|()| self.create_producer(&producer_id, ProducerConfig::default()));
        if let Err(e) = attached {
            self.consumers.remove(&consumer_id);
            return Err(e);
        }

        Ok(())
    }

    /// Stop a processor
    ///
    /// The loop observes the state at its next iteration boundary and
    /// exits; no further polling or committing happens afterwards. A
    /// stopped processor cannot be resumed.
    pub fn stop_processor(&self, id: &str) -> Result<()> {
        let processor = self
            .processors
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StreamBusError::ProcessorNotFound(id.to_string()))?;

        processor.stop();
        info!(processor = %id, "Stopped processor");
        Ok(())
    }

    /// Statistics for one processor
    pub fn processor_stats(&self, id: &str) -> Result<ProcessorStats> {
        self.processors
            .get(id)
            .map(|entry| entry.value().stats())
            .ok_or_else(|| StreamBusError::ProcessorNotFound(id.to_string()))
    }

    /// The processing loop: poll, transform, forward, commit, repeat
    async fn run_processor_loop(
        &self,
        processor: Arc<StreamProcessor>,
        consumer_id: String,
        producer_id: String,
    ) {
        info!(processor = %processor.id, "Processor loop running");

        loop {
            if processor.state() != ProcessorState::Running {
                break;
            }

            match self.poll(&consumer_id, PROCESSOR_POLL_TIMEOUT_MS) {
                Ok(records) => {
                    let commits = batch_commit_map(&records);

                    for record in records {
                        self.process_record(&processor, &producer_id, &record);
                    }

                    // Batched, monotonic commit: every (topic, partition)
                    // touched this cycle advances to last offset + 1, even
                    // for records routed to the errors topic.
                    if !commits.is_empty() {
                        if let Err(e) = self.commit(&consumer_id, &commits) {
                            error!(
                                processor = %processor.id,
                                error = %e,
                                "Failed to commit processor offsets"
                            );
                        }
                    }

                    tokio::time::sleep(Duration::from_millis(PROCESSOR_IDLE_SLEEP_MS)).await;
                }
                Err(e) => {
                    // Transient: log and back off, never terminate the loop
                    error!(
                        processor = %processor.id,
                        error = %e,
                        "Processor poll failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(PROCESSOR_ERROR_BACKOFF_MS)).await;
                }
            }
        }

        info!(processor = %processor.id, "Processor loop exited");
    }

    /// Run the transform on one record and route the outcome
    fn process_record(&self, processor: &StreamProcessor, producer_id: &str, record: &Record) {
        let transform = Arc::clone(&processor.config.transform);
        let result = match catch_unwind(AssertUnwindSafe(|| transform(record))) {
            Ok(result) => result,
            Err(panic) => Err(panic_message(panic).into()),
        };

        match result {
            Ok(output) => {
                if let (Some(message), Some(output_topic)) =
                    (output, processor.config.output_topic.as_deref())
                {
                    if let Err(e) = self.send(producer_id, output_topic, message, None) {
                        warn!(
                            processor = %processor.id,
                            topic = %output_topic,
                            error = %e,
                            "Failed to forward transform output"
                        );
                        self.record_processing_failure(processor, producer_id, record, e.to_string());
                        return;
                    }
                }
                processor.record_success(now_ms());
            }
            Err(e) => self.record_processing_failure(processor, producer_id, record, e.to_string()),
        }
    }

    /// Count a failure and publish its envelope to the errors topic
    fn record_processing_failure(
        &self,
        processor: &StreamProcessor,
        producer_id: &str,
        record: &Record,
        error: String,
    ) {
        processor.record_failure();
        debug!(
            processor = %processor.id,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            error = %error,
            "Transform failed, routing to error topic"
        );

        let envelope = FailureEnvelope {
            processor_id: processor.id.clone(),
            original_record: record.clone(),
            error,
            timestamp: now_ms(),
        };

        match envelope.to_message() {
            Ok(message) => {
                if let Err(e) = self.send(producer_id, ERRORS_TOPIC, message, None) {
                    error!(
                        processor = %processor.id,
                        error = %e,
                        "Failed to publish failure envelope"
                    );
                }
            }
            Err(e) => {
                error!(
                    processor = %processor.id,
                    error = %e,
                    "Failed to encode failure envelope"
                );
            }
        }
    }

    // ---- engine lifecycle and statistics ----

    /// Start the periodic retention sweep task
    ///
    /// Idempotent. Must be called from within a tokio runtime. The lazy
    /// per-append sweep keeps retention roughly current even when this is
    /// never called.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak = self.self_ref.clone();
        let interval = self.retention.interval();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(engine) = weak.upgrade() else { break };
                engine.retention.enforce(&engine.topics);
            }
        });
        *self.retention_task.lock() = Some(handle);

        info!("Stream engine started");
    }

    /// Stop all processors and cancel the retention task
    ///
    /// Idempotent; safe to call without a prior `start`.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);

        for entry in self.processors.iter() {
            entry.value().stop();
        }

        if let Some(handle) = self.retention_task.lock().take() {
            handle.abort();
        }

        info!("Stream engine shut down");
    }

    /// Aggregate statistics across topics, producers, consumers, and
    /// processors
    pub fn engine_stats(&self) -> EngineStats {
        EngineStats {
            topics: self.topics.all_stats(),
            producers: self.producers.iter().map(|e| e.value().stats()).collect(),
            consumers: self.consumers.iter().map(|e| e.value().stats()).collect(),
            processors: self.processors.iter().map(|e| e.value().stats()).collect(),
        }
    }
}

fn internal_consumer_id(processor_id: &str) -> String {
    format!("{}-consumer", processor_id)
}

fn internal_producer_id(processor_id: &str) -> String {
    format!("{}-producer", processor_id)
}

/// Per-(topic, partition) commit map for a batch: last offset + 1
fn batch_commit_map(records: &[Record]) -> HashMap<(String, i32), i64> {
    let mut commits: HashMap<(String, i32), i64> = HashMap::new();
    for record in records {
        let next = record.offset + 1;
        commits
            .entry((record.topic.clone(), record.partition))
            .and_modify(|offset| *offset = (*offset).max(next))
            .or_insert(next);
    }
    commits
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("transform panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("transform panicked: {}", s)
    } else {
        "transform panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> Arc<StreamEngine> {
        StreamEngine::new().unwrap()
    }

    #[test]
    fn test_errors_topic_exists_at_startup() {
        let engine = engine();
        assert!(engine.topic_names().contains(&ERRORS_TOPIC.to_string()));

        let stats = engine.topic_stats(ERRORS_TOPIC).unwrap();
        assert_eq!(stats.partition_count, ERRORS_TOPIC_PARTITIONS);
    }

    #[test]
    fn test_duplicate_client_ids_rejected() {
        let engine = engine();
        engine.create_producer("p", ProducerConfig::default()).unwrap();
        engine
            .create_consumer("c", "g", ConsumerConfig::default())
            .unwrap();

        assert!(matches!(
            engine.create_producer("p", ProducerConfig::default()),
            Err(StreamBusError::ClientAlreadyExists(_))
        ));
        assert!(matches!(
            engine.create_consumer("c", "g2", ConsumerConfig::default()),
            Err(StreamBusError::ClientAlreadyExists(_))
        ));
    }

    #[test]
    fn test_send_requires_connected_producer_and_known_topic() {
        let engine = engine();
        engine.create_topic("t", TopicConfig::default()).unwrap();
        engine.create_producer("p", ProducerConfig::default()).unwrap();

        assert!(matches!(
            engine.send("ghost", "t", Message::new(json!(1)), None),
            Err(StreamBusError::ProducerNotFound(_))
        ));
        assert!(matches!(
            engine.send("p", "missing", Message::new(json!(1)), None),
            Err(StreamBusError::TopicNotFound(_))
        ));

        engine.disconnect_producer("p").unwrap();
        assert!(matches!(
            engine.send("p", "t", Message::new(json!(1)), None),
            Err(StreamBusError::NotConnected(_))
        ));
    }

    #[test]
    fn test_send_updates_producer_counters() {
        let engine = engine();
        engine.create_topic("t", TopicConfig::default()).unwrap();
        engine.create_producer("p", ProducerConfig::default()).unwrap();

        let meta = engine.send("p", "t", Message::new(json!("x")), None).unwrap();
        assert_eq!(meta.topic, "t");
        assert_eq!(meta.offset, 0);

        let stats = engine.producer_stats("p").unwrap();
        assert_eq!(stats.messages_sent, 1);
        assert!(stats.bytes_sent > 0);
    }

    #[test]
    fn test_subscribe_rejects_unknown_topic_atomically() {
        let engine = engine();
        engine.create_topic("known", TopicConfig::default()).unwrap();
        engine
            .create_consumer("c", "g", ConsumerConfig::default())
            .unwrap();

        let err = engine.subscribe("c", &["known", "unknown"]).unwrap_err();
        assert!(matches!(err, StreamBusError::TopicNotFound(_)));

        // Nothing was added: a later poll sees no subscriptions
        let records = engine.poll("c", 100).unwrap();
        assert!(records.is_empty());
        assert!(engine.consumer_stats("c").unwrap().subscriptions.is_empty());
    }

    #[test]
    fn test_poll_requires_connected_consumer() {
        let engine = engine();
        engine
            .create_consumer("c", "g", ConsumerConfig::default())
            .unwrap();
        engine.disconnect_consumer("c").unwrap();

        assert!(matches!(
            engine.poll("c", 100),
            Err(StreamBusError::NotConnected(_))
        ));
    }

    #[test]
    fn test_concurrent_producer_registration_has_single_winner() {
        use std::sync::Barrier;

        let engine = engine();
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    engine.create_producer("raced", ProducerConfig::default()).is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1, "exactly one racing registration must win");
        assert!(engine.producer_stats("raced").is_ok());
    }

    #[test]
    fn test_failed_processor_launch_rolls_back() {
        let engine = engine();
        engine.create_topic("in", TopicConfig::default()).unwrap();

        // Squat on the internal producer id so the launch fails after the
        // internal consumer has been registered
        engine
            .create_producer("proc-producer", ProducerConfig::default())
            .unwrap();

        let transform: crate::processor::Transform = Arc::new(|_| Ok(None));
        engine
            .create_processor("proc", ProcessorConfig::new(vec!["in".to_string()], transform))
            .unwrap();

        let err = engine.start_processor("proc").unwrap_err();
        assert!(matches!(err, StreamBusError::ClientAlreadyExists(_)));

        // The partial internal consumer was removed and the processor is
        // back in `Created`, not pushed to terminal `Stopped`
        assert!(engine.consumer_stats("proc-consumer").is_err());
        assert_eq!(
            engine.processor_stats("proc").unwrap().state,
            ProcessorState::Created
        );

        // Retrying reports the collision again instead of a stopped processor
        let err = engine.start_processor("proc").unwrap_err();
        assert!(matches!(err, StreamBusError::ClientAlreadyExists(_)));
    }

    #[test]
    fn test_processor_requires_input_topics() {
        let engine = engine();
        let transform: crate::processor::Transform = Arc::new(|_| Ok(None));
        let err = engine
            .create_processor("p", ProcessorConfig::new(vec![], transform))
            .unwrap_err();
        assert!(matches!(err, StreamBusError::InvalidConfig(_)));
    }

    #[test]
    fn test_batch_commit_map_takes_max_per_partition() {
        let record = |partition: i32, offset: i64| Record {
            topic: "t".to_string(),
            partition,
            offset,
            timestamp: 0,
            size: 1,
            key: None,
            value: json!(null),
            headers: None,
        };

        let commits = batch_commit_map(&[record(0, 2), record(0, 5), record(1, 0)]);
        assert_eq!(commits[&("t".to_string(), 0)], 6);
        assert_eq!(commits[&("t".to_string(), 1)], 1);
    }
}
