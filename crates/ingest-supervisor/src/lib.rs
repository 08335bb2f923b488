//! Worker-pool supervisor (C9, spec §5, §7): wires the MQTT session, the
//! classifier, and the per-device worker pool together.
//!
//! Messages are classified once on a single dispatcher task — cheap, pure
//! CPU work — then routed by [`partition_for`] on the resulting device key,
//! so every message from the same device reaches the same worker and is
//! processed in broker-delivery order. Backpressure is the bounded channel
//! itself: a worker falling behind its `queue.high` watermark slows the
//! dispatcher's `send` before it ever blocks the MQTT event loop.
//!
//! Shutdown is grounded on the teacher's `DeliveryProcessor::run`
//! watch-channel pattern: a `false -> true` transition stops the MQTT
//! session and dispatcher, then workers drain their remaining queue for up
//! to [`DRAIN_TIMEOUT`] before the supervisor returns.

mod partition;
mod pipeline;

pub use partition::partition_for;

use std::sync::Arc;
use std::time::Duration;

use ingest_classify::classify;
use ingest_config::AppConfig;
use ingest_core::{CanonicalObservation, Instant};
use ingest_events::{
    EventEmitter, EventStatus, MonitoringEvent, STEP_ERROR, STEP_FHIR_VALIDATION, STEP_MQTT_RECEIVED,
    STEP_PAYLOAD_PARSED,
};
use ingest_fhir::FhirWriter;
use ingest_mqtt::{IncomingMessage, MqttConfig, MqttSession};
use ingest_storage::{DeviceDirectory, HistoryStore};
use tokio::sync::{mpsc, watch};

/// How long the supervisor waits for in-flight work to drain after shutdown
/// is signaled before it gives up and returns anyway (spec §6.6).
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A classified observation still carrying its unacked MQTT handle.
struct RoutedMessage {
    message: IncomingMessage,
    observation: CanonicalObservation,
}

pub struct Supervisor {
    config: AppConfig,
    directory: Arc<dyn DeviceDirectory>,
    history: Arc<dyn HistoryStore>,
    fhir: Arc<FhirWriter>,
    emitter: EventEmitter,
}

impl Supervisor {
    pub fn new(config: AppConfig, directory: Arc<dyn DeviceDirectory>, history: Arc<dyn HistoryStore>) -> Self {
        let fhir = Arc::new(FhirWriter::new(config.fhir.base_url.clone(), config.fhir.token.clone()));
        Self { config, directory, history, fhir, emitter: EventEmitter::new() }
    }

    /// A clone of the shared emitter, for callers that want to observe the
    /// monitoring stream directly (e.g. a health endpoint).
    pub fn events(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// Runs until `shutdown` transitions to `true`, then drains.
    pub async fn run(self, client_id: String, shutdown: watch::Receiver<bool>) {
        let worker_count = self.config.worker_count().max(1);
        let capacity = self.config.queue.high;

        let (mqtt_tx, mqtt_rx) = mpsc::channel(capacity);
        let mqtt_session = MqttSession::new(MqttConfig {
            client_id,
            broker: self.config.mqtt.broker.clone(),
            port: self.config.mqtt.port,
            user: self.config.mqtt.user.clone(),
            pass: self.config.mqtt.pass.clone(),
        });

        let strict = self.config.validation.strict;
        let mut worker_txs = Vec::with_capacity(worker_count);
        let mut worker_handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let (tx, rx) = mpsc::channel(capacity);
            worker_txs.push(tx);
            worker_handles.push(tokio::spawn(pipeline::worker_loop(
                id,
                rx,
                self.directory.clone(),
                self.history.clone(),
                self.fhir.clone(),
                self.emitter.clone(),
                strict,
            )));
        }

        let dispatcher = tokio::spawn(dispatch_loop(mqtt_rx, worker_txs, self.emitter.clone()));
        let mqtt_task = tokio::spawn(mqtt_session.run(mqtt_tx, shutdown.clone()));
        let events_task = tokio::spawn({
            let emitter = self.emitter.clone();
            let sink_url = self.config.emit.sink_url.clone();
            let shutdown = shutdown.clone();
            async move { emitter.run(sink_url, shutdown).await }
        });

        let mut shutdown_wait = shutdown;
        let _ = shutdown_wait.changed().await;

        // mqtt_task returning drops its `mqtt_tx`, which closes `mqtt_rx` and
        // lets the dispatcher drain; the dispatcher dropping `worker_txs` in
        // turn closes every worker channel.
        let _ = mqtt_task.await;
        let _ = dispatcher.await;

        let drain = futures_util::future::join_all(worker_handles);
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!(timeout = ?DRAIN_TIMEOUT, "worker drain deadline exceeded, shutting down with in-flight work outstanding");
        }

        let _ = events_task.await;
    }
}

async fn dispatch_loop(
    mut mqtt_rx: mpsc::Receiver<IncomingMessage>,
    worker_txs: Vec<mpsc::Sender<RoutedMessage>>,
    emitter: EventEmitter,
) {
    while let Some(message) = mqtt_rx.recv().await {
        let topic = message.topic.clone();
        let payload = message.payload.clone();
        let received = Instant::now();

        emitter.emit(received_event(&topic, &payload));

        match classify(&topic, payload.clone(), received) {
            Ok(observation) => {
                // `classify` only returns `Ok` once both parsing and the
                // range/shape validation in `ingest-classify::validate` have
                // succeeded, so the PARSED and VALIDATED stages (spec §4.9)
                // are both satisfied by this point and emit together.
                emitter.emit(parsed_event(&topic, &payload, &observation));
                emitter.emit(validation_event(&topic, &payload, &observation));
                let idx = partition_for(observation.device_key(), worker_txs.len());
                if worker_txs[idx].send(RoutedMessage { message, observation }).await.is_err() {
                    tracing::error!(topic = %topic, "worker channel closed, message dropped");
                }
            }
            Err(err) => {
                // Classifier-level errors (malformed payload, unknown topic,
                // out-of-range value) are always a hard reject regardless of
                // `validation.strict` (spec §8 S5) — `strict` only changes
                // the downstream identity-conflict policy (see pipeline.rs).
                tracing::warn!(topic = %topic, error = %err, "dropping payload");
                emitter.emit(error_event(&topic, &payload, &err.to_string()));
                if let Err(ack_err) = message.ack().await {
                    tracing::warn!(topic = %topic, error = %ack_err, "ack of rejected message failed");
                }
            }
        }
    }
}

fn received_event(topic: &str, payload: &[u8]) -> MonitoringEvent {
    MonitoringEvent {
        step: STEP_MQTT_RECEIVED.to_string(),
        status: EventStatus::Success,
        device_type: "unknown".to_string(),
        topic: topic.to_string(),
        payload: payload_as_json(payload),
        patient_info: None,
        error: None,
        timestamp: ingest_core::now_utc().to_string(),
    }
}

fn parsed_event(topic: &str, payload: &[u8], obs: &CanonicalObservation) -> MonitoringEvent {
    MonitoringEvent {
        step: STEP_PAYLOAD_PARSED.to_string(),
        status: EventStatus::Success,
        device_type: obs.source_vendor.as_str().to_string(),
        topic: topic.to_string(),
        payload: payload_as_json(payload),
        patient_info: None,
        error: None,
        timestamp: ingest_core::now_utc().to_string(),
    }
}

fn validation_event(topic: &str, payload: &[u8], obs: &CanonicalObservation) -> MonitoringEvent {
    MonitoringEvent {
        step: STEP_FHIR_VALIDATION.to_string(),
        status: EventStatus::Success,
        device_type: obs.source_vendor.as_str().to_string(),
        topic: topic.to_string(),
        payload: payload_as_json(payload),
        patient_info: None,
        error: None,
        timestamp: ingest_core::now_utc().to_string(),
    }
}

fn error_event(topic: &str, payload: &[u8], error: &str) -> MonitoringEvent {
    MonitoringEvent {
        step: STEP_ERROR.to_string(),
        status: EventStatus::Error,
        device_type: "unknown".to_string(),
        topic: topic.to_string(),
        payload: payload_as_json(payload),
        patient_info: None,
        error: Some(error.to_string()),
        timestamp: ingest_core::now_utc().to_string(),
    }
}

/// JSON when the payload parses as such, else the hex encoding of the raw
/// bytes (spec §4.3, §4.8: a non-UTF-8/malformed payload is preserved as hex
/// in the error event rather than discarded).
fn payload_as_json(payload: &[u8]) -> serde_json::Value {
    serde_json::from_slice(payload).unwrap_or_else(|_| serde_json::Value::String(hex::encode(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_store_memory::MemoryDeviceDirectory;
    use ingest_store_memory::MemoryHistoryStore;

    fn app_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.mqtt.broker = "127.0.0.1".into();
        cfg.mqtt.port = 18830;
        cfg.fhir.base_url = "http://127.0.0.1:0".into();
        cfg
    }

    #[tokio::test]
    async fn supervisor_builds_from_config() {
        let directory: Arc<dyn DeviceDirectory> = MemoryDeviceDirectory::new();
        let history: Arc<dyn HistoryStore> = MemoryHistoryStore::new();
        let supervisor = Supervisor::new(app_config(), directory, history);
        assert_eq!(supervisor.config.worker_count(), AppConfig::default().worker_count());
    }

    #[test]
    fn dispatcher_prefers_malformed_event_for_unknown_topic() {
        let err = ingest_classify::classify("not/a/real/topic", b"{}".to_vec(), Instant::now()).unwrap_err();
        let event = error_event("not/a/real/topic", b"{}", &err.to_string());
        assert_eq!(event.status, EventStatus::Error);
        assert_eq!(event.step, STEP_ERROR);
    }
}
