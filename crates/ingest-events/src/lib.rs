//! Event emitter (C7, spec §4.7): step markers for the monitoring sink.
//!
//! The queue/drain shape is grounded on the teacher's `DeliveryProcessor`:
//! a `Notify`-woken background task drains a bounded buffer, except here the
//! buffer itself drops-oldest-on-overflow instead of backpressuring, since
//! spec §4.7 requires the emitter to never block ingestion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::Client;
use serde::Serialize;
use tokio::sync::{watch, Notify};

const QUEUE_CAPACITY: usize = 4096;

/// Step markers emitted across the pipeline (spec §4.7).
pub const STEP_MQTT_RECEIVED: &str = "1_mqtt_received";
pub const STEP_PAYLOAD_PARSED: &str = "2_payload_parsed";
pub const STEP_FHIR_VALIDATION: &str = "2.5_fhir_validation";
pub const STEP_PATIENT_LOOKUP: &str = "3_patient_lookup";
pub const STEP_FHIR_PROJECTED: &str = "4_fhir_projected";
pub const STEP_HISTORY_STORED: &str = "5_history_stored";
pub const STEP_FHIR_STORAGE: &str = "6_fhir_storage";
pub const STEP_ERROR: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Error,
}

/// One monitoring event, matching the `POST /api/data-flow/emit` body shape
/// from spec §6.5.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringEvent {
    pub step: String,
    pub status: EventStatus,
    pub device_type: String,
    pub topic: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

#[derive(Serialize)]
struct EmitBody {
    event: MonitoringEvent,
}

/// Bounded, drop-oldest event queue shared between producers and the drainer.
struct Queue {
    buffer: Mutex<VecDeque<MonitoringEvent>>,
    notify: Notify,
    dropped: AtomicU64,
}

/// Handle producers use to enqueue events without ever blocking (spec §4.7).
#[derive(Clone)]
pub struct EventEmitter {
    queue: Arc<Queue>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Queue {
                buffer: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueues an event, dropping the oldest queued event on overflow.
    pub fn emit(&self, event: MonitoringEvent) {
        let mut buffer = self.queue.buffer.lock().expect("event queue mutex poisoned");
        if buffer.len() >= QUEUE_CAPACITY {
            buffer.pop_front();
            self.queue.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("event queue at capacity, dropping oldest event");
        }
        buffer.push_back(event);
        drop(buffer);
        self.queue.notify.notify_one();
    }

    pub fn events_dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Drains the queue into the monitoring sink until `shutdown` fires.
    /// Failures are counted via tracing, never retried (spec §6.5).
    pub async fn run(&self, sink_url: String, mut shutdown: watch::Receiver<bool>) {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("failed to build monitoring sink HTTP client");
        let endpoint = format!("{sink_url}/api/data-flow/emit");

        loop {
            while let Some(event) = self.pop() {
                let body = EmitBody { event };
                if let Err(err) = client.post(&endpoint).json(&body).send().await {
                    tracing::debug!(error = %err, "monitoring sink emit failed, not retried");
                }
            }

            tokio::select! {
                biased;
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = self.queue.notify.notified() => {}
            }
        }
    }

    fn pop(&self) -> Option<MonitoringEvent> {
        self.queue.buffer.lock().expect("event queue mutex poisoned").pop_front()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(step: &str) -> MonitoringEvent {
        MonitoringEvent {
            step: step.to_string(),
            status: EventStatus::Success,
            device_type: "ava4".to_string(),
            topic: "dusun_sub".to_string(),
            payload: serde_json::json!({}),
            patient_info: None,
            error: None,
            timestamp: ingest_core::now_utc().to_string(),
        }
    }

    #[test]
    fn drops_oldest_on_overflow() {
        let emitter = EventEmitter::new();
        for i in 0..QUEUE_CAPACITY {
            emitter.emit(event(&format!("step-{i}")));
        }
        assert_eq!(emitter.events_dropped(), 0);
        emitter.emit(event("overflow"));
        assert_eq!(emitter.events_dropped(), 1);

        let first = emitter.pop().unwrap();
        assert_eq!(first.step, "step-1");
    }

    #[test]
    fn pop_returns_in_fifo_order() {
        let emitter = EventEmitter::new();
        emitter.emit(event("a"));
        emitter.emit(event("b"));
        assert_eq!(emitter.pop().unwrap().step, "a");
        assert_eq!(emitter.pop().unwrap().step, "b");
        assert!(emitter.pop().is_none());
    }
}
