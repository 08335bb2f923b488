//! MQTT session (C8, spec §4.8, §6.1).
//!
//! Wraps `rumqttc`'s manual-ack client: messages are only acknowledged to
//! the broker once the caller has handed them off to the worker pool (C9),
//! so a crash mid-processing results in QoS-1 redelivery rather than loss.

use std::time::Duration;

use ingest_core::MAX_PAYLOAD_BYTES;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_CAP: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 1024;

/// AVA4 gateway topics (spec §6.1).
pub const AVA4_TOPICS: &[&str] = &["ESP32_BLE_GW_TX", "dusun_sub", "dusun_status"];
/// Kati wrist monitor topic filter (spec §6.1).
pub const KATI_TOPICS: &[&str] = &["iMEDE_watch/#"];
/// Qube-Vital hospital box topic (spec §6.1).
pub const QUBE_TOPICS: &[&str] = &["CM4_BLE_GW_TX"];

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub client_id: String,
    pub broker: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
}

impl MqttConfig {
    fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(self.client_id.clone(), self.broker.clone(), self.port);
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_clean_session(false);
        opts.set_manual_acks(true);
        opts.set_max_packet_size(MAX_PAYLOAD_BYTES + 4096, MAX_PAYLOAD_BYTES + 4096);
        if let (Some(user), Some(pass)) = (&self.user, &self.pass) {
            opts.set_credentials(user.clone(), pass.clone());
        }
        opts
    }
}

/// A message received off any subscribed topic, still un-acked.
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    client: AsyncClient,
    publish: Publish,
}

impl IncomingMessage {
    /// Acknowledges the message to the broker. Call this only after the
    /// message has been durably handed off downstream (spec §4.8).
    pub async fn ack(&self) -> Result<(), rumqttc::ClientError> {
        self.client.ack(&self.publish).await
    }
}

pub struct MqttSession {
    config: MqttConfig,
}

impl MqttSession {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    /// Runs the session until `shutdown` is signaled: connects, subscribes
    /// all topics atomically, and forwards publishes to `tx`. Reconnects
    /// with exponential backoff on any connection error (spec §4.8).
    pub async fn run(self, tx: mpsc::Sender<IncomingMessage>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return;
            }

            let (client, mut eventloop) = AsyncClient::new(self.config.options(), CHANNEL_CAPACITY);
            if let Err(err) = subscribe_all(&client).await {
                tracing::warn!(error = %err, "initial subscribe failed, reconnecting");
                attempt += 1;
                sleep_backoff(attempt, &mut shutdown).await;
                continue;
            }

            loop {
                tokio::select! {
                    biased;
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                    event = eventloop.poll() => {
                        match event {
                            Ok(Event::Incoming(Packet::Publish(publish))) => {
                                attempt = 0;
                                let msg = IncomingMessage {
                                    topic: publish.topic.clone(),
                                    payload: publish.payload.to_vec(),
                                    client: client.clone(),
                                    publish,
                                };
                                if tx.send(msg).await.is_err() {
                                    return;
                                }
                            }
                            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                                attempt = 0;
                                if let Err(err) = subscribe_all(&client).await {
                                    tracing::warn!(error = %err, "resubscribe after reconnect failed");
                                }
                            }
                            Ok(_) => {}
                            Err(err) => {
                                tracing::warn!(error = %err, "mqtt connection error, reconnecting with backoff");
                                attempt += 1;
                                sleep_backoff(attempt, &mut shutdown).await;
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn subscribe_all(client: &AsyncClient) -> Result<(), rumqttc::ClientError> {
    for topic in AVA4_TOPICS.iter().chain(KATI_TOPICS).chain(QUBE_TOPICS) {
        client.subscribe(*topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

async fn sleep_backoff(attempt: u32, shutdown: &mut tokio::sync::watch::Receiver<bool>) {
    let exp = RECONNECT_BASE.saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
    let delay = exp.min(RECONNECT_CAP);
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown.changed() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_sets_match_subscription_table() {
        assert_eq!(AVA4_TOPICS, &["ESP32_BLE_GW_TX", "dusun_sub", "dusun_status"]);
        assert_eq!(KATI_TOPICS, &["iMEDE_watch/#"]);
        assert_eq!(QUBE_TOPICS, &["CM4_BLE_GW_TX"]);
    }

    #[test]
    fn backoff_base_and_cap() {
        assert_eq!(RECONNECT_BASE, Duration::from_millis(500));
        assert_eq!(RECONNECT_CAP, Duration::from_secs(30));
    }
}
