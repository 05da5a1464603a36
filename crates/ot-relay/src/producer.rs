//! Periodic counter publisher.
//!
//! Each tick publishes the next counter value while the session is
//! healthy, and skips the tick otherwise. Ticks are never queued up for a
//! later reconnect.

use std::time::Duration;

use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::time;

use ot_mqtt_channel::{Channel, HealthFlag, SessionEvent};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Published(u64),
    Skipped,
    Failed(String),
}

/// Publishes a monotonically increasing counter.
pub struct Producer {
    topic: String,
    qos: QoS,
    next: u64,
}

impl Producer {
    pub fn new(topic: &str, qos: QoS) -> Self {
        Self {
            topic: topic.to_string(),
            qos,
            next: 1,
        }
    }

    /// Value the next successful publish will carry.
    pub fn next_value(&self) -> u64 {
        self.next
    }

    /// Run one tick. The counter advances only when the publish was accepted.
    pub async fn tick<C: Channel + ?Sized>(&mut self, channel: &C, health: &HealthFlag) -> TickOutcome {
        if !health.is_healthy() {
            tracing::info!("link offline, skipping");
            return TickOutcome::Skipped;
        }

        let value = self.next;
        let payload = value.to_string();
        match channel.publish(&self.topic, payload.as_bytes(), self.qos).await {
            Ok(()) => {
                tracing::info!(topic = %self.topic, counter = value, "published");
                self.next += 1;
                TickOutcome::Published(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, counter = value, "failed to publish counter");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tick every `interval` until the task is cancelled.
    pub async fn run<C: Channel + ?Sized>(
        &mut self,
        channel: &C,
        health: &HealthFlag,
        interval: Duration,
    ) {
        let mut ticker = time::interval(interval);
        // Skip the first tick (fires immediately).
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.tick(channel, health).await;
        }
    }
}

/// Drain session events for a publish-only driver, logging link changes.
///
/// Returns when the session's event stream closes.
pub async fn watch_session(mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected => tracing::info!("broker link up"),
            SessionEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "broker link down");
            }
            SessionEvent::Message(msg) => {
                tracing::debug!(topic = %msg.topic, "ignoring inbound message");
            }
        }
    }
    tracing::info!("session event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ot_mqtt_channel::MockChannel;

    fn healthy() -> HealthFlag {
        let health = HealthFlag::new();
        health.set(true);
        health
    }

    #[tokio::test]
    async fn publishes_counter_when_healthy() {
        let channel = MockChannel::new();
        let health = healthy();
        let mut producer = Producer::new("securedios/demo", QoS::AtLeastOnce);

        assert_eq!(producer.tick(&channel, &health).await, TickOutcome::Published(1));
        assert_eq!(producer.tick(&channel, &health).await, TickOutcome::Published(2));

        let published = channel.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].payload, b"1");
        assert_eq!(published[1].payload, b"2");
        assert_eq!(published[0].topic, "securedios/demo");
        assert_eq!(published[0].qos, QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn skips_while_offline() {
        let channel = MockChannel::new();
        let health = HealthFlag::new();
        let mut producer = Producer::new("securedios/demo", QoS::AtLeastOnce);

        assert_eq!(producer.tick(&channel, &health).await, TickOutcome::Skipped);
        assert!(channel.published().is_empty());
        assert_eq!(producer.next_value(), 1);
    }

    #[tokio::test]
    async fn resumes_after_health_returns_without_backlog() {
        let channel = MockChannel::new();
        let health = healthy();
        let mut producer = Producer::new("t", QoS::AtLeastOnce);

        producer.tick(&channel, &health).await;
        health.set(false);
        producer.tick(&channel, &health).await;
        producer.tick(&channel, &health).await;
        health.set(true);
        producer.tick(&channel, &health).await;

        let payloads: Vec<Vec<u8>> = channel.published().into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_on_interval() {
        let channel = MockChannel::new();
        let health = healthy();
        let mut producer = Producer::new("t", QoS::AtLeastOnce);

        let _ = time::timeout(
            Duration::from_millis(3500),
            producer.run(&channel, &health, Duration::from_secs(1)),
        )
        .await;

        assert_eq!(channel.published().len(), 3);
    }

    #[tokio::test]
    async fn watch_session_returns_when_stream_closes() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(SessionEvent::Connected).await.unwrap();
        tx.send(SessionEvent::Disconnected {
            reason: "reset".into(),
        })
        .await
        .unwrap();
        drop(tx);

        watch_session(rx).await;
    }
}
