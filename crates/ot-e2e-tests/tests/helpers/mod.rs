//! Shared test harness for E2E integration tests.
//!
//! Wires a `TransportSession` over the scripted link to the relay's
//! dispatcher and a `RecordingSink`, exercising real code paths across all
//! crate boundaries without a broker or webhook endpoint.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;
use tokio::sync::mpsc;

use ot_mqtt_channel::mock::{LinkController, MockLink, MockRequester};
use ot_mqtt_channel::{BackoffPolicy, SessionEvent, TransportSession};
use ot_protocol::topics::DEMO_TOPIC;
use ot_relay::consumer;
use ot_relay::dispatch::Dispatcher;
use ot_relay::policy::EventNames;
use ot_relay::sink::RecordingSink;

pub const NOTIFY: &str = "door_notify";
pub const LOG: &str = "door_log";

pub fn event_names() -> EventNames {
    EventNames {
        notification: NOTIFY.into(),
        log: LOG.into(),
    }
}

pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5))
}

/// A connected session over the scripted link.
pub struct SessionHarness {
    pub session: TransportSession,
    pub events: mpsc::Receiver<SessionEvent>,
    pub link: LinkController,
    pub requester: Arc<MockRequester>,
}

impl SessionHarness {
    /// Start a session whose first connection attempt succeeds.
    pub async fn connected() -> Self {
        let (link, ctl) = MockLink::new();
        let requester = Arc::new(MockRequester::new(Some(ctl.clone())));
        ctl.connack();
        let (session, events) = TransportSession::start(link, requester.clone(), fast_backoff())
            .await
            .expect("scripted connect");
        Self {
            session,
            events,
            link: ctl,
            requester,
        }
    }

    /// Start a session with the command subscription registered.
    pub async fn subscribed() -> Self {
        let harness = Self::connected().await;
        consumer::register(&harness.session, DEMO_TOPIC, QoS::AtMostOnce)
            .await
            .expect("subscribe");
        harness
    }

    /// Deliver `payloads` on the command topic, close the session, and run
    /// the consumer driver over everything the session emitted.
    pub async fn relay(self, sink: &RecordingSink, payloads: &[&[u8]]) {
        for payload in payloads {
            self.link.message(DEMO_TOPIC, payload);
        }
        self.session.disconnect(Duration::from_millis(250)).await;

        let dispatcher = Dispatcher::new(sink, event_names());
        tokio::time::timeout(
            Duration::from_secs(2),
            consumer::run(self.events, &dispatcher, DEMO_TOPIC),
        )
        .await
        .expect("consumer should finish once the session closes");
    }
}

/// Wait for the next session event, failing after two seconds.
pub async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session event stream closed")
}

/// Sink events as `(event, value1, value2, value3)` tuples.
pub fn calls(sink: &RecordingSink) -> Vec<(String, String, String, String)> {
    sink.events()
        .into_iter()
        .map(|e| (e.event, e.value1, e.value2, e.value3))
        .collect()
}

pub fn call(event: &str, sender: &str, label: &str, code: &str) -> (String, String, String, String) {
    (event.into(), sender.into(), label.into(), code.into())
}
