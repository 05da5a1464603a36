//! In-memory stand-ins for testing without a real broker.
//!
//! - `MockChannel` records publishes and subscriptions made through the
//!   `Channel` trait.
//! - `MockLink` + `LinkController` script the event-loop side of a session,
//!   including injected link failures.
//! - `MockRequester` records what the session asked the broker to do.

use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::error::{MqttError, MqttResult};
use crate::link::{Link, LinkEvent, Requester};
use crate::state::InboundMessage;

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Mock implementation of the `Channel` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Get all subscription filters.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|(f, _)| f == filter)
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        Ok(())
    }
}

// ── Scripted link ─────────────────────────────────────────────

/// Event-loop stand-in fed by a [`LinkController`].
///
/// `poll` waits for the next scripted step; once the controller is
/// dropped it never returns, like an idle connection.
pub struct MockLink {
    steps: mpsc::UnboundedReceiver<Result<LinkEvent, String>>,
}

/// Feeds steps into a [`MockLink`].
#[derive(Clone)]
pub struct LinkController {
    steps: mpsc::UnboundedSender<Result<LinkEvent, String>>,
}

impl MockLink {
    pub fn new() -> (Self, LinkController) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { steps: rx }, LinkController { steps: tx })
    }
}

#[async_trait]
impl Link for MockLink {
    async fn poll(&mut self) -> Result<LinkEvent, String> {
        match self.steps.recv().await {
            Some(step) => step,
            None => std::future::pending().await,
        }
    }
}

impl LinkController {
    pub fn connack(&self) {
        let _ = self.steps.send(Ok(LinkEvent::ConnAck));
    }

    pub fn message(&self, topic: &str, payload: &[u8]) {
        let _ = self.steps.send(Ok(LinkEvent::Message(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })));
    }

    /// Inject a link failure.
    pub fn fail(&self, reason: &str) {
        let _ = self.steps.send(Err(reason.to_string()));
    }

    /// Report a publish as written, with the packet id the broker will ack.
    pub fn sent(&self, pkid: u16) {
        let _ = self.steps.send(Ok(LinkEvent::PublishSent(pkid)));
    }

    pub fn acked(&self, pkid: u16) {
        let _ = self.steps.send(Ok(LinkEvent::Acked(pkid)));
    }

    pub fn closed(&self) {
        let _ = self.steps.send(Ok(LinkEvent::Closed));
    }
}

/// A request the session submitted to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Publish(PublishedMessage),
    Subscribe(String, QoS),
    Disconnect,
}

/// Records requests. A disconnect request is answered with
/// [`LinkEvent::Closed`] when a controller is attached, the way the real
/// event loop reports its outgoing DISCONNECT.
pub struct MockRequester {
    requests: Mutex<Vec<Request>>,
    link: Option<LinkController>,
    fail_publish: bool,
}

impl MockRequester {
    pub fn new(link: Option<LinkController>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            link,
            fail_publish: false,
        }
    }

    /// A requester whose publish submissions are refused.
    pub fn failing_publish() -> Self {
        Self {
            fail_publish: true,
            ..Self::new(None)
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Request::Subscribe(filter, _) => Some(filter),
                _ => None,
            })
            .collect()
    }
}

impl Requester for MockRequester {
    fn try_publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> MqttResult<()> {
        if self.fail_publish {
            return Err(MqttError::Publish("request queue full".into()));
        }
        self.requests
            .lock()
            .unwrap()
            .push(Request::Publish(PublishedMessage {
                topic: topic.to_string(),
                payload,
                qos,
            }));
        Ok(())
    }

    fn try_subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.requests
            .lock()
            .unwrap()
            .push(Request::Subscribe(filter.to_string(), qos));
        Ok(())
    }

    fn try_disconnect(&self) -> MqttResult<()> {
        self.requests.lock().unwrap().push(Request::Disconnect);
        if let Some(link) = &self.link {
            link.closed();
        }
        Ok(())
    }
}
