//! Seams between the session pump and rumqttc.
//!
//! `Link` is the event side (the rumqttc `EventLoop`), `Requester` the
//! request side (the rumqttc `AsyncClient`). Both have in-memory stand-ins
//! in [`crate::mock`] so the connection state machine can be driven
//! without a broker.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};

use crate::error::{MqttError, MqttResult};
use crate::state::InboundMessage;

/// What the session pump cares about from one event-loop step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Broker accepted the connection.
    ConnAck,
    Message(InboundMessage),
    /// A publish was written to the socket; `0` for QoS 0.
    PublishSent(u16),
    /// The broker finished a QoS 1/2 exchange (PUBACK or PUBCOMP).
    Acked(u16),
    /// Our own DISCONNECT went out; the link is done.
    Closed,
    /// Anything else (SUBACK, pings, other outgoing packets).
    Other,
}

/// Source of connection events. A failed poll means the link is down;
/// polling again attempts a reconnect.
#[async_trait]
pub trait Link: Send {
    async fn poll(&mut self) -> Result<LinkEvent, String>;
}

/// Non-blocking request submission to the broker connection.
pub trait Requester: Send + Sync {
    fn try_publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> MqttResult<()>;

    fn try_subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;

    fn try_disconnect(&self) -> MqttResult<()>;
}

/// Reduce a rumqttc event to a [`LinkEvent`].
pub fn classify(event: &Event) -> LinkEvent {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => LinkEvent::ConnAck,
        Event::Incoming(Packet::Publish(publish)) => LinkEvent::Message(InboundMessage {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
        }),
        Event::Incoming(Packet::PubAck(ack)) => LinkEvent::Acked(ack.pkid),
        Event::Incoming(Packet::PubComp(comp)) => LinkEvent::Acked(comp.pkid),
        Event::Outgoing(Outgoing::Publish(pkid)) => LinkEvent::PublishSent(*pkid),
        Event::Outgoing(Outgoing::Disconnect) => LinkEvent::Closed,
        _ => LinkEvent::Other,
    }
}

#[async_trait]
impl Link for EventLoop {
    async fn poll(&mut self) -> Result<LinkEvent, String> {
        EventLoop::poll(self)
            .await
            .map(|event| classify(&event))
            .map_err(|e| e.to_string())
    }
}

impl Requester for AsyncClient {
    fn try_publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> MqttResult<()> {
        AsyncClient::try_publish(self, topic, qos, false, payload)
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn try_subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        AsyncClient::try_subscribe(self, filter, qos)
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    fn try_disconnect(&self) -> MqttResult<()> {
        AsyncClient::try_disconnect(self).map_err(|e| MqttError::Connection(e.to_string()))
    }
}
