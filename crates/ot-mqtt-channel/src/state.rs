//! Connection state, shared health flag, and session events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle state of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Link lost after a successful connect; retrying with backoff.
    Reconnecting,
}

/// Connection health shared between the session pump and the drivers.
///
/// `true` only while the broker has acknowledged the current connection.
#[derive(Debug, Clone, Default)]
pub struct HealthFlag(Arc<AtomicBool>);

impl HealthFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, healthy: bool) {
        self.0.store(healthy, Ordering::Release);
    }
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Notifications from the session pump to the driver, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Broker acknowledged a connection (first connect or reconnect).
    Connected,
    /// An established link was lost.
    Disconnected { reason: String },
    Message(InboundMessage),
}
