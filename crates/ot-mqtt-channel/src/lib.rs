//! Secured MQTT session for the Open-TLS command relay.
//!
//! - `CredentialBundle` + `tls` turn PEM material into an mTLS transport
//! - `TransportSession` owns the connection, its state machine, the shared
//!   health flag, and reconnection with capped backoff
//! - `Channel` trait for publish/subscribe (mockable in tests)
//! - `mock` stand-ins for the channel, the event loop, and the client

pub mod backoff;
pub mod channel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod link;
pub mod mock;
pub mod session;
pub mod state;
pub mod tls;

// Re-exports for convenience.
pub use backoff::BackoffPolicy;
pub use channel::Channel;
pub use config::MqttConfig;
pub use credentials::{CredentialBundle, VerifyMode};
pub use error::{MqttError, MqttResult};
pub use link::{Link, LinkEvent, Requester};
pub use mock::MockChannel;
pub use session::TransportSession;
pub use state::{ConnectionState, HealthFlag, InboundMessage, SessionEvent};
