//! Automation sinks: where dispatched events go.
//!
//! `WebhookSink` posts to a maker-style webhook endpoint:
//! `POST {base_url}/trigger/{event}/with/key/{api_key}` with a JSON body of
//! `{"value1", "value2", "value3"}`. `RecordingSink` keeps events in memory
//! for tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::policy::{EventNames, SinkEvent};

/// Failure delivering one event.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink not configured: {0}")]
    NotConfigured(String),

    #[error("sink request failed: {0}")]
    Transport(String),

    #[error("sink rejected event {event}: HTTP {status}")]
    Status { event: String, status: u16 },
}

/// Receives dispatched events.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn emit(&self, event: &SinkEvent) -> Result<(), SinkError>;
}

/// Webhook sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Webhook key. May be supplied via `OT_SINK_API_KEY` instead.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_notification_event")]
    pub notification_event: String,
    #[serde(default = "default_log_event")]
    pub log_event: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://maker.ifttt.com".to_string()
}

fn default_notification_event() -> String {
    "door_notify".to_string()
}

fn default_log_event() -> String {
    "door_log".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            notification_event: default_notification_event(),
            log_event: default_log_event(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SinkConfig {
    pub fn event_names(&self) -> EventNames {
        EventNames {
            notification: self.notification_event.clone(),
            log: self.log_event.clone(),
        }
    }
}

/// HTTP webhook sink.
pub struct WebhookSink {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WebhookSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        if config.api_key.is_empty() {
            return Err(SinkError::NotConfigured("api_key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn trigger_url(&self, event: &str) -> String {
        format!(
            "{}/trigger/{}/with/key/{}",
            self.base_url, event, self.api_key
        )
    }
}

#[async_trait]
impl Sink for WebhookSink {
    async fn emit(&self, event: &SinkEvent) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.trigger_url(&event.event))
            .json(event)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                event: event.event.clone(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(event = %event.event, "webhook delivered");
        Ok(())
    }
}

/// In-memory sink that records every event it is asked to emit.
///
/// Events named via [`RecordingSink::fail_event`] are recorded but
/// answered with an error.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_event(&self, name: &str) {
        self.failing.lock().unwrap().push(name.to_string());
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn emit(&self, event: &SinkEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        if self.failing.lock().unwrap().contains(&event.event) {
            return Err(SinkError::Status {
                event: event.event.clone(),
                status: 500,
            });
        }
        Ok(())
    }
}
