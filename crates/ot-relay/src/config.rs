//! Relay configuration, loadable from TOML with environment overrides.

use std::time::Duration;

use anyhow::{Context, anyhow, ensure};
use rumqttc::QoS;
use serde::Deserialize;

use ot_mqtt_channel::MqttConfig;

use crate::sink::SinkConfig;

/// Environment variable that overrides `sink.api_key`.
pub const API_KEY_ENV: &str = "OT_SINK_API_KEY";

/// Top-level configuration shared by both relay binaries.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// MQTT connection settings.
    pub mqtt: MqttConfig,
    /// Automation webhook settings. Only the subscriber uses these.
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    /// Publish tick interval in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl ProducerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl RelayConfig {
    /// Load config from a TOML file path, then apply environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the sink key when an override is present and non-empty.
    pub fn apply_api_key_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            self.sink.api_key = key;
        }
    }

    pub fn publish_qos(&self) -> anyhow::Result<QoS> {
        self.mqtt
            .publish_qos()
            .ok_or_else(|| anyhow!("mqtt.publish_qos must be 0, 1 or 2, got {}", self.mqtt.publish_qos))
    }

    pub fn subscribe_qos(&self) -> anyhow::Result<QoS> {
        self.mqtt.subscribe_qos().ok_or_else(|| {
            anyhow!("mqtt.subscribe_qos must be 0, 1 or 2, got {}", self.mqtt.subscribe_qos)
        })
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.publish_qos()?;
        self.subscribe_qos()?;
        ensure!(self.producer.interval_ms > 0, "producer.interval_ms must be positive");
        ensure!(!self.mqtt.topic.is_empty(), "mqtt.topic must not be empty");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[mqtt]
broker_host = "a1b2c3-ats.iot.us-west-2.amazonaws.com"
client_cert_path = "/etc/open-tls/device.crt"
client_key_path = "/etc/open-tls/device.key"
"#;

    #[test]
    fn deserialize_minimal_config() {
        let config = RelayConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.mqtt.broker_port, 8883); // default
        assert_eq!(config.mqtt.topic, "securedios/demo"); // default
        assert_eq!(config.publish_qos().unwrap(), QoS::AtLeastOnce);
        assert_eq!(config.subscribe_qos().unwrap(), QoS::AtMostOnce);
        assert_eq!(config.producer.interval(), Duration::from_secs(1));
        assert_eq!(config.sink.base_url, "https://maker.ifttt.com");
        assert!(config.sink.api_key.is_empty());
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
[mqtt]
broker_host = "broker.local"
broker_port = 18883
client_cert_path = "/tmp/c.pem"
client_key_path = "/tmp/k.pem"
ca_cert_path = "/tmp/ca.pem"
topic = "doors/front"
publish_qos = 0
subscribe_qos = 1

[sink]
base_url = "http://127.0.0.1:9000"
api_key = "abc"
notification_event = "front_open"
log_event = "front_log"
timeout_secs = 3

[producer]
interval_ms = 250
"#;
        let config = RelayConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.mqtt.broker_port, 18883);
        assert_eq!(config.publish_qos().unwrap(), QoS::AtMostOnce);
        assert_eq!(config.subscribe_qos().unwrap(), QoS::AtLeastOnce);
        let names = config.sink.event_names();
        assert_eq!(names.notification, "front_open");
        assert_eq!(names.log, "front_log");
        assert_eq!(config.sink.timeout_secs, 3);
        assert_eq!(config.producer.interval(), Duration::from_millis(250));
    }

    #[test]
    fn invalid_qos_is_rejected() {
        let toml = format!("{MINIMAL}publish_qos = 3\n");
        let err = RelayConfig::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("publish_qos"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let toml = format!("{MINIMAL}\n[producer]\ninterval_ms = 0\n");
        assert!(RelayConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn missing_mqtt_section_is_rejected() {
        assert!(RelayConfig::from_toml_str("[sink]\napi_key = \"x\"\n").is_err());
    }

    #[test]
    fn api_key_override() {
        let mut config = RelayConfig::from_toml_str(MINIMAL).unwrap();
        config.apply_api_key_override(Some(String::new()));
        assert!(config.sink.api_key.is_empty());
        config.apply_api_key_override(Some("from-env".into()));
        assert_eq!(config.sink.api_key, "from-env");
        config.apply_api_key_override(None);
        assert_eq!(config.sink.api_key, "from-env");
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = RelayConfig::from_file("/nonexistent/relay.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/relay.toml"));
    }
}
