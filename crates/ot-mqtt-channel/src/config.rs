use std::time::Duration;

use rumqttc::QoS;
use serde::Deserialize;

/// MQTT connection configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname (e.g., AWS IoT endpoint).
    pub broker_host: String,
    /// MQTT broker port (default 8883 for TLS).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// Path suffix of the broker URL.
    #[serde(default = "default_path")]
    pub broker_path: String,
    /// Fixed tag in front of the randomized client ID.
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// Path to device X.509 certificate (PEM).
    pub client_cert_path: String,
    /// Path to device private key (PEM).
    pub client_key_path: String,
    /// Path to CA certificate (e.g., AmazonRootCA1.pem). Optional.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// First reconnect delay in milliseconds; doubles per failed attempt.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Ceiling for the reconnect delay.
    #[serde(default = "default_max_reconnect_interval")]
    pub max_reconnect_interval_secs: u64,
    /// Time allowed for in-flight acknowledgements on disconnect.
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,
    /// Topic the demo drivers publish to and subscribe on.
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_publish_qos")]
    pub publish_qos: u8,
    #[serde(default = "default_subscribe_qos")]
    pub subscribe_qos: u8,
}

fn default_port() -> u16 {
    8883
}

fn default_path() -> String {
    "/mqtt".to_string()
}

fn default_client_id_prefix() -> String {
    "otMQTTclient".to_string()
}

fn default_keepalive() -> u16 {
    60
}

fn default_clean_session() -> bool {
    true
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_max_reconnect_interval() -> u64 {
    60
}

fn default_disconnect_grace_ms() -> u64 {
    250
}

fn default_topic() -> String {
    ot_protocol::topics::DEMO_TOPIC.to_string()
}

fn default_publish_qos() -> u8 {
    1
}

fn default_subscribe_qos() -> u8 {
    0
}

impl MqttConfig {
    /// Full broker URL, for diagnostics.
    pub fn broker_url(&self) -> String {
        format!(
            "mqtts://{}:{}{}",
            self.broker_host, self.broker_port, self.broker_path
        )
    }

    pub fn publish_qos(&self) -> Option<QoS> {
        qos_from_level(self.publish_qos)
    }

    pub fn subscribe_qos(&self) -> Option<QoS> {
        qos_from_level(self.subscribe_qos)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}

/// Map a numeric QoS level to rumqttc's enum.
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

/// Generate a client ID of the form `{prefix}-{hex}`.
///
/// The suffix is a random 16-bit value so restarts do not collide with a
/// session the broker still holds for the previous process.
pub fn generate_client_id(prefix: &str) -> String {
    let random = uuid::Uuid::new_v4().as_u128() as u16;
    format!("{prefix}-{random:x}")
}
