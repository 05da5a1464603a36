//! Open-TLS demo publisher: sends a counter over mTLS MQTT on a fixed
//! interval, skipping ticks while the broker link is down.

use tracing_subscriber::EnvFilter;

use ot_mqtt_channel::{CredentialBundle, TransportSession};
use ot_relay::config::RelayConfig;
use ot_relay::producer::{self, Producer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ot-publisher starting");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/open-tls/relay.toml".to_string());

    let config = RelayConfig::from_file(&config_path)?;
    let qos = config.publish_qos()?;
    tracing::info!(broker = %config.mqtt.broker_url(), topic = %config.mqtt.topic, "config loaded");

    let bundle = CredentialBundle::load(&config.mqtt)?;
    let (session, events) = TransportSession::connect(&config.mqtt, &bundle).await?;
    tracing::info!("[MQTT Publisher] Connected");

    let mut producer = Producer::new(&config.mqtt.topic, qos);

    tokio::select! {
        () = producer.run(&session, session.health(), config.producer.interval()) => {
            tracing::error!("producer loop exited unexpectedly");
        }
        () = producer::watch_session(events) => {
            tracing::error!("session event stream ended unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!(last_counter = producer.next_value() - 1, "stopping publisher");
    session.disconnect(config.mqtt.disconnect_grace()).await;
    Ok(())
}
