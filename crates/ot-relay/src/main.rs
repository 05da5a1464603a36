//! Open-TLS command relay: subscribes to device commands over mTLS MQTT and
//! forwards them to an automation webhook.

use tracing_subscriber::EnvFilter;

use ot_mqtt_channel::{CredentialBundle, TransportSession};
use ot_relay::config::RelayConfig;
use ot_relay::consumer;
use ot_relay::dispatch::Dispatcher;
use ot_relay::sink::WebhookSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ot-relay starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/open-tls/relay.toml".to_string());

    let config = RelayConfig::from_file(&config_path)?;
    let qos = config.subscribe_qos()?;
    tracing::info!(broker = %config.mqtt.broker_url(), topic = %config.mqtt.topic, "config loaded");

    // ── Sink ────────────────────────────────────────────────────
    let sink = WebhookSink::new(&config.sink)?;
    let dispatcher = Dispatcher::new(&sink, config.sink.event_names());

    // ── MQTT session ────────────────────────────────────────────
    let bundle = CredentialBundle::load(&config.mqtt)?;
    let (session, events) = TransportSession::connect(&config.mqtt, &bundle).await?;
    tracing::info!("[MQTT Subscriber] Connected");

    consumer::register(&session, &config.mqtt.topic, qos).await?;

    tracing::info!("ot-relay ready");

    tokio::select! {
        () = consumer::run(events, &dispatcher, &config.mqtt.topic) => {
            tracing::error!("session event stream ended unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    session.disconnect(config.mqtt.disconnect_grace()).await;
    tracing::info!("ot-relay stopped");
    Ok(())
}
