//! Subscribe-side driver: feeds inbound command messages to the dispatcher.

use rumqttc::QoS;
use tokio::sync::mpsc;

use ot_mqtt_channel::{Channel, MqttResult, SessionEvent};
use ot_protocol::topics;

use crate::dispatch::Dispatcher;

/// Register the single command subscription.
pub async fn register<C: Channel + ?Sized>(channel: &C, filter: &str, qos: QoS) -> MqttResult<()> {
    channel.subscribe(filter, qos).await?;
    tracing::info!(filter, ?qos, "command subscription registered");
    Ok(())
}

/// Handle session events one at a time until the stream closes.
///
/// Messages on topics outside `filter` are ignored.
pub async fn run(mut events: mpsc::Receiver<SessionEvent>, dispatcher: &Dispatcher<'_>, filter: &str) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected => tracing::info!("broker link up"),
            SessionEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "broker link down");
            }
            SessionEvent::Message(msg) => {
                if !topics::matches(filter, &msg.topic) {
                    tracing::debug!(topic = %msg.topic, "ignoring message outside subscription");
                    continue;
                }
                tracing::debug!(topic = %msg.topic, len = msg.payload.len(), "command message");
                // Rejections are logged by the dispatcher.
                let _ = dispatcher.handle_payload(&msg.payload).await;
            }
        }
    }
    tracing::info!("session event stream closed");
}
