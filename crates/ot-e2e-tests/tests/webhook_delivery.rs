//! Dispatch through the HTTP webhook sink against a mock endpoint.

mod helpers;

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::event_names;
use ot_relay::dispatch::{Delivery, Dispatcher};
use ot_relay::sink::{SinkConfig, WebhookSink};

fn sink_for(server: &MockServer) -> WebhookSink {
    WebhookSink::new(&SinkConfig {
        base_url: server.uri(),
        api_key: "test-key".into(),
        timeout_secs: 2,
        ..SinkConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn open_command_posts_both_events() {
    let server = MockServer::start().await;
    let body = serde_json::json!({"value1": "deviceA", "value2": "open", "value3": "1"});
    for event in ["door_notify", "door_log"] {
        Mock::given(method("POST"))
            .and(path(format!("/trigger/{event}/with/key/test-key")))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let sink = sink_for(&server);
    let dispatcher = Dispatcher::new(&sink, event_names());
    let report = dispatcher
        .handle_payload(br#"{"command":1,"sender":"deviceA"}"#)
        .await
        .unwrap();

    assert_eq!(report.notification, Some(Delivery::Delivered));
    assert_eq!(report.audit, Delivery::Delivered);
}

#[tokio::test]
async fn notification_outage_does_not_block_audit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trigger/door_notify/with/key/test-key"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/trigger/door_log/with/key/test-key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sink = sink_for(&server);
    let dispatcher = Dispatcher::new(&sink, event_names());
    let report = dispatcher
        .handle_payload(br#"{"command":4,"sender":"deviceB"}"#)
        .await
        .unwrap();

    assert!(matches!(report.notification, Some(Delivery::Failed(_))));
    assert_eq!(report.audit, Delivery::Delivered);
}

#[tokio::test]
async fn rejected_payload_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let sink = sink_for(&server);
    let dispatcher = Dispatcher::new(&sink, event_names());
    assert!(dispatcher.handle_payload(br#"{"sender":"deviceA"}"#).await.is_err());
}
