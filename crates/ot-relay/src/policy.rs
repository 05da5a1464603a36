//! Dispatch policy: which automation events a command fires.
//!
//! Every command produces one audit ("log") event. Commands whose kind is
//! listed in [`NOTIFY_KINDS`] additionally produce a notification event,
//! which is delivered first.

use serde::Serialize;

use ot_protocol::commands::{CommandKind, CommandRecord};

/// Command kinds that trigger a notification.
pub const NOTIFY_KINDS: &[CommandKind] = &[CommandKind::Open, CommandKind::Auto];

/// Sink event names, taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames {
    pub notification: String,
    pub log: String,
}

/// One named event with its three positional values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkEvent {
    #[serde(skip)]
    pub event: String,
    pub value1: String,
    pub value2: String,
    pub value3: String,
}

/// Events to deliver for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub notification: Option<SinkEvent>,
    pub audit: SinkEvent,
}

impl DispatchOutcome {
    /// Events in delivery order: notification (if any), then audit.
    pub fn events(&self) -> impl Iterator<Item = &SinkEvent> {
        self.notification.iter().chain(std::iter::once(&self.audit))
    }
}

/// Decide the outcome for a classified command.
pub fn decide(record: &CommandRecord, names: &EventNames) -> DispatchOutcome {
    let event = |name: &str| SinkEvent {
        event: name.to_string(),
        value1: record.sender.clone(),
        value2: record.label.clone(),
        value3: record.code.to_string(),
    };

    DispatchOutcome {
        notification: NOTIFY_KINDS
            .contains(&record.kind)
            .then(|| event(&names.notification)),
        audit: event(&names.log),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ot_protocol::commands::CommandPayload;

    fn names() -> EventNames {
        EventNames {
            notification: "door_notify".into(),
            log: "door_log".into(),
        }
    }

    fn record(code: i64, sender: Option<&str>) -> CommandRecord {
        CommandPayload {
            command: Some(code),
            otp_auth: None,
            sender: sender.map(str::to_string),
        }
        .into_record()
        .unwrap()
    }

    #[test]
    fn open_notifies_and_logs() {
        let outcome = decide(&record(1, Some("deviceA")), &names());
        let expected = |event: &str| SinkEvent {
            event: event.into(),
            value1: "deviceA".into(),
            value2: "open".into(),
            value3: "1".into(),
        };
        assert_eq!(outcome.notification, Some(expected("door_notify")));
        assert_eq!(outcome.audit, expected("door_log"));
    }

    #[test]
    fn notification_only_for_open_and_auto() {
        for code in -2..=10 {
            let outcome = decide(&record(code, Some("x")), &names());
            assert_eq!(
                outcome.notification.is_some(),
                code == 1 || code == 4,
                "code {code}"
            );
            assert_eq!(outcome.audit.event, "door_log");
        }
    }

    #[test]
    fn stop_logs_only() {
        let outcome = decide(&record(2, Some("deviceA")), &names());
        assert!(outcome.notification.is_none());
        assert_eq!(outcome.audit.value2, "stop");
        assert_eq!(outcome.audit.value3, "2");
    }

    #[test]
    fn unknown_code_label_is_decimal() {
        let outcome = decide(&record(77, Some("deviceA")), &names());
        assert_eq!(outcome.audit.value2, "77");
        assert_eq!(outcome.audit.value3, "77");
    }

    #[test]
    fn missing_sender_uses_null_sentinel() {
        let outcome = decide(&record(4, None), &names());
        assert_eq!(outcome.notification.unwrap().value1, "NULL");
        assert_eq!(outcome.audit.value1, "NULL");
    }

    #[test]
    fn events_are_ordered_notification_first() {
        let outcome = decide(&record(1, Some("a")), &names());
        let order: Vec<&str> = outcome.events().map(|e| e.event.as_str()).collect();
        assert_eq!(order, vec!["door_notify", "door_log"]);

        let outcome = decide(&record(3, Some("a")), &names());
        assert_eq!(outcome.events().count(), 1);
    }

    #[test]
    fn sink_event_body_has_positional_values_only() {
        let outcome = decide(&record(1, Some("a")), &names());
        let json = serde_json::to_value(&outcome.audit).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value1": "a", "value2": "open", "value3": "1"})
        );
    }
}
