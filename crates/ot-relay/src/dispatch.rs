//! Command dispatch: decode, classify, audit, deliver.
//!
//! One inbound payload yields at most two sink calls. Each call is
//! attempted on its own; a failed notification never suppresses the audit
//! event.

use chrono::Utc;

use ot_protocol::commands::{CommandPayload, CommandRecord, RejectReason};

use crate::policy::{self, DispatchOutcome, EventNames, SinkEvent};
use crate::sink::Sink;

/// Result of delivering one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// What happened to one accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub record: CommandRecord,
    pub notification: Option<Delivery>,
    pub audit: Delivery,
}

/// Routes command payloads to a sink.
pub struct Dispatcher<'a> {
    sink: &'a dyn Sink,
    names: EventNames,
}

impl<'a> Dispatcher<'a> {
    pub fn new(sink: &'a dyn Sink, names: EventNames) -> Self {
        Self { sink, names }
    }

    /// Handle one raw inbound payload.
    ///
    /// Rejected payloads are logged and produce no sink calls.
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<DispatchReport, RejectReason> {
        let record = match CommandPayload::parse(payload).and_then(CommandPayload::into_record) {
            Ok(record) => record,
            Err(reason) => {
                tracing::error!(
                    reason = %reason,
                    payload = %String::from_utf8_lossy(payload),
                    "rejecting command message"
                );
                return Err(reason);
            }
        };

        tracing::info!(
            target: "audit",
            code = record.code,
            label = %record.label,
            sender = %record.sender,
            otp_present = record.otp_present,
            at = %Utc::now().to_rfc3339(),
            "command received"
        );

        let outcome = policy::decide(&record, &self.names);
        let (notification, audit) = self.deliver(&outcome).await;

        Ok(DispatchReport {
            record,
            notification,
            audit,
        })
    }

    /// Deliver an outcome: notification first, then audit.
    pub async fn deliver(&self, outcome: &DispatchOutcome) -> (Option<Delivery>, Delivery) {
        let notification = match &outcome.notification {
            Some(event) => Some(self.emit(event).await),
            None => None,
        };
        let audit = self.emit(&outcome.audit).await;
        (notification, audit)
    }

    async fn emit(&self, event: &SinkEvent) -> Delivery {
        match self.sink.emit(event).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                tracing::warn!(event = %event.event, error = %e, "sink delivery failed");
                Delivery::Failed(e.to_string())
            }
        }
    }
}
