//! Transport session: one secured connection to the broker.
//!
//! A background pump task drives the event loop, owns the connection state
//! machine, and forwards [`SessionEvent`]s to the driver over a single
//! channel, so handlers run one at a time in arrival order:
//!
//! ```text
//! Disconnected --connect()--> Connecting --ConnAck--> Connected
//! Connecting --error (first attempt)--> Disconnected   (fatal to connect())
//! Connected --error--> Reconnecting --backoff, poll--> Connected | Reconnecting
//! Connected --disconnect()--> acks drained or grace elapsed --DISCONNECT--> Disconnected
//! Reconnecting --disconnect()--> Disconnected
//! ```
//!
//! Connection events wait for room in the event channel. Inbound messages
//! do not: when the driver falls a full channel behind, further messages
//! are dropped with a warning so the event loop keeps answering keep-alives.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backoff::BackoffPolicy;
use crate::channel::Channel;
use crate::config::{MqttConfig, generate_client_id};
use crate::credentials::CredentialBundle;
use crate::error::{MqttError, MqttResult};
use crate::link::{Link, LinkEvent, Requester};
use crate::state::{ConnectionState, HealthFlag, InboundMessage, SessionEvent};
use crate::tls;

/// Capacity of the session event channel and the rumqttc request queue.
const CHANNEL_CAPACITY: usize = 64;

/// Time allowed for DISCONNECT to go out once the grace period is over.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type Subscriptions = Arc<Mutex<Vec<(String, QoS)>>>;

/// A connected MQTT session.
///
/// Publishing and subscribing never block. Callers check [`health`] before
/// publishing; the session accepts publishes while disconnected but their
/// delivery is undefined.
///
/// [`health`]: TransportSession::health
pub struct TransportSession {
    requester: Arc<dyn Requester>,
    health: HealthFlag,
    state: watch::Receiver<ConnectionState>,
    /// Grace deadline, set once a disconnect is requested.
    shutdown: watch::Sender<Option<Instant>>,
    subscriptions: Subscriptions,
    attempts: Arc<AtomicU32>,
    /// QoS 1/2 publishes submitted but not yet written by the event loop.
    unsent: Arc<AtomicUsize>,
    pump: Option<JoinHandle<()>>,
}

impl TransportSession {
    /// Connect to the broker over mTLS.
    ///
    /// Blocks until the first connection attempt resolves. A failed first
    /// attempt is returned as an error; later link losses are retried in
    /// the background without limit.
    pub async fn connect(
        config: &MqttConfig,
        bundle: &CredentialBundle,
    ) -> MqttResult<(Self, mpsc::Receiver<SessionEvent>)> {
        let client_id = generate_client_id(&config.client_id_prefix);
        tracing::info!(
            client_id = %client_id,
            broker = %config.broker_url(),
            verify_mode = ?bundle.verify_mode(),
            "connecting to broker"
        );

        let mut options = MqttOptions::new(&client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
        options.set_clean_session(config.clean_session);
        options.set_transport(tls::build_transport(bundle)?);

        let (client, eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);

        Self::start(eventloop, Arc::new(client), BackoffPolicy::from_config(config)).await
    }

    /// Start a session over any link/requester pair.
    ///
    /// `connect` uses this with rumqttc; tests use it with the mocks.
    pub async fn start<L: Link + 'static>(
        link: L,
        requester: Arc<dyn Requester>,
        backoff: BackoffPolicy,
    ) -> MqttResult<(Self, mpsc::Receiver<SessionEvent>)> {
        let health = HealthFlag::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (first_tx, first_rx) = oneshot::channel();
        let subscriptions: Subscriptions = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(AtomicU32::new(0));
        let unsent = Arc::new(AtomicUsize::new(0));

        let pump = Pump {
            link,
            requester: requester.clone(),
            health: health.clone(),
            state: state_tx,
            shutdown: shutdown_rx,
            subscriptions: subscriptions.clone(),
            attempts: attempts.clone(),
            unsent: unsent.clone(),
            in_flight: HashSet::new(),
            backoff,
            events: events_tx,
        };
        let handle = tokio::spawn(pump.run(first_tx));

        let session = Self {
            requester,
            health,
            state: state_rx,
            shutdown: shutdown_tx,
            subscriptions,
            attempts,
            unsent,
            pump: Some(handle),
        };

        match first_rx.await {
            Ok(Ok(())) => Ok((session, events_rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MqttError::Connection(
                "session task ended before the first connection resolved".into(),
            )),
        }
    }

    /// Shared health flag; `true` while connected.
    pub fn health(&self) -> &HealthFlag {
        &self.health
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Failed reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Submit a publish without waiting for it to go out.
    pub fn publish(&self, topic: &str, qos: QoS, payload: impl Into<Vec<u8>>) -> MqttResult<()> {
        self.requester.try_publish(topic, qos, payload.into())?;
        if qos != QoS::AtMostOnce {
            self.unsent.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Register a subscription.
    ///
    /// Issued immediately when connected, and again after every reconnect.
    pub fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        {
            let mut subs = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !subs.iter().any(|(f, _)| f == filter) {
                subs.push((filter.to_string(), qos));
            }
        }

        if self.health.is_healthy() {
            self.requester.try_subscribe(filter, qos)?;
        }
        tracing::info!(filter = %filter, qos = ?qos, "subscription registered");
        Ok(())
    }

    /// Disconnect and tear the session down.
    ///
    /// QoS 1/2 publishes already submitted get up to `grace` to be
    /// acknowledged before DISCONNECT is sent. A session that is
    /// reconnecting stops at once.
    pub async fn disconnect(mut self, grace: Duration) {
        self.health.set(false);
        let _ = self.shutdown.send(Some(Instant::now() + grace));

        if let Some(mut handle) = self.pump.take() {
            if tokio::time::timeout(grace + CLOSE_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "broker link did not close in time, dropping it"
                );
                handle.abort();
            }
        }
        tracing::info!("MQTT session disconnected");
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Channel for TransportSession {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        TransportSession::publish(self, topic, qos, payload)
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        TransportSession::subscribe(self, filter, qos)
    }
}

// ── Pump ──────────────────────────────────────────────────────

/// Shutdown progress of the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Running,
    /// Disconnect requested; waiting for acknowledgements until the deadline.
    Waiting(Instant),
    /// DISCONNECT submitted; waiting for the link to report it sent.
    Closing,
}

struct Pump<L> {
    link: L,
    requester: Arc<dyn Requester>,
    health: HealthFlag,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<Option<Instant>>,
    subscriptions: Subscriptions,
    attempts: Arc<AtomicU32>,
    unsent: Arc<AtomicUsize>,
    /// Packet ids written to the broker and not yet acknowledged.
    in_flight: HashSet<u16>,
    backoff: BackoffPolicy,
    events: mpsc::Sender<SessionEvent>,
}

impl<L: Link> Pump<L> {
    async fn run(mut self, first: oneshot::Sender<MqttResult<()>>) {
        let mut first = Some(first);
        let mut drain = Drain::Running;
        self.set_state(ConnectionState::Connecting);

        loop {
            let step = match drain {
                Drain::Running => tokio::select! {
                    step = self.link.poll() => step,
                    changed = self.shutdown.changed() => {
                        let requested = match changed {
                            Ok(()) => *self.shutdown.borrow_and_update(),
                            Err(_) => break,
                        };
                        if let Some(deadline) = requested {
                            drain = self.begin_drain(deadline);
                        }
                        continue;
                    }
                },
                Drain::Waiting(deadline) => tokio::select! {
                    step = self.link.poll() => step,
                    () = tokio::time::sleep_until(deadline) => {
                        tracing::warn!(
                            pending = self.pending(),
                            "disconnect grace period elapsed with unacknowledged publishes"
                        );
                        drain = self.close();
                        continue;
                    }
                },
                Drain::Closing => self.link.poll().await,
            };

            match step {
                Ok(LinkEvent::ConnAck) => {
                    let failed = self.attempts.swap(0, Ordering::AcqRel);
                    self.health.set(true);
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(failed_attempts = failed, "CONNECTED EVENT");
                    self.resubscribe();
                    emit(&self.events, SessionEvent::Connected).await;
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                Ok(LinkEvent::Message(message)) => self.forward(message),
                Ok(LinkEvent::PublishSent(pkid)) => {
                    if pkid != 0 {
                        let _ = self
                            .unsent
                            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
                        self.in_flight.insert(pkid);
                    }
                }
                Ok(LinkEvent::Acked(pkid)) => {
                    self.in_flight.remove(&pkid);
                    if matches!(drain, Drain::Waiting(_)) && self.pending() == 0 {
                        tracing::debug!("in-flight publishes acknowledged");
                        drain = self.close();
                    }
                }
                Ok(LinkEvent::Closed) => break,
                Ok(LinkEvent::Other) => {}
                Err(reason) => {
                    if self.shutdown.borrow().is_some() {
                        break;
                    }

                    if let Some(tx) = first.take() {
                        self.health.set(false);
                        self.set_state(ConnectionState::Disconnected);
                        tracing::error!(error = %reason, "initial broker connection failed");
                        let _ = tx.send(Err(MqttError::Connection(reason)));
                        return;
                    }

                    if self.health.is_healthy() {
                        self.health.set(false);
                        self.set_state(ConnectionState::Reconnecting);
                        tracing::warn!(reason = %reason, "MQTT DISCONNECTED");
                        emit(
                            &self.events,
                            SessionEvent::Disconnected {
                                reason: reason.clone(),
                            },
                        )
                        .await;
                    }

                    let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
                    let delay = self.backoff.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "reconnecting"
                    );
                    if self.sleep_or_shutdown(delay).await {
                        break;
                    }
                }
            }
        }

        self.health.set(false);
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_replace(next);
    }

    /// QoS 1/2 publishes not yet acknowledged, written or not.
    fn pending(&self) -> usize {
        self.unsent.load(Ordering::Acquire) + self.in_flight.len()
    }

    fn begin_drain(&self, deadline: Instant) -> Drain {
        match self.pending() {
            0 => self.close(),
            pending => {
                tracing::info!(pending, "waiting for in-flight acknowledgements");
                Drain::Waiting(deadline)
            }
        }
    }

    fn close(&self) -> Drain {
        if let Err(e) = self.requester.try_disconnect() {
            tracing::debug!(error = %e, "disconnect request not queued");
        }
        Drain::Closing
    }

    fn resubscribe(&self) {
        let subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (filter, qos) in subs {
            if let Err(e) = self.requester.try_subscribe(&filter, qos) {
                tracing::error!(filter = %filter, error = %e, "resubscribe failed");
            }
        }
    }

    fn forward(&self, message: InboundMessage) {
        let topic = message.topic.clone();
        match self.events.try_send(SessionEvent::Message(message)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(topic = %topic, "driver is behind, dropping inbound message");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("session event dropped, no receiver");
            }
        }
    }

    /// Returns `true` if shutdown was requested during the sleep.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => self.shutdown.borrow().is_some(),
            changed = self.shutdown.changed() => changed.is_err() || self.shutdown.borrow().is_some(),
        }
    }
}

async fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("session event dropped, no receiver");
    }
}
