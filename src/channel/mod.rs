pub mod backoff;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::channel::backoff::Backoff;
use crate::error::AppError;
use crate::models::wire::{
    BookingEnvelope, InboundEvent, InboundFrame, OutboundMessage, RideRequest, UserType,
};
use crate::observability::metrics::Metrics;

/// The phone field of a booking_request is a placeholder until a verified
/// number exists server-side.
const PLACEHOLDER_PHONE_PREFIX: &str = "+000";

const OUTBOUND_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting to redial; carries the attempt number.
    Backoff(u32),
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Empty URL means `connect` is a no-op and the channel stays down.
    pub ws_url: String,
    /// Identity sent in the registration handshake, when known.
    pub identity: Option<(UserType, u64)>,
    pub backoff: Backoff,
    pub event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            identity: None,
            backoff: Backoff::default(),
            event_buffer_size: 256,
        }
    }
}

struct Inner {
    cfg: ChannelConfig,
    metrics: Arc<Metrics>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<InboundEvent>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// Owns at most one live WebSocket to the ride server. Cheap to clone; all
/// clones share the same connection.
#[derive(Clone)]
pub struct RideChannel {
    inner: Arc<Inner>,
}

impl RideChannel {
    pub fn new(cfg: ChannelConfig, metrics: Arc<Metrics>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(cfg.event_buffer_size.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                cfg,
                metrics,
                state_tx,
                events_tx,
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                shutdown_tx,
                running: AtomicBool::new(false),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<InboundEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner
            .last_error
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Starts the connection loop. A no-op when the URL is empty or the loop
    /// is already running; never fails the caller.
    pub fn connect(&self) {
        if self.inner.cfg.ws_url.is_empty() {
            debug!("no websocket url configured; channel stays disconnected");
            return;
        }

        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let outbound_rx = match self.inner.outbound_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(outbound_rx) = outbound_rx else {
            // The loop already ran once and was torn down.
            return;
        };

        let channel = self.clone();
        tokio::spawn(async move {
            channel.run(outbound_rx).await;
        });
    }

    /// The only cancellation path: stops any pending redial and closes the
    /// socket. The channel cannot be reused afterwards.
    pub fn disconnect(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Serializes and sends only while connected. `false` means the message
    /// was dropped; there is no queueing across disconnects.
    pub fn send_message(&self, msg: &OutboundMessage) -> bool {
        if self.state() != ConnectionState::Connected {
            self.inner.metrics.messages_dropped_total.inc();
            return false;
        }

        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "failed to serialize outbound message");
                return false;
            }
        };

        if self.inner.outbound_tx.try_send(text).is_ok() {
            self.inner.metrics.messages_sent_total.inc();
            true
        } else {
            self.inner.metrics.messages_dropped_total.inc();
            false
        }
    }

    /// Shapes the fixed booking_request envelope and forwards it.
    pub fn send_ride_request(&self, req: RideRequest) -> bool {
        let envelope = BookingEnvelope {
            passenger_id: req.passenger_id,
            passenger_name: req.passenger_name,
            passenger_phone: format!("{PLACEHOLDER_PHONE_PREFIX}{}", req.passenger_id),
            pickup_address: req.pickup_address,
            destination_address: req.destination_address,
            estimated_fare: req.estimated_fare,
            distance: req.distance,
            service_type: "standard".to_string(),
            timestamp: Utc::now(),
        };

        self.send_message(&OutboundMessage::BookingRequest(envelope))
    }

    fn set_state(&self, state: ConnectionState) {
        let gauge = match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Backoff(_) => 3,
        };
        self.inner.metrics.connection_state.set(gauge);
        let _ = self.inner.state_tx.send(state);
    }

    fn record_error(&self, err: AppError) {
        warn!(error = %err, "channel error");
        if let Ok(mut guard) = self.inner.last_error.lock() {
            *guard = Some(err.to_string());
        }
    }

    fn shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    async fn run(&self, mut outbound_rx: mpsc::Receiver<String>) {
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let mut attempt: u32 = 0;

        loop {
            if self.shutting_down() {
                break;
            }

            self.set_state(ConnectionState::Connecting);

            let dial = tokio::select! {
                result = connect_async(self.inner.cfg.ws_url.as_str()) => result,
                _ = shutdown_rx.changed() => break,
            };

            match dial {
                Ok((socket, _)) => {
                    self.inner
                        .metrics
                        .connect_attempts_total
                        .with_label_values(&["success"])
                        .inc();
                    attempt = 0;
                    info!(url = %self.inner.cfg.ws_url, "channel connected");
                    self.session(socket, &mut outbound_rx, &mut shutdown_rx)
                        .await;
                }
                Err(err) => {
                    self.inner
                        .metrics
                        .connect_attempts_total
                        .with_label_values(&["error"])
                        .inc();
                    self.record_error(AppError::Transport(format!("dial failed: {err}")));
                }
            }

            if self.shutting_down() {
                break;
            }

            // Exactly one pending redial at a time.
            attempt = attempt.saturating_add(1);
            self.set_state(ConnectionState::Backoff(attempt));
            let delay = self.inner.cfg.backoff.delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling redial");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("channel stopped");
    }

    async fn session(
        &self,
        socket: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        outbound_rx: &mut mpsc::Receiver<String>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let (mut sink, mut stream) = socket.split();

        // Sends attempted while down were dropped by send_message; anything
        // still queued raced the previous close and must not leak into the
        // new session.
        while outbound_rx.try_recv().is_ok() {}

        self.set_state(ConnectionState::Connected);

        // Fire-and-once handshake: the server associates this socket with
        // the user from this single message. Re-sent after every reconnect.
        if let Some((user_type, user_id)) = self.inner.cfg.identity {
            let register = OutboundMessage::Register { user_type, user_id };
            match serde_json::to_string(&register) {
                Ok(text) => {
                    if let Err(err) = sink.send(Message::Text(text.into())).await {
                        self.record_error(AppError::Transport(format!(
                            "register send failed: {err}"
                        )));
                        return;
                    }
                    debug!(user_id, "registration handshake sent");
                }
                Err(err) => {
                    self.record_error(AppError::Internal(format!(
                        "register serialize failed: {err}"
                    )));
                }
            }
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = sink.close().await;
                    return;
                }
                outbound = outbound_rx.recv() => {
                    let Some(text) = outbound else { return };
                    if let Err(err) = sink.send(Message::Text(text.into())).await {
                        self.record_error(AppError::Transport(format!("send failed: {err}")));
                        return;
                    }
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                        Some(Ok(Message::Close(_))) | None => {
                            info!("server closed the channel");
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            self.record_error(AppError::Transport(format!(
                                "receive failed: {err}"
                            )));
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Best-effort parse and fan-out. Malformed frames are counted and
    /// dropped, never surfaced to the user.
    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => {
                let event = InboundEvent::from_frame(frame);
                let _ = self.inner.events_tx.send(event);
            }
            Err(err) => {
                self.inner.metrics.frames_malformed_total.inc();
                let err = AppError::Parse(err.to_string());
                warn!(error = %err, "dropping malformed frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(cfg: ChannelConfig) -> RideChannel {
        RideChannel::new(cfg, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn connect_with_empty_url_stays_disconnected() {
        let ch = channel(ChannelConfig::default());
        ch.connect();

        assert_eq!(ch.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_message_while_disconnected_returns_false() {
        let ch = channel(ChannelConfig::default());

        let msg = OutboundMessage::Register {
            user_type: UserType::Passenger,
            user_id: 1,
        };
        assert!(!ch.send_message(&msg));
        assert_eq!(ch.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_ride_request_while_disconnected_is_dropped() {
        let ch = channel(ChannelConfig::default());

        let dropped = ch.send_ride_request(RideRequest {
            passenger_id: 9,
            passenger_name: "Ada".to_string(),
            pickup_address: "A".to_string(),
            destination_address: "B".to_string(),
            estimated_fare: 10.0,
            distance: 2.0,
        });

        assert!(!dropped);
    }

    #[tokio::test]
    async fn dial_failure_is_recorded_as_a_transport_error() {
        use std::time::Duration;

        let ch = channel(ChannelConfig {
            // Nothing listens on the discard port.
            ws_url: "ws://127.0.0.1:9/ws".to_string(),
            backoff: Backoff::new(Duration::from_secs(10), Duration::from_secs(10)),
            ..ChannelConfig::default()
        });
        ch.connect();

        let mut state_rx = ch.subscribe_state();
        tokio::time::timeout(
            Duration::from_secs(5),
            state_rx.wait_for(|s| matches!(s, ConnectionState::Backoff(_))),
        )
        .await
        .expect("timed out waiting for backoff")
        .expect("state channel closed");

        let err = ch.last_error().expect("dial error must be recorded");
        assert!(err.contains("transport error"), "{err}");

        ch.disconnect();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let ch = channel(ChannelConfig::default());
        ch.disconnect();
        ch.disconnect();

        assert_eq!(ch.state(), ConnectionState::Disconnected);
    }
}
