//! Reconnecting WebSocket transport for the CTI channel.
//!
//! The transport owns the socket lifecycle: connect with the bearer
//! credential, forward inbound frames upward, classify abnormal closes, and
//! reconnect after a fixed delay. It knows nothing about the CTI protocol
//! beyond "frames are JSON with a `messageId`"; re-establishing the agent
//! session after a reconnect (sending a fresh login) is the dispatcher's
//! job, triggered by the `Connected` event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

use phonebar_core::{CloseReason, ConnectionConfig, PhoneBarError, Result};

use crate::sink::OutboundSink;

/// Wire destinations on the signaling channel.
pub mod destinations {
    /// Fixed destination all outbound commands publish to.
    pub const OUTBOUND: &str = "/cti/call";
    /// Per-agent inbound topic prefix; the authenticated identity is
    /// appended.
    pub const TOPIC_PREFIX: &str = "/topic/user.";
}

/// Socket-level transport modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    WebSocket,
    /// Long-polling fallback used by constrained mobile embeddings.
    XhrPolling,
}

impl TransportMode {
    /// Fallback policy by client platform: a constrained mobile client must
    /// not attempt the plain WebSocket upgrade.
    pub fn fallback_modes(mobile_client: bool) -> Vec<TransportMode> {
        if mobile_client {
            vec![TransportMode::XhrPolling]
        } else {
            vec![TransportMode::WebSocket, TransportMode::XhrPolling]
        }
    }
}

/// What the transport reports upward.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Socket established and subscribed; the dispatcher re-logs-in on this.
    Connected,
    /// One inbound frame, deserialized from wire text.
    Frame(Value),
    /// Inbound text that is not valid JSON; carries the parse error.
    Malformed(String),
    /// Socket lost, classified by close code. Reconnection is automatic.
    Disconnected(CloseReason),
}

/// Idempotent application-level keep-alive timer.
///
/// Runs a caller-supplied ping action on a fixed interval, only while the
/// connection is open. Restart stops any existing timer first so two starts
/// never leave two timers running; stop with no timer is a no-op.
#[derive(Default)]
pub struct KeepAlive {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &self,
        interval: Duration,
        immediate: bool,
        is_open: Arc<AtomicBool>,
        ping: Arc<dyn Fn() + Send + Sync>,
    ) {
        self.stop();
        if !is_open.load(Ordering::SeqCst) {
            return;
        }
        if immediate {
            ping();
        }
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; the immediate ping is opt-in
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if is_open.load(Ordering::SeqCst) {
                    ping();
                } else {
                    break;
                }
            }
        });
        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }
    }

    pub fn stop(&self) {
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

/// Reconnecting CTI transport.
pub struct CtiTransport {
    config: ConnectionConfig,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    out_tx: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    runner: Mutex<Option<JoinHandle<()>>>,
    keep_alive: KeepAlive,
}

impl CtiTransport {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            out_tx: Arc::new(Mutex::new(None)),
            runner: Mutex::new(None),
            keep_alive: KeepAlive::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The per-agent inbound topic this transport subscribes to.
    pub fn inbound_topic(&self) -> String {
        format!("{}{}", destinations::TOPIC_PREFIX, self.config.username)
    }

    /// Open the channel and keep it open until [`close`](Self::close).
    ///
    /// Fails fast, without a connection attempt, when the credential is
    /// missing or the platform policy leaves no supported transport mode.
    /// Opening an already-open transport is a no-op.
    pub fn open(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        if self.config.token.is_empty() {
            return Err(PhoneBarError::Config(
                "missing access token, connection attempt suppressed".to_string(),
            ));
        }
        let modes = TransportMode::fallback_modes(self.config.mobile_client);
        if !modes.contains(&TransportMode::WebSocket) {
            return Err(PhoneBarError::Config(
                "transport policy excludes websocket, no supported mode remains".to_string(),
            ));
        }

        let mut runner = self
            .runner
            .lock()
            .map_err(|_| PhoneBarError::Internal("transport runner lock poisoned".to_string()))?;
        if runner.is_some() {
            return Ok(());
        }
        self.closed.store(false, Ordering::SeqCst);
        info!(topic = %self.inbound_topic(), "opening CTI channel");

        let url = format!("{}/stomp?access_token={}", self.config.url, self.config.token);
        let reconnect_delay = self.config.reconnect_delay;
        let heartbeat = self.config.heartbeat_interval;
        let connected = self.connected.clone();
        let closed = self.closed.clone();
        let out_tx = self.out_tx.clone();

        *runner = Some(tokio::spawn(async move {
            run_loop(url, reconnect_delay, heartbeat, connected, closed, out_tx, events).await;
        }));
        Ok(())
    }

    /// Publish one frame to the outbound destination. Explicit error when no
    /// connection is established.
    pub async fn send(&self, message: &Value) -> Result<()> {
        let tx = self.out_tx.lock().ok().and_then(|guard| guard.clone());
        let Some(tx) = tx else {
            return Err(PhoneBarError::InvalidState(
                "no CTI connection established".to_string(),
            ));
        };
        let text = serde_json::to_string(message)?;
        tx.send(text)
            .await
            .map_err(|_| PhoneBarError::Transport("outbound channel closed".to_string()))
    }

    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Graceful shutdown: stops the keep-alive and the reconnect loop.
    /// Safe to call multiple times.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.keep_alive.stop();
        if let Ok(mut guard) = self.out_tx.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.runner.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    /// Start the application keep-alive, optionally pinging immediately.
    /// Restarting replaces any running timer.
    pub fn start_keep_alive(&self, immediate: bool, ping: Arc<dyn Fn() + Send + Sync>) {
        self.keep_alive.start(
            self.config.keep_alive_interval,
            immediate,
            self.connected.clone(),
            ping,
        );
    }

    pub fn stop_keep_alive(&self) {
        self.keep_alive.stop();
    }
}

#[async_trait]
impl OutboundSink for CtiTransport {
    async fn send(&self, message: Value) -> Result<()> {
        CtiTransport::send(self, &message).await
    }

    fn is_open(&self) -> bool {
        CtiTransport::is_open(self)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    url: String,
    reconnect_delay: Duration,
    heartbeat: Duration,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    out_tx: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    events: mpsc::Sender<TransportEvent>,
) {
    loop {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("CTI channel connected");
                let (mut write, mut read) = ws_stream.split();

                let (tx, mut rx) = mpsc::channel::<String>(100);
                if let Ok(mut guard) = out_tx.lock() {
                    *guard = Some(tx);
                }
                connected.store(true, Ordering::SeqCst);
                if events.send(TransportEvent::Connected).await.is_err() {
                    break;
                }

                let write_task = tokio::spawn(async move {
                    while let Some(msg) = rx.recv().await {
                        if let Err(e) = write.send(Message::Text(msg)).await {
                            error!("failed to send frame: {}", e);
                            break;
                        }
                    }
                });

                let mut reason = CloseReason::Generic;
                loop {
                    let msg = match tokio::time::timeout(heartbeat, read.next()).await {
                        Ok(Some(msg)) => msg,
                        Ok(None) => break,
                        Err(_) => {
                            warn!("no traffic within the heartbeat window, dropping connection");
                            break;
                        }
                    };
                    match msg {
                        Ok(Message::Text(text)) => {
                            match serde_json::from_str::<Value>(&text) {
                                Ok(frame) => {
                                    if events.send(TransportEvent::Frame(frame)).await.is_err() {
                                        closed.store(true, Ordering::SeqCst);
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!("failed to parse inbound frame: {}", e);
                                    if events
                                        .send(TransportEvent::Malformed(e.to_string()))
                                        .await
                                        .is_err()
                                    {
                                        closed.store(true, Ordering::SeqCst);
                                        break;
                                    }
                                }
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            reason = frame
                                .map(|f| CloseReason::from_close_code(u16::from(f.code)))
                                .unwrap_or(CloseReason::Generic);
                            info!(?reason, "CTI connection closed by server");
                            break;
                        }
                        Err(e) => {
                            error!("CTI socket error: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }

                write_task.abort();
                connected.store(false, Ordering::SeqCst);
                if let Ok(mut guard) = out_tx.lock() {
                    *guard = None;
                }
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                let _ = events.send(TransportEvent::Disconnected(reason)).await;
            }
            Err(e) => {
                warn!("CTI connect failed: {}", e);
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                let _ = events
                    .send(TransportEvent::Disconnected(CloseReason::NetworkUnreachable))
                    .await;
            }
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}
