//! `Client` builder, handshake and per-tick pump.
//!
//! This is the entry point for talking to a match server. It ties
//! together all the layers: transport → framing → queue → dispatch.
//!
//! The client never spawns tasks. The embedding game owns it and calls
//! [`Client::pump`] once per frame (or lets [`Client::run_at`] do that
//! at a fixed rate); everything the server said since the last call is
//! applied to the session and surfaces as [`GameEvent`]s.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clashlink_protocol::{
    ContentChecksum, FrameDecoder, HandshakeRequest, Message, MessageType,
    PlayerAccepted, PlayerChangedNick, PlayerChangedState, PlayerRejected,
    ProtocolVersion, UnitQueueRequest, WireMessage,
};
use clashlink_session::{
    DispatchReport, GameEvent, InboundQueue, Phase, Router, SessionState,
};
use clashlink_transport::{Connection, Received, TcpConnection, TransportError};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, Span};

use crate::{ClientConfig, ClientError};

// ---------------------------------------------------------------------------
// CancelHandle
// ---------------------------------------------------------------------------

/// Cancels a pending handshake or a running [`Client::run_at`] loop from
/// another task.
///
/// Cheap to clone. Cancelling is permanent for the client it came from.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        if !self.tx.send_replace(true) {
            tracing::debug!("cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once `rx` sees a cancellation. Never resolves if the sender
/// is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// PumpReport
// ---------------------------------------------------------------------------

/// What one [`Client::pump`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Bytes read from the socket.
    pub bytes_received: usize,
    /// Complete frames extracted from those bytes.
    pub frames: usize,
    /// Frames dropped because their header was unusable.
    pub malformed: usize,
    /// Outbound messages written.
    pub sent: usize,
    /// The dispatch round run at the end of the pump.
    pub dispatch: DispatchReport,
}

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,no_run
/// use clashlink::prelude::*;
///
/// # async fn demo() -> Result<(), ClientError> {
/// let mut client = Client::builder()
///     .server("127.0.0.1:7777")
///     .nick("Zed")
///     .build::<TcpConnection>();
/// client.open().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    content: Vec<ContentChecksum>,
    handshake_timeout: Option<Duration>,
    router: Option<Router>,
    span: Option<Span>,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            content: Vec::new(),
            handshake_timeout: None,
            router: None,
            span: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the server address (`host:port`).
    pub fn server(mut self, addr: &str) -> Self {
        self.config.server_addr = addr.to_string();
        self
    }

    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.config.protocol_version = version;
        self
    }

    pub fn nick(mut self, nick: &str) -> Self {
        self.config.nick = nick.to_string();
        self
    }

    /// Content checksums declared in the handshake.
    pub fn content(mut self, content: Vec<ContentChecksum>) -> Self {
        self.content = content;
        self
    }

    /// Overrides `handshake_timeout_secs` with a finer-grained value.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Uses `router` instead of [`Router::default`].
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Span the client runs its work in.
    ///
    /// Defaults to `info_span!("client", server = ..)`.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Builds the client. Nothing is connected until [`Client::open`].
    pub fn build<C: Connection>(self) -> Client<C> {
        let config = self.config;
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("client", server = %config.server_addr)
        });
        let cancel = CancelHandle::new();
        Client {
            conn: None,
            decoder: FrameDecoder::with_max_frame_size(
                config.framing,
                config.max_frame_size,
            ),
            queue: InboundQueue::with_policy(config.queue_policy),
            router: self.router.unwrap_or_default(),
            state: SessionState::new(config.protocol_version),
            outbox: VecDeque::new(),
            recv_buf: vec![0; config.recv_chunk_size.max(1)],
            cancel_rx: cancel.subscribe(),
            cancel,
            handshake_timeout: self
                .handshake_timeout
                .unwrap_or_else(|| config.handshake_timeout()),
            deadline: None,
            last_activity: None,
            content: self.content,
            span,
            config,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Outcome of one wait during the handshake.
enum Wake {
    Cancelled,
    TimedOut,
    Received(Result<Received, TransportError>),
}

/// A connection to one match server and the session running over it.
pub struct Client<C: Connection = TcpConnection> {
    config: ClientConfig,
    content: Vec<ContentChecksum>,
    conn: Option<C>,
    decoder: FrameDecoder,
    queue: InboundQueue,
    router: Router,
    state: SessionState,
    /// Encoded frames waiting for the next flush.
    outbox: VecDeque<Bytes>,
    recv_buf: Vec<u8>,
    cancel: CancelHandle,
    cancel_rx: watch::Receiver<bool>,
    handshake_timeout: Duration,
    deadline: Option<Instant>,
    /// When the server last sent us any bytes.
    last_activity: Option<Instant>,
    span: Span,
}

impl Client {
    /// Creates a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<C: Connection> Client<C> {
    // -- Accessors --

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Messages received but not dispatched yet.
    pub fn queue(&self) -> &InboundQueue {
        &self.queue
    }

    /// Lets the game register its own handlers after building.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Drains the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        self.state.take_events()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| conn.is_connected())
    }

    /// When bytes last arrived from the server, or `None` before the
    /// first read. Lets the game spot a server that went quiet.
    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    // -- Lifecycle --

    /// Connects, sends the handshake and waits for the server's answer.
    ///
    /// On acceptance the session is in `Lobby` and the readiness
    /// declaration has already been sent.
    ///
    /// # Errors
    /// - [`ClientError::Rejected`] if the server refused us.
    /// - [`ClientError::HandshakeTimeout`] if it didn't answer in time.
    /// - [`ClientError::Cancelled`] if the [`CancelHandle`] fired.
    ///
    /// Every error except `Cancelled` leaves the session `Failed`.
    pub async fn open(&mut self) -> Result<(), ClientError> {
        let span = self.span.clone();
        async {
            self.start_handshake().await?;
            self.await_handshake().await
        }
        .instrument(span)
        .await
    }

    /// Connects and sends the handshake without waiting for the answer.
    ///
    /// The answer is then picked up by [`pump`](Self::pump), which also
    /// enforces the handshake deadline. Use this when the game loop
    /// must keep running while connecting.
    pub async fn start_handshake(&mut self) -> Result<(), ClientError> {
        if self.conn.is_some() || self.state.phase() != Phase::Connecting {
            return Err(ClientError::AlreadyOpen);
        }
        if self.cancel.is_cancelled() {
            self.state.local_disconnect();
            return Err(ClientError::Cancelled);
        }

        let addr = self.config.server_addr.clone();
        let conn = match C::connect(&addr).await {
            Ok(conn) => conn,
            Err(e) => {
                self.state.fail(e.to_string());
                return Err(e.into());
            }
        };
        self.conn = Some(conn);
        self.deadline = Some(Instant::now() + self.handshake_timeout);

        let request = HandshakeRequest {
            version: self.config.protocol_version,
            nick: self.config.nick.clone(),
            content: self.content.clone(),
        };
        tracing::info!(
            version = %request.version,
            nick = %request.nick,
            "sending handshake"
        );
        self.enqueue(&request)?;
        self.flush().await?;
        Ok(())
    }

    async fn await_handshake(&mut self) -> Result<(), ClientError> {
        let mut report = PumpReport::default();
        while self.state.phase() == Phase::Connecting {
            let Some(conn) = self.conn.as_ref() else {
                return Err(ClientError::NotConnected);
            };
            let deadline = self.deadline.unwrap_or_else(Instant::now);

            let wake = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => Wake::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Wake::TimedOut,
                res = conn.recv(&mut self.recv_buf) => Wake::Received(res),
            };

            match wake {
                Wake::Cancelled => {
                    tracing::info!("handshake cancelled");
                    self.conn = None;
                    self.state.local_disconnect();
                    return Err(ClientError::Cancelled);
                }
                Wake::TimedOut => return Err(self.handshake_timed_out()),
                Wake::Received(Ok(Received::Data(n))) => {
                    self.ingest(n, &mut report)?;
                }
                Wake::Received(Ok(Received::Pending)) => {}
                Wake::Received(Ok(Received::Closed)) => {
                    return Err(self.lose("server closed the connection during handshake"));
                }
                Wake::Received(Err(e)) => return Err(self.lose(e.to_string())),
            }
        }
        self.flush().await?;
        Ok(())
    }

    /// Runs one client tick.
    ///
    /// 1. Sends queued outbound messages.
    /// 2. Reads everything the socket has without waiting.
    /// 3. Frames and decodes it; malformed frames are logged and dropped.
    /// 4. Runs one dispatch round.
    ///
    /// # Errors
    /// [`ClientError::ConnectionLost`] when the server closed the stream
    /// or the socket failed; the session is `Failed` afterwards. While
    /// still `Connecting`, a handshake answer can also produce
    /// `Rejected` or `HandshakeTimeout`.
    pub async fn pump(&mut self) -> Result<PumpReport, ClientError> {
        let span = self.span.clone();
        async { self.pump_once().await }.instrument(span).await
    }

    async fn pump_once(&mut self) -> Result<PumpReport, ClientError> {
        if self.conn.is_none() {
            return Err(ClientError::NotConnected);
        }
        let mut report = PumpReport::default();
        report.sent += self.flush().await?;

        loop {
            let Some(conn) = self.conn.as_ref() else {
                return Err(ClientError::NotConnected);
            };
            match conn.try_recv(&mut self.recv_buf) {
                Ok(Received::Data(n)) => {
                    report.bytes_received += n;
                    self.ingest(n, &mut report)?;
                }
                Ok(Received::Pending) => break,
                Ok(Received::Closed) => {
                    return Err(self.lose("server closed the connection"));
                }
                Err(e) => return Err(self.lose(e.to_string())),
            }
        }

        if self.state.phase() == Phase::Connecting
            && self.deadline.is_some_and(|d| Instant::now() >= d)
        {
            return Err(self.handshake_timed_out());
        }

        report.dispatch = self.router.dispatch(&mut self.queue, &mut self.state);
        report.sent += self.flush().await?;

        if report.frames > 0 {
            tracing::trace!(?report, queued = self.queue.len(), "pump");
        }
        Ok(report)
    }

    /// Drives [`pump`](Self::pump) at `rate_hz` until `on_tick` returns
    /// `Break`, the [`CancelHandle`] fires, or the session is closed.
    ///
    /// Ticks that fall behind are skipped, not bunched up.
    pub async fn run_at<F>(
        &mut self,
        rate_hz: u32,
        mut on_tick: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&mut Self, &PumpReport) -> ControlFlow<()>,
    {
        let period = Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::debug!(rate_hz, ?period, "tick loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => {
                    tracing::info!("tick loop cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            let report = self.pump().await?;
            if on_tick(self, &report).is_break() || self.state.is_closed() {
                tracing::debug!("tick loop stopped");
                return Ok(());
            }
        }
    }

    /// Shuts the connection down.
    ///
    /// The session moves to `Ended` unless it already failed, and a
    /// later `pump` returns `NotConnected`.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let span = self.span.clone();
        async {
            self.cancel.cancel();
            self.outbox.clear();
            self.state.local_disconnect();
            if let Some(conn) = self.conn.take() {
                conn.close().await?;
            }
            Ok::<(), ClientError>(())
        }
        .instrument(span)
        .await
    }

    // -- Outbound --

    /// Asks the server to queue a unit of `unit_type`.
    pub fn send_unit_request(&mut self, unit_type: &str) -> Result<(), ClientError> {
        self.send(&UnitQueueRequest {
            unit_type: unit_type.to_string(),
            enqueue: true,
        })
    }

    pub fn send_nick_change(&mut self, nick: &str) -> Result<(), ClientError> {
        let Some(user_id) = self.state.user_id() else {
            tracing::debug!("nick change skipped, not accepted yet");
            return Ok(());
        };
        self.send(&PlayerChangedNick {
            user_id,
            nick: nick.to_string(),
        })
    }

    /// Toggles between ready-to-play and spectator.
    pub fn send_ready_toggle(&mut self) -> Result<(), ClientError> {
        let Some(user_id) = self.state.user_id() else {
            tracing::debug!("ready toggle skipped, not accepted yet");
            return Ok(());
        };
        self.send(&PlayerChangedState { user_id })
    }

    /// Queues `msg` for the next pump, or skips it when not connected.
    fn send<M: WireMessage>(&mut self, msg: &M) -> Result<(), ClientError> {
        if !self.is_connected() || self.state.phase().is_terminal() {
            tracing::debug!(kind = ?M::KIND, "send skipped, not connected");
            return Ok(());
        }
        self.enqueue(msg)
    }

    fn enqueue<M: WireMessage>(&mut self, msg: &M) -> Result<(), ClientError> {
        let frame = self.config.framing.encode(&msg.to_message()?)?;
        self.outbox.push_back(frame);
        Ok(())
    }

    /// Writes the outbox. Returns how many frames went out.
    async fn flush(&mut self) -> Result<usize, ClientError> {
        let mut sent = 0;
        while let Some(frame) = self.outbox.pop_front() {
            let Some(conn) = self.conn.as_ref() else {
                self.outbox.clear();
                break;
            };
            if let Err(e) = conn.send(&frame).await {
                return Err(self.lose(e.to_string()));
            }
            sent += 1;
        }
        Ok(sent)
    }

    // -- Inbound --

    /// Frames `recv_buf[..n]`, decodes each frame and queues it.
    ///
    /// While `Connecting`, handshake answers are handled here instead of
    /// being queued.
    fn ingest(&mut self, n: usize, report: &mut PumpReport) -> Result<(), ClientError> {
        if n > 0 {
            self.last_activity = Some(Instant::now());
        }
        let frames = match self.decoder.feed(&self.recv_buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "byte stream corrupt");
                self.state.fail(e.to_string());
                self.conn = None;
                return Err(e.into());
            }
        };

        for frame in frames {
            report.frames += 1;
            let msg = match self.config.framing.decode(frame) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed frame dropped");
                    report.malformed += 1;
                    continue;
                }
            };
            tracing::trace!(kind = ?msg.kind(), len = msg.payload().len(), "received");

            if self.state.phase() == Phase::Connecting {
                match msg.kind() {
                    MessageType::PlayerAccepted => {
                        self.on_accepted(&msg)?;
                        continue;
                    }
                    MessageType::PlayerRejected => return Err(self.on_rejected(&msg)),
                    _ => {}
                }
            }
            self.queue.append(msg);
        }
        Ok(())
    }

    fn on_accepted(&mut self, msg: &Message) -> Result<(), ClientError> {
        let accepted = match PlayerAccepted::from_message(msg) {
            Ok(accepted) => accepted,
            Err(e) => {
                self.state.fail(format!("unreadable handshake answer: {e}"));
                self.conn = None;
                return Err(e.into());
            }
        };
        let user_id = accepted.user_id;
        self.state.accept(accepted)?;
        self.deadline = None;
        // Declare readiness right away.
        self.enqueue(&PlayerChangedState { user_id })
    }

    fn on_rejected(&mut self, msg: &Message) -> ClientError {
        let rejected = match PlayerRejected::from_message(msg) {
            Ok(rejected) => rejected,
            Err(e) => {
                self.state.fail(format!("unreadable handshake answer: {e}"));
                self.conn = None;
                return e.into();
            }
        };
        tracing::warn!(
            status = %rejected.status,
            reason = %rejected.reason,
            "rejected by server"
        );
        self.state
            .fail(format!("rejected: {} ({})", rejected.reason, rejected.status));
        self.conn = None;
        ClientError::Rejected {
            status: rejected.status,
            reason: rejected.reason,
        }
    }

    fn handshake_timed_out(&mut self) -> ClientError {
        tracing::warn!(timeout = ?self.handshake_timeout, "handshake timed out");
        self.state.fail("handshake timed out");
        self.conn = None;
        ClientError::HandshakeTimeout
    }

    /// Marks the session failed after the connection dropped.
    fn lose(&mut self, reason: impl Into<String>) -> ClientError {
        let reason = reason.into();
        tracing::warn!(%reason, "connection lost");
        self.state.fail(reason.clone());
        self.conn = None;
        self.outbox.clear();
        ClientError::ConnectionLost(reason)
    }
}

impl<C: Connection> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server", &self.config.server_addr)
            .field("phase", &self.state.phase())
            .field("connected", &self.is_connected())
            .field("queued", &self.queue.len())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_starts_connecting_and_disconnected() {
        let client = Client::builder().server("127.0.0.1:1").build::<TcpConnection>();
        assert_eq!(client.phase(), Phase::Connecting);
        assert!(!client.is_connected());
        assert!(client.queue().is_empty());
        assert!(client.last_activity().is_none());
    }

    #[test]
    fn test_ingest_records_last_activity() {
        let mut client = Client::builder().build::<TcpConnection>();
        let mut report = PumpReport::default();
        client.ingest(0, &mut report).unwrap();
        assert!(client.last_activity().is_none(), "empty read is not activity");

        let before = Instant::now();
        client.recv_buf[..2].copy_from_slice(&[0x22, 0x00]);
        client.ingest(2, &mut report).unwrap();
        assert!(client.last_activity().is_some_and(|at| at >= before));
    }

    #[test]
    fn test_builder_handshake_timeout_overrides_config() {
        let client = Client::builder()
            .handshake_timeout(Duration::from_millis(250))
            .build::<TcpConnection>();
        assert_eq!(client.handshake_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_cancel_handle_shared_between_clones() {
        let client = Client::builder().build::<TcpConnection>();
        let handle = client.cancel_handle();
        assert!(!handle.is_cancelled());
        client.cancel_handle().cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_send_before_open_is_skipped() {
        let mut client = Client::builder().build::<TcpConnection>();
        client.send_unit_request("Archer").unwrap();
        client.send_ready_toggle().unwrap();
        assert!(client.outbox.is_empty());
    }

    #[tokio::test]
    async fn test_pump_before_open_is_not_connected() {
        let mut client = Client::builder().build::<TcpConnection>();
        assert!(matches!(client.pump().await, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_open_after_cancel_returns_cancelled() {
        let mut client = Client::builder().build::<TcpConnection>();
        client.cancel_handle().cancel();
        assert!(matches!(client.open().await, Err(ClientError::Cancelled)));
        assert_eq!(client.phase(), Phase::Ended);
    }

    #[tokio::test]
    async fn test_open_unreachable_server_fails_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut client = Client::builder().server(&addr).build::<TcpConnection>();
        let err = client.open().await.unwrap_err();

        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.phase(), Phase::Failed);
    }
}
