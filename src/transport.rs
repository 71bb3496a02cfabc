use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
    time::Duration,
};

use bytes::Bytes;
use futures::{channel::oneshot, Stream};
use url::Url;

use crate::{
    proto,
    socket::{BoxedSocket, Dialed, SocketEvent, SocketFactory},
    Result, TransportError,
};

/// How often a clean close re-checks the socket's queued-outbound-byte count
/// while waiting for it to drain.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for one connection attempt.
///
/// Built in the consuming-builder style:
///
/// ```
/// use yawt::Options;
///
/// let options = Options::default().with_headers().with_debug();
/// ```
#[derive(Default)]
pub struct Options {
    /// Explicit request for an encrypted channel. The WebSocket negotiates
    /// encryption through the URL scheme (`wss:`), so setting this makes
    /// [`WsTransport::connect`] fail with
    /// [`TransportError::UnsupportedOption`] before any socket is opened.
    pub tls: bool,

    /// Enables frame-level debug logging for this connection. Only effective
    /// with the `logging` cargo feature; without it the flag is inert.
    pub debug: bool,

    /// Requires a server that can suppress echoing the client's own
    /// messages back to it. Validated against the announced protocol
    /// revision during the handshake.
    pub no_echo: bool,

    /// Requires a server that supports message headers. Validated against
    /// the announcement during the handshake.
    pub headers: bool,

    /// Custom socket-construction strategy. When absent, `wasm32` targets
    /// dial with the browser WebSocket; native targets refuse to dial.
    pub factory: Option<Box<dyn SocketFactory>>,
}

impl Options {
    /// Requests an explicitly encrypted channel. Always rejected by the
    /// WebSocket transport; present so callers can carry one options type
    /// across transports and learn about the mismatch at `connect` time.
    pub fn with_tls(self) -> Self {
        Self { tls: true, ..self }
    }

    /// Enables frame-level debug logging for this connection.
    pub fn with_debug(self) -> Self {
        Self { debug: true, ..self }
    }

    /// Requires server-side echo suppression.
    pub fn with_no_echo(self) -> Self {
        Self {
            no_echo: true,
            ..self
        }
    }

    /// Requires server-side header support.
    pub fn with_headers(self) -> Self {
        Self {
            headers: true,
            ..self
        }
    }

    /// Installs a custom socket-construction strategy.
    pub fn with_factory(self, factory: impl SocketFactory + 'static) -> Self {
        Self {
            factory: Some(Box::new(factory)),
            ..self
        }
    }
}

/// Transport lifecycle.
///
/// `Closing` covers the window in which a local clean close waits for the
/// socket to drain its outbound buffer. `Closed` and `Discarded` are both
/// terminal; they differ only in the notification contract — a discarded
/// transport tells nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Connecting,
    Open,
    Closing,
    Closed,
    Discarded,
}

/// Shared mutable core of a transport.
///
/// Mutated only from socket event dispatch and consumer calls, which the
/// host event loop serializes; the `RefCell` is never held across a
/// suspension point.
struct Inner {
    state: State,
    encrypted: bool,
    handshake_seen: bool,
    socket_closed: bool,
    #[cfg_attr(not(feature = "logging"), allow(dead_code))]
    debug: bool,
    no_echo: bool,
    headers: bool,
    socket: Option<BoxedSocket>,
    /// Frames received but not yet pulled by the consumer, in arrival order.
    yields: Vec<Bytes>,
    /// Wakeup signal for a consumer suspended on an empty `yields`.
    read_waker: Option<Waker>,
    /// Resolves the pending `connect` outcome. Taken on first resolution.
    handshake: Option<oneshot::Sender<Result<()>>>,
    /// Resolves the close notification. Taken on first resolution; a
    /// discarded transport leaves it in place forever.
    notification: Option<oneshot::Sender<Option<TransportError>>>,
}

impl Inner {
    fn terminal(&self) -> bool {
        matches!(self.state, State::Closed | State::Discarded)
    }

    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn resolve_handshake(&mut self, outcome: Result<()>) {
        if let Some(sender) = self.handshake.take() {
            let _ = sender.send(outcome);
        }
    }

    fn on_message(&mut self, frame: Bytes) {
        if self.terminal() {
            return;
        }
        self.yields.push(frame);
        if self.handshake_seen {
            self.wake_reader();
            return;
        }

        // Peek at everything buffered so far without consuming any of it:
        // the same bytes must reach the consumer verbatim once the
        // handshake concludes.
        let total: usize = self.yields.iter().map(Bytes::len).sum();
        let mut buffered = Vec::with_capacity(total);
        for chunk in &self.yields {
            buffered.extend_from_slice(chunk);
        }

        let Some(line) = proto::first_line(&buffered) else {
            // incomplete line; wait for more bytes
            return;
        };

        let outcome = proto::parse_announcement(line)
            .and_then(|info| proto::check_server_info(&info, self.no_echo, self.headers));
        match outcome {
            Ok(()) => {
                self.handshake_seen = true;
                self.state = State::Open;
                self.wake_reader();
                self.resolve_handshake(Ok(()));
            }
            Err(err) => {
                #[cfg(feature = "logging")]
                if self.debug {
                    log::error!("!!! {}", render(&buffered));
                }
                // leave the transport unusable; the caller discards it
                self.resolve_handshake(Err(err));
            }
        }
    }

    fn on_close(&mut self, was_clean: bool, reason: String) {
        if self.terminal() {
            return;
        }
        self.socket_closed = true;
        match self.state {
            State::Created | State::Connecting => {
                // the server went away before the announcement was validated
                self.state = State::Closed;
                self.resolve_handshake(Err(TransportError::ConnectionClosed(reason)));
                self.wake_reader();
            }
            State::Open | State::Closing => {
                let err = if was_clean {
                    None
                } else {
                    Some(TransportError::ConnectionClosed(reason))
                };
                self.finish_close(err, true);
            }
            State::Closed | State::Discarded => unreachable!("terminal handled above"),
        }
    }

    fn on_error(&mut self, message: String) {
        if self.terminal() {
            return;
        }
        let err = TransportError::Socket(message);
        if self.handshake_seen {
            self.finish_close(Some(err), true);
        } else {
            self.resolve_handshake(Err(err));
        }
    }

    /// Single transition into `Closed`: captures the reason, closes the
    /// socket if it is still up, and — unless the closer opted out —
    /// resolves the close notification.
    fn finish_close(&mut self, err: Option<TransportError>, notify: bool) {
        self.state = State::Closed;
        if !self.socket_closed {
            if let Some(socket) = self.socket.as_mut() {
                // 1000 for a clean close, 1002 when tearing down on error
                let outcome = match &err {
                    Some(reason) => socket.close(1002, &reason.to_string()),
                    None => socket.close(1000, ""),
                };
                let _ = outcome;
            }
        }
        if notify {
            if let Some(sender) = self.notification.take() {
                let _ = sender.send(err);
            }
        }
        self.wake_reader();
    }
}

/// Routes one socket event into the transport core.
///
/// Installed as the socket's event handler; holds only a weak reference so a
/// dropped transport does not keep its state alive through the socket's
/// callback.
fn dispatch(inner: &Weak<RefCell<Inner>>, event: SocketEvent) {
    let Some(cell) = inner.upgrade() else {
        return;
    };
    let mut inner = cell.borrow_mut();
    match event {
        // nothing to do on open: the connection only becomes usable once
        // the server announces itself
        SocketEvent::Open => {}
        SocketEvent::Message(frame) => inner.on_message(frame),
        SocketEvent::Close { was_clean, reason } => inner.on_close(was_clean, reason),
        SocketEvent::Error(message) => inner.on_error(message),
    }
}

/// WebSocket-backed transport for a pub/sub messaging client.
///
/// One instance serves exactly one physical connection attempt: create it,
/// [`connect`](WsTransport::connect) once, exchange bytes, then end it through
/// exactly one of [`close`](WsTransport::close),
/// [`disconnect`](WsTransport::disconnect) or
/// [`discard`](WsTransport::discard). Instances are never reused across
/// connections — reconnection means a fresh transport.
///
/// Inbound bytes are pulled through the [`Stream`] implementation, which
/// yields the entire buffered backlog as one batch per poll, in arrival
/// order. The stream ends when the transport reaches a terminal state.
///
/// Cloning is shallow: clones share the same transport. This is how one part
/// of a client iterates inbound frames while another issues sends and
/// closes. The transport is single-threaded by design — all state changes
/// happen on event dispatch or consumer calls within one event loop.
#[derive(Clone)]
pub struct WsTransport {
    inner: Rc<RefCell<Inner>>,
    notification: Rc<RefCell<Option<oneshot::Receiver<Option<TransportError>>>>>,
}

impl WsTransport {
    /// Creates a transport in the created state, ready for
    /// [`connect`](WsTransport::connect).
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Created,
                encrypted: false,
                handshake_seen: false,
                socket_closed: false,
                debug: false,
                no_echo: false,
                headers: false,
                socket: None,
                yields: Vec::new(),
                read_waker: None,
                handshake: None,
                notification: Some(sender),
            })),
            notification: Rc::new(RefCell::new(Some(receiver))),
        }
    }

    /// Dials `server` and validates the protocol handshake.
    ///
    /// `server` is a normalized `ws:`/`wss:` endpoint, typically produced by
    /// [`crate::endpoint::normalize`]. The call resolves once the server's
    /// announcement line has been located in the inbound stream, parsed, and
    /// validated against `options` — at which point the transport is open
    /// and the announcement bytes are waiting, untouched, at the head of the
    /// inbound stream for the client's own parser.
    ///
    /// # Errors
    /// - [`TransportError::UnsupportedOption`] for an explicit TLS request,
    ///   before any socket is opened
    /// - [`TransportError::InvalidScheme`] for a non-WebSocket endpoint
    /// - [`TransportError::AlreadyConnected`] when invoked twice
    /// - [`TransportError::UnexpectedResponse`],
    ///   [`TransportError::InvalidAnnouncement`] or
    ///   [`TransportError::OptionUnavailable`] when handshake validation
    ///   fails; the transport is unusable and should be discarded
    /// - [`TransportError::ConnectionClosed`] or [`TransportError::Socket`]
    ///   when the socket fails before the handshake concludes
    pub async fn connect(&self, server: &str, mut options: Options) -> Result<()> {
        // the socket mechanism negotiates encryption via the URL scheme;
        // an explicit request cannot be honored
        if options.tls {
            return Err(TransportError::UnsupportedOption("tls"));
        }

        let url: Url = server.parse()?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(TransportError::InvalidScheme(url.scheme().to_string()));
        }

        let factory = options.factory.take();
        let receiver = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                State::Created => {}
                State::Closed | State::Discarded => {
                    return Err(TransportError::ConnectionClosed(
                        "transport discarded".into(),
                    ))
                }
                _ => return Err(TransportError::AlreadyConnected),
            }
            inner.state = State::Connecting;
            inner.debug = options.debug;
            inner.no_echo = options.no_echo;
            inner.headers = options.headers;
            let (sender, receiver) = oneshot::channel();
            inner.handshake = Some(sender);
            receiver
        };

        let dialed = match factory {
            Some(factory) => factory.dial(url.clone()).await?,
            None => default_dial(&url)?,
        };

        {
            let mut inner = self.inner.borrow_mut();
            let Dialed {
                mut socket,
                encrypted,
            } = dialed;
            if inner.terminal() {
                // abandoned while the dial was in flight
                let _ = socket.close(1000, "");
                return Err(TransportError::ConnectionClosed(
                    "transport discarded".into(),
                ));
            }
            inner.encrypted = encrypted;
            let weak = Rc::downgrade(&self.inner);
            socket.set_handler(Box::new(move |event| dispatch(&weak, event)));
            inner.socket = Some(socket);
        }

        match receiver.await {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Err(TransportError::ConnectionClosed(
                "transport dropped before the handshake concluded".into(),
            )),
        }
    }

    /// Queues one frame for transmission, fire-and-forget.
    ///
    /// Failures are swallowed: a dead link is detected by the client core's
    /// read-timeout/heartbeat logic, not by a write error. After the
    /// transport reaches a terminal state this is a no-op.
    pub fn send(&self, frame: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        if inner.terminal() {
            return;
        }
        if let Some(socket) = inner.socket.as_mut() {
            match socket.send(frame) {
                Ok(()) => {
                    #[cfg(feature = "logging")]
                    if inner.debug {
                        log::debug!("< {}", render(frame));
                    }
                }
                Err(_err) => {
                    // the client will notice on a read or when its heartbeat
                    // detects a stale connection
                    #[cfg(feature = "logging")]
                    if inner.debug {
                        log::debug!("!!! {}: {_err}", render(frame));
                    }
                }
            }
        }
    }

    /// Closes the transport locally.
    ///
    /// With no `reason`, this is a clean close: the call waits — polling at
    /// a fixed short interval — until the socket reports no buffered
    /// outbound bytes (or reports closed), so queued writes are not
    /// truncated, then closes with code 1000. With a `reason`, the drain
    /// wait is skipped and the socket closes immediately with code 1002.
    ///
    /// The closer already knows the transport is going away, so this path
    /// does not resolve [`closed`](WsTransport::closed); that notification
    /// is reserved for closes the consumer did not itself initiate (and for
    /// [`disconnect`](WsTransport::disconnect)). No-op unless the transport
    /// is open.
    pub async fn close(&self, reason: Option<TransportError>) {
        self.shutdown(reason, false).await;
    }

    /// Tears the transport down without a specific error.
    ///
    /// Equivalent to an internal error-free close: drains like a clean
    /// [`close`](WsTransport::close) and resolves
    /// [`closed`](WsTransport::closed) with no error.
    pub async fn disconnect(&self) {
        self.shutdown(None, true).await;
    }

    async fn shutdown(&self, reason: Option<TransportError>, notify: bool) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != State::Open {
                return;
            }
            inner.state = State::Closing;
        }

        if reason.is_none() {
            loop {
                {
                    let inner = self.inner.borrow();
                    if inner.terminal() {
                        // a remote close or discard finished the job while
                        // we were waiting
                        return;
                    }
                    if inner.socket_closed {
                        break;
                    }
                    let buffered = inner
                        .socket
                        .as_ref()
                        .map_or(0, |socket| socket.buffered_amount());
                    if buffered == 0 {
                        break;
                    }
                }
                delay(DRAIN_POLL_INTERVAL).await;
            }
        }

        let mut inner = self.inner.borrow_mut();
        if inner.terminal() {
            return;
        }
        inner.finish_close(reason, notify);
    }

    /// Abandons the transport immediately and unconditionally.
    ///
    /// Marks the transport terminal without waiting for drains, closes the
    /// socket best-effort (failures swallowed), and resolves neither the
    /// pending handshake nor the close notification — a consumer that
    /// discards already knows, and is not listening. Safe at any lifecycle
    /// point, including before a socket exists. This is the cancellation
    /// primitive used when a racing connection attempt loses.
    pub fn discard(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.terminal() {
            inner.state = State::Discarded;
        }
        if let Some(socket) = inner.socket.as_mut() {
            let _ = socket.close(1000, "");
        }
        inner.wake_reader();
    }

    /// Resolves once the transport has fully terminated through the close
    /// path, with the captured reason (`None` for a clean close).
    ///
    /// A discarded transport never resolves this future. The notification
    /// is delivered once, to the first caller; later calls return a future
    /// that never completes.
    pub fn closed(&self) -> Closed {
        Closed {
            receiver: self.notification.borrow_mut().take(),
        }
    }

    /// Whether the transport has reached a terminal state.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().terminal()
    }

    /// Whether the negotiated channel is encrypted. Only meaningful once
    /// the handshake has been seen; `false` before that.
    pub fn is_encrypted(&self) -> bool {
        let inner = self.inner.borrow();
        inner.handshake_seen && inner.encrypted
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// The inbound pull sequence.
///
/// Each poll drains everything currently buffered as one batch, preserving
/// arrival order and frame boundaries. An empty buffer suspends the consumer
/// until the next socket message or the transition to a terminal state; a
/// discarded transport ends the sequence immediately, dropping whatever was
/// still buffered.
impl Stream for WsTransport {
    type Item = Vec<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        if inner.state == State::Discarded {
            return Poll::Ready(None);
        }
        if !inner.yields.is_empty() {
            let batch = std::mem::take(&mut inner.yields);
            #[cfg(feature = "logging")]
            if inner.debug {
                for frame in &batch {
                    log::debug!("> {}", render(frame));
                }
            }
            return Poll::Ready(Some(batch));
        }
        if inner.state == State::Closed {
            return Poll::Ready(None);
        }
        // registered under the same borrow as the emptiness check, so a
        // message arriving in between cannot slip past unobserved
        inner.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Future returned by [`WsTransport::closed`].
pub struct Closed {
    receiver: Option<oneshot::Receiver<Option<TransportError>>>,
}

impl Future for Closed {
    type Output = Option<TransportError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(Ok(reason)) => {
                this.receiver = None;
                Poll::Ready(reason)
            }
            Poll::Ready(Err(oneshot::Canceled)) => {
                // discarded transports never notify
                this.receiver = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn default_dial(url: &Url) -> Result<Dialed> {
    let socket = crate::wasm::BrowserSocket::open(url)?;
    Ok(Dialed {
        socket: Box::new(socket),
        encrypted: url.scheme() == "wss",
    })
}

#[cfg(not(target_arch = "wasm32"))]
fn default_dial(_url: &Url) -> Result<Dialed> {
    Err(TransportError::FactoryRequired)
}

#[cfg(not(target_arch = "wasm32"))]
async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(target_arch = "wasm32")]
use crate::wasm::delay;

/// Renders a frame for the debug log, keeping protocol lines on one line.
#[cfg(feature = "logging")]
fn render(frame: &[u8]) -> String {
    String::from_utf8_lossy(frame).replace("\r\n", "␍␊")
}
