//! Capability surface of the underlying WebSocket.
//!
//! The transport never touches a concrete socket type. It talks to a
//! [`Socket`] — a small capability object exposing send, close, the
//! queued-outbound-byte count, and a single registration point for the four
//! socket events. A [`SocketFactory`] produces connected sockets, which is the
//! hook for proxies, custom TLS setups, and test doubles.
//!
//! On `wasm32` the crate ships a default factory backed by the browser
//! WebSocket (see [`crate::BrowserSocket`]). Native targets must supply their
//! own factory when calling [`crate::WsTransport::connect`].

use std::io;

use bytes::Bytes;
use futures::future::LocalBoxFuture;
use url::Url;

use crate::Result;

/// An event fired by the underlying socket.
///
/// These are the four callbacks of the WebSocket event model, flattened into
/// one enum so a socket implementation forwards everything through a single
/// [`EventHandler`]. The transport routes each variant to the right place:
/// `Message` feeds the handshake validator and the inbound queue, `Close` and
/// `Error` drive the close coordinator.
#[derive(Debug)]
pub enum SocketEvent {
    /// The socket finished connecting. The transport takes no action here;
    /// the connection is only usable once the server announces itself.
    Open,
    /// One received frame, as raw bytes. Sockets must be configured for
    /// binary payloads — text delivery loses byte fidelity.
    Message(Bytes),
    /// The socket closed.
    Close {
        /// Whether the close handshake completed cleanly.
        was_clean: bool,
        /// Close reason reported by the peer, possibly empty.
        reason: String,
    },
    /// A socket-level error, rendered as text.
    Error(String),
}

/// Callback through which a [`Socket`] delivers its events.
///
/// Handlers are invoked from the host event loop, one event at a time, and
/// must never be called re-entrantly.
pub type EventHandler = Box<dyn FnMut(SocketEvent) + 'static>;

/// A connected WebSocket, reduced to the operations the transport needs.
///
/// Implementations wrap the browser WebSocket, a native client library, or a
/// test double. The transport owns the socket exclusively for the lifetime of
/// one connection attempt.
pub trait Socket {
    /// Installs the event handler.
    ///
    /// The transport installs its handler immediately after the factory
    /// returns. Implementations that can receive events before that point
    /// (the dial future yields control to the event loop) should buffer them
    /// and flush on installation, so no event is lost.
    fn set_handler(&mut self, handler: EventHandler);

    /// Queues one frame for transmission.
    ///
    /// The transport treats failures as advisory: they are logged and
    /// dropped, never surfaced to the caller.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Closes the socket with the given close code and reason.
    fn close(&mut self, code: u16, reason: &str) -> io::Result<()>;

    /// Number of bytes accepted by [`send`](Socket::send) but not yet handed
    /// to the network. A clean transport close waits for this to reach zero
    /// before closing the socket.
    fn buffered_amount(&self) -> usize;
}

/// Owned, type-erased socket handle as stored by the transport.
pub type BoxedSocket = Box<dyn Socket>;

/// The outcome of dialing: a live socket plus whether the resulting channel
/// is encrypted.
///
/// Encryption is a property of the negotiated scheme (`wss:`), not of any
/// pre-declared intent, so the factory that dialed reports it.
pub struct Dialed {
    /// The connected socket.
    pub socket: BoxedSocket,
    /// Whether the channel is encrypted.
    pub encrypted: bool,
}

/// Socket-construction strategy.
///
/// Injected through [`crate::Options::with_factory`] to substitute a custom
/// dialer. The returned future resolves once the socket is ready to have its
/// event handler installed.
///
/// A plain closure works too:
///
/// ```no_run
/// use futures::{future::LocalBoxFuture, FutureExt};
/// use url::Url;
/// use yawt::socket::{Dialed, SocketFactory};
///
/// fn factory() -> impl SocketFactory {
///     |url: Url| -> LocalBoxFuture<'static, yawt::Result<Dialed>> {
///         async move { todo!("dial {url}") }.boxed_local()
///     }
/// }
/// ```
pub trait SocketFactory {
    /// Establishes a socket to `url`.
    fn dial(&self, url: Url) -> LocalBoxFuture<'static, Result<Dialed>>;
}

impl<F> SocketFactory for F
where
    F: Fn(Url) -> LocalBoxFuture<'static, Result<Dialed>>,
{
    fn dial(&self, url: Url) -> LocalBoxFuture<'static, Result<Dialed>> {
        (self)(url)
    }
}
