//! # yawt
//! WebSocket transport adapter for publish/subscribe messaging clients.
//!
//! A pub/sub client core wants a very small contract from its transport: send
//! bytes, receive an ordered sequence of byte frames, and learn when the
//! connection has terminated and why. A WebSocket — whether the browser's
//! native object or an embedder-supplied handle — speaks a different language
//! entirely: four event callbacks (`open`, `message`, `close`, `error`) firing
//! whenever the host event loop pleases. This crate is the bridge between the
//! two, covering:
//!
//! - dialing, including an injectable socket-construction strategy for
//!   proxies, tests, and non-default environments;
//! - validating the server's announcement line (`INFO {...}`) inside the raw
//!   byte stream without consuming it, so the client's own protocol parser
//!   sees the exact same bytes;
//! - buffering inbound frames and exposing them as a suspendable
//!   [`futures::Stream`] of batches;
//! - reconciling graceful close, abrupt remote close, and forced discard into
//!   one terminal state and a single close notification.
//!
//! On `wasm32` targets the browser WebSocket is used automatically. On native
//! targets callers supply a [`socket::SocketFactory`] wrapping whatever
//! WebSocket implementation the host application already carries.
//!
//! # Features
//! The crate provides one optional feature:
//!
//! - `logging`: Enables frame-level debug logging using the `log` crate when
//!   the connection was configured with [`Options::with_debug`]. Useful for
//!   watching the protocol exchange during development.
//!
//! ## Usage Example
//! ```toml
//! [dependencies]
//! yawt = { version = "0.1", features = ["logging"] }
//! ```
//!
//! # Client Example
//! ```no_run
//! use futures::StreamExt;
//! use yawt::{endpoint, Options, WsTransport};
//!
//! async fn run() -> yawt::Result<()> {
//!     let server = endpoint::normalize("demo.example.org", None)?;
//!
//!     let transport = WsTransport::new();
//!     transport.connect(&server, Options::default()).await?;
//!
//!     transport.send(b"SUB updates 1\r\n");
//!
//!     let mut frames = transport.clone();
//!     while let Some(batch) = frames.next().await {
//!         for frame in batch {
//!             // feed the client's protocol parser
//!             let _ = frame;
//!         }
//!     }
//!
//!     // the stream ended; find out why
//!     if let Some(err) = transport.closed().await {
//!         eprintln!("connection lost: {err}");
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[doc(hidden)]
#[cfg(target_arch = "wasm32")]
mod wasm;

pub mod endpoint;
pub mod socket;

mod proto;
mod transport;

use thiserror::Error;

#[cfg(target_arch = "wasm32")]
pub use wasm::BrowserSocket;

pub use proto::ServerInfo;
pub use transport::{Closed, Options, WsTransport};

/// A result type for transport operations, using `TransportError` as the error type.
///
/// This type alias simplifies function signatures within the crate by providing a
/// standard result type for operations that may return a `TransportError`.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur while establishing or running a transport.
///
/// The errors fall into the categories the transport distinguishes between:
///
/// - Configuration errors, reported synchronously by [`WsTransport::connect`]
///   before any socket exists
/// - Handshake errors, rejecting the pending connection outcome
/// - Transport errors, surfaced once through the close notification after the
///   connection was established
///
/// Write failures are deliberately absent: sends are fire-and-forget and a
/// dead link is detected by the client core's own read-timeout/heartbeat
/// logic.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection configuration requests an option the socket mechanism
    /// cannot satisfy. The WebSocket negotiates encryption through the URL
    /// scheme, so an explicit TLS request is rejected here before dialing.
    #[error("option not supported by the websocket transport: {0}")]
    UnsupportedOption(&'static str),

    /// The dial target does not carry a `ws:` or `wss:` scheme. Endpoints
    /// produced by [`endpoint::normalize`] always do.
    #[error("invalid websocket scheme: {0}")]
    InvalidScheme(String),

    /// `connect` was invoked on a transport that already left the created
    /// state. A transport instance serves exactly one physical connection.
    #[error("transport already connected")]
    AlreadyConnected,

    /// `connect` was called without a socket factory on a target that has no
    /// default socket. Only `wasm32` builds carry one, backed by the browser
    /// WebSocket; native embedders supply their own through
    /// [`Options::with_factory`].
    #[error("no default socket on this target; supply a socket factory")]
    FactoryRequired,

    /// The first complete line received from the server is not a protocol
    /// announcement. The transport is left unusable; discard it.
    #[error("unexpected response from server")]
    UnexpectedResponse,

    /// The announcement line was recognized but its payload failed to parse.
    #[error("invalid server announcement: {0}")]
    InvalidAnnouncement(#[from] serde_json::Error),

    /// The announcement parsed but the server lacks a capability the
    /// connection options require.
    #[error("server does not support {0}")]
    OptionUnavailable(&'static str),

    /// The socket closed. Carries the close reason reported by the socket,
    /// which may be empty for an abrupt drop.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A socket-level error event. Before the handshake concludes this
    /// rejects the pending connect outcome; afterwards it is delivered
    /// through the close notification.
    #[error("websocket error: {0}")]
    Socket(String),

    /// Wraps errors from URL parsing that may occur when processing WebSocket
    /// endpoints.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    /// Wraps standard I/O errors raised by socket factories.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
