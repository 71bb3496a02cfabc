//! Browser-backed socket for WASM targets.
//!
//! Wraps the browser's native WebSocket behind the [`Socket`] capability so
//! the transport core stays target-independent. The four browser callbacks
//! are translated into [`SocketEvent`]s; events that fire before the
//! transport installs its handler (the dial future yields control back to
//! the event loop) are buffered and flushed on installation.

use std::{cell::RefCell, io, rc::Rc, time::Duration};

use bytes::Bytes;
use url::Url;
use wasm_bindgen::{prelude::*, JsCast};
use web_sys::{BinaryType, CloseEvent, ErrorEvent, MessageEvent};

use crate::{
    socket::{EventHandler, Socket, SocketEvent},
    Result, TransportError,
};

/// The browser's native WebSocket behind the [`Socket`] capability.
///
/// Used automatically by [`crate::WsTransport::connect`] on `wasm32` targets
/// when no custom factory is configured.
pub struct BrowserSocket {
    stream: web_sys::WebSocket,
    delegate: Rc<RefCell<Delegate>>,
}

/// Fans browser events into the installed handler, buffering any that fire
/// before installation.
#[derive(Default)]
struct Delegate {
    handler: Option<EventHandler>,
    backlog: Vec<SocketEvent>,
}

impl Delegate {
    fn emit(&mut self, event: SocketEvent) {
        match self.handler.as_mut() {
            Some(handler) => handler(event),
            None => self.backlog.push(event),
        }
    }
}

impl BrowserSocket {
    /// Opens a WebSocket to `url` and wires up the browser callbacks.
    ///
    /// The socket is switched to arraybuffer mode so payloads arrive as raw
    /// bytes rather than text.
    pub fn open(url: &Url) -> Result<Self> {
        let stream = web_sys::WebSocket::new(url.as_str()).map_err(js_error)?;
        stream.set_binary_type(BinaryType::Arraybuffer);

        let delegate = Rc::new(RefCell::new(Delegate::default()));

        let onopen = {
            let delegate = delegate.clone();
            Closure::<dyn FnMut()>::new(move || {
                delegate.borrow_mut().emit(SocketEvent::Open);
            })
        };
        stream.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        onopen.forget();

        let onmessage = {
            let delegate = delegate.clone();
            Closure::<dyn FnMut(_)>::new(move |event: MessageEvent| {
                // only arraybuffer payloads carry bytes; anything else would
                // mean the binary type was not honored
                if let Ok(buffer) = event.data().dyn_into::<js_sys::ArrayBuffer>() {
                    let data = js_sys::Uint8Array::new(&buffer).to_vec();
                    delegate
                        .borrow_mut()
                        .emit(SocketEvent::Message(Bytes::from(data)));
                }
            })
        };
        stream.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        onmessage.forget();

        let onclose = {
            let delegate = delegate.clone();
            Closure::<dyn FnMut(_)>::new(move |event: CloseEvent| {
                delegate.borrow_mut().emit(SocketEvent::Close {
                    was_clean: event.was_clean(),
                    reason: event.reason(),
                });
            })
        };
        stream.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        onclose.forget();

        let onerror = {
            let delegate = delegate.clone();
            Closure::<dyn FnMut(_)>::new(move |event: ErrorEvent| {
                delegate
                    .borrow_mut()
                    .emit(SocketEvent::Error(event.message()));
            })
        };
        stream.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        onerror.forget();

        Ok(Self { stream, delegate })
    }
}

impl Socket for BrowserSocket {
    fn set_handler(&mut self, mut handler: EventHandler) {
        let mut delegate = self.delegate.borrow_mut();
        for event in delegate.backlog.drain(..) {
            handler(event);
        }
        delegate.handler = Some(handler);
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream
            .send_with_u8_array(frame)
            .map_err(|err| io::Error::other(format!("{err:?}")))
    }

    fn close(&mut self, code: u16, reason: &str) -> io::Result<()> {
        self.stream
            .close_with_code_and_reason(code, reason)
            .map_err(|err| io::Error::other(format!("{err:?}")))
    }

    fn buffered_amount(&self) -> usize {
        self.stream.buffered_amount() as usize
    }
}

fn js_error(value: JsValue) -> TransportError {
    TransportError::Socket(format!("{value:?}"))
}

/// Suspends for `duration` on the browser event loop.
///
/// `setTimeout` is looked up on the global object so this works in windows
/// and workers alike.
pub(crate) async fn delay(duration: Duration) {
    let millis = duration.as_millis().min(i32::MAX as u128) as i32;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let global = js_sys::global();
        let set_timeout: js_sys::Function = js_sys::Reflect::get(&global, &"setTimeout".into())
            .and_then(|function| function.dyn_into())
            .expect("setTimeout in the global scope");
        let _ = set_timeout.call2(&global, &resolve, &millis.into());
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}
