//! One-shot loopback listener capturing the authorization redirect.
//!
//! # Overview
//!
//! [`RedirectListener::bind`] binds a TCP listener (by default on an
//! ephemeral `127.0.0.1` port) and spawns a task that waits for the redirect.
//! The task reads each request head, answers with a page that closes the
//! browser tab, and hands the parsed request to the waiting side over a
//! capacity-one oneshot channel.
//!
//! A token grant puts its parameters in the URL fragment, which browsers do
//! not send. A request without query parameters is therefore answered with a
//! page that requests the same path again with the fragment as its query
//! (tagged with `fragment=1`), and the listener keeps accepting.
//!
//! The task is owned by the [`RedirectListener`]; dropping the listener
//! aborts it, so every exit path of the authorization flow releases the
//! port.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::api::CallParams;

/// Default host the listener binds to.
pub const DEFAULT_REDIRECT_HOST: &str = "127.0.0.1";

/// Response body that closes the tab the provider redirected.
const CLOSE_TAB_HTML: &str = "<script>window.close()</script>";

/// Query parameter marking a request re-issued by [`FRAGMENT_RELAY_HTML`].
const FRAGMENT_MARKER: &str = "fragment";

/// Response body that re-requests the page with the fragment as its query.
const FRAGMENT_RELAY_HTML: &str =
    "<script>location.replace(location.pathname + '?fragment=1&' + location.hash.slice(1))</script>";

/// Connections answered before giving up on a redirect with parameters.
const MAX_CONNECTIONS: usize = 8;

/// Upper bound on the request head we are willing to buffer.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Errors from the loopback listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The requested address.
        addr: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Accepting or reading the redirect connection failed.
    #[error("failed to read redirect request: {0}")]
    Io(#[from] io::Error),

    /// The request was not a parsable HTTP request.
    #[error("malformed redirect request: {reason}")]
    Malformed {
        /// What was wrong with it.
        reason: String,
    },

    /// No request with parameters arrived within the connection budget.
    #[error("no redirect parameters after {MAX_CONNECTIONS} requests")]
    NoParameters,

    /// The listener task ended without capturing a request.
    #[error("listener stopped before a redirect arrived")]
    Closed,

    /// The caller cancelled while waiting for the redirect.
    #[error("cancelled while waiting for redirect")]
    Cancelled,
}

impl ListenerError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// The redirect request observed by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRequest {
    /// Request path without the query.
    pub path: String,
    /// Decoded query parameters in order.
    pub params: CallParams,
}

/// What the listener task delivers exactly once.
pub type RedirectCapture = Result<RedirectRequest, ListenerError>;

/// Aborts the listener task when dropped.
#[derive(Debug)]
struct ListenerTask(JoinHandle<()>);

impl Drop for ListenerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A bound, single-use redirect receiver.
#[derive(Debug)]
pub struct RedirectListener {
    addr: SocketAddr,
    capture: oneshot::Receiver<RedirectCapture>,
    _task: ListenerTask,
}

impl RedirectListener {
    /// Binds `host:port` (port 0 picks an ephemeral port) and starts the
    /// accept task.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Bind`] if the address cannot be bound.
    #[instrument]
    pub async fn bind(host: &str, port: u16) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        };
        let listener = TcpListener::bind((host, port)).await.map_err(bind_error)?;
        let addr = listener.local_addr().map_err(bind_error)?;
        debug!(%addr, "redirect listener bound");

        let (tx, capture) = oneshot::channel();
        let task = tokio::spawn(async move {
            let captured = accept_redirect(&listener).await;
            if tx.send(captured).is_err() {
                debug!("redirect arrived after the waiter left");
            }
        });

        Ok(Self {
            addr,
            capture,
            _task: ListenerTask(task),
        })
    }

    /// The local address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The redirect URI to register with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Waits for the redirect or cancellation, whichever comes first.
    ///
    /// Consumes the listener; its task is torn down on return.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Cancelled`] if `cancel` fires first, or the
    /// capture error if the request could not be read.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<RedirectRequest, ListenerError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ListenerError::Cancelled),
            captured = &mut self.capture => captured.unwrap_or(Err(ListenerError::Closed)),
        }
    }
}

async fn accept_redirect(listener: &TcpListener) -> RedirectCapture {
    for _ in 0..MAX_CONNECTIONS {
        let (mut stream, peer) = listener.accept().await?;
        debug!(%peer, "redirect connection accepted");

        let captured = read_request(&mut stream).await;
        match captured {
            Ok(request) if request.params.is_empty() => {
                debug!(path = %request.path, "request without parameters, relaying fragment");
                respond(&mut stream, "200 OK", FRAGMENT_RELAY_HTML).await;
            }
            Ok(mut request) => {
                respond(&mut stream, "200 OK", CLOSE_TAB_HTML).await;
                request.params = request
                    .params
                    .iter()
                    .filter(|(key, _)| *key != FRAGMENT_MARKER)
                    .collect();
                return Ok(request);
            }
            Err(error) => {
                respond(&mut stream, "400 Bad Request", CLOSE_TAB_HTML).await;
                return Err(error);
            }
        }
    }
    Err(ListenerError::NoParameters)
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    if let Err(error) = stream.write_all(response.as_bytes()).await {
        warn!(%error, "failed to answer redirect request");
    }
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> RedirectCapture {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        if head.len() >= MAX_HEAD_BYTES {
            return Err(ListenerError::malformed("request head too large"));
        }
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..read]);
    }
    if head.is_empty() {
        return Err(ListenerError::malformed("empty request"));
    }
    parse_request_line(&String::from_utf8_lossy(&head))
}

/// Parses `GET /path?query HTTP/1.1` into a [`RedirectRequest`].
fn parse_request_line(head: &str) -> RedirectCapture {
    let line = head
        .lines()
        .next()
        .ok_or_else(|| ListenerError::malformed("missing request line"))?;
    let mut parts = line.split_whitespace();
    let (Some(_method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(ListenerError::malformed(format!("bad request line {line:?}")));
    };
    if !version.starts_with("HTTP/") {
        return Err(ListenerError::malformed(format!("bad protocol {version:?}")));
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let params = url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    Ok(RedirectRequest {
        path: path.to_string(),
        params,
    })
}
