// src/server.rs

//! WebSocket broadcast server.
//!
//! The server binds the first free port of its candidate range, accepts
//! WebSocket clients on `/` and fans every broadcast out to all of them. The
//! most recent broadcast is retained and replayed to clients that connect
//! later.

use crate::config::ProviderOptions;
use crate::error::Error;
use crate::message::Message;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch, Mutex as AsyncMutex,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bind address used when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Candidate ports scanned when no fixed port is configured.
pub const DYNAMIC_PORTS: RangeInclusive<u16> = 49152..=65535;

/// Per-client backlog before a slow client starts skipping messages.
const CLIENT_BACKLOG: usize = 64;

#[derive(Debug, Clone)]
struct Snapshot {
    message: Message,
    wire: Arc<str>,
}

/// Fan-out channel plus the retained last message.
struct Hub {
    tx: broadcast::Sender<Arc<str>>,
    last: Mutex<Option<Snapshot>>,
    /// Port reported by the bound listener. Never 0 once bound, so 0 marks
    /// a stopped server.
    port: AtomicU16,
}

impl Hub {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CLIENT_BACKLOG);
        Hub {
            tx,
            last: Mutex::new(None),
            port: AtomicU16::new(0),
        }
    }

    fn port(&self) -> Option<u16> {
        match self.port.load(Ordering::SeqCst) {
            0 => None,
            port => Some(port),
        }
    }

    /// Stores `message` as the last state and sends it to every subscriber.
    ///
    /// Returns the number of subscribers the message was queued for.
    fn publish(&self, message: &Message) -> Result<usize, Error> {
        let wire: Arc<str> = message.to_wire()?.into();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(Snapshot {
            message: message.clone(),
            wire: Arc::clone(&wire),
        });
        // Sent under the slot lock so a concurrent subscribe sees it exactly once.
        Ok(self.tx.send(wire).unwrap_or(0))
    }

    /// Subscribes to future broadcasts and snapshots the current last message.
    fn subscribe(&self) -> (broadcast::Receiver<Arc<str>>, Option<Arc<str>>) {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let replay = last.as_ref().map(|snapshot| Arc::clone(&snapshot.wire));
        (self.tx.subscribe(), replay)
    }
}

/// Shared state handed to every WebSocket connection.
#[derive(Clone)]
struct AppState {
    hub: Arc<Hub>,
    shutdown: watch::Receiver<bool>,
}

/// Handles incoming WebSocket upgrade requests.
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    debug!("New WebSocket connection request.");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single WebSocket client connection.
///
/// The send task replays the last message, then forwards broadcasts until the
/// client goes away or the server shuts down. The receive task only logs what
/// the client sends. The connection ends when either task finishes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver): (SplitSink<WebSocket, WsMessage>, SplitStream<WebSocket>) =
        socket.split();
    let (mut rx, replay) = state.hub.subscribe();
    let mut shutdown = state.shutdown.clone();
    info!("WebSocket client connected.");

    let mut send_task = tokio::spawn(async move {
        if let Some(wire) = replay {
            if sender.send(WsMessage::Text(wire.to_string())).await.is_err() {
                warn!("Failed to replay last message, client disconnected?");
                return;
            }
            debug!("Replayed last message to new client.");
        }
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(wire) => {
                        if sender.send(WsMessage::Text(wire.to_string())).await.is_err() {
                            warn!("Failed to send message to WebSocket client, client disconnected?");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed_count)) => {
                        warn!(
                            "WebSocket client lagged behind, missed {} messages.",
                            missed_count
                        );
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.changed() => {
                    let _ = sender.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
        debug!("WebSocket send task for a client finished.");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(t) => {
                    debug!("Ignoring text from WebSocket client: {}", t);
                }
                WsMessage::Binary(_) => {
                    debug!("Ignoring binary from WebSocket client.");
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                WsMessage::Close(_) => {
                    debug!("WebSocket client sent Close frame.");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!("WebSocket client disconnected.");
}

struct Running {
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    serve_task: JoinHandle<()>,
}

/// Owns the listening socket, the connection set and the last message.
pub struct BroadcastServer {
    host: String,
    ports: RangeInclusive<u16>,
    hub: Arc<Hub>,
    running: AsyncMutex<Option<Running>>,
}

impl BroadcastServer {
    /// Server for `host` (loopback when `None`) on a fixed `port`, or on the
    /// first free port of [`DYNAMIC_PORTS`].
    pub fn new(host: Option<&str>, port: Option<u16>) -> Self {
        let ports = match port {
            Some(port) => port..=port,
            None => DYNAMIC_PORTS,
        };
        Self::with_port_range(host.unwrap_or(DEFAULT_HOST), ports)
    }

    pub fn from_options(options: &ProviderOptions) -> Self {
        Self::new(options.host.as_deref(), options.port)
    }

    /// Server scanning an explicit candidate range in ascending order.
    pub fn with_port_range(host: impl Into<String>, ports: RangeInclusive<u16>) -> Self {
        BroadcastServer {
            host: host.into(),
            ports,
            hub: Arc::new(Hub::new()),
            running: AsyncMutex::new(None),
        }
    }

    /// Binds the first free candidate port and starts accepting clients.
    ///
    /// # Errors
    /// - [`Error::AlreadyRunning`] if the server is listening already.
    /// - [`Error::Resolve`] if the host does not resolve to an address.
    /// - [`Error::PortExhausted`] if no candidate port could be bound.
    pub async fn start(&self) -> Result<u16, Error> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Err(Error::AlreadyRunning(current.port));
        }

        let ip = resolve_host(&self.host).await?;
        let (port, listener) = bind_first_free(ip, self.ports.clone())
            .await
            .ok_or_else(|| Error::PortExhausted {
                host: self.host.clone(),
                first: *self.ports.start(),
                last: *self.ports.end(),
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = Router::new()
            .route("/", get(websocket_handler))
            .with_state(AppState {
                hub: Arc::clone(&self.hub),
                shutdown: shutdown_rx.clone(),
            });

        let mut shutdown = shutdown_rx;
        let serve_task = tokio::spawn(async move {
            let result = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move {
                    shutdown.changed().await.ok();
                    debug!("WebSocket server shutting down gracefully.");
                })
                .await;
            if let Err(e) = result {
                error!("WebSocket server exited with error: {}", e);
            }
        });

        self.hub.port.store(port, Ordering::SeqCst);
        *running = Some(Running {
            port,
            shutdown_tx,
            serve_task,
        });
        info!("WebSocket server listening on ws://{}", SocketAddr::new(ip, port));
        Ok(port)
    }

    /// Closes every connection and releases the port. No-op when stopped.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            debug!("stop() called on a stopped server.");
            return;
        };
        self.hub.port.store(0, Ordering::SeqCst);
        if running.shutdown_tx.send(true).is_err() {
            debug!("No WebSocket task was listening for shutdown.");
        }
        if let Err(e) = running.serve_task.await {
            error!("WebSocket server task failed: {}", e);
        }
        info!("WebSocket server on port {} stopped.", running.port);
    }

    /// Sends `message` to every connected client and keeps it for replay.
    ///
    /// # Errors
    /// [`Error::ServerNotRunning`] unless the server is listening.
    pub fn broadcast(&self, message: &Message) -> Result<(), Error> {
        if self.hub.port().is_none() {
            return Err(Error::ServerNotRunning);
        }
        let queued = self.hub.publish(message)?;
        debug!(
            "Broadcast {:?} payload to {} client(s).",
            message.payload(),
            queued
        );
        Ok(())
    }

    /// Port the server is bound to, `None` while stopped.
    pub fn port(&self) -> Option<u16> {
        self.hub.port()
    }

    pub fn is_running(&self) -> bool {
        self.hub.port().is_some()
    }

    /// The retained last broadcast, if any.
    pub fn last_message(&self) -> Option<Message> {
        let last = self.hub.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.as_ref().map(|snapshot| snapshot.message.clone())
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.hub.tx.receiver_count()
    }
}

async fn resolve_host(host: &str) -> Result<IpAddr, Error> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let resolve_error = |source: io::Error| Error::Resolve {
        host: host.to_string(),
        source,
    };
    tokio::net::lookup_host((host, 0))
        .await
        .map_err(resolve_error)?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| {
            resolve_error(io::Error::new(
                io::ErrorKind::NotFound,
                "no address found",
            ))
        })
}

/// Tries each candidate port in ascending order and returns the first bound.
///
/// The returned port is the one the listener actually holds, which differs
/// from the candidate when the candidate is 0 and the OS picks the port.
async fn bind_first_free(ip: IpAddr, ports: RangeInclusive<u16>) -> Option<(u16, TcpListener)> {
    for port in ports {
        let listener = match TcpListener::bind(SocketAddr::new(ip, port)).await {
            Ok(listener) => listener,
            Err(e) => {
                debug!("Port {} unavailable: {}", port, e);
                continue;
            }
        };
        match listener.local_addr() {
            Ok(addr) => return Some((addr.port(), listener)),
            Err(e) => debug!("Cannot read bound address for port {}: {}", port, e),
        }
    }
    None
}
