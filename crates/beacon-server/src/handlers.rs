//! Connection handlers for the Beacon server.
//!
//! This module owns the shared state, the HTTP router, and the WebSocket
//! session loop.

use crate::api;
use crate::config::Config;
use crate::error::{frame_code, ApiError};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use beacon_core::{Broadcaster, Connection, ConnectionMeta, FanoutMode, Roster};
use beacon_protocol::{codec, codes, validate_identifier, version, Format, Frame, PROTOCOL_VERSION};
use beacon_transport::{HubSession, Outbound, TopicHub, Transport};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Presence registry and room index.
    pub roster: Arc<Roster>,
    /// In-process topic hub backing every session.
    pub hub: Arc<TopicHub>,
    /// Fan-out with the configured strategy.
    pub broadcaster: Broadcaster,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let roster = Arc::new(Roster::with_config(config.roster_config()));
        let hub = Arc::new(TopicHub::new());

        let broadcaster = match config.fanout.strategy {
            FanoutMode::Topic => {
                Broadcaster::topic(roster.clone(), hub.clone(), config.broadcast_config())
            }
            FanoutMode::Direct => Broadcaster::direct(roster.clone(), config.broadcast_config()),
        };

        Self {
            roster,
            hub,
            broadcaster,
            config,
        }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .merge(api::routes())
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Beacon server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{} (strategy: {})",
        addr,
        config.transport.websocket_path,
        state.broadcaster.strategy()
    );

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.roster.shutdown().await;
    info!("Beacon server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Identity handed over by the authenticating proxy.
#[derive(Debug, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Protocol version the client speaks.
    #[serde(default)]
    pub protocol: Option<u8>,
}

impl Identity {
    fn meta(&self) -> ConnectionMeta {
        ConnectionMeta::new(
            self.user_name.as_deref().unwrap_or(&self.user_id),
            self.role.as_deref().unwrap_or("member"),
        )
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(identity): Query<Identity>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Err(reason) = validate_identifier(&identity.user_id) {
        return ApiError::from(beacon_core::PresenceError::InvalidIdentifier(reason))
            .into_response();
    }
    if !version::supports(identity.protocol) {
        return ApiError::UnsupportedProtocol(identity.protocol.unwrap_or_default()).into_response();
    }
    // A reconnect replaces the live connection, so it never raises the count.
    let max_connections = state.config.limits.max_connections;
    if !state.roster.is_online(&identity.user_id) && state.roster.count() >= max_connections {
        warn!(user = %identity.user_id, "Rejecting connection: at capacity");
        metrics::record_error("capacity");
        return ApiError::AtCapacity(max_connections).into_response();
    }

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, identity))
}

type WsSink = SplitSink<WebSocket, Message>;

/// Per-socket context for frame handling.
struct Session<'a> {
    state: &'a AppState,
    connection: Connection,
    format: Format,
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let format = state.config.transport.format;
    let user_id = identity.user_id.clone();

    let (session, mut outbound) =
        HubSession::new(state.hub.clone(), state.config.transport.queue_capacity);
    let connection_id = session.id().clone();
    debug!(connection = %connection_id, user = %user_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let connection = match state
        .roster
        .register(&user_id, session.clone(), identity.meta())
        .await
    {
        Ok(connection) => connection,
        Err(e) => {
            warn!(connection = %connection_id, user = %user_id, error = %e, "Registration failed");
            metrics::record_error("register");
            let _ = send_frame(&mut sender, &Frame::error(0, frame_code(&e), e.to_string()), format)
                .await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let ctx = Session {
        state: &state,
        connection,
        format,
    };

    let connected = Frame::connected(
        connection_id.as_str(),
        user_id.as_str(),
        PROTOCOL_VERSION,
        state.config.heartbeat.interval_ms as u32,
    );
    match send_frame(&mut sender, &connected, format).await {
        Ok(()) => run_session(&ctx, &mut sender, &mut receiver, &mut outbound).await,
        Err(e) => error!(connection = %connection_id, error = %e, "Failed to send Connected frame"),
    }

    // Open -> Closing here; unregister drives Closing -> Closed.
    ctx.connection.lifecycle().begin_close();
    state.roster.unregister_connection(&user_id, &connection_id);
    drop(outbound);
    let _ = session.close().await;
    metrics::set_active_rooms(state.roster.stats().rooms);

    debug!(connection = %connection_id, user = %user_id, "WebSocket disconnected");
}

/// Relay outbound traffic and answer inbound frames until either side stops.
async fn run_session(
    ctx: &Session<'_>,
    sender: &mut WsSink,
    receiver: &mut SplitStream<WebSocket>,
    outbound: &mut mpsc::Receiver<Outbound>,
) {
    let connection_id = ctx.connection.id();
    let format = ctx.format;
    let idle_timeout = Duration::from_millis(ctx.state.config.heartbeat.timeout_ms);
    let mut deadline = tokio::time::Instant::now() + idle_timeout;

    loop {
        tokio::select! {
            biased;

            // Relay payloads queued by direct sends and topic forwarders
            item = outbound.recv() => {
                match item {
                    Some(Outbound::Payload(data)) => {
                        metrics::record_message(data.len(), "outbound");
                        if sender.send(to_message(data, format)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        debug!(connection = %connection_id, "Session closed by server");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                deadline = tokio::time::Instant::now() + idle_timeout;
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_data(ctx, sender, text.as_bytes(), Format::Json).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if handle_data(ctx, sender, &data, format).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            () = tokio::time::sleep_until(deadline) => {
                warn!(connection = %connection_id, user = %ctx.connection.user_id(), "Heartbeat timeout");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Decode and answer one inbound message.
async fn handle_data(
    ctx: &Session<'_>,
    sender: &mut WsSink,
    data: &[u8],
    format: Format,
) -> Result<()> {
    let start = Instant::now();
    metrics::record_message(data.len(), "inbound");

    let reply = match codec::decode(data, format) {
        Ok(frame) => handle_frame(ctx, frame),
        Err(e) => {
            debug!(connection = %ctx.connection.id(), error = %e, "Malformed frame");
            metrics::record_error("decode");
            Some(Frame::error(0, codes::MALFORMED_FRAME, e.to_string()))
        }
    };

    if let Some(reply) = reply {
        send_frame(sender, &reply, ctx.format).await?;
    }
    metrics::record_latency(start.elapsed().as_secs_f64());
    Ok(())
}

/// Handle a decoded frame, returning the reply to send, if any.
fn handle_frame(ctx: &Session<'_>, frame: Frame) -> Option<Frame> {
    let roster = &ctx.state.roster;
    let user_id = ctx.connection.user_id();

    match frame {
        Frame::Join { id, chat_id } => {
            debug!(user = %user_id, chat = %chat_id, "Join request");
            let reply = match roster.join(user_id, &chat_id) {
                Ok(joined) => {
                    if joined {
                        metrics::record_join();
                        metrics::set_active_rooms(roster.stats().rooms);
                    }
                    Frame::ack(id)
                }
                Err(e) => {
                    warn!(user = %user_id, chat = %chat_id, error = %e, "Join failed");
                    Frame::error(id, frame_code(&e), e.to_string())
                }
            };
            Some(reply)
        }

        Frame::Leave { id, chat_id } => {
            debug!(user = %user_id, chat = %chat_id, "Leave request");
            if roster.leave(user_id, &chat_id) {
                metrics::set_active_rooms(roster.stats().rooms);
            }
            Some(Frame::ack(id))
        }

        Frame::Ping { timestamp } => Some(Frame::pong(timestamp)),

        Frame::Pong { .. } => None,

        other => {
            warn!(
                connection = %ctx.connection.id(),
                frame_type = other.frame_type().as_str(),
                "Unexpected frame type"
            );
            Some(Frame::error(
                0,
                codes::UNEXPECTED_FRAME,
                format!("{} is not a client frame", other.frame_type().as_str()),
            ))
        }
    }
}

fn to_message(data: Bytes, format: Format) -> Message {
    if format.is_text() {
        Message::Text(String::from_utf8_lossy(&data).into_owned())
    } else {
        Message::Binary(data.to_vec())
    }
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut WsSink, frame: &Frame, format: Format) -> Result<()> {
    let data = codec::encode(frame, format)?;
    metrics::record_message(data.len(), "outbound");
    sender.send(to_message(data, format)).await?;
    Ok(())
}
