use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{AccessGate, ConnectionIdentity, RequestedRole};
use crate::config::{Config, WsConfig};
use crate::control::PresentationControlCoordinator;
use crate::error::{ErrorCode, SyncError};
use crate::participation::ParticipationService;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::rooms::RoomBroadcaster;
use crate::session::SessionRegistry;
use crate::store::{PresentationStore, SlideStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub rooms: Arc<RoomBroadcaster>,
    pub control: Arc<PresentationControlCoordinator>,
    pub participation: Arc<ParticipationService>,
    pub gate: Arc<AccessGate>,
    pub ws_config: WsConfig,
}

impl AppState {
    pub fn new(
        config: &Config,
        presentations: Arc<dyn PresentationStore>,
        slides: Arc<dyn SlideStore>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomBroadcaster::new());
        let control = Arc::new(PresentationControlCoordinator::new(
            presentations.clone(),
            slides.clone(),
            rooms.clone(),
        ));
        let participation = Arc::new(ParticipationService::new(
            registry.clone(),
            rooms.clone(),
            presentations,
            slides,
        ));
        let gate = Arc::new(AccessGate::new(
            &config.auth.token_secret,
            config.auth.clock_skew_secs,
        ));

        Self {
            registry,
            rooms,
            control,
            participation,
            gate,
            ws_config: config.ws.clone(),
        }
    }

    /// (active sessions, live connections) for the stats endpoints
    pub async fn get_stats(&self) -> (usize, usize) {
        (self.registry.len().await, self.rooms.connection_count())
    }
}

/// Connection-time query parameters
#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler; the access gate runs before the upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let connection_id = Uuid::new_v4();
    let requested_role = match params.role.as_deref() {
        Some("presenter") => RequestedRole::Presenter,
        _ => RequestedRole::Participant,
    };

    let identity = match state
        .gate
        .authenticate(params.token.as_deref(), requested_role, connection_id)
    {
        Ok(identity) => identity,
        Err(SyncError::Forbidden) => {
            warn!("Connection {} refused: wrong role claim", connection_id);
            return StatusCode::FORBIDDEN.into_response();
        }
        Err(_) => {
            warn!("Connection {} refused: bad credentials", connection_id);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, connection_id, identity))
}

/// Handle a WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    connection_id: Uuid,
    identity: ConnectionIdentity,
) {
    info!("New WebSocket connection: {}", connection_id);
    counter!("slidecast_ws_connections_total").increment(1);

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.ws_config.channel_capacity);
    state.rooms.register_connection(connection_id, tx.clone());

    // Milliseconds since connection start, updated on every inbound frame
    let started = Instant::now();
    let last_seen = Arc::new(AtomicU64::new(0));

    // Split socket into sender and receiver
    use futures_util::{SinkExt, StreamExt};
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward outgoing messages to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    // Keepalive: ping on an interval, close when the peer goes silent
    let ping_tx = tx.clone();
    let ping_config = state.ws_config.clone();
    let ping_last_seen = last_seen.clone();
    let ping_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(ping_config.ping_interval);
        interval.tick().await; // immediate first tick
        loop {
            interval.tick().await;

            let idle_ms = started.elapsed().as_millis() as u64
                - ping_last_seen.load(Ordering::Relaxed);
            let limit = ping_config.ping_interval + ping_config.ping_timeout;
            if idle_ms > 2 * limit.as_millis() as u64 {
                debug!("Connection timed out waiting for traffic");
                break;
            }

            if ping_tx.send(ServerMessage::Ping).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages in arrival order
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(msg) => match msg {
                Message::Text(text) => {
                    last_seen.store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
                    state.registry.touch_connection(connection_id).await;

                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            counter!("slidecast_ws_messages_total", "message" => client_msg.message_type())
                                .increment(1);
                            handle_client_message(client_msg, connection_id, &identity, &state, &tx)
                                .await;
                        }
                        Err(e) => {
                            warn!("Failed to parse client message: {}", e);
                            let _ = tx
                                .send(ServerMessage::Error {
                                    ack_seq: None,
                                    code: ErrorCode::InvalidMessage,
                                    message: format!("invalid message format: {}", e),
                                })
                                .await;
                        }
                    }
                }
                Message::Ping(data) => {
                    // Pong reply is handled by axum automatically
                    debug!("Received ping: {:?}", data);
                }
                Message::Pong(_) => {
                    last_seen.store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
                    state.registry.touch_connection(connection_id).await;
                }
                Message::Binary(_) => {
                    debug!("Ignoring binary frame from {}", connection_id);
                }
                Message::Close(_) => {
                    info!("Client {} requested close", connection_id);
                    break;
                }
            },
            Err(e) => {
                error!("WebSocket error for {}: {}", connection_id, e);
                break;
            }
        }
    }

    // Cleanup: connection loss is the same as an explicit leave
    ping_task.abort();
    state.participation.disconnect(connection_id).await;
    state.rooms.unregister_connection(connection_id).await;
    send_task.abort();

    info!("WebSocket connection closed: {}", connection_id);
}

/// Handle a parsed client message
///
/// Failures are replies, never disconnects: a bad control call answers with
/// an error frame and leaves the socket (and every other session) intact.
async fn handle_client_message(
    msg: ClientMessage,
    connection_id: Uuid,
    identity: &ConnectionIdentity,
    state: &AppState,
    tx: &mpsc::Sender<ServerMessage>,
) {
    match msg {
        ClientMessage::Join {
            access_code,
            display_name,
            prior_session_id,
            seq,
        } => {
            let result = state
                .participation
                .join(
                    connection_id,
                    identity,
                    &access_code,
                    display_name,
                    prior_session_id,
                )
                .await;
            match result {
                Ok(outcome) => {
                    let _ = tx
                        .send(ServerMessage::Joined {
                            ack_seq: seq,
                            session_id: outcome.session.session_id.clone(),
                            participant: outcome.session.to_participant_info(),
                            snapshot: outcome.snapshot,
                            participant_count: outcome.participant_count,
                        })
                        .await;
                }
                Err(err) => send_error(tx, Some(seq), err).await,
            }
        }
        ClientMessage::Leave { session_id } => {
            // Fire-and-forget; absence is a routine race outcome
            state.participation.leave(&session_id).await;
        }
        ClientMessage::StartPresentation {
            presentation_id,
            seq,
        } => {
            control_op(tx, seq, identity, |principal| {
                let control = state.control.clone();
                async move { control.start(&presentation_id, &principal).await }
            })
            .await;
        }
        ClientMessage::StopPresentation {
            presentation_id,
            seq,
        } => {
            control_op(tx, seq, identity, |principal| {
                let control = state.control.clone();
                async move { control.stop(&presentation_id, &principal).await }
            })
            .await;
        }
        ClientMessage::NextSlide {
            presentation_id,
            seq,
        } => {
            control_op(tx, seq, identity, |principal| {
                let control = state.control.clone();
                async move { control.next_slide(&presentation_id, &principal).await }
            })
            .await;
        }
        ClientMessage::PrevSlide {
            presentation_id,
            seq,
        } => {
            control_op(tx, seq, identity, |principal| {
                let control = state.control.clone();
                async move { control.prev_slide(&presentation_id, &principal).await }
            })
            .await;
        }
        ClientMessage::GotoSlide {
            presentation_id,
            slide_index,
            seq,
        } => {
            control_op(tx, seq, identity, |principal| {
                let control = state.control.clone();
                async move {
                    control
                        .goto_slide(&presentation_id, &principal, slide_index)
                        .await
                }
            })
            .await;
        }
        ClientMessage::Ping { seq } => {
            let _ = tx.send(ServerMessage::Pong { ack_seq: seq }).await;
        }
    }
}

/// Run a presenter-only control operation and ack or reject it
async fn control_op<F, Fut>(
    tx: &mpsc::Sender<ServerMessage>,
    seq: u64,
    identity: &ConnectionIdentity,
    op: F,
) where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<crate::control::ControlOutcome, SyncError>>,
{
    let ConnectionIdentity::Presenter { principal_id } = identity else {
        send_error(tx, Some(seq), SyncError::Forbidden).await;
        return;
    };

    match op(principal_id.clone()).await {
        Ok(outcome) => {
            let _ = tx
                .send(ServerMessage::ControlAck {
                    ack_seq: seq,
                    is_active: outcome.is_active,
                    current_slide_index: outcome.current_slide_index,
                    total_slides: outcome.total_slides,
                })
                .await;
        }
        Err(err) => send_error(tx, Some(seq), err).await,
    }
}

async fn send_error(tx: &mpsc::Sender<ServerMessage>, ack_seq: Option<u64>, err: SyncError) {
    let _ = tx
        .send(ServerMessage::Error {
            ack_seq,
            code: err.code(),
            message: err.to_string(),
        })
        .await;
}
