//! WebSocket upgrade handlers and per-connection event loops for the three
//! gateway channels.
//!
//! Each channel authenticates independently at open time from a `token`
//! query parameter supplied in the handshake. All outbound traffic for a
//! connection flows through one unbounded queue drained by a pump task, so
//! handler code never blocks on the socket and per-sender delivery order is
//! preserved.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::auth::{self, Identity};
use crate::error::{code, AuthFailure};
use crate::review::ReviewInput;
use crate::AppState;

use super::connection::Connection;
use super::events::{
    CollabEvent, CollabRequest, ReviewEvent, ReviewRequest, SessionEvent, SessionRequest, UserRef,
};
use super::rooms::RoomMember;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/gateway/collab", get(collab_upgrade))
        .route("/gateway/reviews", get(reviews_upgrade))
        .route("/gateway/sessions", get(sessions_upgrade))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

async fn collab_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<AuthQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| collab_connection(socket, state, query.token))
}

async fn reviews_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<AuthQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| reviews_connection(socket, state, query.token))
}

async fn sessions_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<AuthQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| sessions_connection(socket, state, query.token))
}

// ---------------------------------------------------------------------------
// Connection admission
// ---------------------------------------------------------------------------

enum Admission {
    /// Token verified, identity attached.
    Authenticated(Identity),
    /// No token supplied: the connection stays open but every operation on
    /// it fails with `Unauthorized`.
    Unauthenticated,
    /// Token supplied but bad, or the user vanished: fatal.
    Rejected(AuthFailure),
}

async fn admit(state: &AppState, token: Option<String>) -> Admission {
    match token {
        None => Admission::Unauthenticated,
        Some(token) => {
            match auth::authenticate(
                &state.config.auth_secret,
                state.directory.as_ref(),
                &token,
            )
            .await
            {
                Ok(identity) => Admission::Authenticated(identity),
                Err(failure) => Admission::Rejected(failure),
            }
        }
    }
}

/// Drain the outbound queue onto the socket until the queue closes or the
/// peer goes away.
async fn pump_outbound<E: Serialize>(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<E>,
) {
    while let Some(event) = rx.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(?e, "outbound event serialization failed");
                continue;
            }
        };
        if ws_tx.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.close().await;
}

/// Read the next inbound text frame, or `None` when the connection is done.
async fn next_text(ws_rx: &mut SplitStream<WebSocket>, conn_id: &str) -> Option<String> {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) => return None,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, %conn_id, "ws read error");
                return None;
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Collaboration channel
// ---------------------------------------------------------------------------

async fn collab_connection(socket: WebSocket, state: AppState, token: Option<String>) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<CollabEvent>();
    let pump = tokio::spawn(pump_outbound(ws_tx, rx));

    let identity = match admit(&state, token).await {
        Admission::Authenticated(identity) => {
            let _ = tx.send(CollabEvent::AuthSuccess {
                user: UserRef {
                    id: identity.user_id.clone(),
                    username: identity.username.clone(),
                },
            });
            Some(identity)
        }
        Admission::Unauthenticated => {
            let _ = tx.send(CollabEvent::AuthError {
                message: "Missing token".to_string(),
            });
            None
        }
        Admission::Rejected(failure) => {
            let _ = tx.send(CollabEvent::AuthError {
                message: failure.message().to_string(),
            });
            drop(tx);
            let _ = pump.await;
            return;
        }
    };

    let conn = Connection::new(identity);
    tracing::info!(conn_id = %conn.conn_id, "collab connection opened");

    while let Some(text) = next_text(&mut ws_rx, &conn.conn_id).await {
        let request: CollabRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx.send(CollabEvent::Error {
                    code: code::PROTOCOL_ERROR.to_string(),
                    message: format!("Unrecognized message: {e}"),
                });
                continue;
            }
        };
        handle_collab_request(&state, &conn, &tx, request);
    }

    state.rooms.disconnect_cleanup(&conn.conn_id);
    drop(tx);
    let _ = pump.await;
    tracing::info!(conn_id = %conn.conn_id, "collab connection closed");
}

fn handle_collab_request(
    state: &AppState,
    conn: &Connection,
    tx: &mpsc::UnboundedSender<CollabEvent>,
    request: CollabRequest,
) {
    let Some(sender) = conn.user_ref() else {
        let _ = tx.send(CollabEvent::Error {
            code: code::UNAUTHORIZED.to_string(),
            message: "Not authenticated".to_string(),
        });
        return;
    };

    match request {
        CollabRequest::JoinRoom(target) => {
            tracing::debug!(conn_id = %conn.conn_id, room_id = %target.room_id, "join room");
            state.rooms.join(
                &target.room_id,
                RoomMember::new(
                    conn.conn_id.clone(),
                    sender.id,
                    sender.username,
                    tx.clone(),
                ),
            );
        }
        CollabRequest::LeaveRoom(target) => {
            tracing::debug!(conn_id = %conn.conn_id, room_id = %target.room_id, "leave room");
            state.rooms.leave(&target.room_id, &conn.conn_id);
        }
        CollabRequest::CursorMove(payload) => {
            state.rooms.broadcast_cursor(
                &payload.room_id,
                &conn.conn_id,
                sender,
                payload.position,
                payload.selection,
            );
        }
        CollabRequest::TextChange(payload) => {
            state.rooms.relay_text_change(
                &payload.room_id,
                &conn.conn_id,
                sender,
                payload.changes,
                payload.version_id,
            );
        }
        CollabRequest::ChatMessage(payload) => {
            let id = state.snowflake.generate().to_string();
            state
                .rooms
                .send_chat(&payload.room_id, id, sender, &payload.message);
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis-job channel
// ---------------------------------------------------------------------------

async fn reviews_connection(socket: WebSocket, state: AppState, token: Option<String>) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<ReviewEvent>();
    let pump = tokio::spawn(pump_outbound(ws_tx, rx));

    let identity = match admit(&state, token).await {
        Admission::Authenticated(identity) => {
            let _ = tx.send(ReviewEvent::AuthSuccess {
                user: UserRef {
                    id: identity.user_id.clone(),
                    username: identity.username.clone(),
                },
            });
            Some(identity)
        }
        Admission::Unauthenticated => {
            let _ = tx.send(ReviewEvent::AuthError {
                message: "Missing token".to_string(),
            });
            None
        }
        Admission::Rejected(failure) => {
            let _ = tx.send(ReviewEvent::AuthError {
                message: failure.message().to_string(),
            });
            drop(tx);
            let _ = pump.await;
            return;
        }
    };

    let conn = Connection::new(identity);
    tracing::info!(conn_id = %conn.conn_id, "review connection opened");

    while let Some(text) = next_text(&mut ws_rx, &conn.conn_id).await {
        let request: ReviewRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx.send(ReviewEvent::Error {
                    code: code::PROTOCOL_ERROR.to_string(),
                    message: format!("Unrecognized message: {e}"),
                });
                continue;
            }
        };
        handle_review_request(&state, &conn, &tx, request);
    }

    // In-flight jobs discover the dead flag at their next check; nothing
    // can be delivered to a gone connection anyway.
    state.reviews.disconnect_cleanup(&conn.conn_id);
    drop(tx);
    let _ = pump.await;
    tracing::info!(conn_id = %conn.conn_id, "review connection closed");
}

fn handle_review_request(
    state: &AppState,
    conn: &Connection,
    tx: &mpsc::UnboundedSender<ReviewEvent>,
    request: ReviewRequest,
) {
    if conn.identity.is_none() {
        let _ = tx.send(ReviewEvent::Error {
            code: code::UNAUTHORIZED.to_string(),
            message: "Not authenticated".to_string(),
        });
        return;
    }

    match request {
        ReviewRequest::Start(payload) => {
            tracing::info!(
                conn_id = %conn.conn_id,
                request_id = %payload.request_id,
                project_id = %payload.project_id,
                "review started"
            );
            let input = ReviewInput {
                project_id: payload.project_id,
                code: payload.code,
                language: payload.language,
                file_path: payload.file_path,
                context: payload.context,
            };
            // Slot exists before this handler returns, so a cancel in the
            // very next frame can always find it.
            state.reviews.accept(&conn.conn_id, &payload.request_id);
            let tracker = state.reviews.clone();
            let engine = state.engine.clone();
            let kv = state.kv.clone();
            let tx = tx.clone();
            let conn_id = conn.conn_id.clone();
            let request_id = payload.request_id;
            tokio::spawn(async move {
                tracker
                    .run(&conn_id, &request_id, input, engine.as_ref(), kv.as_ref(), &tx)
                    .await;
            });
        }
        ReviewRequest::Cancel(payload) => {
            if state.reviews.cancel(&conn.conn_id, &payload.request_id) {
                tracing::info!(
                    conn_id = %conn.conn_id,
                    request_id = %payload.request_id,
                    "review cancelled"
                );
                let _ = tx.send(ReviewEvent::Cancelled {
                    request_id: payload.request_id,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session channel
// ---------------------------------------------------------------------------

async fn sessions_connection(socket: WebSocket, state: AppState, token: Option<String>) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<SessionEvent>();
    let pump = tokio::spawn(pump_outbound(ws_tx, rx));

    let identity = match admit(&state, token).await {
        Admission::Authenticated(identity) => {
            let _ = tx.send(SessionEvent::AuthSuccess {
                user: UserRef {
                    id: identity.user_id.clone(),
                    username: identity.username.clone(),
                },
            });
            Some(identity)
        }
        Admission::Unauthenticated => {
            let _ = tx.send(SessionEvent::AuthError {
                message: "Missing token".to_string(),
            });
            None
        }
        Admission::Rejected(failure) => {
            let _ = tx.send(SessionEvent::AuthError {
                message: failure.message().to_string(),
            });
            drop(tx);
            let _ = pump.await;
            return;
        }
    };

    let conn = Connection::new(identity);
    tracing::info!(conn_id = %conn.conn_id, "session connection opened");

    while let Some(text) = next_text(&mut ws_rx, &conn.conn_id).await {
        let request: SessionRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx.send(SessionEvent::Error {
                    code: code::PROTOCOL_ERROR.to_string(),
                    message: format!("Unrecognized message: {e}"),
                });
                continue;
            }
        };
        handle_session_request(&state, &conn, &tx, request).await;
    }

    drop(tx);
    let _ = pump.await;
    tracing::info!(conn_id = %conn.conn_id, "session connection closed");
}

async fn handle_session_request(
    state: &AppState,
    conn: &Connection,
    tx: &mpsc::UnboundedSender<SessionEvent>,
    request: SessionRequest,
) {
    let Some(identity) = conn.identity.as_ref() else {
        let _ = tx.send(SessionEvent::Error {
            code: code::UNAUTHORIZED.to_string(),
            message: "Not authenticated".to_string(),
        });
        return;
    };

    match request {
        SessionRequest::Get(target) => {
            let session = state
                .sessions
                .get_session(&identity.user_id, &target.project_id)
                .await;
            let _ = tx.send(SessionEvent::Data {
                project_id: target.project_id,
                session,
            });
        }
        SessionRequest::Update(payload) => {
            state.sessions.schedule_save(
                &identity.user_id,
                &payload.project_id,
                payload.session,
                tx.clone(),
            );
        }
        SessionRequest::Extend(target) => {
            state
                .sessions
                .extend_session(&identity.user_id, &target.project_id)
                .await;
            let _ = tx.send(SessionEvent::Extended {
                project_id: target.project_id,
            });
        }
        SessionRequest::Delete(target) => {
            match state
                .sessions
                .delete_session(&identity.user_id, &target.project_id)
                .await
            {
                Ok(()) => {
                    let _ = tx.send(SessionEvent::Deleted {
                        project_id: target.project_id,
                    });
                }
                Err(e) => {
                    tracing::error!(%e, conn_id = %conn.conn_id, "session delete failed");
                    let _ = tx.send(SessionEvent::Error {
                        code: code::STORE_ERROR.to_string(),
                        message: "Failed to delete session".to_string(),
                    });
                }
            }
        }
    }
}
