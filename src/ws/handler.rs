//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{PlayerInput, SessionCommand, SessionHandle};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let player_id = Uuid::new_v4();
    debug!(player_id = %player_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, player_id, state))
}

/// The session a connection is currently attached to
struct Joined {
    handle: SessionHandle,
    forwarder: JoinHandle<()>,
}

impl Joined {
    fn is_active(&self) -> bool {
        !self.forwarder.is_finished() && !self.handle.input_tx.is_closed()
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: Uuid, state: AppState) {
    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<ServerMsg>(128);

    let writer_handle = tokio::spawn(write_loop(player_id, ws_sink, out_rx));

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if out_tx.send(welcome).await.is_err() {
        error!(player_id = %player_id, "Failed to send welcome");
        return;
    }

    let mut joined = read_loop(player_id, ws_stream, &out_tx, &state).await;

    // Signal disconnect to the session loop
    if let Some(current) = joined.take() {
        leave(player_id, current).await;
    }

    drop(out_tx);
    let _ = writer_handle.await;

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> session loop. Returns the session still joined
/// when the socket closes.
async fn read_loop(
    player_id: Uuid,
    mut ws_stream: SplitStream<WebSocket>,
    out_tx: &mpsc::Sender<ServerMsg>,
    state: &AppState,
) -> Option<Joined> {
    let rate_limiter = PlayerRateLimiter::new();
    let mut joined: Option<Joined> = None;

    while let Some(result) = ws_stream.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
                continue;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        };

        if !rate_limiter.check_input() {
            warn!(player_id = %player_id, "Rate limited input message");
            continue;
        }

        let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                let _ = out_tx.send(error_msg("bad_message", &e.to_string())).await;
                continue;
            }
        };

        match client_msg {
            ClientMsg::Ping { t } => {
                let _ = out_tx.send(ServerMsg::Pong { t }).await;
            }
            ClientMsg::JoinSession { session_id } => {
                if joined.as_ref().is_some_and(Joined::is_active) {
                    let _ = out_tx
                        .send(error_msg("already_joined", "Leave the current session first"))
                        .await;
                    continue;
                }
                if let Some(stale) = joined.take() {
                    stale.forwarder.abort();
                }
                joined = join(player_id, session_id, out_tx, state).await;
            }
            ClientMsg::LeaveSession => {
                if let Some(current) = joined.take() {
                    leave(player_id, current).await;
                }
            }
            msg @ ClientMsg::Action { .. } => {
                let Some(current) = joined.as_ref().filter(|j| j.is_active()) else {
                    let _ = out_tx
                        .send(error_msg("not_in_session", "Join a session first"))
                        .await;
                    continue;
                };
                if forward(player_id, &current.handle, msg).await.is_err() {
                    debug!(player_id = %player_id, "Session input channel closed");
                    if let Some(stale) = joined.take() {
                        stale.forwarder.abort();
                    }
                }
            }
        }
    }

    joined
}

async fn join(
    player_id: Uuid,
    requested: Option<Uuid>,
    out_tx: &mpsc::Sender<ServerMsg>,
    state: &AppState,
) -> Option<Joined> {
    let handle = match state.sessions.join(requested) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(player_id = %player_id, error = %e, "Join failed");
            let _ = out_tx.send(error_msg(e.code(), &e.to_string())).await;
            return None;
        }
    };

    // Subscribe before joining so the confirmation is not missed
    let snapshot_rx = handle.snapshot_tx.subscribe();
    let forwarder = tokio::spawn(forward_loop(player_id, snapshot_rx, out_tx.clone()));

    let msg = ClientMsg::JoinSession {
        session_id: Some(handle.id),
    };
    if forward(player_id, &handle, msg).await.is_err() {
        forwarder.abort();
        let _ = out_tx
            .send(error_msg("session_closed", "Session closed"))
            .await;
        return None;
    }

    info!(player_id = %player_id, session_id = %handle.id, "Joining session");
    Some(Joined { handle, forwarder })
}

async fn leave(player_id: Uuid, current: Joined) {
    let _ = forward(player_id, &current.handle, ClientMsg::LeaveSession).await;
    current.forwarder.abort();
}

async fn forward(
    player_id: Uuid,
    handle: &SessionHandle,
    msg: ClientMsg,
) -> Result<(), mpsc::error::SendError<SessionCommand>> {
    handle
        .input_tx
        .send(SessionCommand::Input(PlayerInput {
            player_id,
            msg,
            received_at: unix_millis(),
        }))
        .await
}

/// Session broadcast -> this connection's outbound queue
async fn forward_loop(
    player_id: Uuid,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
    out_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match snapshot_rx.recv().await {
            Ok(msg) => {
                let refused = match &msg {
                    ServerMsg::PlayerLeft { player_id: id, reason } if *id == player_id => {
                        Some(reason.clone())
                    }
                    _ => None,
                };
                if out_tx.send(msg).await.is_err() {
                    break;
                }
                if let Some(reason) = refused {
                    debug!(player_id = %player_id, reason = %reason, "Detached from session");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(
                    player_id = %player_id,
                    lagged_count = n,
                    "Client lagged, skipping {} snapshots", n
                );
                // Continue - don't disconnect for lag
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(player_id = %player_id, "Snapshot channel closed");
                break;
            }
        }
    }
}

/// Writer loop: outbound queue -> WebSocket
async fn write_loop(
    player_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = out_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
    let _ = ws_sink.close().await;
}

fn error_msg(code: &str, message: &str) -> ServerMsg {
    ServerMsg::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameSession, SessionConfig};

    #[tokio::test]
    async fn joined_goes_inactive_when_session_stops() {
        let (session, handle) = GameSession::new(Uuid::new_v4(), 1, SessionConfig::default());
        let joined = Joined {
            handle,
            forwarder: tokio::spawn(std::future::pending::<()>()),
        };
        assert!(joined.is_active());

        // The connection still holds the broadcast sender, so only the
        // closed input channel shows the session is gone
        drop(session);
        assert!(!joined.is_active());
        joined.forwarder.abort();
    }
}
