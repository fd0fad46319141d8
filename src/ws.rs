//! WebSocket transport for interactive terminal sessions.
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /api/terminal?token=<api_key>` — token is
//!    validated before the upgrade completes.
//! 2. On upgrade the connection is admitted to the [`SessionRegistry`] and a
//!    session task is spawned; shell output arrives as `Text` frames and
//!    client keystrokes are accepted as `Text` or `Binary` frames. Frames
//!    are raw terminal bytes, no envelope.
//! 3. A close from either side (client frame, shell EOF, registry teardown)
//!    ends the whole session; the server finishes by closing the socket.
//!
//! [`SessionRegistry`]: crate::terminal::SessionRegistry

use axum::{
    extract::ws::Message,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::auth;
use crate::terminal::session;
use crate::AppState;

/// Query parameters for the WebSocket upgrade request.
#[derive(Deserialize)]
pub struct WsQuery {
    /// API key passed as a query parameter (since HTTP headers aren't available
    /// during a browser WebSocket upgrade).
    pub token: String,
}

/// `GET /api/terminal?token=<key>` — WebSocket upgrade handler.
///
/// Validates the token before upgrading. Returns `403 Forbidden` on auth
/// failure.
pub async fn terminal_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if !auth::token_matches(&state.config.auth.api_key, &query.token) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    ws.on_upgrade(move |socket| async move {
        let (ws_sink, ws_stream) = socket.split();
        bridge(ws_sink, ws_stream, state).await;
    })
}

/// Bridge one WebSocket connection to one terminal session.
///
/// Outgoing text is funneled through an mpsc channel owned by the session
/// task, so the session can write without holding the socket; when the
/// session ends it drops its sender, the forwarder sees the channel close
/// and shuts the socket. The frame pump ends as soon as either the client
/// goes away or the session task finishes — a client that never completes
/// the close handshake cannot hold its registry slot.
async fn bridge<W, R>(mut ws_sink: W, mut ws_stream: R, state: AppState)
where
    W: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let Some((session_id, close_rx)) = state.registry.accept().await else {
        let _ = ws_sink
            .send(Message::Text(
                "\r\n*** CONNECT ERROR: session limit reached ***\r\n".into(),
            ))
            .await;
        let _ = ws_sink.close().await;
        return;
    };

    info!(session_id = %session_id, "WebSocket terminal connected");

    // Session → client text, client → session raw bytes.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(256);

    let send_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        // Session is gone; close the socket so the client sees a clean end.
        let _ = ws_sink.close().await;
    });

    let mut session_task = tokio::spawn(session::run(
        session_id.clone(),
        state.shell_connector.clone(),
        state.target.clone(),
        out_tx,
        in_rx,
        close_rx,
    ));
    let mut session_finished = false;

    // Pump client frames into the session until the client goes away or the
    // session itself ends (shell EOF, registry teardown).
    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                let Some(Ok(msg)) = frame else { break };
                match msg {
                    Message::Text(text) => {
                        if in_tx.send(text.as_bytes().to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Message::Binary(data) => {
                        if in_tx.send(data.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    // axum answers pings itself.
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            _ = &mut session_task, if !session_finished => {
                session_finished = true;
                break;
            }
        }
    }

    // Closing the input channel ends the session task (if it is still
    // running), which in turn ends the send task.
    drop(in_tx);
    if !session_finished {
        let _ = session_task.await;
    }
    let _ = send_task.await;

    state.registry.remove(&session_id).await;
    debug!(session_id = %session_id, "WebSocket terminal disconnected");
}
