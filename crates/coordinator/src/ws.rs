use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use quiz_types::{ClientMessage, Role};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::verify_token;
use crate::registry::ConnectionContext;
use crate::router::AppState;
use crate::state_machine::SessionMachine;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// `GET /ws?token=...`. The token is verified *before* the upgrade so a bad
/// token fails with a plain HTTP status instead of an upgrade-then-close.
#[tracing::instrument(skip_all)]
pub async fn upgrade(
    State(app): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match verify_token(&app.jwt_secret, &query.token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "rejecting websocket upgrade");
            return (e.to_status(), e.to_string()).into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, app.machine, claims))
}

async fn handle_socket(socket: WebSocket, machine: SessionMachine, claims: crate::auth::Claims) {
    let session_id = claims.session_id.clone();
    let user_id = claims.user_id.clone();
    let role: Role = claims.user_type.into();

    // The registry session entry is created by `session.start`; a connection
    // for a session that hasn't started yet or has already ended is refused
    // rather than silently held open.
    if !machine.registry().session_exists(&session_id) {
        debug!(session_id, user_id, "no such session, closing connection");
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctx = std::sync::Arc::new(ConnectionContext::new(
        session_id.clone(),
        user_id.clone(),
        claims.user_name.clone(),
        role,
        tx,
    ));

    if let Err(e) = machine.registry().register_connection(ctx.clone()) {
        warn!(session_id, user_id, error = %e, "failed to register connection, closing");
        return;
    }
    info!(session_id, user_id, ?role, "connection established");

    let (mut sink, mut stream) = socket.split();

    // Dedicated writer task: owns the socket's write half and drains the
    // channel in order, so `registry::send_message` never has to touch the
    // socket or take a write lock on it.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if role != Role::Participant {
                    continue;
                }
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_message) => {
                        let tracker = machine.tracker().clone();
                        let session_id = session_id.clone();
                        let user_id = user_id.clone();
                        tokio::spawn(async move {
                            if let Err(e) = tracker
                                .record_answer(
                                    &session_id,
                                    &user_id,
                                    client_message.option,
                                    client_message.timestamp,
                                )
                                .await
                            {
                                warn!(session_id, user_id, error = %e, "failed to record answer");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(session_id, user_id, error = %e, "dropping malformed client frame");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(session_id, user_id, error = %e, "transport error, closing connection");
                break;
            }
        }
    }

    machine.registry().unregister_connection(&session_id, &user_id);
    writer.abort();
    info!(session_id, user_id, "connection closed");
}
