//! WebSocket endpoint: authenticate the handshake, register the session
//! with the hub, then run a reader loop and a writer task. The writer owns
//! the socket sink and is the only place frames and pings are written.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use core_lib::auth::{self, AuthenticatedUser};

use crate::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Client -> server control messages. Anything else is ignored.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Inbound {
    #[serde(rename_all = "camelCase")]
    Subscribe { organization_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { organization_id: Uuid },
    #[serde(other)]
    Unknown,
}

/// Handler registered at `/api/ws`. The token comes from the Authorization
/// header or, for browser clients, the `token` query parameter.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(auth::bearer_token)
        .map(|t| t.to_string())
        .or(query.token);

    let Some(token) = token else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let principal = match auth::verify_token(&token, state.config.jwt_secret.as_bytes()) {
        Ok(principal) => principal,
        Err(e) => {
            warn!("WebSocket handshake rejected: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(ws.on_upgrade(move |socket| run_session(socket, state, principal)))
}

async fn run_session(socket: WebSocket, state: AppState, principal: AuthenticatedUser) {
    let conn_id = Uuid::new_v4();
    let user_id = principal.user_id;
    let mut outbound = state
        .hub
        .register(conn_id, user_id, principal.organizations.clone());
    info!(
        "WebSocket session {} established for user {}.",
        conn_id, user_id
    );

    let (mut sink, mut stream) = socket.split();
    let last_pong = Arc::new(Mutex::new(Instant::now()));

    // Writer: drains the session queue, sends protocol pings, and enforces
    // the pong deadline. Ends when the hub drops the sender.
    let ping_interval = state.config.ws_ping_interval;
    let pong_timeout = state.config.ws_pong_timeout;
    let writer_pong = last_pong.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        loop {
            tokio::select! {
                maybe_frame = outbound.recv() => {
                    let Some(frame) = maybe_frame else { break };
                    let Ok(text) = serde_json::to_string(&frame) else { continue };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    let stale = writer_pong
                        .lock()
                        .map(|last| last.elapsed() > pong_timeout)
                        .unwrap_or(true);
                    if stale {
                        info!("Session pong deadline missed; closing.");
                        break;
                    }
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader: control messages and pong bookkeeping. Pings from the client
    // are answered by the websocket layer itself. The loop also ends when
    // the writer does, so a dead peer cannot leave the task parked forever.
    let mut writer_done = false;
    loop {
        tokio::select! {
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                break;
            }
            maybe_message = stream.next() => {
                let Some(Ok(message)) = maybe_message else { break };
                match message {
                    Message::Text(text) => match serde_json::from_str::<Inbound>(&text) {
                        Ok(Inbound::Subscribe { organization_id }) => {
                            state.hub.subscribe(conn_id, organization_id);
                        }
                        Ok(Inbound::Unsubscribe { organization_id }) => {
                            state.hub.unsubscribe(conn_id, organization_id);
                        }
                        Ok(Inbound::Unknown) | Err(_) => {
                            debug!("Ignoring unrecognized message on session {}.", conn_id);
                        }
                    },
                    Message::Pong(_) => {
                        if let Ok(mut last) = last_pong.lock() {
                            *last = Instant::now();
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.hub.remove(conn_id);
    if !writer_done {
        let _ = writer.await;
    }
    info!("WebSocket session {} terminated.", conn_id);
}
