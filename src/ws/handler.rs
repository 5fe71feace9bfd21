//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::http::middleware::verify_jwt;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::dispatch::{disconnect, dispatch};
use crate::ws::hub::{Client, ClientReceiver, PlayerIdentity};
use crate::ws::protocol::{ProtocolError, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session token issued by the identity provider
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        warn!("WebSocket upgrade without token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };

    // Verify token before upgrading
    match verify_jwt(&token, &state.config.auth_secret) {
        Ok(claims) => {
            let identity = claims.identity();
            info!(player_id = %identity.id, "WebSocket upgrade for authenticated player");
            ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: PlayerIdentity, state: AppState) {
    let (client, outbound) = Client::new(identity, state.config.client_send_buffer);
    let player_id = client.player_id().to_string();
    info!(player_id = %player_id, client_id = %client.id(), "New WebSocket connection");

    state.hub.register(client.clone()).await;

    let welcome = ServerMsg::Welcome {
        player_id: player_id.clone(),
        name: client.identity().name.clone(),
    };
    match welcome.encode() {
        Ok(frame) => {
            if let Err(e) = client.try_deliver(frame) {
                debug!(player_id = %player_id, error = %e, "Welcome not delivered");
            }
        }
        Err(e) => error!(player_id = %player_id, error = %e, "Failed to encode welcome"),
    }

    run_session(&state, &client, socket, outbound).await;

    disconnect(&state, &client).await;
    info!(player_id = %player_id, client_id = %client.id(), "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    state: &AppState,
    client: &Client,
    socket: WebSocket,
    mut outbound: ClientReceiver,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let rate_limiter = PlayerRateLimiter::new(state.config.input_rate_limit);

    // Writer task: outbound queue -> WebSocket
    let writer_client = client.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
                debug!(player_id = %writer_client.player_id(), error = %e, "WebSocket send failed");
                writer_client.close();
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> dispatch, until the peer leaves or the hub closes us
    loop {
        let next = tokio::select! {
            _ = client.closed() => {
                debug!(player_id = %client.player_id(), "Connection closed by server");
                break;
            }
            next = ws_stream.next() => next,
        };

        let Some(result) = next else {
            break;
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %client.player_id(), "Rate limited input message");
                    continue;
                }
                dispatch(state, client, &text).await;
            }
            Ok(Message::Binary(bytes)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %client.player_id(), "Rate limited input message");
                    continue;
                }
                match std::str::from_utf8(&bytes) {
                    Ok(text) => dispatch(state, client, text).await,
                    Err(_) => {
                        warn!(
                            player_id = %client.player_id(),
                            error = %ProtocolError::NotUtf8,
                            "Ignoring binary frame"
                        );
                    }
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %client.player_id(), "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(player_id = %client.player_id(), error = %e, "WebSocket error");
                break;
            }
        }
    }

    client.close();
    writer_handle.abort();
}
