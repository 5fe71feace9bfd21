//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Extension, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::Player;
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::lobby::{self, Lobby, LobbyError, LobbyMember, MATCH_SIZE};
use crate::ws::handler::ws_handler;

const LOBBY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let lobby_routes = Router::new()
        .route("/lobbies", get(list_lobbies_handler).post(create_lobby_handler))
        .route("/lobbies/join", post(join_lobby_handler))
        .route("/lobbies/leave", post(leave_lobby_handler))
        .route("/lobbies/dismiss", post(dismiss_lobby_handler))
        .route("/lobbies/start", post(start_lobby_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(LOBBY_REQUEST_TIMEOUT))
                .layer(middleware::from_fn_with_state(state.clone(), require_auth)),
        );

    Router::new()
        .merge(public_routes)
        .merge(lobby_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// CORS configuration - "*" or a comma separated list of origins
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    cors.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connected_clients: usize,
    active_matches: usize,
    queue_size: usize,
    open_lobbies: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        connected_clients: state.hub.client_count().await,
        active_matches: state.matches.len(),
        queue_size: state.matchmaking.queue_size(),
        open_lobbies: state.lobbies.len(),
    })
}

// ============================================================================
// Lobby endpoints
// ============================================================================

fn as_member(auth: &AuthenticatedUser) -> LobbyMember {
    LobbyMember {
        id: auth.player_id.clone(),
        name: auth.display_name.clone(),
    }
}

async fn list_lobbies_handler(State(state): State<AppState>) -> Json<Vec<Lobby>> {
    Json(state.lobbies.list())
}

#[derive(Deserialize, Default)]
struct CreateLobbyRequest {
    #[serde(default)]
    capacity: Option<usize>,
}

async fn create_lobby_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    req: Option<Json<CreateLobbyRequest>>,
) -> Result<(StatusCode, Json<Lobby>), AppError> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let lobby = state
        .lobbies
        .create(as_member(&auth), req.capacity.unwrap_or(MATCH_SIZE))?;
    Ok((StatusCode::CREATED, Json(lobby)))
}

#[derive(Deserialize)]
struct JoinLobbyRequest {
    code: String,
}

async fn join_lobby_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<JoinLobbyRequest>,
) -> Result<Json<Lobby>, AppError> {
    let code = req.code.trim().to_ascii_uppercase();
    Ok(Json(state.lobbies.join(&code, as_member(&auth))?))
}

#[derive(Serialize)]
struct LeaveLobbyResponse {
    code: String,
}

async fn leave_lobby_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<LeaveLobbyResponse>, AppError> {
    let code = state.lobbies.leave(&auth.player_id)?;
    Ok(Json(LeaveLobbyResponse { code }))
}

async fn dismiss_lobby_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Lobby>, AppError> {
    Ok(Json(state.lobbies.dismiss(&auth.player_id)?))
}

#[derive(Serialize)]
struct StartLobbyResponse {
    match_id: String,
    players: Vec<Player>,
}

async fn start_lobby_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<StartLobbyResponse>, AppError> {
    let game_match = lobby::launch(&state, &auth.player_id).await?;
    let snapshot = game_match.snapshot();

    Ok(Json(StartLobbyResponse {
        match_id: game_match.id().to_string(),
        players: snapshot.players.to_vec(),
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<LobbyError> for AppError {
    fn from(err: LobbyError) -> Self {
        let message = err.to_string();
        match err {
            LobbyError::NotFound | LobbyError::NoOwnedLobby | LobbyError::NotMember => {
                AppError::NotFound(message)
            }
            LobbyError::InvalidCapacity(_) => AppError::BadRequest(message),
            LobbyError::AlreadyMember
            | LobbyError::Full
            | LobbyError::InGame
            | LobbyError::RosterIncomplete { .. }
            | LobbyError::NotConnected(_)
            | LobbyError::AlreadyInMatch(_) => AppError::Conflict(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
