//! Matchmaking endpoints.
//!
//! Game clients land here directly: `/match` places a player on the first
//! instance with open slots, spawning a new one when the fleet is saturated,
//! and answers with connection details plus a short-lived join token. The
//! matchmaker holds no reference to fleet state; everything goes through the
//! loopback client so the privileged API stays the single write path.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    client::ControlClient,
    config::DEFAULT_MAX_PLAYERS,
    fleet::Instance,
    matchmaking::generate_join_token,
    server::ErrorResponse,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a join token stays valid.
pub const JOIN_TOKEN_TTL_SECS: i64 = 60;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Shared state for the matchmaking handlers.
#[derive(Clone)]
pub struct MatchState {
    /// Loopback client for the privileged API.
    pub client: Arc<ControlClient>,

    /// Externally reachable address returned to game clients.
    pub public_ip: String,

    /// HMAC secret join tokens are signed with.
    pub token_secret: Arc<String>,
}

/// Connection details handed to a game client.
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchResponse {
    /// Address the client should connect to.
    pub ip: String,

    /// Port of the selected instance.
    pub port: u16,

    /// Name of the selected instance.
    pub container_name: String,

    /// Admission token to present to the game server.
    pub join_token: String,
}

/// One instance as seen by game clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerListEntry {
    /// Instance name.
    pub container_name: String,

    /// External port.
    pub port: u16,

    /// Current player count.
    pub player_count: u32,

    /// Effective player capacity.
    pub max_players: u32,

    /// Whether the instance has no open slots.
    pub full: bool,
}

/// Envelope for `GET /servers`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerListResponse {
    /// Instances with occupancy.
    pub servers: Vec<ServerListEntry>,

    /// Number of instances.
    pub count: usize,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates the matchmaking router.
pub fn create_match_router(state: MatchState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/servers", get(list_handler))
        .route("/match", post(match_handler))
        .route("/join/{name}", post(join_handler))
        .with_state(state)
}

/// Returns an instance's reported capacity, falling back to the configured
/// default until the in-container agent has reported one.
fn effective_max(instance: &Instance) -> u32 {
    if instance.max_players > 0 {
        instance.max_players
    } else {
        DEFAULT_MAX_PLAYERS
    }
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
        .into_response()
}

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

/// Handler for `GET /health`.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handler for `GET /servers`: the fleet with occupancy, as game clients see
/// it.
async fn list_handler(State(state): State<MatchState>) -> Response {
    let listing = match state.client.list_servers().await {
        Ok(listing) => listing,
        Err(e) => return internal_error(format!("failed to list servers: {}", e)),
    };

    let servers: Vec<ServerListEntry> = listing
        .servers
        .iter()
        .map(|instance| {
            let max = effective_max(instance);
            ServerListEntry {
                container_name: instance.container_name.clone(),
                port: instance.port.unwrap_or_default(),
                player_count: instance.player_count,
                max_players: max,
                full: instance.player_count >= max,
            }
        })
        .collect();

    let count = servers.len();
    Json(ServerListResponse { servers, count }).into_response()
}

/// Handler for `POST /match`: pick the first instance with open slots or
/// spawn a fresh one, then mint a join token.
async fn match_handler(State(state): State<MatchState>) -> Response {
    let listing = match state.client.list_servers().await {
        Ok(listing) => listing,
        Err(e) => return internal_error(format!("failed to find server: {}", e)),
    };

    let open = listing
        .servers
        .into_iter()
        .find(|instance| instance.player_count < effective_max(instance));

    let (container_name, port) = match open {
        Some(instance) => (instance.container_name, instance.port.unwrap_or_default()),
        None => {
            // Saturated fleet: spawn, don't queue.
            match state.client.start_server(None).await {
                Ok(started) => (started.container_name, started.port),
                Err(e) => return internal_error(format!("failed to start server: {}", e)),
            }
        }
    };

    respond_with_token(&state, container_name, port)
}

/// Handler for `POST /join/:name`: join one specific instance if it has open
/// slots.
async fn join_handler(State(state): State<MatchState>, Path(name): Path<String>) -> Response {
    let listing = match state.client.list_servers().await {
        Ok(listing) => listing,
        Err(e) => return internal_error(format!("failed to list servers: {}", e)),
    };

    let Some(target) = listing
        .servers
        .into_iter()
        .find(|instance| instance.container_name == name)
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("server {:?} not found", name),
            }),
        )
            .into_response();
    };

    let max = effective_max(&target);
    if target.player_count >= max {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!(
                    "server {:?} is full ({}/{})",
                    name, target.player_count, max
                ),
            }),
        )
            .into_response();
    }

    respond_with_token(&state, target.container_name, target.port.unwrap_or_default())
}

fn respond_with_token(state: &MatchState, container_name: String, port: u16) -> Response {
    let token = match generate_join_token(
        &state.token_secret,
        &container_name,
        port,
        JOIN_TOKEN_TTL_SECS,
    ) {
        Ok(token) => token,
        Err(_) => return internal_error("failed to generate join token".to_string()),
    };

    Json(MatchResponse {
        ip: state.public_ip.clone(),
        port,
        container_name,
        join_token: token,
    })
    .into_response()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
