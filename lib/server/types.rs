//! Request and response types for the privileged REST API.

use serde::{Deserialize, Serialize};

use crate::{
    fleet::Instance,
    history::{RecipeChangeRecord, ServerEvent, UploadRecord},
};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Error response returned when an operation fails.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short error message; sensitive detail stays in the daemon log.
    pub error: String,
}

/// Request body for `POST /api/v1/servers/start`.
#[derive(Debug, Default, Deserialize)]
pub struct StartServerRequest {
    /// External port to use; empty or absent means auto-assign.
    #[serde(default)]
    pub port: Option<String>,

    /// Command override; absent means the image entrypoint.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments for the command override.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Response body for `POST /api/v1/servers/start`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartServerResponse {
    /// Generated name of the new instance.
    pub container_name: String,

    /// External port reserved for the instance.
    pub port: u16,

    /// Human-readable confirmation.
    pub message: String,
}

/// Response body for `GET /api/v1/servers`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListServersResponse {
    /// Snapshot of live instances.
    pub servers: Vec<Instance>,

    /// Number of live instances.
    pub count: usize,
}

/// Request body for `POST /api/v1/heartbeat`.
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    /// Instance reporting in.
    pub container_name: String,

    /// Current player count.
    pub player_count: u32,
}

/// Response body for `GET /api/v1/csrf-token`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CsrfTokenResponse {
    /// Single-use token for the next state-changing request.
    pub csrf_token: String,
}

/// Generic confirmation body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable confirmation.
    pub message: String,
}

/// Response body for `GET /api/v1/servers/:name/logs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerLogsResponse {
    /// Instance the logs belong to.
    pub container_name: String,

    /// Bounded log tail.
    pub logs: String,
}

/// Request body for `POST /login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// The admission API key.
    pub api_key: String,
}

/// Response body for `GET /auth/check`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthCheckResponse {
    /// Whether the request carried a valid session.
    pub authenticated: bool,
}

/// Matchmaking settings exposed to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfigResponse {
    /// Externally reachable address returned to game clients.
    pub public_ip: String,

    /// Port the matchmaking surface listens on.
    pub match_port: u16,

    /// `configured` when the operator supplied the token secret,
    /// `auto-generated` otherwise.
    pub token_secret_status: String,
}

/// Response body for `GET /api/v1/history/servers`.
#[derive(Debug, Serialize)]
pub struct ServerHistoryResponse {
    /// Lifecycle events, newest first.
    pub events: Vec<ServerEvent>,

    /// Number of events returned.
    pub count: usize,
}

/// Response body for `GET /api/v1/history/uploads`.
#[derive(Debug, Serialize)]
pub struct UploadHistoryResponse {
    /// Upload records, newest first.
    pub uploads: Vec<UploadRecord>,

    /// Number of records returned.
    pub count: usize,
}

/// Response body for `GET /api/v1/dockerfiles/history`.
#[derive(Debug, Serialize)]
pub struct RecipeHistoryResponse {
    /// Recipe changes, newest first.
    pub history: Vec<RecipeChangeRecord>,

    /// Number of records returned.
    pub count: usize,
}

/// One preset in `GET /api/v1/dockerfiles/presets`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PresetEntry {
    /// Preset name.
    pub name: String,

    /// Recipe text.
    pub content: String,
}

/// Response body for `GET /api/v1/dockerfiles/presets`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PresetListResponse {
    /// The built-in presets.
    pub presets: Vec<PresetEntry>,
}

/// Response body for `GET /api/v1/dockerfiles/active`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveRecipeResponse {
    /// Preset name, `custom`, or `binary (default)`.
    pub name: String,

    /// The active recipe text.
    pub content: String,
}

/// JSON request body for `POST /api/v1/dockerfiles/active`.
#[derive(Debug, Deserialize)]
pub struct SetActiveRecipeRequest {
    /// Preset to activate.
    #[serde(default)]
    pub preset: String,
}

/// Response body for `POST /api/v1/upload`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Human-readable confirmation.
    pub message: String,

    /// Archive filename as uploaded.
    pub file: String,

    /// Archive size in bytes.
    pub size: u64,
}
