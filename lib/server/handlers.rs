//! HTTP request handlers for the privileged REST API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    fleet::{self, FleetAddError, Instance},
    history::DEFAULT_HISTORY_LIMIT,
    runtime::RunConfig,
    server::{
        state::{ApiError, ApiState},
        types::{
            CsrfTokenResponse, HeartbeatRequest, ListServersResponse, MatchConfigResponse,
            MessageResponse, ServerHistoryResponse, ServerLogsResponse, StartServerRequest,
            StartServerResponse, UploadHistoryResponse,
        },
    },
    validate, LudocoreError,
};

//-------------------------------------------------------------------------------------------------
// Constants
//-------------------------------------------------------------------------------------------------

/// How many times to redraw a generated name that collides with a live
/// instance before giving up.
const NAME_RETRIES: usize = 10;

/// Log window returned by the logs endpoint.
const LOG_WINDOW: &str = "5m";

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Query parameters for `GET /api/v1/history/servers`.
#[derive(Debug, Default, Deserialize)]
pub struct ServerHistoryQuery {
    /// Restrict events to one instance.
    #[serde(default)]
    pub container_name: Option<String>,
}

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for `GET /health`.
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handler for `GET /api/v1/csrf-token`.
pub async fn csrf_token_handler(State(state): State<ApiState>) -> Json<CsrfTokenResponse> {
    Json(CsrfTokenResponse {
        csrf_token: state.csrf.generate_token(),
    })
}

/// Handler for `POST /api/v1/servers/start`.
///
/// The whole allocate-name-run-register span holds the start lock so two
/// concurrent starts can neither agree on a port nor on a name. The build
/// step can be slow but is normally skipped via the image cache. An auto
/// picked port is only reserved by the final `add`, so a failed run leaks
/// nothing.
pub async fn start_server_handler(
    State(state): State<ApiState>,
    Json(req): Json<StartServerRequest>,
) -> Result<(StatusCode, Json<StartServerResponse>), ApiError> {
    let requested_port = validate::validate_port(req.port.as_deref().unwrap_or_default())?;
    if let Some(command) = &req.command {
        validate::validate_command(command)?;
    }
    validate::validate_args(&req.args)?;

    let _start_guard = state.start_lock.lock().await;

    let port = match requested_port {
        Some(port) => {
            if state.fleet.is_port_used(port) {
                return Err(LudocoreError::Conflict(format!(
                    "port {} is already in use",
                    port
                ))
                .into());
            }
            port
        }
        None => state
            .fleet
            .next_free_port(state.game_base_port())
            .ok_or_else(|| {
                LudocoreError::Conflict("no free ports in the allocation range".to_string())
            })?,
    };

    let mut container_name = fleet::generate_name();
    let mut retries = 0;
    while state.fleet.get(&container_name).is_some() {
        retries += 1;
        if retries >= NAME_RETRIES {
            return Err(LudocoreError::Runtime(
                "failed to generate a unique server name after multiple attempts".to_string(),
            )
            .into());
        }
        container_name = fleet::generate_name();
    }

    if !state.docker.image_exists(&state.image_tag).await {
        let recipe = state.recipes.get_active().await?;
        state.docker.build_image(&state.image_tag, &recipe).await?;
    }

    let command = req.command.filter(|c| !c.is_empty());
    state
        .docker
        .run(&RunConfig {
            name: container_name.clone(),
            image: state.image_tag.to_string(),
            command: command.clone(),
            args: req.args.clone(),
        })
        .await?;

    let instance = Instance {
        container_name: container_name.clone(),
        port: Some(port),
        command,
        args: req.args,
        player_count: 0,
        max_players: 0,
        started_at: Utc::now(),
    };

    if let Err(e) = state.fleet.add(instance) {
        // Unreachable while the start lock is held; unwind the container if it
        // ever trips.
        let _ = state.docker.stop(&container_name).await;
        let message = match e {
            FleetAddError::NameTaken(name) => format!("instance name {} already registered", name),
            FleetAddError::PortTaken(port) => format!("port {} already reserved", port),
        };
        return Err(LudocoreError::Conflict(message).into());
    }

    state
        .pollers
        .start(&container_name, state.fleet.clone(), state.docker);

    if let Some(events) = &state.events {
        ApiState::log_event_result(
            "server start",
            events.record_server_start(&container_name, Some(port)).await,
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(StartServerResponse {
            container_name,
            port,
            message: "container started successfully".to_string(),
        }),
    ))
}

/// Handler for `GET /api/v1/servers`.
pub async fn list_servers_handler(State(state): State<ApiState>) -> Json<ListServersResponse> {
    let servers = state.fleet.list();
    let count = servers.len();
    Json(ListServersResponse { servers, count })
}

/// Handler for `GET /api/v1/servers/:name`.
pub async fn get_server_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Instance>, ApiError> {
    validate::validate_container_name(&name)?;

    let instance = state
        .fleet
        .get(&name)
        .ok_or_else(|| LudocoreError::NotFound(format!("server not found: {}", name)))?;
    Ok(Json(instance))
}

/// Handler for `DELETE /api/v1/servers/:name`.
///
/// The registry entry is claimed first, atomically, so of two concurrent
/// stops exactly one proceeds and the other sees 404. If the runtime then
/// fails to stop the container, the claim is rolled back so the operator can
/// retry.
pub async fn stop_server_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate::validate_container_name(&name)?;

    let instance = state
        .fleet
        .remove(&name)
        .ok_or_else(|| LudocoreError::NotFound(format!("server not found: {}", name)))?;

    state.pollers.stop(&name);

    if let Err(e) = state.docker.stop(&name).await {
        // Put the instance back so a retry is possible; the port was never
        // handed to anyone else because remove freed it and add re-reserves it.
        if state.fleet.add(instance).is_ok() {
            state.pollers.start(&name, state.fleet.clone(), state.docker);
        }
        return Err(e.into());
    }

    if let Some(events) = &state.events {
        ApiState::log_event_result(
            "server stop",
            events
                .record_server_stop(&name, instance.port, instance.started_at)
                .await,
        );
    }

    Ok(Json(MessageResponse {
        message: format!("server {} stopped successfully", name),
    }))
}

/// Handler for `GET /api/v1/servers/:name/logs`.
pub async fn server_logs_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ServerLogsResponse>, ApiError> {
    validate::validate_container_name(&name)?;

    if state.fleet.get(&name).is_none() {
        return Err(LudocoreError::NotFound(format!("server not found: {}", name)).into());
    }

    let logs = state.docker.logs_since(&name, LOG_WINDOW).await?;
    Ok(Json(ServerLogsResponse {
        container_name: name,
        logs,
    }))
}

/// Handler for `POST /api/v1/heartbeat`.
pub async fn heartbeat_handler(
    State(state): State<ApiState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate::validate_container_name(&req.container_name)?;
    validate::validate_player_count(req.player_count)?;

    if !state
        .fleet
        .update_player_count(&req.container_name, req.player_count)
    {
        return Err(
            LudocoreError::NotFound(format!("server not found: {}", req.container_name)).into(),
        );
    }

    Ok(Json(MessageResponse {
        message: "heartbeat received".to_string(),
    }))
}

/// Handler for `GET /api/v1/history/servers`.
pub async fn server_history_handler(
    State(state): State<ApiState>,
    Query(query): Query<ServerHistoryQuery>,
) -> Result<Json<ServerHistoryResponse>, ApiError> {
    if let Some(name) = &query.container_name {
        validate::validate_container_name(name)?;
    }

    let events = state
        .events
        .as_ref()
        .ok_or_else(|| LudocoreError::Unavailable("history tracking not enabled".to_string()))?;

    let events = events
        .server_events(query.container_name.as_deref(), DEFAULT_HISTORY_LIMIT)
        .await?;
    let count = events.len();
    Ok(Json(ServerHistoryResponse { events, count }))
}

/// Handler for `GET /api/v1/history/uploads`.
pub async fn upload_history_handler(
    State(state): State<ApiState>,
) -> Result<Json<UploadHistoryResponse>, ApiError> {
    let events = state
        .events
        .as_ref()
        .ok_or_else(|| LudocoreError::Unavailable("history tracking not enabled".to_string()))?;

    let uploads = events.upload_history(DEFAULT_HISTORY_LIMIT).await?;
    let count = uploads.len();
    Ok(Json(UploadHistoryResponse { uploads, count }))
}

/// Handler for `GET /api/v1/matchmaking/config`.
pub async fn match_config_handler(
    State(state): State<ApiState>,
) -> Result<Json<MatchConfigResponse>, ApiError> {
    let config = state
        .match_config
        .read()
        .unwrap()
        .clone()
        .ok_or_else(|| LudocoreError::NotFound("matchmaking not configured".to_string()))?;
    Ok(Json(config))
}
