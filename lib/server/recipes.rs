//! Recipe endpoints: presets, the active recipe, and change history.

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, State},
    http::{header, Request},
    Json,
};

use crate::{
    history::DEFAULT_HISTORY_LIMIT,
    server::{
        state::{ApiError, ApiState},
        types::{
            ActiveRecipeResponse, MessageResponse, PresetEntry, PresetListResponse,
            RecipeHistoryResponse, SetActiveRecipeRequest,
        },
    },
    validate, LudocoreError, LudocoreResult,
};

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for `GET /api/v1/dockerfiles/presets`.
pub async fn list_presets_handler(State(state): State<ApiState>) -> Json<PresetListResponse> {
    let presets = state
        .recipes
        .list_presets()
        .iter()
        .filter_map(|name| {
            state.recipes.get_preset(name).map(|content| PresetEntry {
                name: name.to_string(),
                content,
            })
        })
        .collect();

    Json(PresetListResponse { presets })
}

/// Handler for `GET /api/v1/dockerfiles/active`.
pub async fn get_active_recipe_handler(
    State(state): State<ApiState>,
) -> Result<Json<ActiveRecipeResponse>, ApiError> {
    let content = state.recipes.get_active().await?;
    let name = state.recipes.active_name().await;
    Ok(Json(ActiveRecipeResponse { name, content }))
}

/// Handler for `POST /api/v1/dockerfiles/active`.
///
/// Accepts either JSON `{preset}` or a multipart form with a `dockerfile`
/// file. Every successful change invalidates the cached image tag so the
/// next start rebuilds.
pub async fn set_active_recipe_handler(
    State(state): State<ApiState>,
    req: Request<Body>,
) -> Result<Json<MessageResponse>, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| LudocoreError::Validation(format!("invalid multipart body: {}", e)))?;
        let content = read_recipe_field(multipart).await?;

        validate::validate_recipe(&content)?;
        state.recipes.set_active_text(&content).await?;
        record_change(&state, "dockerfile", "custom", "uploaded via API").await;
        state.docker.remove_image(&state.image_tag).await?;

        return Ok(Json(MessageResponse {
            message: "active recipe set from upload".to_string(),
        }));
    }

    let body = axum::body::to_bytes(req.into_body(), validate::MAX_RECIPE_SIZE * 2)
        .await
        .map_err(|_| LudocoreError::Validation("request body too large".to_string()))?;
    let parsed: SetActiveRecipeRequest = serde_json::from_slice(&body)
        .map_err(|_| LudocoreError::Validation("invalid request body".to_string()))?;

    if parsed.preset.is_empty() {
        return Err(LudocoreError::Validation("preset name is required".to_string()).into());
    }
    validate::validate_preset_name(&parsed.preset)?;
    state.recipes.set_active_from_preset(&parsed.preset).await?;
    record_change(
        &state,
        &parsed.preset,
        &format!("preset:{}", parsed.preset),
        "set via API",
    )
    .await;
    state.docker.remove_image(&state.image_tag).await?;

    Ok(Json(MessageResponse {
        message: format!("active recipe set to preset: {}", parsed.preset),
    }))
}

/// Handler for `GET /api/v1/dockerfiles/history`.
pub async fn recipe_history_handler(
    State(state): State<ApiState>,
) -> Result<Json<RecipeHistoryResponse>, ApiError> {
    let events = state
        .events
        .as_ref()
        .ok_or_else(|| LudocoreError::Unavailable("history tracking not enabled".to_string()))?;

    let history = events.recipe_history(DEFAULT_HISTORY_LIMIT).await?;
    let count = history.len();
    Ok(Json(RecipeHistoryResponse { history, count }))
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Pulls the `dockerfile` field out of a multipart form.
async fn read_recipe_field(mut multipart: Multipart) -> LudocoreResult<String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| LudocoreError::Validation(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("dockerfile") {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| LudocoreError::Validation(format!("invalid form field: {}", e)))?;
        return String::from_utf8(bytes.to_vec())
            .map_err(|_| LudocoreError::Validation("recipe is not valid UTF-8".to_string()));
    }

    Err(LudocoreError::Validation(
        "failed to read dockerfile from form".to_string(),
    ))
}

async fn record_change(state: &ApiState, name: &str, source: &str, notes: &str) {
    if let Some(events) = &state.events {
        ApiState::log_event_result(
            "recipe change",
            events.record_recipe_change(name, source, notes).await,
        );
    }
}
