//! Shared state for the privileged API.

use std::sync::{
    atomic::{AtomicU16, Ordering},
    Arc, RwLock,
};

use axum::{http::StatusCode, response::IntoResponse, Json};
use tokio::sync::Mutex;

use crate::{
    config::{DEFAULT_GAME_PORT, DEFAULT_IMAGE_TAG},
    fleet::FleetState,
    history::EventLog,
    runtime::{DockerCli, PollerSet, RecipeManager},
    security::{CsrfManager, SessionStore},
    server::types::{ErrorResponse, MatchConfigResponse},
    LudocoreError,
};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared state for all privileged-API request handlers.
///
/// Cloning is cheap; everything mutable sits behind its own lock. The start
/// lock serializes the instance-start critical section: port pick, name pick,
/// run, and registration happen under it so two concurrent starts can never
/// agree on a port or a name.
#[derive(Clone)]
pub struct ApiState {
    /// Authoritative instance registry.
    pub fleet: Arc<FleetState>,

    /// Container runtime adapter.
    pub docker: DockerCli,

    /// Recipe storage.
    pub recipes: RecipeManager,

    /// Event log; `None` when history tracking failed to initialize.
    pub events: Option<EventLog>,

    /// Dashboard session store.
    pub sessions: Arc<SessionStore>,

    /// Single-use CSRF tokens.
    pub csrf: Arc<CsrfManager>,

    /// Per-instance poller cancellation handles.
    pub pollers: Arc<PollerSet>,

    /// The admission API key.
    pub api_key: Arc<String>,

    /// Image tag instances run from.
    pub image_tag: Arc<String>,

    /// Serializes the instance-start critical section.
    pub start_lock: Arc<Mutex<()>>,

    /// Base port for auto-allocation; adjustable via the upload form.
    pub base_port: Arc<AtomicU16>,

    /// Matchmaking settings surfaced to the dashboard.
    pub match_config: Arc<RwLock<Option<MatchConfigResponse>>>,
}

/// Wrapper that converts a [`LudocoreError`] into the HTTP response policy of
/// the admission router. Handlers bubble errors with `?`.
pub struct ApiError(pub LudocoreError);

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ApiState {
    /// Creates the API state around its collaborators.
    pub fn new(
        fleet: Arc<FleetState>,
        docker: DockerCli,
        recipes: RecipeManager,
        events: Option<EventLog>,
        api_key: String,
    ) -> Self {
        Self {
            fleet,
            docker,
            recipes,
            events,
            sessions: Arc::new(SessionStore::new()),
            csrf: Arc::new(CsrfManager::new()),
            pollers: Arc::new(PollerSet::new()),
            api_key: Arc::new(api_key),
            image_tag: Arc::new(DEFAULT_IMAGE_TAG.to_string()),
            start_lock: Arc::new(Mutex::new(())),
            base_port: Arc::new(AtomicU16::new(DEFAULT_GAME_PORT)),
            match_config: Arc::new(RwLock::new(None)),
        }
    }

    /// Publishes the matchmaking settings shown by the dashboard.
    pub fn set_match_config(&self, config: MatchConfigResponse) {
        *self.match_config.write().unwrap() = Some(config);
    }

    /// Returns the current auto-allocation base port.
    pub fn game_base_port(&self) -> u16 {
        self.base_port.load(Ordering::Relaxed)
    }

    /// Adjusts the auto-allocation base port.
    pub fn set_game_base_port(&self, port: u16) {
        self.base_port.store(port, Ordering::Relaxed);
    }

    /// Records an event-log write, logging and swallowing failures; the event
    /// log is best-effort and never fails the triggering operation.
    pub fn log_event_result(context: &str, result: crate::LudocoreResult<()>) {
        if let Err(e) = result {
            tracing::warn!("failed to record {} in event log: {}", context, e);
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Trait Implementations
//-------------------------------------------------------------------------------------------------

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            LudocoreError::Validation(_) => StatusCode::BAD_REQUEST,
            LudocoreError::Auth(_) | LudocoreError::Token(_) => StatusCode::UNAUTHORIZED,
            LudocoreError::NotFound(_) => StatusCode::NOT_FOUND,
            LudocoreError::Conflict(_) => StatusCode::CONFLICT,
            LudocoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Stack traces and paths stay in the daemon log.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<LudocoreError> for ApiError {
    fn from(error: LudocoreError) -> Self {
        Self(error)
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: LudocoreError) -> StatusCode {
        ApiError(error).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(LudocoreError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LudocoreError::Auth("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(LudocoreError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LudocoreError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LudocoreError::Unavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(LudocoreError::Build("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(LudocoreError::Token(crate::TokenError::Expired)),
            StatusCode::UNAUTHORIZED
        );
    }
}
