//! Route definitions for the privileged REST API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::{security::security_headers_middleware, validate::MAX_UPLOAD_SIZE};

use super::{auth, handlers, recipes, state::ApiState, upload};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates the privileged API router. Bound to loopback by the daemon; the
/// edge router is the only externally reachable way in.
pub fn create_api_router(state: ApiState) -> Router {
    // State-changing endpoints additionally require a single-use CSRF token.
    let csrf_protected = Router::new()
        .route("/servers/start", post(handlers::start_server_handler))
        .route("/servers/{name}", delete(handlers::stop_server_handler))
        .route("/heartbeat", post(handlers::heartbeat_handler))
        .route("/upload", post(upload::upload_handler))
        .route(
            "/dockerfiles/active",
            post(recipes::set_active_recipe_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::csrf_middleware,
        ));

    let api = Router::new()
        .route("/csrf-token", get(handlers::csrf_token_handler))
        .route("/matchmaking/config", get(handlers::match_config_handler))
        .route("/servers", get(handlers::list_servers_handler))
        .route("/servers/{name}", get(handlers::get_server_handler))
        .route("/servers/{name}/logs", get(handlers::server_logs_handler))
        .route("/history/servers", get(handlers::server_history_handler))
        .route("/history/uploads", get(handlers::upload_history_handler))
        .route("/dockerfiles/presets", get(recipes::list_presets_handler))
        .route(
            "/dockerfiles/active",
            get(recipes::get_active_recipe_handler),
        )
        .route("/dockerfiles/history", get(recipes::recipe_history_handler))
        .merge(csrf_protected)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/login", post(auth::login_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/auth/check", get(auth::auth_check_handler))
        .nest("/api/v1", api)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE as usize + 1024 * 1024))
        .with_state(state)
}
