//! Authentication: bearer key, sessions, CSRF, and the login endpoints.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    security::{self, SESSION_COOKIE_NAME, SESSION_DURATION_HOURS},
    server::{
        state::ApiState,
        types::{AuthCheckResponse, ErrorResponse, LoginRequest, MessageResponse},
    },
};

//-------------------------------------------------------------------------------------------------
// Functions: Middleware
//-------------------------------------------------------------------------------------------------

/// Admission predicate for `/api/v1`: a valid session cookie OR a bearer key.
/// The two are alternatives; either one admits the request. Dashboard
/// requests additionally receive a redirect hint on 401 so the UI can
/// navigate to its login screen.
pub async fn auth_middleware(
    State(state): State<ApiState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(session_id) = cookie_value(&req, SESSION_COOKIE_NAME) {
        if state.sessions.validate_session(&session_id) {
            return next.run(req).await;
        }
    }

    if let Some(token) = bearer_token(&req) {
        if !token.is_empty()
            && !state.api_key.is_empty()
            && security::constant_time_eq(token, &state.api_key)
        {
            return next.run(req).await;
        }
    }

    let dashboard_request = req
        .headers()
        .get("HX-Request")
        .is_some_and(|v| v == "true");

    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "unauthorized".to_string(),
        }),
    )
        .into_response();

    if dashboard_request {
        response
            .headers_mut()
            .insert("HX-Redirect", HeaderValue::from_static("/"));
    }
    response
}

/// CSRF check for state-changing methods: `X-CSRF-Token` must name a live
/// token, which is consumed on use.
pub async fn csrf_middleware(
    State(state): State<ApiState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let state_changing = matches!(
        *req.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );

    if state_changing {
        let token = req
            .headers()
            .get("X-CSRF-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if token.is_empty() || !state.csrf.consume_token(token) {
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse {
                    error: "invalid or missing CSRF token".to_string(),
                }),
            )
                .into_response();
        }
    }

    next.run(req).await
}

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for `POST /login`.
///
/// Verifies the submitted API key in constant time; on success all existing
/// sessions are invalidated (rotation on key use) and a fresh one is minted.
pub async fn login_handler(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> Response {
    if !security::constant_time_eq(&req.api_key, &state.api_key) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid API key".to_string(),
            }),
        )
            .into_response();
    }

    state.sessions.invalidate_all();
    let session = state.sessions.create_session();

    let mut response = (
        StatusCode::OK,
        Json(MessageResponse {
            message: "login successful".to_string(),
        }),
    )
        .into_response();

    let cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        SESSION_COOKIE_NAME,
        session.id,
        SESSION_DURATION_HOURS * 60 * 60
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

/// Handler for `POST /logout`.
pub async fn logout_handler(State(state): State<ApiState>, req: Request<Body>) -> Response {
    if let Some(session_id) = cookie_value(&req, SESSION_COOKIE_NAME) {
        state.sessions.delete_session(&session_id);
    }

    let mut response = (
        StatusCode::OK,
        Json(MessageResponse {
            message: "logged out".to_string(),
        }),
    )
        .into_response();

    let clear = format!("{}=; Path=/; Max-Age=0; HttpOnly", SESSION_COOKIE_NAME);
    if let Ok(value) = HeaderValue::from_str(&clear) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

/// Handler for `GET /auth/check`.
pub async fn auth_check_handler(
    State(state): State<ApiState>,
    req: Request<Body>,
) -> Json<AuthCheckResponse> {
    let authenticated = cookie_value(&req, SESSION_COOKIE_NAME)
        .map(|id| state.sessions.validate_session(&id))
        .unwrap_or(false);

    Json(AuthCheckResponse { authenticated })
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Extracts a named cookie from the request's `Cookie` header.
fn cookie_value(req: &Request<Body>, name: &str) -> Option<String> {
    let header = req.headers().get(header::COOKIE)?.to_str().ok()?;

    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_headers(pairs: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        for (k, v) in pairs {
            builder = builder.header(*k, *v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_cookie_value_parsing() {
        let req = request_with_headers(&[(
            "Cookie",
            "other=1; ludocore_session=abc123; trailing=x",
        )]);
        assert_eq!(
            cookie_value(&req, SESSION_COOKIE_NAME).as_deref(),
            Some("abc123")
        );
        assert_eq!(cookie_value(&req, "missing"), None);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let req = request_with_headers(&[("Authorization", "Bearer deadbeef")]);
        assert_eq!(bearer_token(&req), Some("deadbeef"));

        let req = request_with_headers(&[("Authorization", "Basic deadbeef")]);
        assert_eq!(bearer_token(&req), None);

        let req = request_with_headers(&[]);
        assert_eq!(bearer_token(&req), None);
    }
}
