//! Integration tests for the privileged API router: admission, CSRF, session
//! rotation, and the read-only surfaces. Everything here runs against the
//! real router with an in-memory event log; nothing touches the container
//! runtime.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use tower::util::ServiceExt;

use ludocore::{
    fleet::{FleetState, Instance},
    history::EventLog,
    runtime::{DockerCli, RecipeManager},
    server::{create_api_router, ApiState, MatchConfigResponse},
};

const TEST_API_KEY: &str = "63cf18642b1e49b1a5f4a2c11f92f8d663cf18642b1e49b1a5f4a2c11f92f8d6";

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

async fn test_router() -> (Router, ApiState, tempfile::TempDir) {
    let recipes_dir = tempfile::tempdir().unwrap();
    let events = EventLog::open_in_memory().await.unwrap();

    let state = ApiState::new(
        Arc::new(FleetState::new()),
        DockerCli::new(),
        RecipeManager::with_dir(recipes_dir.path()),
        Some(events),
        TEST_API_KEY.to_string(),
    );

    (create_api_router(state.clone()), state, recipes_dir)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
        .body(Body::empty())
        .unwrap()
}

async fn fetch_csrf_token(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(authed_get("/api/v1/csrf-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["csrf_token"]
        .as_str()
        .unwrap()
        .to_string()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_health_is_unauthenticated() {
    let (router, _, _guard) = test_router().await;

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let (router, _, _guard) = test_router().await;

    // A public route and an unauthorized one both carry the full header set.
    for request in [get("/health"), get("/api/v1/servers")] {
        let response = router.clone().oneshot(request).await.unwrap();
        let headers = response.headers();

        assert_eq!(headers["X-Frame-Options"], "DENY");
        assert_eq!(headers["X-Content-Type-Options"], "nosniff");
        assert_eq!(headers["Referrer-Policy"], "strict-origin-when-cross-origin");
        assert!(headers.contains_key("Content-Security-Policy"));
        assert!(headers.contains_key("Permissions-Policy"));
    }
}

#[tokio::test]
async fn test_api_requires_auth() {
    let (router, _, _guard) = test_router().await;

    let response = router.clone().oneshot(get("/api/v1/servers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong_key = Request::builder()
        .uri("/api/v1/servers")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(wrong_key).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router.oneshot(authed_get("/api/v1/servers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_dashboard_unauthorized_gets_redirect_hint() {
    let (router, _, _guard) = test_router().await;

    let request = Request::builder()
        .uri("/api/v1/servers")
        .header("HX-Request", "true")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["HX-Redirect"], "/");
}

#[tokio::test]
async fn test_state_changing_requires_single_use_csrf() {
    let (router, state, _guard) = test_router().await;

    state
        .fleet
        .add(Instance {
            container_name: "shadow-dragon".to_string(),
            port: Some(7777),
            command: None,
            args: vec![],
            player_count: 0,
            max_players: 0,
            started_at: chrono::Utc::now(),
        })
        .unwrap();

    let heartbeat = |csrf: Option<String>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/heartbeat")
            .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = csrf {
            builder = builder.header("X-CSRF-Token", token);
        }
        builder
            .body(Body::from(
                r#"{"container_name":"shadow-dragon","player_count":3}"#,
            ))
            .unwrap()
    };

    // Missing token: rejected before the handler runs.
    let response = router.clone().oneshot(heartbeat(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Valid token: accepted and consumed.
    let token = fetch_csrf_token(&router).await;
    let response = router
        .clone()
        .oneshot(heartbeat(Some(token.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        state.fleet.get("shadow-dragon").unwrap().player_count,
        3
    );

    // Replaying the same token: rejected.
    let response = router.clone().oneshot(heartbeat(Some(token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_heartbeat_unknown_instance_is_404() {
    let (router, _, _guard) = test_router().await;

    let token = fetch_csrf_token(&router).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/heartbeat")
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-CSRF-Token", token)
        .body(Body::from(r#"{"container_name":"ghost","player_count":1}"#))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_rejects_invalid_port_before_runtime() {
    let (router, _, _guard) = test_router().await;

    for port in ["0", "65536", "-1", "sevens"] {
        let token = fetch_csrf_token(&router).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/servers/start")
            .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-CSRF-Token", token)
            .body(Body::from(format!(r#"{{"port":"{}"}}"#, port)))
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "port {port}");
    }
}

#[tokio::test]
async fn test_start_rejects_conflicting_port() {
    let (router, state, _guard) = test_router().await;

    state
        .fleet
        .add(Instance {
            container_name: "iron-golem".to_string(),
            port: Some(7777),
            command: None,
            args: vec![],
            player_count: 0,
            max_players: 0,
            started_at: chrono::Utc::now(),
        })
        .unwrap();

    let token = fetch_csrf_token(&router).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/servers/start")
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-CSRF-Token", token)
        .body(Body::from(r#"{"port":"7777"}"#))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_rotation_invalidates_previous_session() {
    let (router, _, _guard) = test_router().await;

    let login = || {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"api_key":"{}"}}"#, TEST_API_KEY)))
            .unwrap()
    };

    let session_cookie = |response: &axum::response::Response| {
        response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    };

    let response = router.clone().oneshot(login()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = session_cookie(&response);

    // The first session authenticates API calls on its own.
    let request = Request::builder()
        .uri("/api/v1/servers")
        .header(header::COOKIE, first.clone())
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A second login rotates: the old session dies, the new one works.
    let response = router.clone().oneshot(login()).await.unwrap();
    let second = session_cookie(&response);
    assert_ne!(first, second);

    let request = Request::builder()
        .uri("/api/v1/servers")
        .header(header::COOKIE, first)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/servers")
        .header(header::COOKIE, second)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejects_wrong_key() {
    let (router, _, _guard) = test_router().await;

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"api_key":"wrong"}"#))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!response.headers().contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_history_endpoints() {
    let (router, state, _guard) = test_router().await;

    let events = state.events.as_ref().unwrap();
    events
        .record_server_start("shadow-dragon", Some(7777))
        .await
        .unwrap();
    events
        .record_upload("build.zip", 1024, false, "zip validation failed")
        .await
        .unwrap();

    let response = router
        .clone()
        .oneshot(authed_get("/api/v1/history/servers"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["events"][0]["container_name"], "shadow-dragon");

    let response = router
        .clone()
        .oneshot(authed_get("/api/v1/history/uploads"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["uploads"][0]["success"], false);

    // Name filter validation still applies.
    let response = router
        .oneshot(authed_get("/api/v1/history/servers?container_name=-bad"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_match_config_endpoint() {
    let (router, state, _guard) = test_router().await;

    let response = router
        .clone()
        .oneshot(authed_get("/api/v1/matchmaking/config"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    state.set_match_config(MatchConfigResponse {
        public_ip: "203.0.113.7".to_string(),
        match_port: 7070,
        token_secret_status: "configured".to_string(),
    });

    let response = router
        .oneshot(authed_get("/api/v1/matchmaking/config"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["public_ip"], "203.0.113.7");
    assert_eq!(body["token_secret_status"], "configured");
}

#[tokio::test]
async fn test_recipe_endpoints() {
    let (router, _, _guard) = test_router().await;

    let response = router
        .clone()
        .oneshot(authed_get("/api/v1/dockerfiles/presets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let names: Vec<&str> = body["presets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["unity", "binary"]);

    let response = router
        .oneshot(authed_get("/api/v1/dockerfiles/active"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "binary (default)");
    assert!(body["content"].as_str().unwrap().contains("FROM"));
}

#[tokio::test]
async fn test_get_server_not_found_vs_invalid() {
    let (router, _, _guard) = test_router().await;

    let response = router
        .clone()
        .oneshot(authed_get("/api/v1/servers/ghost-server"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(authed_get("/api/v1/servers/_bad"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
