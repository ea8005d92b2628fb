//! Externally reachable edge router.
//!
//! Serves the dashboard over TLS and reverse-proxies API and matchmaking
//! traffic inward. The privileged API itself binds only to loopback; this
//! router is the sole externally reachable path to it.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode, Uri},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;

use crate::{
    security::{security_headers_middleware, TlsPaths},
    LudocoreError, LudocoreResult,
};

//-------------------------------------------------------------------------------------------------
// Constants
//-------------------------------------------------------------------------------------------------

const DASHBOARD_INDEX: &str = include_str!("../../assets/dashboard/index.html");
const DASHBOARD_STYLES: &str = include_str!("../../assets/dashboard/styles.css");

/// Upper bound on proxied request bodies; matches the API's own body limit.
const PROXY_BODY_LIMIT: usize = 512 * 1024 * 1024;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared state for the proxy handlers.
#[derive(Clone)]
pub struct EdgeState {
    client: reqwest::Client,

    /// Loopback base URL of the privileged API.
    api_base: String,

    /// Loopback base URL of the matchmaking surface.
    match_base: String,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl EdgeState {
    /// Creates the edge state pointing at the two loopback servers.
    pub fn new(api_addr: SocketAddr, match_addr: SocketAddr) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: format!("http://{}", api_addr),
            match_base: format!("http://{}", match_addr),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates the edge router: dashboard assets plus the two reverse proxies.
pub fn create_edge_router(state: EdgeState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/health", any(api_proxy_handler))
        .route("/api/v1/{*path}", any(api_proxy_handler))
        .route("/login", any(api_proxy_handler))
        .route("/logout", any(api_proxy_handler))
        .route("/auth/check", any(api_proxy_handler))
        .route("/match-proxy/{*path}", any(match_proxy_handler))
        .layer(middleware::from_fn(security_headers_middleware))
        .with_state(state)
}

/// Serves the edge router over TLS on `addr`.
pub async fn serve_edge(addr: SocketAddr, tls: TlsPaths, router: Router) -> LudocoreResult<()> {
    let config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
        .await
        .map_err(|e| LudocoreError::custom(anyhow::anyhow!("failed to load TLS material: {}", e)))?;

    axum_server::bind_rustls(addr, config)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

async fn index_handler() -> Html<&'static str> {
    Html(DASHBOARD_INDEX)
}

async fn styles_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/css"))],
        DASHBOARD_STYLES,
    )
}

/// Forwards the request unchanged to the privileged API on loopback.
async fn api_proxy_handler(State(state): State<EdgeState>, req: Request) -> Response {
    let target = format!("{}{}", state.api_base, path_and_query(req.uri()));
    forward(&state.client, &target, req).await
}

/// Forwards `/match-proxy/*` to the matchmaking surface, stripping the
/// prefix.
async fn match_proxy_handler(State(state): State<EdgeState>, req: Request) -> Response {
    let stripped = path_and_query(req.uri())
        .strip_prefix("/match-proxy")
        .map(|rest| {
            if rest.is_empty() {
                "/".to_string()
            } else {
                rest.to_string()
            }
        })
        .unwrap_or_else(|| "/".to_string());

    let target = format!("{}{}", state.match_base, stripped);
    forward(&state.client, &target, req).await
}

async fn forward(client: &reqwest::Client, target: &str, req: Request) -> Response {
    let method = req.method().clone();

    let mut headers = req.headers().clone();
    headers.remove(header::HOST);

    let body = match axum::body::to_bytes(req.into_body(), PROXY_BODY_LIMIT).await {
        Ok(body) => body,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let upstream = client
        .request(method, target)
        .headers(headers)
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(upstream) => {
            let mut response = Response::builder().status(upstream.status());
            if let Some(response_headers) = response.headers_mut() {
                *response_headers = upstream.headers().clone();
            }

            let bytes = upstream.bytes().await.unwrap_or_default();
            response
                .body(Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        Err(e) => {
            tracing::warn!("proxy to {} failed: {}", target, e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_proxy_prefix_stripping() {
        let uri: Uri = "/match-proxy/servers?full=1".parse().unwrap();
        let stripped = path_and_query(&uri)
            .strip_prefix("/match-proxy")
            .unwrap()
            .to_string();
        assert_eq!(stripped, "/servers?full=1");
    }
}
