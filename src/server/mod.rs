pub mod api;
pub mod auth;
pub mod rate_limit;
pub mod web;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::cli::config::AppConfig;
use crate::crawler::ScrapeController;
use crate::storage::ApiKeyStore;
use auth::JwtService;
use rate_limit::RateLimiter;

/// Upload size cap for the web form
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub struct AppState {
    pub controller: ScrapeController,
    pub keys: ApiKeyStore,
    pub jwt: JwtService,
    pub limiter: RateLimiter,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, controller: ScrapeController) -> Self {
        let jwt = JwtService::new(&config.jwt_secret(), config.auth.token_expiry_hours);
        Self {
            controller,
            keys: ApiKeyStore::new(&config.auth.keys_file),
            jwt,
            limiter: RateLimiter::new(Duration::from_secs(config.server.rate_limit_secs)),
            config: Arc::new(config),
        }
    }
}

/// JSON error body shared by every route
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "status": "error", "message": message.into() })),
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    let base_path = state.config.server.route_prefix();

    let app = Router::new()
        .route("/", get(web::index))
        .route("/keywords", get(web::keywords))
        .route("/start_scrape", post(web::start_scrape))
        .route("/task_status/{task_id}", get(web::task_status))
        .route("/download/{task_id}", get(web::download))
        .nest("/api/v1", api::routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let app = if base_path.is_empty() {
        app
    } else {
        Router::new().nest(&base_path, app)
    };

    app.layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
    // method + path + status + latency only; query strings may carry API keys
    .layer(
        tower_http::trace::TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        }),
    )
}

/// Create a key when the store is empty so a fresh install can reach the API.
/// Returns the new key, if one was created.
pub async fn ensure_default_key(keys: &ApiKeyStore) -> Result<Option<String>> {
    if !keys.is_empty().await {
        return Ok(None);
    }
    let key = keys
        .create("Default API Key", "Created on first startup")
        .await
        .context("Failed to create default API key")?;
    Ok(Some(key))
}

/// Bind and run the web UI and API until the process is stopped
pub async fn serve(state: AppState) -> Result<()> {
    if let Some(key) = ensure_default_key(&state.keys).await? {
        warn!("No API keys found, created a default key: {}", key);
        println!("\nDefault API Key: {}\nStore this key securely. It is required to access the API.\n", key);
    }

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let base_path = state.config.server.route_prefix();
    let app = router(Arc::new(state));

    info!("People scraper listening on http://{}{}/", addr, base_path);
    info!("API available at http://{}{}/api/v1/status", addr, base_path);

    let listener = tokio::net::TcpListener::bind(&addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn default_key_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let keys = ApiKeyStore::new(dir.path().join("keys.json"));

        let first = ensure_default_key(&keys).await.unwrap();
        assert!(first.is_some());
        assert!(keys.validate(first.as_deref().unwrap()).await);
        assert_eq!(ensure_default_key(&keys).await.unwrap(), None);
        assert_eq!(keys.list().await.len(), 1);
    }

    #[tokio::test]
    async fn routes_are_nested_under_base_path() {
        let test = test_app("/linkedinpeoplescraper").await;

        let response = test.app.clone()
            .oneshot(Request::get("/linkedinpeoplescraper/api/v1/status").body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = test.app
            .oneshot(Request::get("/api/v1/status").body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn error_body_shape() {
        let response = error_response(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "status": "error", "message": "nope" })
        );
    }
}
