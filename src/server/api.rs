use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::crawler::ScrapeRequest;
use crate::server::auth::ApiKeyAuth;
use crate::server::web::{csv_attachment, task_snapshot};
use crate::server::{error_response, AppState};
use crate::storage::keys::mask_key;
use crate::storage::{load_keywords, ResultStore};

const API_DESCRIPTION: &str =
    "LinkedIn People Scraper API - Access LinkedIn scraping functionality programmatically";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(api_status))
        .route("/auth/token", post(issue_token))
        .route("/admin/keys", get(list_keys).post(create_key))
        .route("/admin/keys/{api_key}", delete(delete_key))
        .route("/keywords", get(keywords))
        .route("/tasks", post(start_task))
        .route("/tasks/{task_id}", get(task_status))
        .route("/tasks/{task_id}/results", get(task_results))
        .route("/tasks/{task_id}/download", get(download))
}

/// Either a comma-separated string or a list of strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl Default for StringOrList {
    fn default() -> Self {
        StringOrList::Many(Vec::new())
    }
}

impl StringOrList {
    /// Entries as given; a single string is split on commas
    pub fn into_entries(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => s.split(',').map(str::to_string).collect(),
            StringOrList::Many(list) => list,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewKeyRequest {
    #[serde(default = "default_key_name")]
    name: String,
    #[serde(default)]
    description: String,
}

fn default_key_name() -> String {
    "API Key".to_string()
}

#[derive(Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    companies: StringOrList,
    #[serde(default)]
    keywords: StringOrList,
}

pub async fn api_status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "description": API_DESCRIPTION,
    }))
}

pub async fn issue_token(State(state): State<Arc<AppState>>, Json(body): Json<TokenRequest>) -> Response {
    let Some(api_key) = body.api_key.filter(|k| !k.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "API key is required");
    };
    if !state.keys.validate(&api_key).await {
        return error_response(StatusCode::UNAUTHORIZED, "Invalid API key");
    }

    match state.jwt.create_token(&api_key) {
        Ok(token) => Json(json!({
            "status": "success",
            "access_token": token,
            "token_type": "bearer",
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to sign access token: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create access token")
        }
    }
}

pub async fn list_keys(_auth: ApiKeyAuth, State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "status": "success", "keys": state.keys.list().await }))
}

pub async fn create_key(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewKeyRequest>,
) -> Response {
    match state.keys.create(&body.name, &body.description).await {
        Ok(api_key) => {
            info!("Created API key '{}'", body.name);
            Json(json!({
                "status": "success",
                "api_key": api_key,
                "name": body.name,
                "description": body.description,
            }))
            .into_response()
        }
        Err(e) => {
            error!("Failed to create API key: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create API key")
        }
    }
}

pub async fn delete_key(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(api_key): Path<String>,
) -> Response {
    match state.keys.delete(&api_key).await {
        Ok(true) => Json(json!({ "status": "success", "message": "API key deleted" })).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "API key not found"),
        Err(e) => {
            error!("Failed to delete API key: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete API key")
        }
    }
}

pub async fn keywords(_auth: ApiKeyAuth, State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let keywords = load_keywords(&state.config.storage.keywords_file);
    Json(json!({ "status": "success", "keywords": keywords }))
}

pub async fn start_task(
    auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TaskPayload>,
) -> Response {
    let request = match ScrapeRequest::new(
        body.companies.into_entries(),
        body.keywords.into_entries(),
        &body.email,
        &body.password,
    ) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    info!(
        "API task starting for key {} with keywords: {:?}",
        mask_key(&auth.api_key),
        request.keywords()
    );
    let task_id = state.controller.submit(request).await;

    Json(json!({
        "status": "success",
        "message": "Task started successfully",
        "task_id": task_id,
    }))
    .into_response()
}

pub async fn task_status(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    task_snapshot(state.controller.registry(), &task_id).await
}

pub async fn task_results(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    let Some(record) = state.controller.registry().get(&task_id).await else {
        return error_response(StatusCode::NOT_FOUND, "Task not found");
    };

    match ResultStore::new(&record.output_file).read_all() {
        Ok(Some(rows)) => Json(json!({
            "status": "success",
            "count": rows.len(),
            "results": rows,
        }))
        .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Output file not found"),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error reading results: {:#}", e),
        ),
    }
}

pub async fn download(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    csv_attachment(state.controller.registry(), &task_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ProfileMatch;
    use crate::server::test_support::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn issued_key(test: &TestApp) -> String {
        test.state.keys.create("test", "").await.unwrap()
    }

    #[test]
    fn string_or_list_entries() {
        let one: StringOrList = serde_json::from_value(json!("acme, globex")).unwrap();
        assert_eq!(one.into_entries(), ["acme", " globex"]);
        let many: StringOrList = serde_json::from_value(json!(["acme", "globex"])).unwrap();
        assert_eq!(many.into_entries(), ["acme", "globex"]);
    }

    #[tokio::test]
    async fn status_is_public() {
        let test = test_app("").await;
        let response = test.app
            .oneshot(Request::get("/api/v1/status").body(empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "online");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn protected_routes_require_a_key() {
        let test = test_app("").await;
        for uri in ["/api/v1/keywords", "/api/v1/admin/keys", "/api/v1/tasks/x", "/api/v1/keywords?api_key=bogus"] {
            let response = test.app.clone()
                .oneshot(Request::get(uri).body(empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body_json(response).await["message"], "Invalid or missing API key");
        }
    }

    #[tokio::test]
    async fn token_exchange_and_bearer_access() {
        let test = test_app("").await;
        let key = issued_key(&test).await;

        let response = test.app.clone()
            .oneshot(json_request("POST", "/api/v1/auth/token", json!({ "api_key": key })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["token_type"], "bearer");
        let token = json["access_token"].as_str().unwrap().to_string();

        let response = test.app.clone()
            .oneshot(
                Request::get("/api/v1/keywords")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // tokens stop working once their key is deleted
        assert!(test.state.keys.delete(&key).await.unwrap());
        let response = test.app
            .oneshot(
                Request::get("/api/v1/keywords")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_exchange_rejects_bad_input() {
        let test = test_app("").await;

        let response = test.app.clone()
            .oneshot(json_request("POST", "/api/v1/auth/token", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "API key is required");

        let response = test.app
            .oneshot(json_request("POST", "/api/v1/auth/token", json!({ "api_key": "nope" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_key_lifecycle() {
        let test = test_app("").await;
        let key = issued_key(&test).await;
        let auth = format!("api_key={key}");

        let response = test.app.clone()
            .oneshot(json_request("POST", &format!("/api/v1/admin/keys?{auth}"), json!({ "name": "ci" })))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["name"], "ci");
        assert_eq!(json["description"], "");
        let created = json["api_key"].as_str().unwrap().to_string();

        let response = test.app.clone()
            .oneshot(Request::get(format!("/api/v1/admin/keys?{auth}")).body(empty()).unwrap())
            .await
            .unwrap();
        let keys = body_json(response).await["keys"].as_array().unwrap().clone();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k["masked_key"].as_str().unwrap().ends_with('*')));

        let response = test.app.clone()
            .oneshot(
                Request::delete(format!("/api/v1/admin/keys/{created}?{auth}"))
                    .body(empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = test.app
            .oneshot(
                Request::delete(format!("/api/v1/admin/keys/{created}?{auth}"))
                    .body(empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_task_accepts_strings_and_lists() {
        let test = test_app("").await;
        let key = issued_key(&test).await;

        let response = test.app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/tasks?api_key={key}"),
                json!({
                    "email": "me@example.com",
                    "password": "pw",
                    "companies": "acme, globex",
                    "keywords": ["engineer, manager", "sales"],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task_id = body_json(response).await["task_id"].as_str().unwrap().to_string();

        let response = test.app
            .oneshot(Request::get(format!("/api/v1/tasks/{task_id}?api_key={key}")).body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["logs"].is_array());
    }

    #[tokio::test]
    async fn start_task_validates_payload() {
        let test = test_app("").await;
        let key = issued_key(&test).await;

        let response = test.app
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/tasks?api_key={key}"),
                json!({ "companies": ["acme"], "keywords": "engineer" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "LinkedIn credentials are required");
        assert_eq!(test.state.controller.registry().len().await, 0);
    }

    #[tokio::test]
    async fn results_are_returned_as_json_rows() {
        let test = test_app("").await;
        let key = issued_key(&test).await;
        let task_id = test.state.controller.create_task().await;

        let uri = format!("/api/v1/tasks/{task_id}/results?api_key={key}");
        let response = test.app.clone().oneshot(Request::get(&uri).body(empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Output file not found");

        let record = test.state.controller.registry().get(&task_id).await.unwrap();
        ResultStore::new(&record.output_file)
            .append(&[ProfileMatch {
                name: "Grace Hopper".into(),
                href: "https://www.linkedin.com/in/grace".into(),
                company: "navy".into(),
                keyword: "admiral".into(),
                url: "https://www.linkedin.com/company/navy/people/?keywords=admiral".into(),
            }])
            .unwrap();

        let response = test.app.oneshot(Request::get(&uri).body(empty()).unwrap()).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["results"][0]["name"], "Grace Hopper");
        assert_eq!(json["results"][0]["company"], "navy");
    }
}
