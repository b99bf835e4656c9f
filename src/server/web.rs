use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{info, warn};

use crate::crawler::{ScrapeRequest, TaskRegistry};
use crate::server::{error_response, AppState};
use crate::storage::{load_keywords, uploads};

const INDEX_HTML: &str = include_str!("templates/index.html");

/// Fields of the web form. Credentials never leave this struct except into a `ScrapeRequest`.
#[derive(Default)]
struct ScrapeForm {
    email: String,
    password: String,
    companies: String,
    keywords: Vec<String>,
    company_file: Option<(String, Vec<u8>)>,
}

async fn read_form(mut multipart: Multipart) -> Result<ScrapeForm, Response> {
    let mut form = ScrapeForm::default();
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        error_response(StatusCode::BAD_REQUEST, format!("Invalid form data: {}", e))
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "company_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_form)?;
                if !filename.is_empty() && !bytes.is_empty() {
                    form.company_file = Some((filename, bytes.to_vec()));
                }
            }
            "email" => form.email = field.text().await.map_err(bad_form)?,
            "password" => form.password = field.text().await.map_err(bad_form)?,
            "companies" => form.companies = field.text().await.map_err(bad_form)?,
            "keywords" => form.keywords.push(field.text().await.map_err(bad_form)?),
            _ => {}
        }
    }

    Ok(form)
}

/// Companies from the text field, falling back to the uploaded list
fn form_companies(state: &AppState, form: &ScrapeForm) -> Result<Vec<String>, Response> {
    let typed: Vec<String> = form
        .companies
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if !typed.is_empty() {
        return Ok(typed);
    }

    let Some((filename, bytes)) = &form.company_file else {
        return Ok(Vec::new());
    };
    let Some(extension) = uploads::allowed_extension(filename) else {
        warn!("Ignoring company file with unsupported type: {}", filename);
        return Ok(Vec::new());
    };

    if let Err(e) = uploads::save_upload(&state.config.storage.upload_dir, filename, bytes) {
        warn!("Failed to keep uploaded company file: {:#}", e);
    }
    uploads::parse_company_file(&extension, bytes)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("{:#}", e)))
}

pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(INDEX_HTML.replace("{{base_path}}", &state.config.server.route_prefix()))
}

pub async fn keywords(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let keywords = load_keywords(&state.config.storage.keywords_file);
    Json(json!({ "status": "success", "keywords": keywords }))
}

pub async fn start_scrape(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Response {
    if !state.limiter.check(addr.ip()).await {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "Rate limit: Please wait {} seconds between scrapes.",
                state.limiter.window().as_secs()
            ),
        );
    }

    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let companies = match form_companies(&state, &form) {
        Ok(companies) => companies,
        Err(response) => return response,
    };

    let request = match ScrapeRequest::new(companies, &form.keywords, &form.email, &form.password) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let storage = &state.config.storage;
    let removed = uploads::prune_stale_files(
        &[storage.output_dir.as_path(), storage.upload_dir.as_path()],
        Duration::from_secs(storage.retention_hours * 3600),
    );
    if removed > 0 {
        info!("Pruned {} stale files", removed);
    }

    info!(
        "Web task starting with {} companies and keywords: {:?}",
        request.companies().len(),
        request.keywords()
    );
    let task_id = state.controller.submit(request).await;

    Json(json!({
        "status": "success",
        "message": "Scraping task started",
        "task_id": task_id,
    }))
    .into_response()
}

pub async fn task_status(State(state): State<Arc<AppState>>, UrlPath(task_id): UrlPath<String>) -> Response {
    task_snapshot(state.controller.registry(), &task_id).await
}

pub async fn download(State(state): State<Arc<AppState>>, UrlPath(task_id): UrlPath<String>) -> Response {
    csv_attachment(state.controller.registry(), &task_id).await
}

/// Current record of a task as JSON, or 404
pub async fn task_snapshot(registry: &TaskRegistry, task_id: &str) -> Response {
    match registry.get(task_id).await {
        Some(record) => Json(record).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Task not found"),
    }
}

/// Task output file as a CSV download, or 404 if the task or file is missing
pub async fn csv_attachment(registry: &TaskRegistry, task_id: &str) -> Response {
    let Some(record) = registry.get(task_id).await else {
        return error_response(StatusCode::NOT_FOUND, "Task not found");
    };

    match tokio::fs::read(&record.output_file).await {
        Ok(bytes) => {
            info!("Sending results file {}", record.output_file.display());
            (
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, attachment_header()),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            warn!("Results file {} unavailable: {}", record.output_file.display(), e);
            error_response(StatusCode::NOT_FOUND, "Output file not found")
        }
    }
}

fn attachment_header() -> String {
    format!(
        "attachment; filename=\"linkedin_profiles_{}.csv\"",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{ProfileMatch, TaskStatus};
    use crate::server::test_support::*;
    use crate::storage::ResultStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str)>) -> Body {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if let Some((filename, contents)) = file {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"company_file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{contents}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    fn form_request(uri: &str, body: Body) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn index_embeds_the_base_path() {
        let test = test_app("/linkedinpeoplescraper").await;
        let response = test.app
            .oneshot(Request::get("/linkedinpeoplescraper").body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(r#"const basePath = "/linkedinpeoplescraper";"#));
        assert!(!html.contains("{{base_path}}"));
    }

    #[tokio::test]
    async fn keywords_come_from_the_file() {
        let test = test_app("").await;
        std::fs::write(&test.state.config.storage.keywords_file, "engineer\n\nmanager\n").unwrap();

        let response = test.app
            .oneshot(Request::get("/keywords").body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["keywords"], json!(["engineer", "manager"]));
    }

    #[tokio::test]
    async fn start_scrape_creates_a_task() {
        let test = test_app("").await;
        let body = multipart_body(
            &[
                ("email", "me@example.com"),
                ("password", "pw"),
                ("companies", "acme, globex"),
                ("keywords", "engineer,manager"),
                ("keywords", "sales"),
            ],
            None,
        );

        let response = test.app.oneshot(form_request("/start_scrape", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "success");

        let task_id = json["task_id"].as_str().unwrap();
        assert!(task_id.starts_with("task_"));
        assert!(test.state.controller.registry().get(task_id).await.is_some());
    }

    #[tokio::test]
    async fn start_scrape_reads_the_company_file() {
        let test = test_app("").await;
        let body = multipart_body(
            &[("email", "me@example.com"), ("password", "pw"), ("keywords", "engineer")],
            Some(("companies.csv", "name,linkedin_company_name\nAcme Inc,acme\nGlobex,globex\n")),
        );

        let response = test.app.oneshot(form_request("/start_scrape", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(test.state.config.storage.upload_dir.join("companies.csv").exists());
    }

    #[tokio::test]
    async fn start_scrape_validates_inputs() {
        let cases = [
            (vec![("companies", "acme"), ("keywords", "x")], "LinkedIn credentials are required"),
            (vec![("email", "a@b.c"), ("password", "pw"), ("keywords", "x")], "No companies provided"),
            (vec![("email", "a@b.c"), ("password", "pw"), ("companies", "acme"), ("keywords", " , ")], "At least one keyword is required"),
        ];

        for (fields, message) in cases {
            let test = test_app("").await;
            let response = test.app
                .oneshot(form_request("/start_scrape", multipart_body(&fields, None)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["message"], message);
            assert_eq!(test.state.controller.registry().len().await, 0);
        }
    }

    #[tokio::test]
    async fn second_submission_within_window_is_limited() {
        let test = test_app("").await;
        let fields = [("email", "me@example.com"), ("password", "pw"), ("companies", "acme"), ("keywords", "x")];

        let first = test.app.clone().oneshot(form_request("/start_scrape", multipart_body(&fields, None))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = test.app.oneshot(form_request("/start_scrape", multipart_body(&fields, None))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body_json(second).await["message"],
            "Rate limit: Please wait 60 seconds between scrapes."
        );
    }

    #[tokio::test]
    async fn unknown_task_is_404() {
        let test = test_app("").await;
        let response = test.app.clone()
            .oneshot(Request::get("/task_status/task_0_missing").body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Task not found");

        let response = test.app
            .oneshot(Request::get("/download/task_0_missing").body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn task_status_and_download_serve_the_record() {
        let test = test_app("").await;
        let registry = test.state.controller.registry();
        let task_id = test.state.controller.create_task().await;

        let response = test.app.clone()
            .oneshot(Request::get(format!("/task_status/{task_id}")).body(empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 0);
        assert_eq!(json["statistics"], serde_json::Value::Null);

        let response = test.app.clone()
            .oneshot(Request::get(format!("/download/{task_id}")).body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Output file not found");

        let record = registry.get(&task_id).await.unwrap();
        ResultStore::new(&record.output_file)
            .append(&[ProfileMatch {
                name: "Ada Lovelace".into(),
                href: "https://www.linkedin.com/in/ada".into(),
                company: "acme".into(),
                keyword: "engineer".into(),
                url: "https://www.linkedin.com/company/acme/people/?keywords=engineer".into(),
            }])
            .unwrap();
        registry.update(&task_id, crate::crawler::TaskUpdate::status(TaskStatus::Completed)).await;

        let response = test.app
            .oneshot(Request::get(format!("/download/{task_id}")).body(empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=\"linkedin_profiles_"));
        let csv = body_text(response).await;
        assert!(csv.starts_with("name,href,company,keyword,url\n"));
        assert!(csv.contains("Ada Lovelace"));
    }
}
