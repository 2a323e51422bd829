use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use labshare_backend::config::{AppConfig, SessionBackend};
use labshare_backend::infrastructure::database;
use labshare_backend::services::session_store::{DbSessionStore, SessionStore};
use labshare_backend::services::storage::{LocalStorageService, StorageService};
use labshare_backend::{AppState, create_app};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "labshare-test-boundary";
const BASE_URL: &str = "http://localhost:5000";

struct TestApp {
    app: Router,
    sessions: Arc<dyn SessionStore>,
    _dir: TempDir,
}

async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

async fn setup_app() -> TestApp {
    setup_app_with(|_| {}).await
}

async fn setup_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = setup_test_db().await;

    let mut config = AppConfig {
        screen_images: false,
        admin_password: Some("lab-secret".to_string()),
        session_secret: "test-secret".to_string(),
        session_backend: SessionBackend::Database,
        upload_dir: dir.path().to_string_lossy().to_string(),
        max_file_size: 64 * 1024,
        ..AppConfig::default()
    };
    configure(&mut config);

    let storage: Arc<dyn StorageService> = Arc::new(LocalStorageService::new(dir.path(), BASE_URL));
    let sessions: Arc<dyn SessionStore> = Arc::new(DbSessionStore::new(
        db.clone(),
        config.session_secret.clone(),
    ));

    let state = AppState::new(db, storage, sessions.clone(), config).unwrap();
    TestApp {
        app: create_app(state),
        sessions,
        _dir: dir,
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload(app: &Router, parts: &[Part<'_>]) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(parts)))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, read_json(response).await)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn view(app: &Router) -> Value {
    let response = get(app, "/view", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

/// Logs in and returns the `name=value` pair of the session cookie
async fn login(app: &Router, password: &str) -> (StatusCode, Option<String>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"username": "admin", "password": password}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.to_string());
    (response.status(), cookie)
}

async fn send(app: &Router, method: &str, uri: &str, cookie: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_upload_without_files_is_rejected() {
    let t = setup_app().await;

    let (status, body) = upload(
        &t.app,
        &[Part::Text("subject", "Blockchain"), Part::Text("expno", "Experiment 3")],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No valid files uploaded.");
    assert_eq!(view(&t.app).await, json!({}));
}

#[tokio::test]
async fn test_upload_requires_subject_and_experiment() {
    let t = setup_app().await;

    let (status, body) = upload(
        &t.app,
        &[
            Part::Text("subject", "   "),
            Part::Text("expno", "Experiment 1"),
            Part::File("code", "main.py", b"print('hi')\n"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Subject and Experiment are required.");
    assert_eq!(view(&t.app).await, json!({}));
}

#[tokio::test]
async fn test_uploaded_code_appears_in_catalog() {
    let t = setup_app().await;

    let (status, body) = upload(
        &t.app,
        &[
            Part::Text("subject", "Blockchain"),
            Part::Text("expno", "Experiment 3"),
            Part::Text("batch", "2024"),
            Part::File("code", "miner.py", b"def mine():\n    return 42\n"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Uploaded 1 file(s) successfully.");

    let catalog = view(&t.app).await;
    let entries = catalog["Blockchain"]["Experiment 3"]["code"]
        .as_array()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0][0], "miner.py");
    let url = entries[0][1].as_str().unwrap();
    assert!(url.starts_with(BASE_URL));
    assert!(url.ends_with("code_miner.py"));

    // Stored bytes are served back from the link in the catalog
    let response = get(&t.app, url.trim_start_matches(BASE_URL), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"def mine():\n    return 42\n");
}

#[tokio::test]
async fn test_rejected_attachment_stores_nothing() {
    let t = setup_app().await;

    // The valid code file must not be stored when another part fails
    let (status, body) = upload(
        &t.app,
        &[
            Part::Text("subject", "Networks"),
            Part::Text("expno", "Experiment 2"),
            Part::File("code", "client.py", b"import socket\n"),
            Part::File("rubric", "virus.exe", b"MZ\x90\x00"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported file type: virus.exe");

    let oversized = vec![b'a'; 64 * 1024 + 1];
    let (status, body) = upload(
        &t.app,
        &[
            Part::Text("subject", "Networks"),
            Part::Text("expno", "Experiment 2"),
            Part::File("output", "log.txt", &oversized),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("exceeds max allowed size"));

    let (status, _) = upload(
        &t.app,
        &[
            Part::Text("subject", "Networks"),
            Part::Text("expno", "Experiment 2"),
            Part::File("rubric", "report.pdf", b"not really a pdf"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(view(&t.app).await, json!({}));
}

#[tokio::test]
async fn test_admin_delete_removes_record() {
    let t = setup_app().await;

    upload(
        &t.app,
        &[
            Part::Text("subject", "Blockchain"),
            Part::Text("expno", "Experiment 3"),
            Part::File("code", "miner.py", b"print(1)\n"),
            Part::File("output", "result.txt", b"block mined\n"),
        ],
    )
    .await;

    let (status, cookie) = login(&t.app, "lab-secret").await;
    assert_eq!(status, StatusCode::OK);
    let cookie = cookie.unwrap();
    assert!(cookie.starts_with("labshare_session="));

    let response = send(&t.app, "GET", "/admin/dashboard", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing = read_json(response).await;
    let listing = listing.as_array().unwrap();
    assert_eq!(listing.len(), 2);
    // Newest first
    assert_eq!(listing[0]["filename"], "result.txt");
    let code_id = listing[1]["id"].as_i64().unwrap();
    let code_url = listing[1]["url"].as_str().unwrap().to_string();

    let response = send(&t.app, "DELETE", &format!("/admin/delete/{}", code_id), &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await["message"],
        "Deleted miner.py successfully."
    );

    let listing = read_json(send(&t.app, "GET", "/admin/dashboard", &cookie).await).await;
    assert!(listing.as_array().unwrap().iter().all(|e| e["id"] != code_id));

    let catalog = view(&t.app).await;
    assert!(catalog["Blockchain"]["Experiment 3"].get("code").is_none());
    assert_eq!(catalog["Blockchain"]["Experiment 3"]["output"][0][0], "result.txt");

    let response = get(&t.app, code_url.trim_start_matches(BASE_URL), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_unknown_id_leaves_catalog_unchanged() {
    let t = setup_app().await;

    upload(
        &t.app,
        &[
            Part::Text("subject", "Compilers"),
            Part::Text("expno", "Experiment 1"),
            Part::File("code", "lexer.py", b"tokens = []\n"),
        ],
    )
    .await;
    let before = view(&t.app).await;

    let (_, cookie) = login(&t.app, "lab-secret").await;
    let response = send(&t.app, "DELETE", "/admin/delete/9999", &cookie.unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["error"], "Upload not found");

    assert_eq!(view(&t.app).await, before);
}

#[tokio::test]
async fn test_admin_routes_require_session() {
    let t = setup_app().await;

    let response = get(&t.app, "/admin/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await["error"], "Unauthorized");

    let response = send(&t.app, "GET", "/admin/dashboard", "labshare_session=forged").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/delete/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let t = setup_app().await;

    let (status, cookie) = login(&t.app, "guess").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookie.is_none());
}

#[tokio::test]
async fn test_logout_ends_session() {
    let t = setup_app().await;

    let (_, cookie) = login(&t.app, "lab-secret").await;
    let cookie = cookie.unwrap();

    let response = send(&t.app, "GET", "/admin/dashboard", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&t.app, "POST", "/admin/logout", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cleared.contains("Max-Age=0"));

    let response = send(&t.app, "GET", "/admin/dashboard", &cookie).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let t = setup_app().await;

    let session = t
        .sessions
        .create("admin", chrono::Duration::seconds(-60))
        .await
        .unwrap();
    let cookie = format!("labshare_session={}", session.token);

    let response = send(&t.app, "GET", "/admin/dashboard", &cookie).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health_and_api_test() {
    let t = setup_app().await;

    let response = get(&t.app, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["database"], "connected");
    assert_eq!(body["storage"], "connected");

    let response = get(&t.app, "/api/test", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["message"], "Backend is working!");
}

#[tokio::test]
async fn test_case_variant_subjects_keep_their_own_files() {
    let t = setup_app().await;

    for (subject, experiment, body) in [
        ("Blockchain", "Experiment 3", "ALICE\n"),
        ("blockchain", "experiment-3", "BOB\n"),
    ] {
        let (status, _) = upload(
            &t.app,
            &[
                Part::Text("subject", subject),
                Part::Text("expno", experiment),
                Part::File("code", "code main.py", body.as_bytes()),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let catalog = view(&t.app).await;
    let alice = catalog["Blockchain"]["Experiment 3"]["code"][0][1]
        .as_str()
        .unwrap()
        .to_string();
    let bob = catalog["blockchain"]["experiment-3"]["code"][0][1]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(alice, bob);

    let response = get(&t.app, alice.trim_start_matches(BASE_URL), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ALICE\n");

    // Removing one entry leaves the other's bytes alone
    let (_, cookie) = login(&t.app, "lab-secret").await;
    let cookie = cookie.unwrap();
    let listing = read_json(send(&t.app, "GET", "/admin/dashboard", &cookie).await).await;
    let bob_id = listing[0]["id"].as_i64().unwrap();
    let response = send(&t.app, "DELETE", &format!("/admin/delete/{}", bob_id), &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&t.app, alice.trim_start_matches(BASE_URL), None).await;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ALICE\n");
    let response = get(&t.app, bob.trim_start_matches(BASE_URL), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_login_body_is_json_error() {
    let t = setup_app().await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_non_numeric_delete_id_is_json_error() {
    let t = setup_app().await;

    let (_, cookie) = login(&t.app, "lab-secret").await;
    let response = send(&t.app, "DELETE", "/admin/delete/abc", &cookie.unwrap()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("abc"));
}

#[tokio::test]
async fn test_non_multipart_upload_is_json_error() {
    let t = setup_app().await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"subject":"Blockchain"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"].is_string());
    assert_eq!(view(&t.app).await, json!({}));
}

#[tokio::test]
async fn test_login_attempts_are_rate_limited() {
    let t = setup_app_with(|config| {
        config.rate_limit.max_requests = 3;
    })
    .await;

    for _ in 0..3 {
        let (status, _) = login(&t.app, "guess").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // The right password no longer helps once the budget is spent
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"username": "admin", "password": "lab-secret"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        read_json(response).await["error"],
        "Too many requests, please try again later."
    );

    // Uploads share the budget; reads are not limited
    let (status, _) = upload(
        &t.app,
        &[
            Part::Text("subject", "Networks"),
            Part::Text("expno", "Experiment 1"),
            Part::File("code", "a.py", b"x = 1\n"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(view(&t.app).await, json!({}));
}
