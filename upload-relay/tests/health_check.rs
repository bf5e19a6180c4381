mod common;

use common::{file_form, TestApp};

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "upload-relay");
}

#[tokio::test]
async fn api_test_endpoint_responds() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/test").await;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "message": "API is working!" }));
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(!headers["x-request-id"].is_empty());
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = TestApp::spawn().await;

    let response = app.get("/does-not-exist").await;

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No route for /does-not-exist");
}

#[tokio::test]
async fn static_dir_serves_unmatched_paths() {
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("index.html"), "<h1>Upload</h1>").unwrap();
    let site_path = site.path().to_path_buf();

    let app = TestApp::spawn_with(|config| config.server.static_dir = Some(site_path)).await;

    let response = app.get("/").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<h1>Upload</h1>");

    // API routes still win over the static fallback.
    let response = app.get("/api/test").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn metrics_endpoint_reports_upload_outcomes() {
    let app = TestApp::spawn().await;

    app.upload(file_form(b"hello".to_vec(), "notes.txt", "text/plain"))
        .await;
    let response = app.get("/metrics").await;

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("upload_relay_uploads_total"));
    assert!(body.contains("http_requests_total"));
}
