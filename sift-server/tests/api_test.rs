//! Integration tests for API edge cases and failure modes.
//!
//! These tests require a running server + database; each test skips itself
//! when the server is not reachable.

use serde_json::Value;

const API_URL: &str = "http://localhost:8080";

async fn ensure_server() -> Option<reqwest::Client> {
    let client = reqwest::Client::new();
    match client.get(format!("{}/health", API_URL)).send().await {
        Ok(_) => Some(client),
        Err(_) => {
            println!("Skipping test: Server not running at {}", API_URL);
            None
        }
    }
}

// ===========================================================================
// Scan creation
// ===========================================================================

#[tokio::test]
async fn scan_without_bucket_is_rejected() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .post(format!("{}/scan", API_URL))
        .json(&serde_json::json!({ "prefix": "test/" }))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400, "Missing bucket should return 400");
    let body: Value = response.json().await.expect("JSON body");
    assert_eq!(body["error"], "bucket is required");
}

#[tokio::test]
async fn scan_with_invalid_json_body_is_treated_as_empty() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .post(format!("{}/scan", API_URL))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("Request failed");

    // An unreadable body degrades to an empty one, so the bucket check fires.
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn scan_with_empty_bucket_is_rejected() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .post(format!("{}/scan", API_URL))
        .json(&serde_json::json!({ "bucket": "" }))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
}

// ===========================================================================
// Job status
// ===========================================================================

#[tokio::test]
async fn unknown_job_returns_404() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .get(format!(
            "{}/jobs/00000000-0000-0000-0000-00000000dead",
            API_URL
        ))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.expect("JSON body");
    assert_eq!(body["error"], "Job not found");
}

#[tokio::test]
async fn malformed_job_id_returns_400() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .get(format!("{}/jobs/not-a-uuid", API_URL))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn real_time_flag_is_accepted_on_missing_job() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .get(format!(
            "{}/jobs/00000000-0000-0000-0000-00000000dead?real_time=true",
            API_URL
        ))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 404);
}

// ===========================================================================
// Results pagination
// ===========================================================================

#[tokio::test]
async fn results_default_shape() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .get(format!("{}/results", API_URL))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("JSON body");
    assert!(body["findings"].is_array());
    assert!(body["total"].is_number());
    assert_eq!(body["limit"], 100);
    assert!(body["has_more"].is_boolean());
    // Offset mode is the default when no cursor is supplied.
    assert_eq!(body["offset"], 0);
    assert!(body.get("cursor").is_none());
}

#[tokio::test]
async fn results_cursor_mode_reports_cursor_fields() {
    let Some(client) = ensure_server().await else { return };

    // A cursor of 1 excludes every row (ids start at 1), which pins the
    // pagination shape without depending on seeded data.
    let response = client
        .get(format!("{}/results?cursor=1", API_URL))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("JSON body");
    assert_eq!(body["cursor"], "1");
    assert_eq!(body["findings"].as_array().unwrap().len(), 0);
    assert_eq!(body["has_more"], false);
    assert!(body.get("offset").is_none());
}

#[tokio::test]
async fn results_invalid_cursor_returns_400() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .get(format!("{}/results?cursor=abc", API_URL))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("JSON body");
    assert_eq!(body["error"], "invalid cursor");
}

#[tokio::test]
async fn results_invalid_job_id_returns_400() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .get(format!("{}/results?job_id=nope", API_URL))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
}

// ===========================================================================
// CORS
// ===========================================================================

#[tokio::test]
async fn responses_carry_cors_headers() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .get(format!("{}/results", API_URL))
        .header("origin", "http://example.com")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn preflight_is_accepted() {
    let Some(client) = ensure_server().await else { return };

    let response = client
        .request(reqwest::Method::OPTIONS, format!("{}/results", API_URL))
        .header("origin", "http://example.com")
        .header("access-control-request-method", "GET")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
}
