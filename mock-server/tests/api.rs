use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use yachaq_mock_server::{app, app_with_config, Fault, MockConfig, DEFAULT_API_KEY};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<String> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.to_string()).unwrap()
}

/// Authenticate against `app` and return the issued access token.
async fn token(app: &Router) -> String {
    let body = format!(r#"{{"apiKey":"{DEFAULT_API_KEY}"}}"#);
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/auth/token", None, &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    json["data"]["accessToken"].as_str().unwrap().to_string()
}

// --- auth ---

#[tokio::test]
async fn auth_issues_token_for_known_key() {
    let app = app();
    let token = token(&app).await;
    assert!(token.starts_with("at-"));
}

#[tokio::test]
async fn auth_rejects_unknown_key_in_envelope() {
    let resp = app()
        .oneshot(json_request("POST", "/v1/auth/token", None, r#"{"apiKey":"nope"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["errorCode"], "INVALID_API_KEY");
}

#[tokio::test]
async fn protected_route_without_token_returns_401() {
    let resp = app()
        .oneshot(Request::builder().uri("/v1/requester/tier").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- requests ---

#[tokio::test]
async fn create_request_returns_draft() {
    let app = app();
    let token = token(&app).await;
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/requests",
            Some(&token),
            r#"{"requiredLabels":["health:steps"],"compensation":"5.00","outputMode":"AGGREGATE_ONLY"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "DRAFT");
    assert!(json["data"]["requestId"].is_string());
}

#[tokio::test]
async fn create_request_with_bad_input_returns_validation_errors() {
    let app = app();
    let token = token(&app).await;
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/requests",
            Some(&token),
            r#"{"requiredLabels":[],"compensation":"0","outputMode":"RAW"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["validationErrors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn status_of_unknown_request_is_404_envelope() {
    let app = app();
    let token = token(&app).await;
    let resp = app
        .oneshot(json_request("GET", "/v1/requests/missing/status", Some(&token), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp).await;
    assert_eq!(json["errorCode"], "REQUEST_NOT_FOUND");
}

#[tokio::test]
async fn templates_filter_by_category() {
    let app = app();
    let token = token(&app).await;
    let resp = app
        .oneshot(json_request("GET", "/v1/templates?category=media", Some(&token), ""))
        .await
        .unwrap();
    let json = body_json(resp).await;
    let templates = json["data"].as_array().unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0]["id"], "tpl-listening");
}

// --- tier ---

#[tokio::test]
async fn restriction_check_flags_disallowed_mode() {
    let app = app();
    let token = token(&app).await;
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/requester/restrictions/check",
            Some(&token),
            r#"{"outputMode":"RAW","compensation":"10","requiredLabels":["health:steps"],"identityReveal":false}"#,
        ))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["data"]["allowed"], false);
    assert_eq!(json["data"]["violations"].as_array().unwrap().len(), 1);
}

// --- faults ---

#[tokio::test]
async fn rate_limit_fault_sets_retry_after() {
    let app = app_with_config(MockConfig {
        fault: Some(Fault::RateLimit {
            retry_after: Some("9".to_string()),
        }),
        ..MockConfig::default()
    });
    let resp = app
        .oneshot(Request::builder().uri("/v1/requester/tier").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers()[http::header::RETRY_AFTER], "9");
}

#[tokio::test]
async fn server_error_fault_returns_non_json_body() {
    let app = app_with_config(MockConfig {
        fault: Some(Fault::ServerError(503)),
        ..MockConfig::default()
    });
    let resp = app
        .oneshot(Request::builder().uri("/v1/requester/analytics").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let bytes = body_bytes(resp).await;
    assert!(serde_json::from_slice::<Value>(&bytes).is_err());
}
