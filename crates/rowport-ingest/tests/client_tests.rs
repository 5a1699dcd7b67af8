//! Tests for the publishing client against a mock target API
//!
//! These tests cover:
//! - Token acquisition and bearer headers
//! - Bounded retry on 401 responses
//! - Delete by id and post-then-delete by location

use reqwest::StatusCode;
use rowport_common::RowportError;
use rowport_ingest::client::{ApiClient, Publisher, MAX_ATTEMPTS};
use rowport_ingest::config::ConnectionConfig;
use wiremock::{
    matchers::{body_string, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Client for `server`, authenticating against `/oauth/token`
fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(ConnectionConfig {
        name: "sandbox".to_string(),
        api_url: format!("{}/data/v3", server.uri()),
        token_url: Some(format!("{}/oauth/token", server.uri())),
        client_id: "key".to_string(),
        client_secret: "secret".to_string(),
        timeout_secs: 5,
    })
    .expect("client builds")
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string("Grant_type=client_credentials"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "t1"})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_post_sends_bearer_token_once_fetched() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/data/v3/students"))
        .and(header("Authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let endpoint = format!("{}/data/v3/students", server.uri());

    for _ in 0..2 {
        let response = client.post(&endpoint, r#"{"studentUniqueId":"1"}"#).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_token_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client
        .post(&format!("{}/data/v3/students", server.uri()), "{}")
        .await
        .unwrap_err();

    assert!(matches!(err, RowportError::Authentication(_)));
    assert!(err
        .to_string()
        .contains("Failed to get Access Token. HTTP Status Code: 400"));
}

// ============================================================================
// Retry on 401
// ============================================================================

#[tokio::test]
async fn test_persistent_401_stops_after_three_attempts() {
    let server = MockServer::start().await;
    mount_token(&server, MAX_ATTEMPTS as u64).await;

    Mock::given(method("POST"))
        .and(path("/data/v3/students"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(MAX_ATTEMPTS as u64)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client
        .post(&format!("{}/data/v3/students", server.uri()), "{}")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, "expired");
}

#[tokio::test]
async fn test_single_401_refreshes_and_succeeds() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/data/v3/students"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/data/v3/students"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client
        .post(&format!("{}/data/v3/students", server.uri()), "{}")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_other_failures_are_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/data/v3/students"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client
        .post(&format!("{}/data/v3/students", server.uri()), "{}")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

// ============================================================================
// Deletes
// ============================================================================

#[tokio::test]
async fn test_delete_targets_id_under_endpoint() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("DELETE"))
        .and(path("/data/v3/students/abc123"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client
        .delete(&format!("{}/data/v3/students", server.uri()), "abc123")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_post_then_delete_follows_location() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/data/v3/students"))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Location", "/data/v3/students/created-1"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/data/v3/students/created-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client
        .post_then_delete_by_location(&format!("{}/data/v3/students", server.uri()), "{}")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_post_then_delete_skips_delete_when_post_fails() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/data/v3/students"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client
        .post_then_delete_by_location(&format!("{}/data/v3/students", server.uri()), "{}")
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, "bad");
}
