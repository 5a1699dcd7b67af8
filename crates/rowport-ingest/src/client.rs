//! Publishing client for the target API
//!
//! Every call is authenticated with a client-credentials bearer token. A
//! `401 Unauthorized` answer drops the cached token, fetches a fresh one and
//! replays the same request, up to [`MAX_ATTEMPTS`] sends in total. The last
//! response is returned as-is, so callers classify a final 401 like any other
//! unexpected status.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use rowport_common::{Result, RowportError};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;

/// Total sends of one request, first try included
pub const MAX_ATTEMPTS: usize = 3;

/// Status and body of the final attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    pub status: StatusCode,
    pub body: String,
    /// `Location` header of a create, when the target sent one
    pub location: Option<String>,
}

impl PublishResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            location: None,
        }
    }
}

/// Outbound side of the pipeline
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name of the target connection, used to select agents
    fn connection_name(&self) -> &str;

    /// Base URL resource paths are appended to
    fn api_url(&self) -> &str;

    async fn post(&self, endpoint_url: &str, document: &str) -> Result<PublishResponse>;

    async fn delete(&self, endpoint_url: &str, id: &str) -> Result<PublishResponse>;

    /// Create the resource, then delete whatever the create's `Location` points at
    async fn post_then_delete_by_location(
        &self,
        endpoint_url: &str,
        document: &str,
    ) -> Result<PublishResponse>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn network(err: reqwest::Error) -> RowportError {
    RowportError::Network(err.to_string())
}

/// HTTP implementation of [`Publisher`]
pub struct ApiClient {
    client: Client,
    connection: ConnectionConfig,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(connection: ConnectionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(connection.timeout_secs))
            .build()
            .map_err(network)?;

        Ok(Self {
            client,
            connection,
            token: RwLock::new(None),
        })
    }

    /// Cached bearer token, fetching one if none is held
    async fn access_token(&self) -> Result<Option<String>> {
        let Some(token_url) = self.connection.token_url.as_deref() else {
            return Ok(None);
        };

        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(Some(token.clone()));
        }

        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            return Ok(Some(token.clone()));
        }

        debug!(connection = %self.connection.name, "Requesting access token");
        let response = self
            .client
            .post(token_url)
            .basic_auth(&self.connection.client_id, Some(&self.connection.client_secret))
            .form(&[("Grant_type", "client_credentials")])
            .send()
            .await
            .map_err(network)?;

        if response.status() != StatusCode::OK {
            return Err(RowportError::Authentication(format!(
                "Failed to get Access Token. HTTP Status Code: {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(network)?;
        *slot = Some(token.access_token.clone());
        Ok(Some(token.access_token))
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    async fn send_with_retry<F>(&self, description: &str, build: F) -> Result<PublishResponse>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let mut request = build();
            if let Some(token) = self.access_token().await? {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(network)?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && attempt < MAX_ATTEMPTS {
                warn!(attempt, request = description, "Unauthorized, refreshing access token");
                self.invalidate_token().await;
                attempt += 1;
                continue;
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.map_err(network)?;

            return Ok(PublishResponse {
                status,
                body,
                location,
            });
        }
    }
}

#[async_trait]
impl Publisher for ApiClient {
    fn connection_name(&self) -> &str {
        &self.connection.name
    }

    fn api_url(&self) -> &str {
        &self.connection.api_url
    }

    async fn post(&self, endpoint_url: &str, document: &str) -> Result<PublishResponse> {
        self.send_with_retry(endpoint_url, || {
            self.client
                .post(endpoint_url)
                .header(CONTENT_TYPE, "application/json")
                .body(document.to_string())
        })
        .await
    }

    async fn delete(&self, endpoint_url: &str, id: &str) -> Result<PublishResponse> {
        let url = format!("{}/{}", endpoint_url.trim_end_matches('/'), id);
        self.send_with_retry(&url, || self.client.delete(&url)).await
    }

    async fn post_then_delete_by_location(
        &self,
        endpoint_url: &str,
        document: &str,
    ) -> Result<PublishResponse> {
        let created = self.post(endpoint_url, document).await?;
        if !created.status.is_success() {
            return Ok(created);
        }

        let location = created.location.ok_or_else(|| {
            RowportError::publish(format!(
                "POST to {endpoint_url} returned {} without a Location header",
                created.status
            ))
        })?;

        let target = Url::parse(endpoint_url)
            .and_then(|base| base.join(&location))
            .map_err(|e| RowportError::publish(format!("Invalid Location '{location}': {e}")))?;

        self.send_with_retry(target.as_str(), || self.client.delete(target.clone()))
            .await
    }
}
