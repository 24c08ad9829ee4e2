//! Transport - HTTP access to the VPC API
//!
//! Everything above this module talks to the API through the object-safe
//! [`Transport`] trait. [`HttpTransport`] is the real implementation; tests
//! substitute scripted doubles.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::ProviderConfig;
use crate::error::{ApiError, ApiResult};

/// Seconds before expiry at which a cached IAM token is renewed
const TOKEN_REFRESH_MARGIN: i64 = 60;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP method of an API request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

/// One request against the VPC API, relative to the base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the base URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Sends requests to the VPC API
///
/// Returns the decoded JSON body, or `None` when the response has no body
/// (e.g. `204 No Content` after a delete). Non-success statuses are
/// returned as [`ApiError::Status`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> ApiResult<Option<serde_json::Value>>;
}

// =============================================================================
// IAM authentication
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Expiry as a Unix timestamp
    expiration: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expiration: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        now < self.expiration - TOKEN_REFRESH_MARGIN
    }
}

/// Exchanges an API key for IAM bearer tokens, caching them until shortly before expiry
pub struct IamAuthenticator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    token: Mutex<Option<CachedToken>>,
}

impl IamAuthenticator {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            token: Mutex::new(None),
        }
    }

    /// Current access token, requesting a new one if needed
    pub async fn token(&self) -> ApiResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh(Utc::now().timestamp())
        {
            return Ok(token.access_token.clone());
        }

        debug!("Requesting IAM token from {}", self.endpoint);
        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("IAM request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Auth(format!("Failed to read IAM response: {}", e)))?;
        if !status.is_success() {
            return Err(ApiError::Auth(format!(
                "IAM returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Auth(format!("Invalid IAM response: {}", e)))?;
        let token = CachedToken {
            access_token: parsed.access_token,
            expiration: parsed.expiration,
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

// =============================================================================
// HTTP transport
// =============================================================================

/// [`Transport`] over HTTPS using reqwest
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    auth: IamAuthenticator,
}

impl HttpTransport {
    pub fn new(config: &ProviderConfig) -> ApiResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ApiError::Auth("API key is not configured".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            auth: IamAuthenticator::new(http.clone(), config.iam_endpoint.clone(), api_key),
            http,
            base_url: config.base_url(),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<Option<serde_json::Value>> {
        let token = self.auth.token().await?;
        let url = format!("{}{}", self.base_url, request.path);

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .query(&[
                ("version", self.api_version.as_str()),
                ("generation", "2"),
            ])
            .query(&request.query);

        if let Some(body) = &request.body {
            // Patches use JSON merge-patch semantics
            let content_type = if request.method == Method::Patch {
                "application/merge-patch+json"
            } else {
                "application/json"
            };
            builder = builder
                .header("Content-Type", content_type)
                .body(body.to_string());
        }

        debug!("{} {}", request.method, url);
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("{} {}: {}", request.method, url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read response body: {}", e)))?;
        debug!("{} {} -> {}", request.method, url, status.as_u16());

        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}
