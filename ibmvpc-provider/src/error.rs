//! Errors returned by the VPC REST API layer

use serde::Deserialize;
use thiserror::Error;

use ibmvpc_core::provider::ProviderError;

/// Error returned by the transport or the remote API
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The API answered with a non-success status code
    #[error("{message} (status {status}, code: {code}, trace: {trace})")]
    Status {
        status: u16,
        code: String,
        message: String,
        trace: String,
    },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request body could not be encoded
    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// No IAM token could be obtained
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    /// Build a status error from an HTTP status and the raw response body
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) if !parsed.errors.is_empty() => {
                let first = &parsed.errors[0];
                ApiError::Status {
                    status,
                    code: first.code.clone(),
                    message: first.message.clone(),
                    trace: parsed.trace.unwrap_or_default(),
                }
            }
            _ => ApiError::Status {
                status,
                code: String::new(),
                message: if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                },
                trace: String::new(),
            },
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True if the API reported 404
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Wrap into a ProviderError with the given context, e.g. "Error getting VPN gateway connection"
    pub fn context(self, context: impl Into<String>) -> ProviderError {
        let context = context.into();
        ProviderError::new(format!("{}: {}", context, self)).with_cause(self)
    }
}

/// Error payload of the VPC API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
    #[serde(default)]
    trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Turns a 404 into `Ok(None)`
pub trait NotFoundExt<T> {
    fn optional(self) -> ApiResult<Option<T>>;
}

impl<T> NotFoundExt<T> for ApiResult<T> {
    fn optional(self) -> ApiResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
