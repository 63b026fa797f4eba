use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = McpError> = std::result::Result<T, E>;

const NETWORK_SUGGESTION: &str =
    "Please check network connectivity and retry the request in a few seconds.";
const INTERNAL_SUGGESTION: &str =
    "Unexpected server error. Check tool arguments and retry. If it persists, inspect server logs.";

/// Externally visible error category. Serialized names are part of the tool contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigError,
    ValidationError,
    RateLimitError,
    AuthenticationError,
    BitgetApiError,
    NetworkError,
    InternalError,
}

/// Every failure the server can raise. Each variant maps onto exactly one [`ErrorKind`].
#[derive(Debug, Error)]
pub enum McpError {
    #[error("{message}")]
    Config {
        message: String,
        suggestion: Option<String>,
    },
    #[error("{message}")]
    Validation {
        message: String,
        suggestion: Option<String>,
    },
    #[error("{message}")]
    RateLimit {
        message: String,
        suggestion: Option<String>,
        endpoint: Option<String>,
    },
    #[error("{message}")]
    Authentication {
        message: String,
        suggestion: Option<String>,
        endpoint: Option<String>,
    },
    /// Vendor business failure or non-success HTTP status.
    #[error("{message}")]
    Api {
        message: String,
        code: Option<String>,
        suggestion: Option<String>,
        endpoint: Option<String>,
    },
    #[error("{message}")]
    Network {
        message: String,
        endpoint: Option<String>,
        #[source]
        source: Option<BoxError>,
    },
    #[error("{message}")]
    Internal { message: String },
}

impl McpError {
    pub fn config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn rate_limit(message: impl Into<String>, suggestion: Option<&str>) -> Self {
        Self::RateLimit {
            message: message.into(),
            suggestion: suggestion.map(str::to_string),
            endpoint: None,
        }
    }

    pub fn api(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            code: Some(code.into()),
            suggestion: None,
            endpoint: None,
        }
    }

    pub fn network(
        message: impl Into<String>,
        endpoint: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Network {
            message: message.into(),
            endpoint: Some(endpoint.into()),
            source,
        }
    }

    /// Attaches a remediation hint; ignored by kinds that carry a fixed one.
    pub fn with_suggestion(mut self, hint: impl Into<String>) -> Self {
        match &mut self {
            Self::Config { suggestion, .. }
            | Self::Validation { suggestion, .. }
            | Self::RateLimit { suggestion, .. }
            | Self::Authentication { suggestion, .. }
            | Self::Api { suggestion, .. } => *suggestion = Some(hint.into()),
            Self::Network { .. } | Self::Internal { .. } => {}
        }
        self
    }

    pub fn with_endpoint(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Self::RateLimit { endpoint, .. }
            | Self::Authentication { endpoint, .. }
            | Self::Api { endpoint, .. }
            | Self::Network { endpoint, .. } => *endpoint = Some(value.into()),
            Self::Config { .. } | Self::Validation { .. } | Self::Internal { .. } => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::ConfigError,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::RateLimit { .. } => ErrorKind::RateLimitError,
            Self::Authentication { .. } => ErrorKind::AuthenticationError,
            Self::Api { .. } => ErrorKind::BitgetApiError,
            Self::Network { .. } => ErrorKind::NetworkError,
            Self::Internal { .. } => ErrorKind::InternalError,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Config { suggestion, .. }
            | Self::Validation { suggestion, .. }
            | Self::RateLimit { suggestion, .. }
            | Self::Authentication { suggestion, .. }
            | Self::Api { suggestion, .. } => suggestion.as_deref(),
            Self::Network { .. } => Some(NETWORK_SUGGESTION),
            Self::Internal { .. } => Some(INTERNAL_SUGGESTION),
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::RateLimit { endpoint, .. }
            | Self::Authentication { endpoint, .. }
            | Self::Api { endpoint, .. }
            | Self::Network { endpoint, .. } => endpoint.as_deref(),
            Self::Config { .. } | Self::Validation { .. } | Self::Internal { .. } => None,
        }
    }

    /// True for a vendor error raised from an HTTP 404 response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code: Some(code), .. } if code == "404")
    }
}

/// Uniform failure shape returned to tool callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolErrorPayload {
    pub error: bool,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub timestamp: String,
}

impl ToolErrorPayload {
    pub fn from_error(err: &McpError, fallback_endpoint: Option<&str>) -> Self {
        Self {
            error: true,
            kind: err.kind(),
            code: err.code().map(str::to_string),
            message: err.to_string(),
            suggestion: err.suggestion().map(str::to_string),
            endpoint: err.endpoint().or(fallback_endpoint).map(str::to_string),
            timestamp: now_iso(),
        }
    }
}

/// Boundary conversion: typed errors keep their kind, anything else is internal.
pub fn to_payload(err: &anyhow::Error, fallback_endpoint: Option<&str>) -> ToolErrorPayload {
    match err.downcast_ref::<McpError>() {
        Some(e) => ToolErrorPayload::from_error(e, fallback_endpoint),
        None => ToolErrorPayload::from_error(
            &McpError::Internal {
                message: err.to_string(),
            },
            fallback_endpoint,
        ),
    }
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
