//! Error types for the censor engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias using the engine's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Message fragments that identify transport-level failures
const NETWORK_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "no such host",
    "network is unreachable",
    "i/o timeout",
    "connection timed out",
    "dial tcp",
    "dial udp",
];

/// Coarse classification used for retry and alerting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Timeout,
    Auth,
    Config,
    Validation,
    Provider,
    Internal,
}

impl ErrorCategory {
    /// Stable string form, as used in logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::Config => "config",
            Self::Validation => "validation",
            Self::Provider => "provider",
            Self::Internal => "internal",
        }
    }

    /// Categorize a provider HTTP status code
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            408 | 504 => Self::Timeout,
            c if c >= 500 => Self::Internal,
            _ => Self::Provider,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network failure sub-kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Unreachable,
    ConnectionRefused,
    DnsResolution,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unreachable => "network unreachable",
            Self::ConnectionRefused => "connection refused",
            Self::DnsResolution => "DNS resolution failed",
        })
    }
}

/// Authentication failure sub-kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    AuthFailed,
    PermissionDenied,
    InvalidCredential,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AuthFailed => "authentication failed",
            Self::PermissionDenied => "permission denied",
            Self::InvalidCredential => "invalid credentials",
        })
    }
}

/// Configuration failure sub-kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    MissingConfig,
    InvalidConfig,
    ProviderDisabled,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingConfig => "missing required configuration",
            Self::InvalidConfig => "invalid configuration",
            Self::ProviderDisabled => "provider is disabled",
        })
    }
}

/// Error reported by a moderation provider, with a retry verdict
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("provider {provider} error [{}{code}]: {message}", status_prefix(.status_code))]
pub struct ProviderError {
    /// Provider name
    pub provider: String,

    /// Vendor error code
    pub code: String,

    /// Vendor error message
    pub message: String,

    /// HTTP status code, when the failure came from an HTTP response
    pub status_code: Option<u16>,

    /// Category used for handling decisions
    pub category: ErrorCategory,

    /// Whether the call may be retried
    pub retryable: bool,
}

fn status_prefix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("{}/", code),
        None => String::new(),
    }
}

impl ProviderError {
    /// Create a provider error in the `provider` category
    pub fn new(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut err = Self {
            provider: provider.into(),
            code: code.into(),
            message: message.into(),
            status_code: None,
            category: ErrorCategory::Provider,
            retryable: false,
        };
        err.retryable = err.compute_retryable();
        err
    }

    /// Attach an HTTP status code; recategorizes the error
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self.category = ErrorCategory::from_status_code(code);
        self.retryable = self.compute_retryable();
        self
    }

    /// Override the category
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self.retryable = self.compute_retryable();
        self
    }

    fn compute_retryable(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::Network | ErrorCategory::RateLimit | ErrorCategory::Timeout
        ) || matches!(self.status_code, Some(429 | 500 | 502 | 503 | 504))
    }
}

/// Input validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation error on {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Persistence failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store error during {operation} on {table}: {cause}")]
pub struct StoreError {
    /// Operation that failed (create, update, query)
    pub operation: String,

    /// Table or collection name
    pub table: String,

    /// Underlying cause
    pub cause: String,
}

impl StoreError {
    pub fn new(
        operation: impl Into<String>,
        table: impl Into<String>,
        cause: impl fmt::Display,
    ) -> Self {
        Self {
            operation: operation.into(),
            table: table.into(),
            cause: cause.to_string(),
        }
    }
}

/// Core error type for censor operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Submit was called without resources
    #[error("no resources provided")]
    NoResources,

    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// No provider registered under the given name
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("store not configured")]
    StoreNotConfigured,

    /// Missing review, task, or snapshot record
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Callback signature verification failed
    #[error("callback signature invalid: {0}")]
    CallbackInvalid(String),

    #[error("operation timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("content exceeds size limit")]
    ContentTooLarge,

    #[error("unsupported resource type: {0}")]
    UnsupportedType(String),

    #[error("duplicate submission")]
    DuplicateSubmit,

    /// Stale binding update
    #[error("revision conflict, stale update")]
    RevisionConflict,

    /// Transport failures
    #[error("{kind}: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// Authentication and authorization failures
    #[error("{kind}: {message}")]
    Auth { kind: AuthErrorKind, message: String },

    /// Configuration failures
    #[error("{kind}: {message}")]
    Config {
        kind: ConfigErrorKind,
        message: String,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid-configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            kind: ConfigErrorKind::InvalidConfig,
            message: msg.into(),
        }
    }

    /// Create a missing-configuration error
    pub fn missing_config(msg: impl Into<String>) -> Self {
        Self::Config {
            kind: ConfigErrorKind::MissingConfig,
            message: msg.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn invalid_resource(msg: impl Into<String>) -> Self {
        Self::InvalidResource(msg.into())
    }

    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound(id.into())
    }

    pub fn callback_invalid(msg: impl Into<String>) -> Self {
        Self::CallbackInvalid(msg.into())
    }

    pub fn network(kind: NetworkErrorKind, msg: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: msg.into(),
        }
    }

    pub fn auth(kind: AuthErrorKind, msg: impl Into<String>) -> Self {
        Self::Auth {
            kind,
            message: msg.into(),
        }
    }

    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(field, msg))
    }

    pub fn store(operation: impl Into<String>, table: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Store(StoreError::new(operation, table, cause))
    }

    /// Map a raw transport error message onto the matching sentinel.
    ///
    /// Messages that match no known shape become `Internal`.
    pub fn from_network_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("connection refused") {
            Self::network(NetworkErrorKind::ConnectionRefused, msg)
        } else if lower.contains("no such host") || lower.contains("dns") {
            Self::network(NetworkErrorKind::DnsResolution, msg)
        } else if lower.contains("network is unreachable") {
            Self::network(NetworkErrorKind::Unreachable, msg)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::Internal(msg)
        }
    }

    /// Whether the failure is transport-related
    pub fn is_network_error(&self) -> bool {
        if matches!(self, Self::Network { .. }) {
            return true;
        }
        let msg = self.to_string().to_lowercase();
        NETWORK_PATTERNS.iter().any(|p| msg.contains(p))
    }

    /// Whether the failure may succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited => true,
            Self::Network {
                kind: NetworkErrorKind::Unreachable | NetworkErrorKind::ConnectionRefused,
                ..
            } => true,
            Self::Provider(pe) => pe.retryable,
            _ => self.is_network_error(),
        }
    }

    pub fn is_auth_error(&self) -> bool {
        match self {
            Self::Auth { .. } => true,
            Self::Provider(pe) => pe.category == ErrorCategory::Auth,
            _ => false,
        }
    }

    pub fn is_config_error(&self) -> bool {
        match self {
            Self::Config { .. } => true,
            Self::Provider(pe) => pe.category == ErrorCategory::Config,
            _ => false,
        }
    }

    pub fn is_rate_limit_error(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Provider(pe) => {
                pe.category == ErrorCategory::RateLimit || pe.status_code == Some(429)
            }
            _ => false,
        }
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        if let Self::Provider(pe) = self {
            return pe.category;
        }
        if self.is_network_error() {
            return ErrorCategory::Network;
        }
        match self {
            Self::Timeout => ErrorCategory::Timeout,
            Self::RateLimited => ErrorCategory::RateLimit,
            Self::Auth { .. } => ErrorCategory::Auth,
            Self::Config { .. } => ErrorCategory::Config,
            Self::Validation(_) => ErrorCategory::Validation,
            _ => ErrorCategory::Internal,
        }
    }
}
