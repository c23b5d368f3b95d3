use miette::{Diagnostic, Result};
use std::fmt;
use thiserror::Error;

/// Why a Remote Event Store mutation or listing was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailure {
    PermissionDenied,
    InvalidField,
    NotFound,
    Other,
}

impl StoreFailure {
    /// Classify an HTTP status code returned by the store
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => StoreFailure::InvalidField,
            401 | 403 => StoreFailure::PermissionDenied,
            404 => StoreFailure::NotFound,
            _ => StoreFailure::Other,
        }
    }
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StoreFailure::PermissionDenied => "permission denied",
            StoreFailure::InvalidField => "invalid field",
            StoreFailure::NotFound => "not found",
            StoreFailure::Other => "request failed",
        };
        f.write_str(label)
    }
}

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Discord API error: {0}")]
    #[diagnostic(code(labsync::discord_api))]
    DiscordApi(#[from] serenity::Error),

    #[error("Environment error: {0}")]
    #[diagnostic(code(labsync::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(labsync::config))]
    Config(String),

    #[error("Feed unavailable ({url}): {reason}")]
    #[diagnostic(code(labsync::feed_unavailable))]
    FeedUnavailable { url: String, reason: String },

    #[error("Malformed feed ({source_name}): {reason}")]
    #[diagnostic(code(labsync::malformed_feed))]
    MalformedFeed { source_name: String, reason: String },

    #[error("Malformed timestamp: {0}")]
    #[diagnostic(code(labsync::malformed_timestamp))]
    MalformedTimestamp(String),

    #[error("Invalid recurrence rule for '{uid}': {reason}")]
    #[diagnostic(code(labsync::invalid_rrule))]
    InvalidRecurrenceRule { uid: String, reason: String },

    #[error("Event store {operation} failed ({kind}): {message}")]
    #[diagnostic(code(labsync::store))]
    StoreOperationFailed {
        operation: &'static str,
        kind: StoreFailure,
        message: String,
    },

    #[error("A reconciliation pass is already running")]
    #[diagnostic(code(labsync::pass_in_progress))]
    PassInProgress,

    #[error("Component error: {0}")]
    #[diagnostic(code(labsync::component))]
    Component(String),

    #[error(transparent)]
    #[diagnostic(code(labsync::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(labsync::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(labsync::other))]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type BotResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

pub fn feed_unavailable(url: &str, reason: impl fmt::Display) -> Error {
    Error::FeedUnavailable {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

pub fn malformed_feed(source_name: &str, reason: impl fmt::Display) -> Error {
    Error::MalformedFeed {
        source_name: source_name.to_string(),
        reason: reason.to_string(),
    }
}

pub fn malformed_timestamp(message: &str) -> Error {
    Error::MalformedTimestamp(message.to_string())
}

pub fn invalid_rrule(uid: &str, reason: impl fmt::Display) -> Error {
    Error::InvalidRecurrenceRule {
        uid: uid.to_string(),
        reason: reason.to_string(),
    }
}

/// Helper to create store errors
pub fn store_error(
    operation: &'static str,
    kind: StoreFailure,
    message: impl fmt::Display,
) -> Error {
    Error::StoreOperationFailed {
        operation,
        kind,
        message: message.to_string(),
    }
}

/// Map a serenity failure onto the store taxonomy
pub fn store_error_from_serenity(operation: &'static str, err: serenity::Error) -> Error {
    let kind = match &err {
        serenity::Error::Http(http_err) => http_err
            .status_code()
            .map(|status| StoreFailure::from_status(status.as_u16()))
            .unwrap_or(StoreFailure::Other),
        _ => StoreFailure::Other,
    };
    store_error(operation, kind, err)
}
