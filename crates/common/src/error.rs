use std::error::Error as StdError;

/// Crate-wide result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared across the bridge daemon.
///
/// Watcher loops log these and continue; RPC handlers translate them into
/// `{success:false, error}` envelopes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No live chat-gateway session.
    #[error("not connected to Discord")]
    NotConnected,

    /// An RPC request is missing a required parameter.
    #[error("missing required parameter: {name}")]
    MissingParameter { name: String },

    /// A thread, channel, or guild id is no longer valid.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The gateway reported missing bot permissions.
    #[error("missing permissions: {missing}")]
    PermissionDenied { missing: String },

    /// Gateway rate limit that did not clear after internal retries.
    #[error("rate limited by the chat service: {message}")]
    Throttled { message: String },

    /// SQLite busy or a transient file-read failure; the current tick is
    /// abandoned and retried on the next one.
    #[error("transient storage failure: {message}")]
    Locked { message: String },

    /// An awaited operation (question, resolve) ran out of time.
    #[error("timed out")]
    Timeout,

    /// The actuator cannot inject keystrokes on this host.
    #[error("accessibility permission denied: {guidance}")]
    AccessibilityDenied { guidance: String },

    /// Internal state that should be impossible; recorded, not fatal.
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Input payload or parameter is invalid.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Wrapped source error from an external dependency.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    #[must_use]
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what: what.to_string(),
        }
    }

    #[must_use]
    pub fn permission_denied(missing: impl std::fmt::Display) -> Self {
        Self::PermissionDenied {
            missing: missing.to_string(),
        }
    }

    #[must_use]
    pub fn throttled(message: impl std::fmt::Display) -> Self {
        Self::Throttled {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn locked(message: impl std::fmt::Display) -> Self {
        Self::Locked {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn accessibility_denied(guidance: impl Into<String>) -> Self {
        Self::AccessibilityDenied {
            guidance: guidance.into(),
        }
    }

    #[must_use]
    pub fn invariant(message: impl std::fmt::Display) -> Self {
        Self::InvariantViolation {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error should set the `permissionError` flag in RPC
    /// responses.
    #[must_use]
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}
