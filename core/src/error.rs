//! Error types for request execution and delivery.
//!
//! # Design
//! `NetworkError` is the single error carried by a `Failure` outcome. The
//! variants follow how the executor treats them: `Transport` failures are
//! retried while the policy allows it, everything else is terminal. The type
//! is `Clone` because one failure reaches up to three delivery channels.

use thiserror::Error;

/// Which transport-level operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection was refused or dropped.
    Connect,
    /// The host name could not be resolved.
    Dns,
    /// The attempt did not finish within the request timeout.
    Timeout,
    /// Socket-level I/O error.
    Io,
    /// Anything else the transport reports, including a panicking transport.
    Other,
}

/// Errors surfaced through `Outcome::Failure`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Connection, DNS, timeout or I/O failure. Retryable.
    #[error("transport error ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// The server answered with a non-2xx status. The body is kept for
    /// callers that want to inspect it.
    #[error("HTTP {status}: {body}")]
    Application { status: u16, body: String },

    /// A response arrived but its body could not be decoded. Retrying
    /// would read the same body again, so this is terminal.
    #[error("malformed response (HTTP {status}): {reason}")]
    MalformedResponse { status: u16, reason: String },

    /// The request was cancelled before it finished.
    #[error("request cancelled")]
    Cancelled,

    /// The request body could not be encoded.
    #[error("encoding failed: {0}")]
    Encode(String),
}

impl NetworkError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        NetworkError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transport(TransportErrorKind::Timeout, message)
    }

    pub fn malformed(status: u16, reason: impl Into<String>) -> Self {
        NetworkError::MalformedResponse {
            status,
            reason: reason.into(),
        }
    }

    /// Whether another attempt could produce a different result.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetworkError::Transport { .. })
    }

    /// The status code to report alongside this error. Zero when no response
    /// was received.
    pub fn status(&self) -> u16 {
        match self {
            NetworkError::Application { status, .. }
            | NetworkError::MalformedResponse { status, .. } => *status,
            _ => 0,
        }
    }
}

/// Errors returned by `Fanout::deliver`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The request already delivered its outcome.
    #[error("outcome for request {0} was already delivered")]
    AlreadyDelivered(uuid::Uuid),
}

/// Errors from loading a `NetworkConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
