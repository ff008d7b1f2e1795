//! Attempt and outcome types.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::NetworkError;

/// One transport invocation within a request's retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based position in the sequence.
    pub ordinal: u32,
}

impl Attempt {
    pub fn first() -> Self {
        Self { ordinal: 1 }
    }

    pub fn next(self) -> Self {
        Self {
            ordinal: self.ordinal + 1,
        }
    }
}

/// The single terminal result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { status: u16, data: Value },
    Failure { status: u16, error: NetworkError },
}

impl Outcome {
    pub fn success(status: u16, data: Value) -> Self {
        Outcome::Success { status, data }
    }

    pub fn failure(status: u16, error: NetworkError) -> Self {
        Outcome::Failure { status, error }
    }

    pub fn cancelled() -> Self {
        Outcome::Failure {
            status: 0,
            error: NetworkError::Cancelled,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Outcome::Success { status, .. } | Outcome::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Outcome::Success { data, .. } => Some(data),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&NetworkError> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error, .. } => Some(error),
        }
    }

    /// Map the result data onto a typed model.
    ///
    /// A failure is returned as its error; data that does not fit `T` is a
    /// `MalformedResponse`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        match self {
            Outcome::Success { status, data } => {
                T::deserialize(data).map_err(|e| NetworkError::malformed(*status, e.to_string()))
            }
            Outcome::Failure { error, .. } => Err(error.clone()),
        }
    }
}
