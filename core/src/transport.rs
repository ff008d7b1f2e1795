//! The seam to the component that actually moves bytes.
//!
//! A transport performs exactly one round-trip per call and must honour
//! `HttpRequest::timeout`, reporting expiry as a `Timeout` transport error.
//! It is called from attempt threads, hence `Send + Sync`.

use crate::error::NetworkError;
use crate::http::{HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    /// Perform one attempt.
    ///
    /// `Ok` means a response arrived; status interpretation is left to the
    /// caller. Errors should be `NetworkError::Transport` for connection
    /// level failures (retryable) and `Application` or `MalformedResponse`
    /// for failures that another attempt will not fix.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError>;
}

impl<F> Transport for F
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, NetworkError> + Send + Sync,
{
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        self(request)
    }
}
