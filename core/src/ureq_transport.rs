//! Blocking transport backed by ureq.
//!
//! # Design
//! One agent is shared by all attempts. `http_status_as_error` is disabled
//! so the status is read here: 2xx responses are returned as data, anything
//! else becomes `NetworkError::Application` with the body attached. The
//! request timeout is applied per call through `timeout_global`.
//!
//! A body that cannot be read as text (invalid UTF-8, or larger than the
//! agent's body limit) is a `MalformedResponse` carrying the status, not a
//! transport failure: another attempt would read the same body.

use ureq::Agent;

use crate::error::{NetworkError, TransportErrorKind};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

fn map_error(err: ureq::Error) -> NetworkError {
    let kind = match &err {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::ConnectionFailed => TransportErrorKind::Connect,
        ureq::Error::Io(_) => TransportErrorKind::Io,
        _ => TransportErrorKind::Other,
    };
    NetworkError::transport(kind, err.to_string())
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        let timeout = Some(request.timeout);

        let result = match request.method {
            HttpMethod::Get | HttpMethod::Delete => {
                let mut builder = match request.method {
                    HttpMethod::Delete => self.agent.delete(&request.url),
                    _ => self.agent.get(&request.url),
                };
                for (k, v) in &request.headers {
                    builder = builder.header(k, v);
                }
                for (k, v) in &request.query {
                    builder = builder.query(k, v);
                }
                builder.config().timeout_global(timeout).build().call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                for (k, v) in &request.headers {
                    builder = builder.header(k, v);
                }
                let builder = builder.config().timeout_global(timeout).build();
                match &request.body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(map_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let bytes = match response.body_mut().read_to_vec() {
            Ok(bytes) => bytes,
            Err(ureq::Error::BodyExceedsLimit(limit)) => {
                return Err(NetworkError::malformed(
                    status,
                    format!("body exceeds {limit} bytes"),
                ))
            }
            Err(e) => return Err(map_error(e)),
        };

        if !(200..300).contains(&status) {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(NetworkError::Application { status, body });
        }
        let body = String::from_utf8(bytes)
            .map_err(|e| NetworkError::malformed(status, format!("body is not UTF-8: {e}")))?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
