//! Request configuration.
//!
//! # Design
//! A `Request` is assembled with a consuming builder and then only read.
//! The executor borrows it for every attempt, so each attempt sees the same
//! configuration verbatim. Defaults: 60 second timeout, a single attempt,
//! delivery on the main queue.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::delivery::NetworkDelegate;
use crate::error::NetworkError;
use crate::http::{HttpMethod, HttpRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Identifies the request an outcome belongs to. Posted with every broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestInfo {
    pub id: Uuid,
    pub method: HttpMethod,
    pub url: String,
}

impl fmt::Display for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.method, self.url, self.id)
    }
}

/// A configured network request.
///
/// Cloning copies the configuration under a fresh id, so every clone that is
/// sent is reported as its own request.
pub struct Request {
    info: RequestInfo,
    headers: BTreeMap<String, String>,
    body: Map<String, Value>,
    timeout: Duration,
    max_attempts: u32,
    run_on_main_thread: bool,
    delegate: Option<Weak<dyn NetworkDelegate>>,
}

impl Clone for Request {
    fn clone(&self) -> Self {
        Self {
            info: RequestInfo {
                id: Uuid::new_v4(),
                ..self.info.clone()
            },
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: self.timeout,
            max_attempts: self.max_attempts,
            run_on_main_thread: self.run_on_main_thread,
            delegate: self.delegate.clone(),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("info", &self.info)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("run_on_main_thread", &self.run_on_main_thread)
            .field("delegate", &self.delegate.is_some())
            .finish()
    }
}

impl Request {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            info: RequestInfo {
                id: Uuid::new_v4(),
                method,
                url: url.into(),
            },
            headers: BTreeMap::new(),
            body: Map::new(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_on_main_thread: true,
            delegate: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Set a header. A later value for the same key replaces the earlier one.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Replace the body with the fields of a serializable model.
    ///
    /// Fails with `NetworkError::Encode` unless `model` serializes to a JSON
    /// object.
    pub fn body_from<T: Serialize>(mut self, model: &T) -> Result<Self, NetworkError> {
        match serde_json::to_value(model).map_err(|e| NetworkError::Encode(e.to_string()))? {
            Value::Object(map) => {
                self.body = map;
                Ok(self)
            }
            other => Err(NetworkError::Encode(format!(
                "request body must be a JSON object, got {other}"
            ))),
        }
    }

    /// Zero is replaced by the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout };
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn run_on_main_thread(mut self, on_main: bool) -> Self {
        self.run_on_main_thread = on_main;
        self
    }

    /// Attach a delegate for this request only. The request keeps a weak
    /// reference, so a dropped delegate is skipped at delivery.
    pub fn delegate(mut self, delegate: &Arc<dyn NetworkDelegate>) -> Self {
        self.delegate = Some(Arc::downgrade(delegate));
        self
    }

    pub fn info(&self) -> &RequestInfo {
        &self.info
    }

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn method(&self) -> HttpMethod {
        self.info.method
    }

    pub fn url(&self) -> &str {
        &self.info.url
    }

    pub fn header_fields(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body_fields(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// The configured attempt count as stored, possibly below one.
    pub fn configured_max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Total attempts the executor will make at most. Never below one.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn runs_on_main_thread(&self) -> bool {
        self.run_on_main_thread
    }

    pub(crate) fn delegate_ref(&self) -> Option<&Weak<dyn NetworkDelegate>> {
        self.delegate.as_ref()
    }

    /// Build the wire form of one attempt.
    ///
    /// POST bodies are sent as JSON. GET and DELETE send the body entries as
    /// query parameters: strings verbatim, other values as JSON text.
    pub fn to_http(&self) -> Result<HttpRequest, NetworkError> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let (query, body) = match self.info.method {
            HttpMethod::Post => {
                if !self
                    .headers
                    .keys()
                    .any(|k| k.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("content-type".to_string(), "application/json".to_string()));
                }
                let body = serde_json::to_string(&self.body)
                    .map_err(|e| NetworkError::Encode(e.to_string()))?;
                (Vec::new(), Some(body))
            }
            HttpMethod::Get | HttpMethod::Delete => {
                let query = self
                    .body
                    .iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect();
                (query, None)
            }
        };

        Ok(HttpRequest {
            method: self.info.method,
            url: self.info.url.clone(),
            headers,
            query,
            body,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let req = Request::get("http://localhost/x");
        assert_eq!(req.timeout_duration(), Duration::from_secs(60));
        assert_eq!(req.effective_max_attempts(), 1);
        assert!(req.runs_on_main_thread());
        assert!(req.header_fields().is_empty());
    }

    #[test]
    fn attempts_below_one_are_clamped() {
        assert_eq!(Request::get("u").max_attempts(0).effective_max_attempts(), 1);
        assert_eq!(Request::get("u").max_attempts(4).effective_max_attempts(), 4);
        assert_eq!(Request::get("u").max_attempts(0).configured_max_attempts(), 0);
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let req = Request::get("u").timeout(Duration::ZERO);
        assert_eq!(req.timeout_duration(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn header_keys_are_unique() {
        let req = Request::get("u").header("x-a", "1").header("x-a", "2");
        assert_eq!(req.header_fields().len(), 1);
        assert_eq!(req.header_fields()["x-a"], "2");
    }

    #[test]
    fn post_body_is_json_with_content_type() {
        let req = Request::post("http://h/items")
            .param("title", "milk")
            .param("tags", json!({"nested": [1, 2]}));
        let http = req.to_http().unwrap();
        assert_eq!(http.method, HttpMethod::Post);
        assert!(http.query.is_empty());
        assert!(http
            .headers
            .contains(&("content-type".to_string(), "application/json".to_string())));
        let body: Value = serde_json::from_str(http.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"title": "milk", "tags": {"nested": [1, 2]}}));
    }

    #[test]
    fn caller_content_type_is_kept() {
        let http = Request::post("u")
            .header("Content-Type", "application/vnd.api+json")
            .to_http()
            .unwrap();
        assert_eq!(http.headers.len(), 1);
        assert_eq!(http.headers[0].1, "application/vnd.api+json");
    }

    #[test]
    fn get_body_becomes_query() {
        let http = Request::get("http://h/search")
            .param("q", "rust")
            .param("page", 2)
            .timeout(Duration::from_secs(5))
            .to_http()
            .unwrap();
        assert!(http.body.is_none());
        assert_eq!(
            http.query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "rust".to_string())
            ]
        );
        assert_eq!(http.timeout, Duration::from_secs(5));
    }

    #[test]
    fn body_from_requires_an_object() {
        #[derive(Serialize)]
        struct Login {
            user: String,
        }
        let req = Request::post("u")
            .body_from(&Login {
                user: "ann".into(),
            })
            .unwrap();
        assert_eq!(req.body_fields()["user"], "ann");

        let err = Request::post("u").body_from(&vec![1, 2]).unwrap_err();
        assert!(matches!(err, NetworkError::Encode(_)));
    }

    #[test]
    fn each_request_gets_its_own_id() {
        assert_ne!(Request::get("u").id(), Request::get("u").id());
    }

    #[test]
    fn clone_keeps_configuration_under_a_new_id() {
        let original = Request::post("http://h/items")
            .header("x-token", "abc")
            .param("title", "milk")
            .timeout(Duration::from_secs(3))
            .max_attempts(4)
            .run_on_main_thread(false);
        let copy = original.clone();

        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.method(), original.method());
        assert_eq!(copy.url(), original.url());
        assert_eq!(copy.to_http().unwrap(), original.to_http().unwrap());
        assert_eq!(copy.configured_max_attempts(), 4);
        assert!(!copy.runs_on_main_thread());
    }
}
