use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Per-key hit counters for the flaky endpoint.
pub type Hits = Arc<RwLock<HashMap<String, u32>>>;

#[derive(Debug, Default, Deserialize)]
pub struct FlakyParams {
    /// How many leading hits misbehave.
    #[serde(default)]
    pub failures: u32,
    /// How long a misbehaving hit stalls before answering 503.
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HitCount {
    pub key: String,
    pub hits: u32,
}

pub fn app() -> Router {
    let hits: Hits = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/echo", get(echo_query).post(echo_body).delete(echo_query))
        .route("/status/{code}", get(status))
        .route("/malformed", get(malformed))
        .route("/binary/{key}", get(binary))
        .route("/slow/{ms}", get(slow))
        .route("/flaky/{key}", get(flaky))
        .route("/hits/{key}", get(hit_count))
        .with_state(hits)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo_query(
    method: axum::http::Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "headers": header_map(&headers),
    }))
}

async fn echo_body(headers: HeaderMap, body: Bytes) -> Result<Json<Value>, StatusCode> {
    let body: Value = serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Json(json!({
        "method": "POST",
        "body": body,
        "headers": header_map(&headers),
    })))
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect()
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    let body = match status {
        StatusCode::INTERNAL_SERVER_ERROR => "server error".to_string(),
        other => format!("status {}", other.as_u16()),
    };
    Ok((status, body))
}

async fn malformed() -> ([(header::HeaderName, &'static str); 1], &'static str) {
    (
        [(header::CONTENT_TYPE, "application/json")],
        "<html>not json</html>",
    )
}

/// 200 with a body that is not valid UTF-8. Counts hits like `/flaky`.
async fn binary(
    State(hits): State<Hits>,
    Path(key): Path<String>,
) -> ([(header::HeaderName, &'static str); 1], Vec<u8>) {
    let hit = record_hit(&hits, &key).await;
    tracing::info!(%key, hit, "binary hit");
    (
        [(header::CONTENT_TYPE, "application/json")],
        vec![0xff, 0xfe, 0xfd],
    )
}

async fn record_hit(hits: &Hits, key: &str) -> u32 {
    let mut hits = hits.write().await;
    let count = hits.entry(key.to_string()).or_insert(0);
    *count += 1;
    *count
}

async fn slow(Path(ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({ "ok": true, "slept_ms": ms }))
}

async fn flaky(
    State(hits): State<Hits>,
    Path(key): Path<String>,
    Query(params): Query<FlakyParams>,
) -> (StatusCode, Json<Value>) {
    let hit = record_hit(&hits, &key).await;
    tracing::info!(%key, hit, failures = params.failures, "flaky hit");

    if hit <= params.failures {
        tokio::time::sleep(Duration::from_millis(params.delay_ms)).await;
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ok": false, "hits": hit })),
        );
    }
    (StatusCode::OK, Json(json!({ "ok": true, "hits": hit })))
}

async fn hit_count(State(hits): State<Hits>, Path(key): Path<String>) -> Json<HitCount> {
    let hits = hits.read().await.get(&key).copied().unwrap_or(0);
    Json(HitCount { key, hits })
}
