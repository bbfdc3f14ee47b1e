use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use uuid::Uuid;

/// Upper bound for `/bytes/{n}` so a typo cannot exhaust memory.
pub const MAX_BYTES: usize = 16 * 1024 * 1024;

/// Body echoed by `/echo`, in JSON when the caller asks for it.
#[derive(Debug, Clone, Serialize)]
pub struct Echo {
    pub method: String,
    pub content_type: Option<String>,
    pub len: usize,
}

pub fn app() -> Router {
    Router::new()
        .route("/bytes/{n}", get(bytes))
        .route("/delay/{ms}", get(delay))
        .route("/echo", any(echo))
        .route("/headers", get(headers))
        .route("/status/{code}", get(status))
        .layer(middleware::map_response(tag_response))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Byte `i` of every `/bytes` payload.
pub fn pattern_byte(i: usize) -> u8 {
    (i % 251) as u8
}

async fn tag_response(mut response: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn bytes(Path(n): Path<usize>) -> Result<Response, StatusCode> {
    if n > MAX_BYTES {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    let body: Vec<u8> = (0..n).map(pattern_byte).collect();
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response())
}

async fn delay(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "ok"
}

/// Returns the request body unchanged with its content type, or a JSON
/// summary when `accept: application/json` is sent.
async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if wants_json {
        return Json(Echo {
            method: method.to_string(),
            content_type,
            len: body.len(),
        })
        .into_response();
    }
    let mut response = body.into_response();
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

async fn headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    Json(
        headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect(),
    )
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}
