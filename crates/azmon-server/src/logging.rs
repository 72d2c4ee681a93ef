use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

/// Per-request trace id, stored in request extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// 16 hex characters from 8 random bytes.
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

const MAX_BODY_LOG_CHARS: usize = 200;

fn truncate_body(bytes: &[u8], max: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => azmon_cloud::transport::body_excerpt(s, max),
        Err(_) => "<non-utf8 body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

/// Logs every scrape with a trace id and its duration, and echoes the id
/// back in `X-Trace-Id`. Error bodies are logged; exposition bodies are not.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    tracing::info!(
        trace_id = %trace_id,
        method = %method,
        path = %path,
        ua = %user_agent,
        "--> request"
    );

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();
    let status_code = status.as_u16();

    let mut response = if status.is_server_error() {
        let (parts, body) = response.into_parts();
        let body_bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();
        tracing::error!(
            trace_id = %trace_id,
            status = status_code,
            elapsed = %elapsed,
            body = %truncate_body(&body_bytes, MAX_BODY_LOG_CHARS),
            "<-- response"
        );
        Response::from_parts(parts, Body::from(body_bytes))
    } else {
        if status.is_client_error() {
            tracing::warn!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, "<-- response");
        } else {
            tracing::info!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, "<-- response");
        }
        response
    };

    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-Id", val);
    }
    response
}
