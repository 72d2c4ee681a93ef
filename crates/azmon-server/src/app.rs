use crate::exposition;
use crate::logging::{self, TraceId};
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Extension, Router};

const LANDING_PAGE: &str = r#"<html>
<head><title>Azure Exporter</title></head>
<body>
<h1>Azure Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#;

pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing_page))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(logging::request_logging))
        .with_state(state)
}

async fn landing_page() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// Runs one collection cycle per scrape.
async fn metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    let samples = match state.collector.collect().await {
        Ok(samples) => samples,
        Err(e) => {
            tracing::error!(trace_id = %trace_id.0, error = %e, "Collection cycle failed");
            return error_response(&e);
        }
    };

    match exposition::encode(&samples) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, exposition::content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(trace_id = %trace_id.0, error = %e, "Failed to encode metrics");
            error_response(&e)
        }
    }
}

fn error_response(err: &dyn std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        exposition::error_body(err),
    )
        .into_response()
}
