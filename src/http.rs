//! HTTP surface: a landing page and the `/metrics` endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tracing::error;

/// Content type of the text exposition written by [`encode`].
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

const LANDING_PAGE: &str = "<html>
<head><title>MSSQL exporter for Prometheus</title></head>
<body>
<h1>MSSQL exporter for Prometheus</h1>
<p><a href='/metrics'>Metrics</a></p>
</body>
</html>
";

/// Routes `GET /` to the landing page and `GET /metrics` to a scrape of
/// `registry`.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/", get(landing_page))
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

async fn landing_page() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// Encodes the registry, which runs one scrape, on a blocking thread.
async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    let encoded = tokio::task::spawn_blocking(move || {
        let mut buffer = String::new();
        encode(&mut buffer, &registry).map(|()| buffer)
    })
    .await;

    match encoded {
        Ok(Ok(buffer)) => ([(CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], buffer).into_response(),
        Ok(Err(error)) => {
            error!(%error, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(error) => {
            error!(%error, "scrape task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
