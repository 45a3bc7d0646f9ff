//! HTTP-Middleware fuer Axum
//!
//! Misst die Antwortzeit jeder HTTP-Anfrage, zaehlt sie in den
//! Prometheus-Metriken und protokolliert sie als strukturiertes Log-Event.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, Response},
    middleware::Next,
};
use std::time::Instant;

use crate::metrics::FernrufMetriken;

/// TraceLayer fuer Request-Spans
pub fn request_trace_layer() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
> {
    tower_http::trace::TraceLayer::new_for_http()
}

/// Axum-Middleware-Funktion: misst Antwortzeit und zaehlt die Anfrage.
///
/// Verwendung:
/// ```ignore
/// Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn_with_state(metriken, http_metriken_middleware))
/// ```
pub async fn http_metriken_middleware(
    State(metriken): State<FernrufMetriken>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let methode = req.method().to_string();
    // Route-Muster statt roher Pfad, damit die Label-Menge begrenzt bleibt
    let pfad = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unbekannt".to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    let dauer = start.elapsed();
    let status = response.status().as_u16().to_string();

    metriken
        .http_requests_total
        .with_label_values(&[methode.as_str(), pfad.as_str(), status.as_str()])
        .inc();
    metriken
        .http_request_duration_seconds
        .with_label_values(&[methode.as_str(), pfad.as_str()])
        .observe(dauer.as_secs_f64());

    tracing::debug!(
        method = %methode,
        path = %pfad,
        status = %status,
        duration_ms = dauer.as_millis() as u64,
        "HTTP-Anfrage abgeschlossen"
    );

    response
}
