//! Prometheus-kompatible Metriken fuer Fernruf
//!
//! Registrierte Metriken:
//! - `fernruf_connected_clients` – Gauge: Aktuell gebundene Live-Verbindungen
//! - `fernruf_messages_relayed_total` – Counter: Weitergeleitete Nachrichten (type)
//! - `fernruf_messages_dropped_total` – Counter: Verworfene Nachrichten (reason)
//! - `fernruf_logins_total` – Counter: Login-Versuche (result)
//! - `fernruf_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `fernruf_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Fernruf-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Zaehler.
#[derive(Clone)]
pub struct FernrufMetriken {
    pub registry: Arc<Registry>,

    // Signaling
    pub connected_clients: IntGauge,
    pub messages_relayed_total: IntCounterVec,
    pub messages_dropped_total: IntCounterVec,

    // Auth
    pub logins_total: IntCounterVec,

    // HTTP
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl FernrufMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "fernruf_connected_clients",
            "Anzahl aktuell gebundener Live-Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let messages_relayed_total = IntCounterVec::new(
            Opts::new(
                "fernruf_messages_relayed_total",
                "Weitergeleitete Signaling-Nachrichten",
            ),
            &["type"],
        )?;
        registry.register(Box::new(messages_relayed_total.clone()))?;

        let messages_dropped_total = IntCounterVec::new(
            Opts::new(
                "fernruf_messages_dropped_total",
                "Verworfene Signaling-Nachrichten",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(messages_dropped_total.clone()))?;

        let logins_total = IntCounterVec::new(
            Opts::new("fernruf_logins_total", "Login-Versuche nach Ergebnis"),
            &["result"],
        )?;
        registry.register(Box::new(logins_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("fernruf_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "fernruf_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            messages_relayed_total,
            messages_dropped_total,
            logins_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt eine weitergeleitete Nachricht
    pub fn weitergeleitet(&self, typ: &str) {
        self.messages_relayed_total.with_label_values(&[typ]).inc();
    }

    /// Zaehlt eine verworfene Nachricht
    pub fn verworfen(&self, grund: &str) {
        self.messages_dropped_total.with_label_values(&[grund]).inc();
    }

    /// Zaehlt einen Login-Versuch
    pub fn login(&self, ergebnis: &str) {
        self.logins_total.with_label_values(&[ergebnis]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: FernrufMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<FernrufMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
