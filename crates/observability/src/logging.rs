//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `FERNRUF_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `fernruf_signaling=debug`)
//! - `FERNRUF_LOG_FORMAT`: Format (text/json)
//!
//! Gesetzte Umgebungsvariablen haben Vorrang vor der Konfigurationsdatei.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "FERNRUF_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "FERNRUF_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Ein zweiter Aufruf im selben Prozess ist ein No-op.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = effektives_format(std::env::var(LOG_FORMAT_ENV).ok(), format);

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging war bereits initialisiert");
    }
}

/// Waehlt das Format: Umgebung vor Konfiguration, unbekannte Werte werden zu `text`
fn effektives_format(aus_env: Option<String>, konfiguriert: &str) -> String {
    let kandidat = aus_env.unwrap_or_else(|| konfiguriert.to_string());
    if log_format_gueltig(&kandidat) {
        kandidat
    } else {
        "text".to_string()
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
