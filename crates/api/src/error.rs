//! Fehlertypen fuer die Fernruf-API

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use fernruf_auth::AuthError;
use serde_json::json;
use thiserror::Error;

/// Alle Fehler die ein REST-Handler zurueckgeben kann
///
/// Der Display-Text geht als `error` an den Client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    UngueltigeEingabe(String),

    #[error("{0}")]
    NichtAutorisiert(String),

    #[error("Account locked. Try again in {verbleibend_sek} seconds")]
    Gesperrt { verbleibend_sek: u64 },

    #[error("Internal server error")]
    Intern(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// HTTP-Statuscode fuer die Antwort
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::UngueltigeEingabe(_) | Self::Gesperrt { .. } => StatusCode::BAD_REQUEST,
            Self::NichtAutorisiert(_) => StatusCode::UNAUTHORIZED,
            Self::Intern(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label fuer `fernruf_logins_total`
    pub fn login_ergebnis(&self) -> &'static str {
        match self {
            Self::UngueltigeEingabe(_) => "rejected",
            Self::NichtAutorisiert(_) => "invalid",
            Self::Gesperrt { .. } => "locked",
            Self::Intern(_) => "error",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::PasswortZuSchwach { minimum } => Self::UngueltigeEingabe(format!(
                "Password must be at least {minimum} characters"
            )),
            AuthError::BenutzernameVergeben(_) => {
                Self::UngueltigeEingabe("Username already exists".into())
            }
            AuthError::UngueltigeAnmeldedaten => {
                Self::NichtAutorisiert("Invalid username or password".into())
            }
            AuthError::KontoGesperrt { verbleibend_sek } => Self::Gesperrt { verbleibend_sek },
            andere => Self::Intern(andere.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        tracing::debug!(fehler = %e, "Request-Body abgelehnt");
        Self::UngueltigeEingabe("Invalid JSON".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Intern(detail) = &self {
            tracing::error!(fehler = %detail, "Interner API-Fehler");
        }
        (
            self.http_status(),
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}
