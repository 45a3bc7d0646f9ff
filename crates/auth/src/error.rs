//! Fehlertypen fuer den Auth-Service

use thiserror::Error;

/// Alle moeglichen Fehler im Auth-Service
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Passwort ---
    #[error("Passwort-Hashing fehlgeschlagen: {0}")]
    PasswortHashing(String),

    #[error("Passwort muss mindestens {minimum} Zeichen lang sein")]
    PasswortZuSchwach { minimum: usize },

    // --- Authentifizierung ---
    #[error("Benutzername oder Passwort falsch")]
    UngueltigeAnmeldedaten,

    #[error("Konto gesperrt. Erneut versuchen in {verbleibend_sek} Sekunden")]
    KontoGesperrt { verbleibend_sek: u64 },

    // --- Benutzerverwaltung ---
    #[error("Benutzername bereits vergeben: {0}")]
    BenutzernameVergeben(String),

    #[error("Benutzer nicht gefunden: {0}")]
    BenutzerNichtGefunden(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Alias fuer den Auth-Service
pub type AuthResult<T> = Result<T, AuthError>;
