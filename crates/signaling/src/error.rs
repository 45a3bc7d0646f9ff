//! Fehlertypen fuer den Signaling-Service

use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
///
/// Keiner dieser Fehler wird an den Client gemeldet; sie fuehren zum
/// Verwerfen des Frames und werden nur lokal protokolliert und gezaehlt.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Frame ist kein JSON oder hat nicht die erwartete Struktur
    #[error("Ungueltiges Frame: {0}")]
    UngueltigesFormat(String),

    /// Verbindung ist an keine Identitaet gebunden
    #[error("Verbindung nicht authentifiziert")]
    NichtAuthentifiziert,

    /// `from` im Frame widerspricht der Bindung der Verbindung
    #[error("Absender '{gemeldet}' passt nicht zur Verbindung ({erwartet})")]
    AbsenderAbweichend { erwartet: String, gemeldet: String },

    /// Ziel-Identitaet fehlt oder ist unbekannt
    #[error("Unbekanntes Ziel: {0}")]
    UnbekanntesZiel(String),

    /// Ziel-Identitaet ist nicht verbunden
    #[error("Ziel nicht online")]
    ZielOffline,
}

impl SignalingError {
    /// Erstellt einen Formatfehler
    pub fn format(msg: impl Into<String>) -> Self {
        Self::UngueltigesFormat(msg.into())
    }

    /// Label fuer die `reason`-Dimension der Drop-Metrik
    pub fn grund(&self) -> &'static str {
        match self {
            Self::UngueltigesFormat(_) => "malformed",
            Self::NichtAuthentifiziert => "unauthenticated",
            Self::AbsenderAbweichend { .. } => "sender_mismatch",
            Self::UnbekanntesZiel(_) => "unknown_target",
            Self::ZielOffline => "target_offline",
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
