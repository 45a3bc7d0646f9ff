//! Gemeinsame Identifikationstypen fuer Fernruf
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Eindeutige Benutzer-ID (stabil fuer die Lebensdauer des Accounts)
///
/// Wird auf dem Draht als nackter UUID-String serialisiert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Erstellt eine neue zufaellige UserId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }

    /// Parst eine UserId aus dem Draht-Format (UUID-String)
    ///
    /// Gibt `None` zurueck wenn der String keine gueltige UUID ist.
    pub fn parsen(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    /// Draht-Darstellung (ohne `user:`-Praefix)
    pub fn als_draht(&self) -> String {
        self.0.to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Zaehler fuer Verbindungs-IDs (prozessweit eindeutig)
static NAECHSTE_VERBINDUNG: AtomicU64 = AtomicU64::new(1);

/// ID einer Live-Verbindung (WebSocket)
///
/// Wird nur im Prozess verwendet und nie an Clients herausgegeben.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerbindungsId(pub u64);

impl VerbindungsId {
    /// Vergibt die naechste freie Verbindungs-ID
    pub fn naechste() -> Self {
        Self(NAECHSTE_VERBINDUNG.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_eindeutig() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b, "Zwei neue UserIds muessen verschieden sein");
    }

    #[test]
    fn user_id_display_hat_praefix() {
        let id = UserId(Uuid::nil());
        assert!(id.to_string().starts_with("user:"));
        assert!(!id.als_draht().starts_with("user:"));
    }

    #[test]
    fn user_id_serialisiert_als_nackte_uuid() {
        let uid = UserId::new();
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, format!("\"{}\"", uid.inner()));
        let uid2: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, uid2);
    }

    #[test]
    fn user_id_parsen() {
        let uid = UserId::new();
        assert_eq!(UserId::parsen(&uid.als_draht()), Some(uid));
        assert_eq!(UserId::parsen("server"), None);
        assert_eq!(UserId::parsen(""), None);
    }

    #[test]
    fn verbindungs_ids_steigen() {
        let a = VerbindungsId::naechste();
        let b = VerbindungsId::naechste();
        assert!(b > a);
    }
}
