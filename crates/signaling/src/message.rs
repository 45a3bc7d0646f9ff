//! JSON-Umschlaege der Live-Verbindung
//!
//! Jedes Frame ist ein JSON-Objekt `{type, data, from, to, timestamp}`.
//! Eingehende Frames werden in zwei Schritten geparst: zuerst der lose
//! Umschlag, dann je nach `type` die geschlossene [`ClientNachricht`].
//! Unbekannte Typen werden zu [`ClientNachricht::Unbekannt`] statt zu
//! einem Fehler.

use chrono::Utc;
use fernruf_auth::{IdentitaetsInfo, OnlineStatus};
use fernruf_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{SignalingError, SignalingResult};

/// Absender fuer alle vom Server erzeugten Nachrichten
pub const SERVER_ABSENDER: &str = "server";

/// Empfaenger-Platzhalter fuer noch nicht gebundene Verbindungen
pub const CLIENT_EMPFAENGER: &str = "client";

// ---------------------------------------------------------------------------
// Eingehend
// ---------------------------------------------------------------------------

/// Loser Umschlag, wie er auf dem Draht ankommt
#[derive(Debug, Deserialize)]
struct Umschlag {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthDaten {
    session_token: String,
    /// Optional vom Client gemeldete Adresse
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KontaktDaten {
    username: String,
}

/// Arten von Verhandlungsnachrichten, die unveraendert weitergeleitet werden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalArt {
    CallResponse,
    Offer,
    Answer,
    IceCandidate,
    HangUp,
}

impl SignalArt {
    pub fn als_str(self) -> &'static str {
        match self {
            Self::CallResponse => "call-response",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
            Self::HangUp => "hang-up",
        }
    }

    pub fn von_str(typ: &str) -> Option<Self> {
        Some(match typ {
            "call-response" => Self::CallResponse,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "ice-candidate" => Self::IceCandidate,
            "hang-up" => Self::HangUp,
            _ => return None,
        })
    }
}

/// Alle Nachrichten die ein Client senden kann
#[derive(Debug, Clone, PartialEq)]
pub enum ClientNachricht {
    AuthConnect {
        session_token: String,
        adresse: Option<String>,
    },
    AddContact {
        username: String,
    },
    /// Die Nutzdaten einer Anruf-Anfrage werden nicht weitergegeben
    CallRequest,
    Signal {
        art: SignalArt,
        data: Value,
    },
    Unbekannt {
        typ: String,
    },
}

/// Ein geparstes eingehendes Frame
#[derive(Debug, Clone, PartialEq)]
pub struct Eingehend {
    /// Vom Client behaupteter Absender (leer wird zu `None`)
    pub from: Option<String>,
    /// Roher Empfaenger, wird erst vom Router aufgeloest
    pub to: Option<String>,
    pub nachricht: ClientNachricht,
}

fn leer_zu_none(wert: Option<String>) -> Option<String> {
    wert.filter(|s| !s.is_empty())
}

/// Parst ein Text-Frame
///
/// Fehler bedeuten: kein JSON, kein String-`type` oder `data` in falscher Form.
pub fn parsen(text: &str) -> SignalingResult<Eingehend> {
    let umschlag: Umschlag =
        serde_json::from_str(text).map_err(|e| SignalingError::format(e.to_string()))?;

    let nachricht = match umschlag.typ.as_str() {
        "auth-connect" => {
            let daten: AuthDaten = serde_json::from_value(umschlag.data)
                .map_err(|e| SignalingError::format(format!("auth-connect: {e}")))?;
            ClientNachricht::AuthConnect {
                session_token: daten.session_token,
                adresse: leer_zu_none(daten.address),
            }
        }
        "add-contact" => {
            let daten: KontaktDaten = serde_json::from_value(umschlag.data)
                .map_err(|e| SignalingError::format(format!("add-contact: {e}")))?;
            ClientNachricht::AddContact {
                username: daten.username,
            }
        }
        "call-request" => ClientNachricht::CallRequest,
        andere => match SignalArt::von_str(andere) {
            Some(art) => ClientNachricht::Signal {
                art,
                data: umschlag.data,
            },
            None => ClientNachricht::Unbekannt {
                typ: andere.to_string(),
            },
        },
    };

    Ok(Eingehend {
        from: leer_zu_none(umschlag.from),
        to: leer_zu_none(umschlag.to),
        nachricht,
    })
}

// ---------------------------------------------------------------------------
// Ausgehend
// ---------------------------------------------------------------------------

/// Eintrag eines `contacts-update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KontaktAnsicht {
    pub id: UserId,
    pub username: String,
    pub status: OnlineStatus,
    pub address: String,
    /// RFC 3339, `None` solange der Kontakt online ist
    pub last_seen: Option<String>,
}

impl From<IdentitaetsInfo> for KontaktAnsicht {
    fn from(info: IdentitaetsInfo) -> Self {
        let last_seen = match info.status {
            OnlineStatus::Online => None,
            OnlineStatus::Offline => Some(info.last_seen.to_rfc3339()),
        };
        Self {
            id: info.id,
            username: info.username,
            status: info.status,
            address: info.adresse,
            last_seen,
        }
    }
}

/// Alle Nachrichten die der Server sendet
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNachricht {
    VerbindungBestaetigt {
        id: UserId,
        username: String,
        adresse: String,
    },
    KontakteUpdate(Vec<KontaktAnsicht>),
    KontaktErgebnis {
        success: bool,
        username: String,
    },
    AuthFehler {
        error: String,
    },
    AnrufFehlgeschlagen {
        reason: String,
    },
    Anruf {
        anrufer_id: UserId,
        anrufer_name: String,
        anrufer_adresse: String,
    },
    /// Verhandlungsnachricht, `data` unveraendert
    Weitergeleitet {
        art: SignalArt,
        data: Value,
    },
}

/// Serialisierter Umschlag einer ausgehenden Nachricht
#[derive(Debug, Serialize)]
struct AusgehenderUmschlag<'a> {
    #[serde(rename = "type")]
    typ: &'a str,
    data: Value,
    from: &'a str,
    to: &'a str,
    timestamp: String,
}

impl ServerNachricht {
    pub fn typ(&self) -> &'static str {
        match self {
            Self::VerbindungBestaetigt { .. } => "connection-confirmed",
            Self::KontakteUpdate(_) => "contacts-update",
            Self::KontaktErgebnis { .. } => "add-contact-result",
            Self::AuthFehler { .. } => "auth-error",
            Self::AnrufFehlgeschlagen { .. } => "call-failed",
            Self::Anruf { .. } => "call-request",
            Self::Weitergeleitet { art, .. } => art.als_str(),
        }
    }

    fn daten(&self) -> Value {
        match self {
            Self::VerbindungBestaetigt {
                id,
                username,
                adresse,
            } => json!({ "user": { "id": id, "username": username, "address": adresse } }),
            Self::KontakteUpdate(kontakte) => json!(kontakte),
            Self::KontaktErgebnis { success, username } => {
                json!({ "success": success, "username": username })
            }
            Self::AuthFehler { error } => json!({ "error": error }),
            Self::AnrufFehlgeschlagen { reason } => json!({ "reason": reason }),
            Self::Anruf {
                anrufer_id,
                anrufer_name,
                anrufer_adresse,
            } => json!({
                "callerId": anrufer_id,
                "callerName": anrufer_name,
                "callerAddress": anrufer_adresse,
            }),
            Self::Weitergeleitet { data, .. } => data.clone(),
        }
    }

    /// Baut das fertige Text-Frame
    pub fn als_json(&self, from: &str, to: &str) -> String {
        let umschlag = AusgehenderUmschlag {
            typ: self.typ(),
            data: self.daten(),
            from,
            to,
            timestamp: Utc::now().to_rfc3339(),
        };
        json!(umschlag).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_connect_parsen() {
        let e = parsen(r#"{"type":"auth-connect","data":{"session_token":"abc"}}"#).unwrap();
        assert_eq!(
            e.nachricht,
            ClientNachricht::AuthConnect {
                session_token: "abc".into(),
                adresse: None
            }
        );
        assert_eq!(e.from, None);
    }

    #[test]
    fn auth_connect_ohne_token_ist_ungueltig() {
        let e = parsen(r#"{"type":"auth-connect","data":{}}"#).unwrap_err();
        assert!(matches!(e, SignalingError::UngueltigesFormat(_)));
        let e = parsen(r#"{"type":"auth-connect","data":{"session_token":5}}"#).unwrap_err();
        assert_eq!(e.grund(), "malformed");
    }

    #[test]
    fn kein_json_oder_kein_typ() {
        assert!(parsen("hallo").is_err());
        assert!(parsen(r#"{"data":{}}"#).is_err());
        assert!(parsen(r#"{"type":42}"#).is_err());
        assert!(parsen(r#"[1,2,3]"#).is_err());
    }

    #[test]
    fn add_contact_behaelt_rohen_namen() {
        let e = parsen(r#"{"type":"add-contact","data":{"username":"  bob "},"from":"x"}"#)
            .unwrap();
        assert_eq!(
            e.nachricht,
            ClientNachricht::AddContact {
                username: "  bob ".into()
            }
        );
        assert_eq!(e.from.as_deref(), Some("x"));
    }

    #[test]
    fn signalarten_und_unbekannte_typen() {
        for typ in ["call-response", "offer", "answer", "ice-candidate", "hang-up"] {
            let text = format!(r#"{{"type":"{typ}","data":{{"sdp":"v=0"}},"to":"t"}}"#);
            match parsen(&text).unwrap().nachricht {
                ClientNachricht::Signal { art, data } => {
                    assert_eq!(art.als_str(), typ);
                    assert_eq!(data["sdp"], "v=0");
                }
                andere => panic!("Signal erwartet, bekommen: {andere:?}"),
            }
        }

        let e = parsen(r#"{"type":"tanzen"}"#).unwrap();
        assert_eq!(
            e.nachricht,
            ClientNachricht::Unbekannt {
                typ: "tanzen".into()
            }
        );
    }

    #[test]
    fn leere_adressfelder_werden_none() {
        let e = parsen(r#"{"type":"offer","from":"","to":""}"#).unwrap();
        assert_eq!(e.from, None);
        assert_eq!(e.to, None);
    }

    #[test]
    fn ausgehender_umschlag_hat_alle_felder() {
        let text = ServerNachricht::AuthFehler {
            error: "Invalid or expired session".into(),
        }
        .als_json(SERVER_ABSENDER, CLIENT_EMPFAENGER);
        let v: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(v["type"], "auth-error");
        assert_eq!(v["from"], "server");
        assert_eq!(v["to"], "client");
        assert_eq!(v["data"]["error"], "Invalid or expired session");
        let ts = v["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn anruf_verwendet_camel_case() {
        let id = UserId::new();
        let text = ServerNachricht::Anruf {
            anrufer_id: id,
            anrufer_name: "alice".into(),
            anrufer_adresse: "::1".into(),
        }
        .als_json(&id.als_draht(), "ziel");
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "call-request");
        assert_eq!(v["data"]["callerId"], id.als_draht());
        assert_eq!(v["data"]["callerName"], "alice");
        assert_eq!(v["data"]["callerAddress"], "::1");
    }

    #[test]
    fn kontakt_ansicht_last_seen_nur_offline() {
        let jetzt = Utc::now();
        let mut info = IdentitaetsInfo {
            id: UserId::new(),
            username: "bob".into(),
            status: OnlineStatus::Online,
            adresse: String::new(),
            last_seen: jetzt,
        };
        assert_eq!(KontaktAnsicht::from(info.clone()).last_seen, None);

        info.status = OnlineStatus::Offline;
        let ansicht = KontaktAnsicht::from(info);
        assert_eq!(ansicht.last_seen, Some(jetzt.to_rfc3339()));

        let v = serde_json::to_value(&ansicht).unwrap();
        assert_eq!(v["status"], "offline");
        assert_eq!(v["username"], "bob");
    }
}
