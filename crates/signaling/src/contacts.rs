//! Kontakt-Graph – Gegenseitige Kontakte und Status-Fan-out
//!
//! Die Beziehung ist symmetrisch und liegt im CredentialStore. Deshalb ist
//! die eigene Kontaktmenge einer Identitaet zugleich die Menge ihrer
//! Beobachter: ein Statuswechsel kostet O(Kontakte).

use std::sync::Arc;

use fernruf_auth::CredentialStore;
use fernruf_core::UserId;
use tokio::sync::mpsc;

use crate::message::{KontaktAnsicht, ServerNachricht, SERVER_ABSENDER};
use crate::presence::{PresenceDirectory, PresenceEvent};

/// Gegenseitige Kontakte mit Snapshot-Versand
pub struct ContactGraph {
    credentials: Arc<CredentialStore>,
    presence: Arc<PresenceDirectory>,
}

impl ContactGraph {
    pub fn neu(credentials: Arc<CredentialStore>, presence: Arc<PresenceDirectory>) -> Self {
        Self {
            credentials,
            presence,
        }
    }

    /// Fuegt einen Kontakt per Benutzername hinzu
    ///
    /// `false` bei unbekanntem Namen, unbekannter Identitaet oder sich
    /// selbst. Bei Erfolg bekommen beide Seiten einen frischen Snapshot.
    pub fn hinzufuegen(&self, user_id: &UserId, kontakt_name: &str) -> bool {
        let Some(kontakt_id) = self.credentials.id_fuer_name(kontakt_name) else {
            tracing::debug!(user_id = %user_id, kontakt = %kontakt_name, "Kontakt unbekannt");
            return false;
        };
        if !self.credentials.kontakte_verbinden(user_id, &kontakt_id) {
            return false;
        }

        self.snapshot_senden(user_id);
        self.snapshot_senden(&kontakt_id);
        tracing::info!(user_id = %user_id, kontakt_id = %kontakt_id, "Kontakt hinzugefuegt");
        true
    }

    /// Aktuelle Sicht auf alle Kontakte (Reihenfolge nicht stabil)
    pub fn snapshot(&self, user_id: &UserId) -> Vec<KontaktAnsicht> {
        self.credentials
            .kontakte_von(user_id)
            .unwrap_or_default()
            .into_iter()
            .map(KontaktAnsicht::from)
            .collect()
    }

    /// Schickt der Identitaet ein `contacts-update`, falls sie online ist
    pub fn snapshot_senden(&self, user_id: &UserId) -> bool {
        let text = ServerNachricht::KontakteUpdate(self.snapshot(user_id))
            .als_json(SERVER_ABSENDER, &user_id.als_draht());
        self.presence.senden(user_id, text)
    }

    /// Alle Identitaeten, die `user_id` als Kontakt haben, bekommen einen Snapshot
    pub fn beobachter_benachrichtigen(&self, user_id: &UserId) {
        for beobachter in self.credentials.kontakt_ids(user_id) {
            self.snapshot_senden(&beobachter);
        }
    }

    /// Konsumiert Presence-Events bis der Sender wegfaellt
    pub async fn events_verarbeiten(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<PresenceEvent>) {
        while let Some(event) = events.recv().await {
            tracing::trace!(?event, "Presence-Event");
            self.beobachter_benachrichtigen(&event.user_id());
        }
        tracing::debug!("Presence-Event-Strom beendet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{Ausgehend, VerbindungsHandle};
    use fernruf_auth::OnlineStatus;
    use fernruf_observability::FernrufMetriken;
    use serde_json::Value;

    fn aufbau() -> (Arc<CredentialStore>, Arc<PresenceDirectory>, ContactGraph) {
        let credentials = Arc::new(CredentialStore::neu(1_000, 6));
        let (presence, _events) =
            PresenceDirectory::neu(Arc::clone(&credentials), FernrufMetriken::neu().unwrap());
        let presence = Arc::new(presence);
        let graph = ContactGraph::neu(Arc::clone(&credentials), Arc::clone(&presence));
        (credentials, presence, graph)
    }

    fn als_json(ausgehend: Ausgehend) -> Value {
        match ausgehend {
            Ausgehend::Text(t) => serde_json::from_str(&t).unwrap(),
            Ausgehend::Schliessen => panic!("Text erwartet"),
        }
    }

    #[test]
    fn hinzufuegen_ist_symmetrisch() {
        let (credentials, _, graph) = aufbau();
        let a = credentials.registrieren("a", "passwort", "").unwrap().id;
        let b = credentials.registrieren("b", "passwort", "").unwrap().id;

        assert!(graph.hinzufuegen(&a, "b"));
        let von_a: Vec<_> = graph.snapshot(&a).into_iter().map(|k| k.id).collect();
        let von_b: Vec<_> = graph.snapshot(&b).into_iter().map(|k| k.id).collect();
        assert_eq!(von_a, vec![b]);
        assert_eq!(von_b, vec![a]);

        // Umgekehrte Richtung aendert nichts mehr
        assert!(graph.hinzufuegen(&b, "a"));
        assert_eq!(graph.snapshot(&a).len(), 1);
    }

    #[test]
    fn hinzufuegen_schlaegt_fehl() {
        let (credentials, _, graph) = aufbau();
        let a = credentials.registrieren("a", "passwort", "").unwrap().id;

        assert!(!graph.hinzufuegen(&a, "a"));
        assert!(!graph.hinzufuegen(&a, "niemand"));
        assert!(!graph.hinzufuegen(&UserId::new(), "a"));
        assert!(graph.snapshot(&a).is_empty());
    }

    #[test]
    fn beide_seiten_bekommen_snapshot() {
        let (credentials, presence, graph) = aufbau();
        let a = credentials.registrieren("a", "passwort", "").unwrap().id;
        let b = credentials.registrieren("b", "passwort", "").unwrap().id;
        let (ha, mut rxa) = VerbindungsHandle::neu();
        let (hb, mut rxb) = VerbindungsHandle::neu();
        presence.binden(a, ha, None);
        presence.binden(b, hb, None);

        assert!(graph.hinzufuegen(&a, "b"));

        let fuer_a = als_json(rxa.try_recv().unwrap());
        assert_eq!(fuer_a["type"], "contacts-update");
        assert_eq!(fuer_a["data"][0]["username"], "b");
        assert_eq!(fuer_a["data"][0]["status"], "online");
        assert!(fuer_a["data"][0]["last_seen"].is_null());

        let fuer_b = als_json(rxb.try_recv().unwrap());
        assert_eq!(fuer_b["data"][0]["username"], "a");
    }

    #[test]
    fn beobachter_sehen_offline_mit_last_seen() {
        let (credentials, presence, graph) = aufbau();
        let a = credentials.registrieren("a", "passwort", "").unwrap().id;
        let b = credentials.registrieren("b", "passwort", "").unwrap().id;
        credentials.kontakte_verbinden(&a, &b);
        let (ha, mut rxa) = VerbindungsHandle::neu();
        presence.binden(a, ha, None);

        graph.beobachter_benachrichtigen(&b);

        let update = als_json(rxa.try_recv().unwrap());
        assert_eq!(update["data"][0]["status"], "offline");
        assert!(update["data"][0]["last_seen"].is_string());
        assert_eq!(credentials.info(&b).unwrap().status, OnlineStatus::Offline);
    }

    #[tokio::test]
    async fn fan_out_aus_presence_events() {
        let credentials = Arc::new(CredentialStore::neu(1_000, 6));
        let (presence, events) =
            PresenceDirectory::neu(Arc::clone(&credentials), FernrufMetriken::neu().unwrap());
        let presence = Arc::new(presence);
        let graph = Arc::new(ContactGraph::neu(
            Arc::clone(&credentials),
            Arc::clone(&presence),
        ));
        tokio::spawn(Arc::clone(&graph).events_verarbeiten(events));

        let a = credentials.registrieren("a", "passwort", "").unwrap().id;
        let b = credentials.registrieren("b", "passwort", "").unwrap().id;
        credentials.kontakte_verbinden(&a, &b);
        let (ha, mut rxa) = VerbindungsHandle::neu();
        let (hb, _rxb) = VerbindungsHandle::neu();
        presence.binden(a, ha, None);
        presence.binden(b, hb, None);

        // Irgendwann sieht a den Kontakt b online
        let gefunden = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while let Some(ausgehend) = rxa.recv().await {
                let v = als_json(ausgehend);
                if v["type"] == "contacts-update" && v["data"][0]["status"] == "online" {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(gefunden, "kein contacts-update mit b online erhalten");
    }
}
