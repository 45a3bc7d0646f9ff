//! Identitaets-Register (CredentialStore)
//!
//! Haelt alle registrierten Identitaeten samt Benutzernamen-Index. Beide
//! Indizes liegen hinter genau einem Lock, damit Registrierungen atomar
//! sind: zwei gleichzeitige Registrierungen desselben Namens koennen nicht
//! beide gelingen.
//!
//! Die rohe Tabelle verlaesst dieses Modul nie. Andere Komponenten
//! (Sessions, Presence, Kontakte) gehen ueber die schmalen Operationen
//! unten; keine davon haelt den Lock ueber I/O oder ein `.await`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use fernruf_core::UserId;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{AuthError, AuthResult};
use crate::password::{passwort_hashen, passwort_verifizieren, STANDARD_RUNDEN};

/// Standard-Mindestlaenge fuer Passwoerter
pub const MIN_PASSWORT_LAENGE: usize = 6;

// ---------------------------------------------------------------------------
// Datentypen
// ---------------------------------------------------------------------------

/// Online-Status einer Identitaet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
}

/// Ein registrierter Account
#[derive(Debug, Clone)]
pub struct Identitaet {
    pub id: UserId,
    pub username: String,
    /// PHC-String (Salt + abgeleiteter Schluessel)
    pub password_hash: String,
    pub status: OnlineStatus,
    pub last_seen: DateTime<Utc>,
    pub login_fehlversuche: u32,
    pub gesperrt_bis: Option<DateTime<Utc>>,
    /// Best-Effort Netzwerkadresse (vom Client gemeldet oder vom Transport)
    pub adresse: String,
    /// Symmetrisch: enthaelt A den Kontakt B, enthaelt B auch A
    pub kontakte: HashSet<UserId>,
    pub session_token: Option<String>,
    pub session_ablauf: Option<DateTime<Utc>>,
}

impl Identitaet {
    /// Oeffentliche Sicht ohne Geheimnisse
    pub fn info(&self) -> IdentitaetsInfo {
        IdentitaetsInfo {
            id: self.id,
            username: self.username.clone(),
            status: self.status,
            adresse: self.adresse.clone(),
            last_seen: self.last_seen,
        }
    }
}

/// Oeffentliche, geheimnisfreie Sicht auf eine Identitaet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitaetsInfo {
    pub id: UserId,
    pub username: String,
    pub status: OnlineStatus,
    pub adresse: String,
    pub last_seen: DateTime<Utc>,
}

struct IdentitaetsTabelle {
    nach_id: HashMap<UserId, Identitaet>,
    nach_name: HashMap<String, UserId>,
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Identitaets-Register mit Passwort-Verifikation
pub struct CredentialStore {
    tabelle: RwLock<IdentitaetsTabelle>,
    hash_runden: u32,
    min_passwort_laenge: usize,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::neu(STANDARD_RUNDEN, MIN_PASSWORT_LAENGE)
    }
}

impl CredentialStore {
    /// Erstellt ein leeres Register
    pub fn neu(hash_runden: u32, min_passwort_laenge: usize) -> Self {
        Self {
            tabelle: RwLock::new(IdentitaetsTabelle {
                nach_id: HashMap::new(),
                nach_name: HashMap::new(),
            }),
            hash_runden,
            min_passwort_laenge,
        }
    }

    /// Registriert eine neue Identitaet
    ///
    /// Reihenfolge der Pruefungen: Name vergeben, dann Passwort zu kurz.
    /// Das Hashing laeuft ausserhalb des Locks; die Reservierung von ID und
    /// Name passiert danach in einem einzigen Schreibzugriff.
    pub fn registrieren(
        &self,
        username: &str,
        passwort: &str,
        adresse: &str,
    ) -> AuthResult<Identitaet> {
        if self.tabelle.read().nach_name.contains_key(username) {
            return Err(AuthError::BenutzernameVergeben(username.to_string()));
        }
        if passwort.chars().count() < self.min_passwort_laenge {
            return Err(AuthError::PasswortZuSchwach {
                minimum: self.min_passwort_laenge,
            });
        }

        let password_hash = passwort_hashen(passwort, self.hash_runden)?;
        let identitaet = Identitaet {
            id: UserId::new(),
            username: username.to_string(),
            password_hash,
            status: OnlineStatus::Offline,
            last_seen: Utc::now(),
            login_fehlversuche: 0,
            gesperrt_bis: None,
            adresse: adresse.to_string(),
            kontakte: HashSet::new(),
            session_token: None,
            session_ablauf: None,
        };

        let mut tabelle = self.tabelle.write();
        // Erneut pruefen: ein paralleler Aufruf kann den Namen inzwischen belegt haben
        if tabelle.nach_name.contains_key(username) {
            return Err(AuthError::BenutzernameVergeben(username.to_string()));
        }
        tabelle
            .nach_name
            .insert(identitaet.username.clone(), identitaet.id);
        tabelle.nach_id.insert(identitaet.id, identitaet.clone());
        drop(tabelle);

        tracing::info!(
            user_id = %identitaet.id,
            username = %identitaet.username,
            "Neue Identitaet registriert"
        );
        Ok(identitaet)
    }

    /// Prueft ein Passwort gegen den gespeicherten Hash
    ///
    /// Unbekannte Namen und defekte Hashes ergeben `false`.
    pub fn verifizieren(&self, username: &str, passwort: &str) -> bool {
        let hash = {
            let tabelle = self.tabelle.read();
            let Some(id) = tabelle.nach_name.get(username) else {
                return false;
            };
            match tabelle.nach_id.get(id) {
                Some(identitaet) => identitaet.password_hash.clone(),
                None => return false,
            }
        };

        match passwort_verifizieren(passwort, &hash) {
            Ok(korrekt) => korrekt,
            Err(e) => {
                tracing::error!(username = %username, fehler = %e, "Gespeicherter Hash unlesbar");
                false
            }
        }
    }

    /// Loest einen Benutzernamen zur ID auf
    pub fn id_fuer_name(&self, username: &str) -> Option<UserId> {
        self.tabelle.read().nach_name.get(username).copied()
    }

    /// Gibt eine Kopie der Identitaet zurueck
    pub fn identitaet(&self, id: &UserId) -> Option<Identitaet> {
        self.tabelle.read().nach_id.get(id).cloned()
    }

    /// Gibt die oeffentliche Sicht einer Identitaet zurueck
    pub fn info(&self, id: &UserId) -> Option<IdentitaetsInfo> {
        self.tabelle.read().nach_id.get(id).map(Identitaet::info)
    }

    /// Prueft ob eine Identitaet existiert
    pub fn existiert(&self, id: &UserId) -> bool {
        self.tabelle.read().nach_id.contains_key(id)
    }

    /// Anzahl registrierter Identitaeten
    pub fn anzahl(&self) -> usize {
        self.tabelle.read().nach_id.len()
    }

    /// Anzahl der Identitaeten mit Status online
    pub fn online_anzahl(&self) -> usize {
        self.tabelle
            .read()
            .nach_id
            .values()
            .filter(|i| i.status == OnlineStatus::Online)
            .count()
    }

    // -----------------------------------------------------------------------
    // Login-Sperre
    // -----------------------------------------------------------------------

    /// Verbleibende Sperrzeit zum Zeitpunkt `jetzt`, falls gesperrt
    pub fn sperre_verbleibend(&self, id: &UserId, jetzt: DateTime<Utc>) -> Option<Duration> {
        let tabelle = self.tabelle.read();
        let bis = tabelle.nach_id.get(id)?.gesperrt_bis?;
        (jetzt < bis).then(|| bis - jetzt)
    }

    /// Vermerkt einen fehlgeschlagenen Login
    ///
    /// Erreicht der Zaehler `schwelle`, wird die Identitaet bis
    /// `jetzt + sperrdauer` gesperrt und dieser Zeitpunkt zurueckgegeben.
    pub fn fehlversuch_vermerken(
        &self,
        id: &UserId,
        jetzt: DateTime<Utc>,
        schwelle: u32,
        sperrdauer: Duration,
    ) -> Option<DateTime<Utc>> {
        let mut tabelle = self.tabelle.write();
        let identitaet = tabelle.nach_id.get_mut(id)?;
        // Der Zaehler faellt nur nach einem erfolgreichen Login zurueck
        identitaet.login_fehlversuche = identitaet.login_fehlversuche.saturating_add(1);
        if identitaet.login_fehlversuche >= schwelle {
            let bis = jetzt + sperrdauer;
            identitaet.gesperrt_bis = Some(bis);
            tracing::warn!(
                user_id = %id,
                username = %identitaet.username,
                fehlversuche = identitaet.login_fehlversuche,
                "Konto wegen zu vieler Fehlversuche gesperrt"
            );
            return Some(bis);
        }
        None
    }

    /// Setzt Fehlversuche und Sperre nach erfolgreichem Login zurueck
    ///
    /// Ist die Identitaet zum Zeitpunkt `jetzt` inzwischen gesperrt (ein
    /// paralleler Fehlversuch hat die Schwelle erreicht), bleibt alles
    /// unveraendert und das Sperrende wird als `Err` zurueckgegeben.
    pub fn anmeldung_erfolgreich(
        &self,
        id: &UserId,
        jetzt: DateTime<Utc>,
    ) -> Result<(), DateTime<Utc>> {
        let mut tabelle = self.tabelle.write();
        let Some(identitaet) = tabelle.nach_id.get_mut(id) else {
            return Ok(());
        };
        if let Some(bis) = identitaet.gesperrt_bis.filter(|bis| jetzt < *bis) {
            return Err(bis);
        }
        identitaet.login_fehlversuche = 0;
        identitaet.gesperrt_bis = None;
        identitaet.last_seen = jetzt;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session-Felder
    // -----------------------------------------------------------------------

    /// Vermerkt die aktuelle Session auf der Identitaet
    ///
    /// Gibt den vorherigen Token zurueck, damit der Aufrufer ihn widerrufen kann.
    pub fn session_vermerken(
        &self,
        id: &UserId,
        token: &str,
        ablauf: DateTime<Utc>,
    ) -> Option<String> {
        let mut tabelle = self.tabelle.write();
        let identitaet = tabelle.nach_id.get_mut(id)?;
        identitaet.session_ablauf = Some(ablauf);
        identitaet.session_token.replace(token.to_string())
    }

    /// Loescht die Session-Felder, sofern sie noch zum Token gehoeren
    pub fn session_loeschen(&self, id: &UserId, token: &str) {
        if let Some(identitaet) = self.tabelle.write().nach_id.get_mut(id) {
            if identitaet.session_token.as_deref() == Some(token) {
                identitaet.session_token = None;
                identitaet.session_ablauf = None;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Presence-Felder
    // -----------------------------------------------------------------------

    /// Setzt den Online-Status und `last_seen`
    ///
    /// Gibt `false` zurueck wenn die Identitaet unbekannt ist.
    pub fn status_setzen(&self, id: &UserId, status: OnlineStatus, jetzt: DateTime<Utc>) -> bool {
        match self.tabelle.write().nach_id.get_mut(id) {
            Some(identitaet) => {
                identitaet.status = status;
                identitaet.last_seen = jetzt;
                true
            }
            None => false,
        }
    }

    /// Setzt die Adresse nur, wenn noch keine bekannt ist
    pub fn adresse_ergaenzen(&self, id: &UserId, adresse: &str) {
        if adresse.is_empty() {
            return;
        }
        if let Some(identitaet) = self.tabelle.write().nach_id.get_mut(id) {
            if identitaet.adresse.is_empty() {
                identitaet.adresse = adresse.to_string();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Kontakte
    // -----------------------------------------------------------------------

    /// Traegt die Kontaktbeziehung in beiden Richtungen ein
    ///
    /// Beide Seiten werden im selben Schreibzugriff geaendert: entweder
    /// sehen beide die Beziehung oder keine. Gibt `false` zurueck wenn eine
    /// Seite unbekannt ist oder `a == b`.
    pub fn kontakte_verbinden(&self, a: &UserId, b: &UserId) -> bool {
        if a == b {
            return false;
        }
        let mut tabelle = self.tabelle.write();
        if !tabelle.nach_id.contains_key(a) || !tabelle.nach_id.contains_key(b) {
            return false;
        }
        if let Some(identitaet) = tabelle.nach_id.get_mut(a) {
            identitaet.kontakte.insert(*b);
        }
        if let Some(identitaet) = tabelle.nach_id.get_mut(b) {
            identitaet.kontakte.insert(*a);
        }
        true
    }

    /// IDs aller Kontakte einer Identitaet
    pub fn kontakt_ids(&self, id: &UserId) -> Vec<UserId> {
        self.tabelle
            .read()
            .nach_id
            .get(id)
            .map(|i| i.kontakte.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Oeffentliche Sicht aller noch existierenden Kontakte
    ///
    /// `None` wenn die Identitaet selbst unbekannt ist. Die Reihenfolge folgt
    /// der Iteration des Sets und ist nicht stabil.
    pub fn kontakte_von(&self, id: &UserId) -> Option<Vec<IdentitaetsInfo>> {
        let tabelle = self.tabelle.read();
        let identitaet = tabelle.nach_id.get(id)?;
        Some(
            identitaet
                .kontakte
                .iter()
                .filter_map(|kid| tabelle.nach_id.get(kid).map(Identitaet::info))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> CredentialStore {
        CredentialStore::neu(1_000, MIN_PASSWORT_LAENGE)
    }

    #[test]
    fn registrieren_und_verifizieren() {
        let store = store();
        let alice = store.registrieren("alice", "geheim123", "::1").unwrap();

        assert_eq!(alice.username, "alice");
        assert_eq!(alice.status, OnlineStatus::Offline);
        assert!(store.verifizieren("alice", "geheim123"));
        assert!(!store.verifizieren("alice", "falsch123"));
        assert!(!store.verifizieren("bob", "geheim123"));
        assert_eq!(store.id_fuer_name("alice"), Some(alice.id));
    }

    #[test]
    fn doppelter_name_wird_abgelehnt() {
        let store = store();
        store.registrieren("alice", "geheim123", "").unwrap();
        let ergebnis = store.registrieren("alice", "anderes_pw", "");
        assert!(matches!(ergebnis, Err(AuthError::BenutzernameVergeben(_))));
        assert_eq!(store.anzahl(), 1);
    }

    #[test]
    fn namen_sind_case_sensitiv() {
        let store = store();
        store.registrieren("Alice", "geheim123", "").unwrap();
        assert!(store.registrieren("alice", "geheim123", "").is_ok());
    }

    #[test]
    fn zu_kurzes_passwort_wird_abgelehnt() {
        let store = store();
        let ergebnis = store.registrieren("kurz", "12345", "");
        assert!(matches!(
            ergebnis,
            Err(AuthError::PasswortZuSchwach { minimum: 6 })
        ));
        assert_eq!(store.anzahl(), 0);
    }

    #[test]
    fn gleichzeitige_registrierungen_verschiedener_namen() {
        let store = Arc::new(store());
        let threads: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .registrieren(&format!("user{i}"), "passwort", "")
                        .map(|i| i.id)
                })
            })
            .collect();

        let ids: HashSet<UserId> = threads
            .into_iter()
            .map(|t| t.join().unwrap().expect("Registrierung fehlgeschlagen"))
            .collect();

        assert_eq!(ids.len(), 16);
        assert_eq!(store.anzahl(), 16);
        for i in 0..16 {
            assert!(store.id_fuer_name(&format!("user{i}")).is_some());
        }
    }

    #[test]
    fn gleichzeitige_registrierung_desselben_namens_genau_einmal() {
        let store = Arc::new(store());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.registrieren("gleich", "passwort", "").is_ok())
            })
            .collect();

        let erfolge = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(erfolge, 1);
        assert_eq!(store.anzahl(), 1);
    }

    #[test]
    fn kontakte_symmetrisch_und_ohne_selbstbezug() {
        let store = store();
        let a = store.registrieren("a", "passwort", "").unwrap().id;
        let b = store.registrieren("b", "passwort", "").unwrap().id;

        assert!(!store.kontakte_verbinden(&a, &a));
        assert!(!store.kontakte_verbinden(&a, &UserId::new()));
        assert!(store.kontakte_verbinden(&a, &b));

        assert_eq!(store.kontakt_ids(&a), vec![b]);
        assert_eq!(store.kontakt_ids(&b), vec![a]);
        let sicht = store.kontakte_von(&a).unwrap();
        assert_eq!(sicht.len(), 1);
        assert_eq!(sicht[0].username, "b");
        assert!(store.kontakte_von(&UserId::new()).is_none());
    }

    #[test]
    fn sperre_nach_schwelle() {
        let store = store();
        let id = store.registrieren("sperr", "passwort", "").unwrap().id;
        let jetzt = Utc::now();

        for _ in 0..4 {
            assert!(store
                .fehlversuch_vermerken(&id, jetzt, 5, Duration::minutes(15))
                .is_none());
        }
        let bis = store
            .fehlversuch_vermerken(&id, jetzt, 5, Duration::minutes(15))
            .expect("fuenfter Fehlversuch muss sperren");
        assert_eq!(bis, jetzt + Duration::minutes(15));
        assert!(store.sperre_verbleibend(&id, jetzt).is_some());
        assert!(store.sperre_verbleibend(&id, bis).is_none());

        // Nach Ablauf sperrt schon der naechste Fehlversuch erneut
        let erneut = store
            .fehlversuch_vermerken(&id, bis, 5, Duration::minutes(15))
            .expect("Fehlversuch nach Ablauf muss wieder sperren");
        assert_eq!(erneut, bis + Duration::minutes(15));
        assert_eq!(store.identitaet(&id).unwrap().login_fehlversuche, 6);

        assert!(store.anmeldung_erfolgreich(&id, erneut).is_ok());
        let identitaet = store.identitaet(&id).unwrap();
        assert_eq!(identitaet.login_fehlversuche, 0);
        assert!(identitaet.gesperrt_bis.is_none());
    }

    #[test]
    fn erfolgreiche_anmeldung_hebt_neue_sperre_nicht_auf() {
        let store = store();
        let id = store.registrieren("parallel", "passwort", "").unwrap().id;
        let jetzt = Utc::now();

        for _ in 0..5 {
            store.fehlversuch_vermerken(&id, jetzt, 5, Duration::minutes(15));
        }
        let bis = jetzt + Duration::minutes(15);
        assert_eq!(store.anmeldung_erfolgreich(&id, jetzt), Err(bis));

        let identitaet = store.identitaet(&id).unwrap();
        assert_eq!(identitaet.login_fehlversuche, 5);
        assert_eq!(identitaet.gesperrt_bis, Some(bis));
    }

    #[test]
    fn session_loeschen_nur_fuer_passenden_token() {
        let store = store();
        let id = store.registrieren("sess", "passwort", "").unwrap().id;
        let ablauf = Utc::now();

        assert_eq!(store.session_vermerken(&id, "alt", ablauf), None);
        assert_eq!(
            store.session_vermerken(&id, "neu", ablauf),
            Some("alt".to_string())
        );

        store.session_loeschen(&id, "alt");
        assert_eq!(
            store.identitaet(&id).unwrap().session_token.as_deref(),
            Some("neu")
        );
        store.session_loeschen(&id, "neu");
        assert!(store.identitaet(&id).unwrap().session_token.is_none());
    }

    #[test]
    fn status_serialisiert_klein() {
        assert_eq!(
            serde_json::to_string(&OnlineStatus::Online).unwrap(),
            "\"online\""
        );
        assert_eq!(
            serde_json::to_string(&OnlineStatus::Offline).unwrap(),
            "\"offline\""
        );
    }

    #[test]
    fn adresse_wird_nur_ergaenzt() {
        let store = store();
        let leer = store.registrieren("leer", "passwort", "").unwrap().id;
        let gesetzt = store.registrieren("gesetzt", "passwort", "10.0.0.1").unwrap().id;

        store.adresse_ergaenzen(&leer, "192.168.1.5");
        store.adresse_ergaenzen(&gesetzt, "192.168.1.5");

        assert_eq!(store.info(&leer).unwrap().adresse, "192.168.1.5");
        assert_eq!(store.info(&gesetzt).unwrap().adresse, "10.0.0.1");
    }
}
