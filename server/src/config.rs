//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;

use anyhow::{bail, Context};
use chrono::Duration;
use fernruf_auth::AuthKonfig;
use fernruf_observability::{log_format_gueltig, log_level_gueltig};
use fernruf_signaling::WsKonfig;
use serde::{Deserialize, Serialize};

/// Untergrenze fuer PBKDF2-Runden
pub const MIN_PBKDF2_RUNDEN: u32 = 100_000;

/// Obergrenze fuer die Session-Lebensdauer (ein Jahr)
pub const MAX_SESSION_TTL_STUNDEN: i64 = 24 * 365;

/// Obergrenze fuer die Sperrdauer (eine Woche)
pub const MAX_SPERR_MINUTEN: i64 = 60 * 24 * 7;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Sessions, Passwoerter und Login-Sperre
    pub auth: AuthEinstellungen,
    /// Bootstrap-Identitaet
    pub admin: AdminEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    pub cors: CorsEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Fernruf".into(),
        }
    }
}

/// Netzwerk-Einstellungen
///
/// REST-API, WebSocket, Health und Metriken teilen sich einen Port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    pub port: u16,
    /// Abstand der Keepalive-Pings auf `/ws` in Sekunden
    pub ws_ping_intervall_sek: u64,
    /// Frist fuer den Pong, danach wird getrennt
    pub ws_pong_timeout_sek: u64,
    /// Maximale Groesse einer eingehenden WebSocket-Nachricht
    pub ws_max_nachricht_bytes: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 3000,
            ws_ping_intervall_sek: 20,
            ws_pong_timeout_sek: 10,
            ws_max_nachricht_bytes: 1024 * 1024,
        }
    }
}

/// Auth-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    /// Lebensdauer einer Session in Stunden
    pub session_ttl_stunden: i64,
    pub min_passwort_laenge: usize,
    pub pbkdf2_runden: u32,
    /// Fehlversuche bis zur Sperre
    pub sperr_schwelle: u32,
    pub sperr_minuten: i64,
}

impl Default for AuthEinstellungen {
    fn default() -> Self {
        Self {
            session_ttl_stunden: 24,
            min_passwort_laenge: 6,
            pbkdf2_runden: MIN_PBKDF2_RUNDEN,
            sperr_schwelle: 5,
            sperr_minuten: 15,
        }
    }
}

/// Bootstrap-Identitaet fuer Demonstrationszwecke
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminEinstellungen {
    /// Legt die Identitaet beim Start an
    pub anlegen: bool,
    pub username: String,
    pub password: String,
}

impl Default for AdminEinstellungen {
    fn default() -> Self {
        Self {
            anlegen: true,
            username: "admin".into(),
            password: "admin123".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// CORS-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsEinstellungen {
    /// Erlaubte Origins (leer = alle erlaubt)
    pub origins: Vec<String>,
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Lehnt unsichere oder unbrauchbare Werte ab
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if self.auth.pbkdf2_runden < MIN_PBKDF2_RUNDEN {
            bail!(
                "auth.pbkdf2_runden = {} liegt unter dem Minimum von {MIN_PBKDF2_RUNDEN}",
                self.auth.pbkdf2_runden
            );
        }
        if !(1..=MAX_SESSION_TTL_STUNDEN).contains(&self.auth.session_ttl_stunden) {
            bail!(
                "auth.session_ttl_stunden = {} muss zwischen 1 und {MAX_SESSION_TTL_STUNDEN} liegen",
                self.auth.session_ttl_stunden
            );
        }
        if self.auth.sperr_schwelle == 0 {
            bail!("auth.sperr_schwelle muss mindestens 1 sein");
        }
        if !(1..=MAX_SPERR_MINUTEN).contains(&self.auth.sperr_minuten) {
            bail!(
                "auth.sperr_minuten = {} muss zwischen 1 und {MAX_SPERR_MINUTEN} liegen",
                self.auth.sperr_minuten
            );
        }
        if self.netzwerk.ws_ping_intervall_sek == 0
            || self.netzwerk.ws_pong_timeout_sek == 0
            || self.netzwerk.ws_max_nachricht_bytes == 0
        {
            bail!("netzwerk.ws_* Werte muessen positiv sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            bail!("Unbekanntes logging.level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("Unbekanntes logging.format '{}'", self.logging.format);
        }
        if self.admin.anlegen
            && (self.admin.username.trim().is_empty() || self.admin.password.is_empty())
        {
            bail!("admin.username und admin.password duerfen nicht leer sein");
        }
        self.bind_adresse()?;
        Ok(())
    }

    /// Bind-Adresse fuer den HTTP-Listener
    pub fn bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let roh = format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port);
        roh.parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{roh}'"))
    }

    /// Parameter fuer den Auth-Service
    pub fn auth_konfig(&self) -> anyhow::Result<AuthKonfig> {
        let session_ttl = Duration::try_hours(self.auth.session_ttl_stunden)
            .context("auth.session_ttl_stunden ausserhalb des darstellbaren Bereichs")?;
        let sperr_dauer = Duration::try_minutes(self.auth.sperr_minuten)
            .context("auth.sperr_minuten ausserhalb des darstellbaren Bereichs")?;
        Ok(AuthKonfig {
            session_ttl,
            min_passwort_laenge: self.auth.min_passwort_laenge,
            pbkdf2_runden: self.auth.pbkdf2_runden,
            sperr_schwelle: self.auth.sperr_schwelle,
            sperr_dauer,
        })
    }

    /// Keepalive und Groessenlimit fuer `/ws`
    pub fn ws_konfig(&self) -> WsKonfig {
        WsKonfig {
            ping_intervall: std::time::Duration::from_secs(self.netzwerk.ws_ping_intervall_sek),
            pong_timeout: std::time::Duration::from_secs(self.netzwerk.ws_pong_timeout_sek),
            max_nachricht_bytes: self.netzwerk.ws_max_nachricht_bytes,
        }
    }
}
