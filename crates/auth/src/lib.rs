//! fernruf-auth – Identitaeten, Passwort-Hashing und Sessions
//!
//! Dieses Crate stellt alle Authentifizierungs-Bausteine bereit:
//! - `password` – PBKDF2-SHA256 Hashing und Verifikation
//! - `credentials` – Identitaets-Register mit Benutzernamen-Index und Kontakten
//! - `session` – In-Memory Session-Store mit TTL
//! - `service` – AuthService mit Registrierung, Login, Logout und Login-Sperre

pub mod credentials;
pub mod error;
pub mod password;
pub mod service;
pub mod session;

pub use credentials::{CredentialStore, Identitaet, IdentitaetsInfo, OnlineStatus};
pub use error::{AuthError, AuthResult};
pub use password::{passwort_hashen, passwort_verifizieren};
pub use service::{AuthKonfig, AuthService};
pub use session::{Session, SessionStore};
