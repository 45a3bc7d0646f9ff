//! Passwort-Hashing mit PBKDF2-HMAC-SHA256
//!
//! Jedes Passwort bekommt ein eigenes zufaelliges Salt. Gespeichert wird
//! der PHC-String (Algorithmus, Runden, Salt und abgeleiteter Schluessel),
//! sodass die Verifikation ohne externe Parameter auskommt.

use pbkdf2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Params, Pbkdf2,
};
use rand::RngCore;

use crate::error::AuthError;

/// Standard-Rundenzahl fuer PBKDF2 (auch das Minimum im Produktivbetrieb)
pub const STANDARD_RUNDEN: u32 = 100_000;

/// Laenge des Salts in Bytes
const SALT_LAENGE: usize = 16;

/// Laenge des abgeleiteten Schluessels in Bytes
const SCHLUESSEL_LAENGE: usize = 32;

/// Hasht ein Passwort mit PBKDF2-SHA256 und einem zufaelligen Salt
///
/// Gibt den PHC-String zurueck (`$pbkdf2-sha256$i=...,l=32$salt$hash`).
pub fn passwort_hashen(passwort: &str, runden: u32) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; SALT_LAENGE];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::PasswortHashing(e.to_string()))?;

    let params = Params {
        rounds: runden,
        output_length: SCHLUESSEL_LAENGE,
    };

    Pbkdf2
        .hash_password_customized(
            passwort.as_bytes(),
            Some(Algorithm::Pbkdf2Sha256.ident()),
            None,
            params,
            &salt,
        )
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswortHashing(e.to_string()))
}

/// Verifiziert ein Passwort gegen einen gespeicherten PHC-Hash
///
/// Der Vergleich des abgeleiteten Schluessels erfolgt in konstanter Zeit.
pub fn passwort_verifizieren(passwort: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AuthError::PasswortHashing(format!("Ungueltiges Hash-Format: {e}")))?;

    match Pbkdf2.verify_password(passwort.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(pbkdf2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::PasswortHashing(e.to_string())),
    }
}
