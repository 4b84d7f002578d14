//! Password and PIN hashing

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use color_eyre::Result;
use color_eyre::eyre::eyre;

/// Hashes a secret into an Argon2 PHC string
pub fn hash(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|err| eyre!("Cannot hash secret: {err}"))?;
    Ok(hash.to_string())
}

/// Verifies a secret against a PHC string. Malformed hashes never verify.
pub fn verify(secret: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Checks if the stored value is a PHC hash rather than a cleartext secret
pub fn is_hash(value: &str) -> bool {
    PasswordHash::new(value).is_ok()
}

/// Hashes the value unless it is a hash already
pub fn ensure_hashed(value: String) -> Result<String> {
    if is_hash(&value) {
        Ok(value)
    } else {
        hash(&value)
    }
}
