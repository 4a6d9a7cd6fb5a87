use std::{fs, io, path::Path};

use anyhow::{Result, anyhow};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::RngCore;
use rand::rngs::OsRng;

/// Length of the challenge salt sent to connecting routers.
pub const SALT_LEN: usize = 16;

/// Load the Argon2 hash from `path`. Returns `Ok(None)` if the file does not
/// exist.
pub fn load_hash<P: AsRef<Path>>(path: P) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Hash `secret` into a PHC string suitable for an auth file.
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("hashing secret: {e}"))?;
    Ok(hash.to_string())
}

/// Check `secret` against a stored PHC hash. A malformed hash never verifies.
pub fn verify(hash: &str, secret: &[u8]) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored secret hash is not a valid PHC string");
        return false;
    };
    Argon2::default().verify_password(secret, &parsed).is_ok()
}

/// Fresh random challenge salt.
pub fn challenge() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
