//! Password hashing and session key material.
//!
//! Passwords are stored as Argon2 PHC strings. The session cookie key is
//! derived from the configured secret with PBKDF2 so that any secret string
//! can be used, whatever its length.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use ring::pbkdf2;
use std::num::NonZeroU32;

/// Length of the cookie signing + encryption key in bytes
pub const COOKIE_KEY_LENGTH: usize = 64;

/// Number of PBKDF2 iterations for key derivation
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt for PBKDF2 key derivation
const PBKDF2_SALT: &[u8] = b"codev-session-cookie-v1";

lazy_static::lazy_static! {
    /// Hash checked against when the login email is unknown, so that path
    /// costs the same as a wrong password.
    static ref DUMMY_HASH: String =
        hash_password("codev-dummy-password").unwrap_or_default();
}

/// Hash a password with Argon2 default parameters and a random salt
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Verify against `hash` if there is one, otherwise burn the same work on
/// the dummy hash and fail.
pub fn verify_password_or_dummy(password: &str, hash: Option<&str>) -> bool {
    match hash {
        Some(hash) => verify_password(password, hash),
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            false
        }
    }
}

/// Derive the 512-bit cookie key from a secret string using PBKDF2.
///
/// The same secret always yields the same key, so sessions survive a
/// restart as long as the secret is unchanged.
pub fn derive_cookie_key(secret: &str) -> [u8; COOKIE_KEY_LENGTH] {
    let mut key = [0u8; COOKIE_KEY_LENGTH];
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        PBKDF2_SALT,
        secret.as_bytes(),
        &mut key,
    );
    key
}

/// Generate a random hex secret, used when none is configured
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}
