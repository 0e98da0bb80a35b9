//! Master password hashing and verification.
//!
//! A stored credential is `base64(salt[16] || digest[32])` where the
//! digest is PBKDF2-SHA256 of the password under that salt. The server
//! only ever sees this opaque string.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use super::{KEY_LEN, SALT_LEN, aead::generate_salt, kdf::derive_key};
use crate::error::Result;

/// Digest length inside a stored credential (32 bytes).
const DIGEST_LEN: usize = KEY_LEN;

/// Hash a master password for storage.
///
/// Generates a fresh random salt, so hashing the same password twice
/// produces different credentials.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = generate_salt()?;
    let digest = derive_key(password, &salt);

    let mut raw = Vec::with_capacity(SALT_LEN + DIGEST_LEN);
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&digest);
    Ok(BASE64.encode(raw))
}

/// Check a password attempt against a stored credential.
///
/// Returns `false` for a wrong password and also for any malformed
/// stored value (bad base64, wrong length). A corrupt credential must
/// read as "no match", never crash the login path.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let raw = match BASE64.decode(stored) {
        Ok(raw) => raw,
        Err(_) => return false,
    };
    if raw.len() != SALT_LEN + DIGEST_LEN {
        return false;
    }

    let (salt, digest) = raw.split_at(SALT_LEN);
    let candidate = derive_key(password, salt);
    constant_time_eq(&candidate, digest)
}

/// Compare two byte strings in constant time.
///
/// XOR-accumulates over every byte so the timing does not reveal the
/// index of the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let stored = hash_password("TestPass123!").unwrap();
        assert!(verify_password("TestPass123!", &stored));
    }

    #[test]
    fn wrong_password_fails() {
        let stored = hash_password("TestPass123!").unwrap();
        assert!(!verify_password("WrongPass999!", &stored));
    }

    #[test]
    fn hashes_use_fresh_salts() {
        let h1 = hash_password("pw").unwrap();
        let h2 = hash_password("pw").unwrap();

        assert_ne!(h1, h2);
        assert!(verify_password("pw", &h1));
        assert!(verify_password("pw", &h2));
    }

    #[test]
    fn malformed_credential_is_no_match() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "not base64 !!!"));
        // valid base64, wrong decoded length
        assert!(!verify_password("pw", &BASE64.encode([0u8; 10])));
    }

    #[test]
    fn truncated_credential_is_no_match() {
        let stored = hash_password("pw").unwrap();
        let truncated = &stored[..stored.len() / 2];
        assert!(!verify_password("pw", truncated));
    }

    #[test]
    fn compare_covers_full_length() {
        // same length, differing only in the last byte
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[31] = 1;

        assert!(constant_time_eq(&a, &a));
        assert!(!constant_time_eq(&a, &b));
        assert!(!constant_time_eq(&a, &[0u8; 31]));
    }
}
