use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::{KEY_LEN, PBKDF2_ITERATIONS};

/// Derive a 256-bit key from a master password and salt.
///
/// PBKDF2-HMAC-SHA256 with [`PBKDF2_ITERATIONS`] rounds. Deterministic:
/// the same password and salt always yield the same key. Freshness comes
/// from the salt, which callers must generate per operation.
pub fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; 16];

        let k1 = derive_key("password", &salt);
        let k2 = derive_key("password", &salt);

        assert_eq!(k1, k2);
    }

    #[test]
    fn kdf_salt_affects_output() {
        let k1 = derive_key("pw", &[7u8; 16]);
        let k2 = derive_key("pw", &[8u8; 16]);

        assert_ne!(k1, k2);
    }

    #[test]
    fn kdf_password_affects_output() {
        let salt = [7u8; 16];

        let k1 = derive_key("pw", &salt);
        let k2 = derive_key("pw2", &salt);

        assert_ne!(k1, k2);
    }
}
