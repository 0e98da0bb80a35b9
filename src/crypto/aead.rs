use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

use super::{KEY_LEN, NONCE_LEN, SALT_LEN};
use crate::error::{Result, VaultError};

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| VaultError::Crypto("OS random generator unavailable".into()))
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate a fresh nonce.
///
/// Every encryption needs its own. Reusing a nonce under the same key
/// breaks both confidentiality and authenticity of GCM.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;
    Ok(nonce)
}

/// Generate a random 256-bit key, e.g. the device wrap key.
pub fn generate_key() -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    secure_random(&mut key)?;
    Ok(key)
}

/// Encrypt plaintext, returning the ciphertext (tag appended) and the
/// nonce that was generated for this call.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| VaultError::Crypto("invalid key length".into()))?;

    let nonce = generate_nonce()?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::Crypto("encryption failed".into()))?;

    Ok((ciphertext, nonce))
}

/// Decrypt ciphertext
pub fn decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| VaultError::Crypto("invalid key length".into()))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::InvalidPassword)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [9u8; 32];

        let (ciphertext, nonce) = encrypt(&key, b"secret payload").unwrap();
        let plaintext = decrypt(&key, &nonce, &ciphertext).unwrap();

        assert_eq!(&plaintext[..], b"secret payload");
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let (ciphertext, nonce) = encrypt(&[1u8; 32], b"payload").unwrap();

        let err = decrypt(&[2u8; 32], &nonce, &ciphertext).unwrap_err();
        assert!(matches!(err, VaultError::InvalidPassword));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = [3u8; 32];
        let (mut ciphertext, nonce) = encrypt(&key, b"payload").unwrap();
        ciphertext[0] ^= 0x01;

        assert!(decrypt(&key, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn nonces_are_fresh() {
        let key = [4u8; 32];

        let (_, n1) = encrypt(&key, b"x").unwrap();
        let (_, n2) = encrypt(&key, b"x").unwrap();

        assert_ne!(n1, n2);
    }
}
