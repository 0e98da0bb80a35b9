//! The encrypted vault envelope.
//!
//! Wire layout: `base64(salt[16] || nonce[12] || ciphertext+tag)`. Salt
//! and nonce are generated fresh on every call, so encrypting the same
//! entries twice yields different blobs and the derived key is never
//! reused across encryptions.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use zeroize::Zeroizing;

use super::{NONCE_LEN, SALT_LEN, TAG_LEN, aead, kdf};
use crate::error::{Result, VaultError};
use crate::store::EntryList;

/// Smallest well-formed blob: salt, nonce, and the tag of an empty
/// ciphertext.
const MIN_BLOB_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Encrypt the entry list under a master password.
pub fn encrypt_entries(entries: &EntryList, password: &str) -> Result<String> {
    let plaintext = Zeroizing::new(serde_json::to_vec(entries)?);

    let salt = aead::generate_salt()?;
    let key = Zeroizing::new(kdf::derive_key(password, &salt));
    let (ciphertext, nonce) = aead::encrypt(&key[..], &plaintext)?;

    let mut raw = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(raw))
}

/// Decrypt a vault blob back into its entries.
///
/// Every failure mode (bad encoding, truncation, tag mismatch, malformed
/// plaintext) reports the same [`VaultError::InvalidPassword`], so a
/// wrong password cannot be told apart from tampered data.
pub fn decrypt_entries(blob: &str, password: &str) -> Result<EntryList> {
    let raw = BASE64
        .decode(blob)
        .map_err(|_| VaultError::InvalidPassword)?;
    if raw.len() < MIN_BLOB_LEN {
        return Err(VaultError::InvalidPassword);
    }

    let (salt, rest) = raw.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = Zeroizing::new(kdf::derive_key(password, salt));
    let plaintext = aead::decrypt(&key[..], nonce, ciphertext)?;

    serde_json::from_slice(&plaintext).map_err(|_| VaultError::InvalidPassword)
}
