//! Device-bound quick unlock.
//!
//! The master password is wrapped under a key that never leaves this
//! device and is released only after a local user-presence gesture.
//! Quick unlock is an alias for typing the password: the released
//! password still flows through normal verification and decryption, so a
//! stale copy (wrapped before a master password change) can never open
//! the vault.

use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{self, NONCE_LEN, TAG_LEN};
use crate::error::{Result, VaultError};

const SERVICE_NAME: &str = "caveau";
const DEVICE_KEY_NAME: &str = "device-key";

/// Custody of the device-local wrapping key.
///
/// The key stays inside the implementation; callers only ever see
/// wrapped bytes.
pub trait DeviceKeystore {
    fn wrap(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn unwrap(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Local user-presence check.
pub trait UserVerifier {
    /// Whether this device can ask for a gesture at all.
    fn is_supported(&self) -> bool;

    /// Block until the user confirms or declines. Declining is a normal
    /// outcome, not an error; implementations must not retry on their
    /// own.
    fn verify_user(&self, reason: &str) -> Result<Gesture>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Confirmed,
    Cancelled,
}

/// Wrap under an explicit key: `nonce[12] || ciphertext+tag`.
fn wrap_with_key(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let (ciphertext, nonce) = crypto::encrypt(key, plaintext)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn unwrap_with_key(key: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if wrapped.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::InvalidPassword);
    }
    let (nonce, ciphertext) = wrapped.split_at(NONCE_LEN);
    crypto::decrypt(key, nonce, ciphertext)
}

/// Keystore backed by the platform keychain (Keychain Services on macOS,
/// Credential Manager on Windows, Secret Service on Linux).
#[derive(Default)]
pub struct KeyringKeystore;

impl KeyringKeystore {
    pub fn new() -> Self {
        Self
    }

    /// Load the device key, creating it on first use.
    fn device_key(&self) -> Result<Zeroizing<[u8; 32]>> {
        let entry = keyring::Entry::new(SERVICE_NAME, DEVICE_KEY_NAME)
            .map_err(|e| VaultError::Keystore(format!("keychain entry creation: {e}")))?;

        match entry.get_password() {
            Ok(mut encoded) => {
                let raw = BASE64.decode(&encoded);
                encoded.zeroize();
                let raw =
                    raw.map_err(|_| VaultError::Keystore("stored device key is malformed".into()))?;
                let key: [u8; 32] = raw.try_into().map_err(|_| {
                    VaultError::Keystore("stored device key has wrong length".into())
                })?;
                Ok(Zeroizing::new(key))
            }
            Err(keyring::Error::NoEntry) => {
                let key = Zeroizing::new(crypto::generate_key()?);
                let encoded = Zeroizing::new(BASE64.encode(&key[..]));
                entry
                    .set_password(&encoded)
                    .map_err(|e| VaultError::Keystore(format!("keychain store: {e}")))?;
                debug!("created device key in platform keychain");
                Ok(key)
            }
            Err(e) => Err(VaultError::Keystore(format!("keychain get: {e}"))),
        }
    }
}

impl DeviceKeystore for KeyringKeystore {
    fn wrap(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.device_key()?;
        wrap_with_key(&key[..], plaintext)
    }

    fn unwrap(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.device_key()?;
        unwrap_with_key(&key[..], wrapped)
    }
}

/// Gesture check for a terminal: an explicit interactive confirmation.
/// Only supported when stdin is a TTY, so scripted runs never see the
/// feature.
#[derive(Default)]
pub struct TerminalVerifier;

impl TerminalVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl UserVerifier for TerminalVerifier {
    fn is_supported(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn verify_user(&self, reason: &str) -> Result<Gesture> {
        if !self.is_supported() {
            return Err(VaultError::GestureUnsupported);
        }

        eprint!("{reason} [y/N] ");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        match line.trim() {
            "y" | "Y" | "yes" => Ok(Gesture::Confirmed),
            _ => Ok(Gesture::Cancelled),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct QuickUnlockState {
    wrapped: String,
}

/// Quick unlock for one vault: gesture-gated release of the wrapped
/// master password.
pub struct QuickUnlock<K: DeviceKeystore, V: UserVerifier> {
    keystore: K,
    verifier: V,
    state_path: PathBuf,
}

impl<K: DeviceKeystore, V: UserVerifier> QuickUnlock<K, V> {
    pub fn new(keystore: K, verifier: V, state_path: PathBuf) -> Self {
        Self {
            keystore,
            verifier,
            state_path,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.verifier.is_supported()
    }

    pub fn is_enabled(&self) -> bool {
        self.state_path.exists()
    }

    /// Turn quick unlock on for this device. Requires a successful
    /// gesture before anything is wrapped or stored.
    pub fn register(&self, master_password: &str) -> Result<()> {
        if !self.verifier.is_supported() {
            return Err(VaultError::GestureUnsupported);
        }
        if self.verifier.verify_user("Enable quick unlock for this vault?")? == Gesture::Cancelled {
            return Err(VaultError::GestureCancelled);
        }

        let wrapped = self.keystore.wrap(master_password.as_bytes())?;
        let state = QuickUnlockState {
            wrapped: BASE64.encode(wrapped),
        };

        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.state_path, serde_json::to_vec_pretty(&state)?)?;
        debug!(path = %self.state_path.display(), "registered quick unlock");
        Ok(())
    }

    /// Release the master password after a gesture.
    ///
    /// Missing state reads as "not enabled" without prompting. State
    /// that exists but cannot be used (corrupt file, rotated or lost
    /// device key) is erased on the way out, so the caller falls back to
    /// the normal password prompt and the feature reads as disabled from
    /// then on.
    pub fn authenticate(&self) -> Result<Zeroizing<String>> {
        let Some(state) = self.load_state() else {
            if self.state_path.exists() {
                self.disable()?;
            }
            return Err(VaultError::QuickUnlockNotEnabled);
        };

        if self.verifier.verify_user("Unlock the vault?")? == Gesture::Cancelled {
            return Err(VaultError::GestureCancelled);
        }

        let Ok(wrapped) = BASE64.decode(&state.wrapped) else {
            self.disable()?;
            return Err(VaultError::QuickUnlockNotEnabled);
        };

        let plaintext = match self.keystore.unwrap(&wrapped) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                // device key rotated away or state tampered with
                debug!("wrapped master password is unusable, disabling quick unlock");
                self.disable()?;
                return Err(VaultError::QuickUnlockNotEnabled);
            }
        };

        match String::from_utf8(plaintext.to_vec()) {
            Ok(password) => Ok(Zeroizing::new(password)),
            Err(e) => {
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                self.disable()?;
                Err(VaultError::QuickUnlockNotEnabled)
            }
        }
    }

    /// Forget the wrapped master password. Idempotent.
    pub fn disable(&self) -> Result<()> {
        if self.state_path.exists() {
            fs::remove_file(&self.state_path)?;
            debug!("quick unlock disabled");
        }
        Ok(())
    }

    fn load_state(&self) -> Option<QuickUnlockState> {
        let data = fs::read(&self.state_path).ok()?;
        serde_json::from_slice(&data).ok()
    }
}
