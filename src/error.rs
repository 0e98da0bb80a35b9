//! Error taxonomy for the vault library.
//!
//! The binary wraps these in `anyhow` for display; library code matches on
//! them to pick recovery paths (fall back to a password prompt, disable
//! quick unlock, retry against the server).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Input rejected before any cryptographic work was attempted.
    #[error("{0}")]
    Input(String),

    /// Wrong master password or tampered/corrupted vault data. Every
    /// decryption failure collapses to this one variant.
    #[error("invalid password or corrupted vault data")]
    InvalidPassword,

    #[error("vault already exists")]
    AlreadyInitialized,

    #[error("vault is not initialized")]
    NotInitialized,

    /// The session purged its plaintext (explicit lock or idle timeout).
    #[error("vault session is locked")]
    Locked,

    #[error("no entry for '{0}'")]
    EntryNotFound(String),

    /// The server rejected our bearer token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server answered with an application error.
    #[error("server error: {0}")]
    Server(String),

    /// The server could not be reached at all. Kept separate from
    /// [`VaultError::Auth`] so connectivity problems are never reported
    /// as a wrong password or bad token.
    #[error("cannot reach server: {0}")]
    Transport(String),

    /// The user declined the local unlock gesture. Recoverable: callers
    /// fall back to manual password entry.
    #[error("unlock cancelled")]
    GestureCancelled,

    #[error("quick unlock is not supported on this device")]
    GestureUnsupported,

    #[error("quick unlock is not enabled")]
    QuickUnlockNotEnabled,

    #[error("invalid backup file: {0}")]
    InvalidBackup(String),

    #[error("device keystore unavailable: {0}")]
    Keystore(String),

    /// A primitive failed (RNG unavailable, cipher setup). Not a user
    /// error; something is wrong with the environment.
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;
