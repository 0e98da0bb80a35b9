//! Cryptographic core of the vault.
//!
//! Provides key derivation, authenticated encryption, master password
//! hashing, and the encrypted vault envelope.

pub mod aead;
pub mod envelope;
pub mod kdf;
pub mod verifier;

pub use aead::{decrypt, encrypt, generate_key, generate_nonce, generate_salt};
pub use envelope::{decrypt_entries, encrypt_entries};
pub use kdf::derive_key;
pub use verifier::{hash_password, verify_password};

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (12 bytes for AES-256-GCM).
pub const NONCE_LEN: usize = 12;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the GCM authentication tag (16 bytes).
pub const TAG_LEN: usize = 16;
/// PBKDF2-SHA256 rounds for key derivation and password hashing.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
