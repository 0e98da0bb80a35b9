//! Portable vault backups.
//!
//! A backup file carries the stored record plus metadata. The contents
//! stay encrypted, so the file is exactly as safe to move around as the
//! server's copy. Restoring proves the password can decrypt the payload
//! before anything is persisted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::storage::{VaultRecord, VaultStore};
use crate::store::EntryList;

/// Current backup file version.
pub const BACKUP_VERSION: u32 = 1;

/// On-disk backup format.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub version: u32,
    pub exported_at: String,
    pub master_hash: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl Backup {
    fn validate(&self) -> Result<()> {
        if self.version != BACKUP_VERSION {
            return Err(VaultError::InvalidBackup(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.master_hash.is_empty() {
            return Err(VaultError::InvalidBackup("missing master hash".into()));
        }
        if self.data.as_deref().is_none_or(str::is_empty) {
            return Err(VaultError::InvalidBackup("missing encrypted data".into()));
        }
        Ok(())
    }

    /// Decrypt the payload under `password`. This is the gate a restore
    /// must pass before anything is persisted.
    pub fn decrypt_entries(&self, password: &str) -> Result<EntryList> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| VaultError::InvalidBackup("missing encrypted data".into()))?;
        crypto::decrypt_entries(data, password)
    }

    pub fn into_record(self) -> VaultRecord {
        VaultRecord {
            master_hash: self.master_hash,
            encrypted_data: self.data,
        }
    }
}

/// Default backup file name, e.g. `caveau-backup-2025-08-25.json`.
pub fn default_file_name() -> String {
    format!("caveau-backup-{}.json", Utc::now().format("%Y-%m-%d"))
}

/// Write the stored record to `path` as a backup file.
///
/// Needs no password: the payload is already ciphertext.
pub fn export(store: &dyn VaultStore, path: &Path) -> Result<()> {
    let record = store.fetch()?.ok_or(VaultError::NotInitialized)?;

    let backup = Backup {
        version: BACKUP_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        master_hash: record.master_hash,
        data: record.encrypted_data,
    };
    fs::write(path, serde_json::to_vec_pretty(&backup)?)?;
    Ok(())
}

/// Parse and shape-check a backup file.
pub fn load(path: &Path) -> Result<Backup> {
    let raw = fs::read(path)?;
    let backup: Backup =
        serde_json::from_slice(&raw).map_err(|e| VaultError::InvalidBackup(e.to_string()))?;
    backup.validate()?;
    Ok(backup)
}
