//! Vault record persistence.
//!
//! [`VaultStore`] is the seam between the crypto core and whatever holds
//! the opaque record: a local file here, the sync server in
//! [`crate::remote`]. Implementations only ever see the hashed master
//! credential and the encrypted blob, never plaintext.

use chrono::{DateTime, Utc};
use getrandom::fill;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, VaultError};

/// The unit of storage: everything the backend holds for one vault.
///
/// `encrypted_data` is `None` for a vault whose master credential has
/// been set but which has never saved entries.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    pub master_hash: String,
    pub encrypted_data: Option<String>,
}

/// Backend contract for vault records.
///
/// The whole record is read and replaced as a unit; there are no partial
/// updates. `rotate` swaps the master credential and re-encrypted data
/// in one atomic step.
pub trait VaultStore {
    /// Load the record, `None` when the vault was never initialized.
    fn fetch(&self) -> Result<Option<VaultRecord>>;

    /// Store or replace the record, returning the update timestamp.
    fn put(&self, record: &VaultRecord) -> Result<DateTime<Utc>>;

    /// Replace credential and data together (master password change).
    fn rotate(&self, record: &VaultRecord) -> Result<DateTime<Utc>>;

    /// Remove the record entirely. Idempotent.
    fn erase(&self) -> Result<()>;
}

/// File-backed [`VaultStore`]: one JSON record per file.
///
/// Writes are crash-safe: data goes to a randomly named temporary file,
/// is synced, then atomically replaces the old file, and the parent
/// directory is synced so the rename itself is persisted. A crash leaves
/// either the old or the new record, never a partial write.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store backed by the given file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save_bytes(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        // securely create temp file (fail if exists)
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?; //fsync file
        drop(tmp_file);

        //atomic replace
        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // fsync directory
        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Uses cryptographically secure random bytes to avoid name
    /// collisions. Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf).map_err(|_| VaultError::Crypto("OS random generator unavailable".into()))?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| VaultError::Input("store path has no file name".into()))?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` so
    /// the operation is truly atomic and persisted to disk.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(VaultError::Io(std::io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same
    /// filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

impl VaultStore for FileStore {
    fn fetch(&self) -> Result<Option<VaultRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        let record = serde_json::from_slice(&data)?;
        Ok(Some(record))
    }

    fn put(&self, record: &VaultRecord) -> Result<DateTime<Utc>> {
        debug!(path = %self.path.display(), "saving vault record");
        let data = serde_json::to_vec_pretty(record)?;
        self.save_bytes(&data)?;
        Ok(Utc::now())
    }

    fn rotate(&self, record: &VaultRecord) -> Result<DateTime<Utc>> {
        // a single whole-file replace already swaps hash and data together
        self.put(record)
    }

    fn erase(&self) -> Result<()> {
        if self.path.exists() {
            debug!(path = %self.path.display(), "erasing vault record");
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record() -> VaultRecord {
        VaultRecord {
            master_hash: "aGFzaA==".into(),
            encrypted_data: Some("Y2lwaGVydGV4dA==".into()),
        }
    }

    // --------------------------------------------------
    // FETCH TESTS
    // --------------------------------------------------

    #[test]
    fn fetch_returns_none_if_missing() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));

        assert!(store.fetch().unwrap().is_none());
    }

    #[test]
    fn put_then_fetch_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));

        store.put(&record()).unwrap();

        let loaded = store.fetch().unwrap().unwrap();
        assert_eq!(loaded.master_hash, "aGFzaA==");
        assert_eq!(loaded.encrypted_data.as_deref(), Some("Y2lwaGVydGV4dA=="));
    }

    #[test]
    fn fetch_fails_on_corrupt_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.json");
        fs::write(&path, b"not json").unwrap();

        let store = FileStore::new(path);
        assert!(store.fetch().is_err());
    }

    #[test]
    fn record_file_uses_camel_case() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let store = FileStore::new(path.clone());

        store.put(&record()).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("\"masterHash\""));
        assert!(content.contains("\"encryptedData\""));
    }

    // --------------------------------------------------
    // RANDOM TMP PATH TESTS
    // --------------------------------------------------

    #[test]
    fn random_tmp_path_has_same_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = FileStore::new(path.clone());
        let tmp = store.random_tmp_path().unwrap();

        assert_eq!(tmp.parent(), path.parent());
    }

    #[test]
    fn tmp_names_are_unique() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));

        let a = store.random_tmp_path().unwrap();
        let b = store.random_tmp_path().unwrap();

        assert_ne!(a, b);
    }

    // --------------------------------------------------
    // SAVE EDGE CASES
    // --------------------------------------------------

    #[test]
    fn put_replaces_existing_record() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));

        store.put(&record()).unwrap();
        let mut second = record();
        second.master_hash = "b3RoZXI=".into();
        store.put(&second).unwrap();

        let loaded = store.fetch().unwrap().unwrap();
        assert_eq!(loaded.master_hash, "b3RoZXI=");
    }

    #[test]
    fn tmp_file_is_removed_after_success() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));

        store.put(&record()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], "vault.json");
    }

    #[test]
    fn parent_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("vault.json");

        let store = FileStore::new(nested.clone());
        store.put(&record()).unwrap();

        assert!(nested.exists());
    }

    // --------------------------------------------------
    // ERASE TESTS
    // --------------------------------------------------

    #[test]
    fn erase_removes_record() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));

        store.put(&record()).unwrap();
        store.erase().unwrap();

        assert!(store.fetch().unwrap().is_none());
    }

    #[test]
    fn erase_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));

        store.erase().unwrap();
        store.erase().unwrap();
    }

    #[test]
    fn rotate_swaps_hash_and_data() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("vault.json"));
        store.put(&record()).unwrap();

        let rotated = VaultRecord {
            master_hash: "bmV3aGFzaA==".into(),
            encrypted_data: Some("bmV3ZGF0YQ==".into()),
        };
        store.rotate(&rotated).unwrap();

        let loaded = store.fetch().unwrap().unwrap();
        assert_eq!(loaded.master_hash, "bmV3aGFzaA==");
        assert_eq!(loaded.encrypted_data.as_deref(), Some("bmV3ZGF0YQ=="));
    }
}
