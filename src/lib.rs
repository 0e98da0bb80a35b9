pub mod backup;
pub mod crypto;
pub mod device;
pub mod error;
pub mod generator;
pub mod remote;
pub mod storage;
pub mod store;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use directories::ProjectDirs;
use tracing::debug;
use zeroize::Zeroizing;

use crate::backup::Backup;
use crate::storage::VaultRecord;

pub use crate::error::{Result, VaultError};
pub use crate::remote::RemoteStore;
pub use crate::storage::{FileStore, VaultStore};
pub use crate::store::{EntryList, PasswordEntry};

/// Minimum length for a master password.
pub const MIN_MASTER_PASSWORD_LEN: usize = 4;

/// Idle time after which a session locks itself (5 minutes).
pub const DEFAULT_AUTO_LOCK: Duration = Duration::from_secs(300);

/// An unlocked vault session.
///
/// Owns the decrypted entries and the master password for the lifetime
/// of the session. Every operation passes an idle guard: once the
/// auto-lock deadline is reached the plaintext is purged and all further
/// calls answer [`VaultError::Locked`]. Dropping the session purges too.
pub struct Vault {
    store: Box<dyn VaultStore>,
    entries: EntryList,
    password: Zeroizing<String>,
    master_hash: String,
    auto_lock: Duration,
    last_activity: Instant,
    locked: bool,
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.purge();
    }
}

// Manual impl: the store is a trait object without a `Debug` bound, and
// the remaining fields hold secrets that must not reach debug output.
impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("auto_lock", &self.auto_lock)
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Set up a brand-new vault on `store`.
    ///
    /// The password is length-checked before any cryptographic work or
    /// store access. Fails with [`VaultError::AlreadyInitialized`] when
    /// the store already holds a record.
    pub fn create(store: Box<dyn VaultStore>, password: &str) -> Result<Self> {
        check_master_password(password)?;

        if store.fetch()?.is_some() {
            return Err(VaultError::AlreadyInitialized);
        }

        let entries = EntryList::new();
        let master_hash = crypto::hash_password(password)?;
        let encrypted = crypto::encrypt_entries(&entries, password)?;
        store.put(&VaultRecord {
            master_hash: master_hash.clone(),
            encrypted_data: Some(encrypted),
        })?;

        debug!("vault created");
        Ok(Self::session(store, entries, password, master_hash))
    }

    /// Open an existing vault.
    ///
    /// Verifies the password against the stored credential in constant
    /// time before attempting decryption. A record whose data field was
    /// never written unlocks to an empty list.
    pub fn unlock(store: Box<dyn VaultStore>, password: &str) -> Result<Self> {
        let record = store.fetch()?.ok_or(VaultError::NotInitialized)?;

        if !crypto::verify_password(password, &record.master_hash) {
            return Err(VaultError::InvalidPassword);
        }

        let entries = match record.encrypted_data.as_deref() {
            Some(blob) => crypto::decrypt_entries(blob, password)?,
            None => EntryList::new(),
        };

        debug!(entries = entries.len(), "vault unlocked");
        Ok(Self::session(store, entries, password, record.master_hash))
    }

    /// Replace the store's record with a backup and open a session on
    /// it. The backup must decrypt under `password`; on failure nothing
    /// is persisted.
    pub fn restore_backup(
        store: Box<dyn VaultStore>,
        backup: Backup,
        password: &str,
    ) -> Result<Self> {
        let entries = backup.decrypt_entries(password)?;
        let record = backup.into_record();
        store.put(&record)?;

        debug!(entries = entries.len(), "backup restored");
        Ok(Self::session(store, entries, password, record.master_hash))
    }

    fn session(
        store: Box<dyn VaultStore>,
        entries: EntryList,
        password: &str,
        master_hash: String,
    ) -> Self {
        Self {
            store,
            entries,
            password: Zeroizing::new(password.to_string()),
            master_hash,
            auto_lock: DEFAULT_AUTO_LOCK,
            last_activity: Instant::now(),
            locked: false,
        }
    }

    /// Replace the idle timeout (default 5 minutes).
    pub fn with_auto_lock(mut self, timeout: Duration) -> Self {
        self.auto_lock = timeout;
        self
    }

    /// Enforce the idle deadline. On expiry the plaintext is purged
    /// before the caller sees [`VaultError::Locked`]; a pass resets the
    /// timer.
    fn guard(&mut self) -> Result<()> {
        if self.locked {
            return Err(VaultError::Locked);
        }
        if self.last_activity.elapsed() >= self.auto_lock {
            debug!("idle deadline reached, locking vault session");
            self.purge();
            return Err(VaultError::Locked);
        }
        self.last_activity = Instant::now();
        Ok(())
    }

    fn purge(&mut self) {
        // dropping the old list zeroizes every entry
        self.entries = EntryList::new();
        self.password = Zeroizing::new(String::new());
        self.locked = true;
    }

    /// Purge the plaintext now. The session stays usable only as a
    /// value; every further operation answers [`VaultError::Locked`].
    pub fn lock(&mut self) {
        debug!("vault session locked");
        self.purge();
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Add an entry and return its id. In-memory only until [`Vault::save`].
    pub fn add_entry(
        &mut self,
        site_name: String,
        username: Option<String>,
        password: String,
        notes: Option<String>,
    ) -> Result<String> {
        self.guard()?;
        Ok(self.entries.add(site_name, username, password, notes))
    }

    pub fn update_entry(
        &mut self,
        id: &str,
        site_name: Option<String>,
        username: Option<String>,
        password: Option<String>,
        notes: Option<String>,
    ) -> Result<()> {
        self.guard()?;
        self.entries.update(id, site_name, username, password, notes)
    }

    pub fn remove_entry(&mut self, id: &str) -> Result<()> {
        self.guard()?;
        self.entries.remove(id)
    }

    pub fn entries(&mut self) -> Result<impl Iterator<Item = &PasswordEntry>> {
        self.guard()?;
        Ok(self.entries.iter())
    }

    pub fn find_by_site(&mut self, site_name: &str) -> Result<Vec<&PasswordEntry>> {
        self.guard()?;
        Ok(self.entries.find_by_site(site_name))
    }

    pub fn search(&mut self, query: &str) -> Result<Vec<&PasswordEntry>> {
        self.guard()?;
        Ok(self.entries.search(query))
    }

    /// The session's master password, e.g. for wrapping into quick
    /// unlock. Guarded like every other operation.
    pub fn master_password(&mut self) -> Result<&str> {
        self.guard()?;
        Ok(&self.password)
    }

    /// Re-encrypt all entries and replace the stored record.
    ///
    /// Always a whole-record write with a fresh salt and nonce; there
    /// are no partial updates.
    pub fn save(&mut self) -> Result<()> {
        self.guard()?;
        let encrypted = crypto::encrypt_entries(&self.entries, &self.password)?;
        self.store.put(&VaultRecord {
            master_hash: self.master_hash.clone(),
            encrypted_data: Some(encrypted),
        })?;
        debug!(entries = self.entries.len(), "vault saved");
        Ok(())
    }

    /// Change the master password: new credential hash plus re-encrypted
    /// data, swapped on the store in one step. The session continues
    /// under the new password. Any quick-unlock copy of the old password
    /// is stale from here on and must be re-registered or dropped by the
    /// caller.
    pub fn change_master(&mut self, new_password: &str) -> Result<()> {
        self.guard()?;
        check_master_password(new_password)?;

        let master_hash = crypto::hash_password(new_password)?;
        let encrypted = crypto::encrypt_entries(&self.entries, new_password)?;
        self.store.rotate(&VaultRecord {
            master_hash: master_hash.clone(),
            encrypted_data: Some(encrypted),
        })?;

        self.master_hash = master_hash;
        self.password = Zeroizing::new(new_password.to_string());
        debug!("master password changed");
        Ok(())
    }
}

fn check_master_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_MASTER_PASSWORD_LEN {
        return Err(VaultError::Input(format!(
            "master password must be at least {MIN_MASTER_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Platform-default location of the vault record file.
pub fn default_vault_path() -> Result<PathBuf> {
    data_file("vault.json")
}

/// Platform-default location of the quick unlock state file.
pub fn default_quick_unlock_path() -> Result<PathBuf> {
    data_file("quick-unlock.json")
}

fn data_file(name: &str) -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "caveau").ok_or_else(|| {
        VaultError::Io(std::io::Error::other(
            "could not determine platform directories",
        ))
    })?;
    Ok(project_dirs.data_dir().join(name))
}
