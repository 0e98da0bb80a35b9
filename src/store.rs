//! Plaintext vault contents.
//!
//! Entries exist decrypted only in memory, inside an unlocked session. At
//! rest and on the wire they live inside the encrypted envelope. The
//! serialized form is a bare JSON array with camelCase field names; list
//! order is preserved across save and load.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// One saved credential.
#[derive(Serialize, Deserialize, Debug, Clone, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct PasswordEntry {
    id: String,
    site_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    /// Epoch milliseconds of the last modification.
    updated_at: i64,
}

impl PasswordEntry {
    fn new(
        id: String,
        site_name: String,
        username: Option<String>,
        password: String,
        notes: Option<String>,
    ) -> Self {
        Self {
            id,
            site_name,
            username,
            password,
            notes,
            updated_at: Utc::now().timestamp_millis(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }
}

/// Ordered collection of entries; serializes as a bare JSON array.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(transparent)]
pub struct EntryList {
    entries: Vec<PasswordEntry>,
}

impl EntryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry and return its id.
    pub fn add(
        &mut self,
        site_name: String,
        username: Option<String>,
        password: String,
        notes: Option<String>,
    ) -> String {
        let id = self.next_id();
        self.entries.push(PasswordEntry::new(
            id.clone(),
            site_name,
            username,
            password,
            notes,
        ));
        id
    }

    pub fn get(&self, id: &str) -> Option<&PasswordEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Update an entry in place; `None` fields are left untouched.
    pub fn update(
        &mut self,
        id: &str,
        site_name: Option<String>,
        username: Option<String>,
        password: Option<String>,
        notes: Option<String>,
    ) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;

        if let Some(site_name) = site_name {
            entry.site_name = site_name;
        }
        if let Some(username) = username {
            entry.username = Some(username);
        }
        if let Some(password) = password {
            entry.password = password;
        }
        if let Some(notes) = notes {
            entry.notes = Some(notes);
        }
        entry.touch();
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| VaultError::EntryNotFound(id.to_string()))?;
        self.entries.remove(pos);
        Ok(())
    }

    /// Entries whose site name matches exactly, ignoring case.
    pub fn find_by_site(&self, site_name: &str) -> Vec<&PasswordEntry> {
        let wanted = site_name.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.site_name.to_lowercase() == wanted)
            .collect()
    }

    /// Case-insensitive substring search over site names and usernames.
    pub fn search(&self, query: &str) -> Vec<&PasswordEntry> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.site_name.to_lowercase().contains(&query)
                    || e.username
                        .as_deref()
                        .is_some_and(|u| u.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PasswordEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Millisecond timestamp, bumped until unused. Keeps ids unique even
    /// when several entries are created within the same millisecond.
    fn next_id(&self) -> String {
        let mut candidate = Utc::now().timestamp_millis();
        let mut id = candidate.to_string();
        while self.get(&id).is_some() {
            candidate += 1;
            id = candidate.to_string();
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_works() {
        let mut list = EntryList::new();
        let id = list.add("github".into(), Some("octocat".into()), "pw".into(), None);

        let entry = list.get(&id).unwrap();
        assert_eq!(entry.site_name(), "github");
        assert_eq!(entry.username(), Some("octocat"));
        assert_eq!(entry.password(), "pw");
        assert_eq!(entry.notes(), None);
    }

    #[test]
    fn ids_stay_unique() {
        let mut list = EntryList::new();
        let mut ids: Vec<String> = Vec::new();
        for _ in 0..50 {
            ids.push(list.add("site".into(), None, "pw".into(), None));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn update_changes_only_given_fields() {
        let mut list = EntryList::new();
        let id = list.add("github".into(), Some("octocat".into()), "old".into(), None);

        list.update(&id, None, None, Some("new".into()), None).unwrap();

        let entry = list.get(&id).unwrap();
        assert_eq!(entry.password(), "new");
        assert_eq!(entry.username(), Some("octocat"));
        assert_eq!(entry.site_name(), "github");
    }

    #[test]
    fn update_touches_timestamp() {
        let mut list = EntryList::new();
        let id = list.add("github".into(), None, "pw".into(), None);
        let before = list.get(&id).unwrap().updated_at();

        list.update(&id, None, None, Some("new".into()), None).unwrap();

        assert!(list.get(&id).unwrap().updated_at() >= before);
    }

    #[test]
    fn update_not_existing_entry_fails() {
        let mut list = EntryList::new();
        match list.update("12345", None, None, Some("pw".into()), None) {
            Err(VaultError::EntryNotFound(id)) => assert_eq!(id, "12345"),
            other => panic!("expected EntryNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn remove_works() {
        let mut list = EntryList::new();
        let id = list.add("github".into(), None, "pw".into(), None);

        list.remove(&id).unwrap();
        assert!(list.get(&id).is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn remove_not_existing_entry_fails() {
        let mut list = EntryList::new();
        match list.remove("nope") {
            Err(VaultError::EntryNotFound(id)) => assert_eq!(id, "nope"),
            other => panic!("expected EntryNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn find_by_site_ignores_case() {
        let mut list = EntryList::new();
        list.add("GitHub".into(), Some("a".into()), "pw".into(), None);
        list.add("github".into(), Some("b".into()), "pw".into(), None);
        list.add("gitlab".into(), None, "pw".into(), None);

        let found = list.find_by_site("github");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn search_matches_site_and_username() {
        let mut list = EntryList::new();
        list.add("GitHub".into(), Some("octocat".into()), "pw".into(), None);
        list.add("mail".into(), Some("me@github.example".into()), "pw".into(), None);
        list.add("bank".into(), None, "pw".into(), None);

        assert_eq!(list.search("HUB").len(), 2);
        assert_eq!(list.search("octo").len(), 1);
        assert_eq!(list.search("xyz").len(), 0);
    }

    #[test]
    fn order_is_preserved() {
        let mut list = EntryList::new();
        let a = list.add("a".into(), None, "pw".into(), None);
        let b = list.add("b".into(), None, "pw".into(), None);
        let c = list.add("c".into(), None, "pw".into(), None);
        list.remove(&b).unwrap();

        let sites: Vec<&str> = list.iter().map(|e| e.site_name()).collect();
        assert_eq!(sites, ["a", "c"]);
        assert_eq!(list.get(&a).unwrap().site_name(), "a");
        assert_eq!(list.get(&c).unwrap().site_name(), "c");
    }

    #[test]
    fn serializes_as_camel_case_array() {
        let mut list = EntryList::new();
        list.add("github".into(), Some("octocat".into()), "pw".into(), None);

        let json = serde_json::to_string(&list).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"siteName\""));
        assert!(json.contains("\"updatedAt\""));
        assert!(!json.contains("\"site_name\""));
    }
}
