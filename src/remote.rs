//! HTTP client for the vault sync server.
//!
//! The server is a thin record holder: it keeps the hashed master
//! credential and the encrypted blob for one account, authenticated by a
//! bearer token. Plaintext never crosses this boundary, and the token
//! never reaches the crypto core.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::storage::{VaultRecord, VaultStore};

/// [`VaultStore`] backed by the sync API.
pub struct RemoteStore {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchResponse {
    master_hash: Option<String>,
    encrypted_data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

impl RemoteStore {
    /// Creates a client for `base_url` (e.g. `https://host/api`) using
    /// the given bearer token.
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with auth, separating "could not reach the server" from
    /// "the server said no".
    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| VaultError::Transport(e.to_string()))?;
        check_status(resp)
    }
}

fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp
        .json::<ErrorResponse>()
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_else(|| status.to_string());

    if status == StatusCode::UNAUTHORIZED {
        return Err(VaultError::Auth(message));
    }
    Err(VaultError::Server(message))
}

fn parse_updated_at(raw: Option<String>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

impl VaultStore for RemoteStore {
    fn fetch(&self) -> Result<Option<VaultRecord>> {
        debug!(url = %self.url("/vault"), "fetching vault record");
        let resp = self.send(self.client.get(self.url("/vault")))?;
        let body: FetchResponse = resp
            .json()
            .map_err(|e| VaultError::Server(format!("malformed response: {e}")))?;

        // both fields null means the vault was never set up
        match body.master_hash {
            Some(master_hash) => Ok(Some(VaultRecord {
                master_hash,
                encrypted_data: body.encrypted_data,
            })),
            None => Ok(None),
        }
    }

    fn put(&self, record: &VaultRecord) -> Result<DateTime<Utc>> {
        debug!(url = %self.url("/vault"), "uploading vault record");
        let resp = self.send(self.client.put(self.url("/vault")).json(record))?;
        let body: SaveResponse = resp
            .json()
            .map_err(|e| VaultError::Server(format!("malformed response: {e}")))?;
        Ok(parse_updated_at(body.updated_at))
    }

    fn rotate(&self, record: &VaultRecord) -> Result<DateTime<Utc>> {
        debug!(url = %self.url("/vault/master"), "rotating master credential");
        let resp = self.send(self.client.put(self.url("/vault/master")).json(record))?;
        let body: SaveResponse = resp
            .json()
            .map_err(|e| VaultError::Server(format!("malformed response: {e}")))?;
        Ok(parse_updated_at(body.updated_at))
    }

    fn erase(&self) -> Result<()> {
        debug!(url = %self.url("/vault"), "erasing vault record");
        self.send(self.client.delete(self.url("/vault")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let store = RemoteStore::new("https://example.test/api/", "token");
        assert_eq!(store.url("/vault"), "https://example.test/api/vault");
    }

    #[test]
    fn updated_at_parses_rfc3339() {
        let t = parse_updated_at(Some("2024-05-01T12:00:00Z".into()));
        assert_eq!(t.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn updated_at_falls_back_to_now() {
        let before = Utc::now();
        let t = parse_updated_at(Some("not a timestamp".into()));
        assert!(t >= before);

        let t = parse_updated_at(None);
        assert!(t >= before);
    }
}
