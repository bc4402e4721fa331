//! Session storage and retrieval.
//!
//! Stores sessions in `<home>/sessions.json` with restricted permissions (0600),
//! one record per configured organization. Tokens are never logged or displayed
//! in full.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::paths;
use crate::error::StorageError;

/// One cooperative organization the user belongs to.
///
/// Discovered once at login; the opaque `id` is resolved separately for the
/// active organization and may be empty on the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRef {
    #[serde(default)]
    pub id: String,
    pub slug: String,
    pub display_name: String,
}

/// An authenticated portal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    /// Expiry, when the portal reported one.
    pub expires_at: Option<DateTime<Utc>>,
    /// Organizations discovered for the account, in portal order.
    pub organizations: Vec<OrgRef>,
}

impl Session {
    /// True when the session must be refreshed before authorizing a request:
    /// the expiry is known and falls within `margin` from now. An unknown
    /// expiry is used as-is.
    pub fn needs_refresh(&self, margin: chrono::Duration) -> bool {
        match self.expires_at {
            Some(at) => at <= Utc::now() + margin,
            None => false,
        }
    }
}

/// Persisted session record for one configured organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The bearer token.
    pub token: String,
    /// Expiry timestamp, if the portal reported one.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Opaque id of the active organization.
    pub organization_id: String,
    /// Slug of the active organization.
    pub organization_slug: String,
    /// All memberships discovered at login.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<OrgRef>,
}

impl SessionRecord {
    /// The session view of this record.
    pub fn session(&self) -> Session {
        Session {
            token: self.token.clone(),
            expires_at: self.expires_at,
            organizations: self.organizations.clone(),
        }
    }
}

/// Session store structure.
/// Maps organization slugs to their session records.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SessionStore {
    /// Organization slug -> session record mapping.
    #[serde(flatten)]
    records: HashMap<String, SessionRecord>,
}

impl SessionStore {
    /// Returns the default path of the session store file.
    pub fn store_path() -> PathBuf {
        paths::sessions_path()
    }

    /// Loads the session store from the default path.
    /// Returns an empty store if the file doesn't exist.
    ///
    /// # Errors
    /// Returns a `StorageError` if the file cannot be read or parsed.
    pub fn load() -> Result<Self, StorageError> {
        Self::load_from(&Self::store_path())
    }

    /// Loads the session store from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|err| StorageError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|err| StorageError::Corrupt {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Saves the session store to the default path with restricted
    /// permissions (0600).
    ///
    /// # Errors
    /// Returns a `StorageError` if the write fails. A failed write must not
    /// be treated as committed by the caller.
    pub fn save(&self) -> Result<(), StorageError> {
        self.save_to(&Self::store_path())
    }

    /// Saves the session store to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), StorageError> {
        let write_err = |err: std::io::Error| StorageError::Write {
            path: path.display().to_string(),
            message: err.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(|err| StorageError::Write {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .map_err(write_err)?;
            file.write_all(contents.as_bytes()).map_err(write_err)?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents).map_err(write_err)?;
        }

        Ok(())
    }

    /// Gets the record for an organization slug.
    pub fn get(&self, slug: &str) -> Option<&SessionRecord> {
        self.records.get(slug)
    }

    /// Sets the record for an organization slug.
    pub fn set(&mut self, record: SessionRecord) {
        self.records
            .insert(record.organization_slug.clone(), record);
    }

    /// Removes the record for an organization slug.
    pub fn remove(&mut self, slug: &str) -> Option<SessionRecord> {
        self.records.remove(slug)
    }

    /// True when no organization is configured.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured organization slugs, sorted for stable output.
    pub fn slugs(&self) -> Vec<&str> {
        let mut slugs: Vec<&str> = self.records.keys().map(String::as_str).collect();
        slugs.sort_unstable();
        slugs
    }
}

/// Returns a masked version of a token for display (first 8 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 12 {
        return "***".to_string();
    }
    format!("{}...", &token[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slug: &str, token: &str) -> SessionRecord {
        SessionRecord {
            token: token.to_string(),
            expires_at: None,
            organization_id: format!("org-{slug}"),
            organization_slug: slug.to_string(),
            organizations: vec![OrgRef {
                id: format!("org-{slug}"),
                slug: slug.to_string(),
                display_name: slug.to_uppercase(),
            }],
        }
    }

    /// Test: save followed by load yields an equal store.
    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let mut store = SessionStore::default();
        store.set(record("solsikken", "tok-123456789012345"));
        store.save_to(&path).unwrap();

        let loaded = SessionStore::load_from(&path).unwrap();
        let rec = loaded.get("solsikken").unwrap();
        assert_eq!(rec.token, "tok-123456789012345");
        assert_eq!(rec.organization_id, "org-solsikken");
        assert_eq!(rec.organizations.len(), 1);
        assert_eq!(rec.session(), store.get("solsikken").unwrap().session());
    }

    /// Test: missing file loads as an empty store.
    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load_from(&dir.path().join("sessions.json")).unwrap();
        assert!(store.is_empty());
    }

    /// Test: corrupt file is reported, not silently reset.
    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = SessionStore::load_from(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_remove() {
        let mut store = SessionStore::default();
        store.set(record("a", "tok-a"));
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_needs_refresh() {
        let mut session = Session {
            token: "t".to_string(),
            expires_at: None,
            organizations: Vec::new(),
        };
        let margin = chrono::Duration::seconds(60);

        // unknown expiry is used as-is
        assert!(!session.needs_refresh(margin));

        // 30 s in the future, 60 s margin: refresh
        session.expires_at = Some(Utc::now() + chrono::Duration::seconds(30));
        assert!(session.needs_refresh(margin));

        // well past the margin: no refresh
        session.expires_at = Some(Utc::now() + chrono::Duration::seconds(3600));
        assert!(!session.needs_refresh(margin));

        // already expired: refresh
        session.expires_at = Some(Utc::now() - chrono::Duration::seconds(10));
        assert!(session.needs_refresh(margin));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("tok-ses-long-token-here"), "tok-ses-...");
        assert_eq!(mask_token("short"), "***");
    }
}
