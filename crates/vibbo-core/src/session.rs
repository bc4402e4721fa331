//! Session lifetime management.
//!
//! `SessionManager` is the single writer of the session store: every read of
//! the active token goes through it, and a refreshed token only counts as
//! committed after the store write succeeds.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::auth::AuthClient;
use crate::credentials::{OrgRef, SessionStore};
use crate::error::SessionError;

/// What a fetch needs to authorize one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub token: String,
    pub org_id: String,
    pub org_slug: String,
}

/// Manages the session of one configured organization.
///
/// Constructed once per organization and handed by reference to the poll
/// scheduler and feed fetcher; there is no ambient global session.
pub struct SessionManager {
    auth: AuthClient,
    store_path: PathBuf,
    org_slug: String,
    margin: chrono::Duration,
}

impl SessionManager {
    pub fn new(
        auth: AuthClient,
        store_path: PathBuf,
        org_slug: String,
        margin: chrono::Duration,
    ) -> Self {
        Self {
            auth,
            store_path,
            org_slug,
            margin,
        }
    }

    /// The organization this manager serves.
    pub fn org_slug(&self) -> &str {
        &self.org_slug
    }

    /// Returns a context that is valid for at least the safety margin.
    ///
    /// A session with an unknown expiry, or one expiring beyond the margin,
    /// is returned unchanged. Otherwise a refresh is attempted; a refresh
    /// failure surfaces as `RefreshFailed` so the scheduler can keep its
    /// previous data instead of crashing.
    pub async fn authorized_context(&self) -> Result<AuthContext, SessionError> {
        let store = SessionStore::load_from(&self.store_path)?;
        let record = store
            .get(&self.org_slug)
            .ok_or(SessionError::Unauthenticated)?;

        if !record.session().needs_refresh(self.margin) {
            return Ok(AuthContext {
                token: record.token.clone(),
                org_id: record.organization_id.clone(),
                org_slug: record.organization_slug.clone(),
            });
        }

        debug!(org = %self.org_slug, "session within refresh margin");
        self.refresh_record(store).await
    }

    /// Forces a refresh regardless of the stored expiry.
    ///
    /// Used after the feed endpoint rejects a token the margin check still
    /// considered valid.
    pub async fn reauthorize(&self) -> Result<AuthContext, SessionError> {
        let store = SessionStore::load_from(&self.store_path)?;
        if store.get(&self.org_slug).is_none() {
            return Err(SessionError::Unauthenticated);
        }
        self.refresh_record(store).await
    }

    /// Organizations discovered for the stored session.
    pub fn organizations(&self) -> Result<Vec<OrgRef>, SessionError> {
        let store = SessionStore::load_from(&self.store_path)?;
        let record = store
            .get(&self.org_slug)
            .ok_or(SessionError::Unauthenticated)?;
        Ok(record.organizations.clone())
    }

    async fn refresh_record(&self, mut store: SessionStore) -> Result<AuthContext, SessionError> {
        let record = store
            .get(&self.org_slug)
            .ok_or(SessionError::Unauthenticated)?;

        let (token, expires_at) = self
            .auth
            .refresh(&record.token)
            .await
            .map_err(SessionError::RefreshFailed)?;

        let mut record = record.clone();
        record.token = token;
        record.expires_at = expires_at;

        let context = AuthContext {
            token: record.token.clone(),
            org_id: record.organization_id.clone(),
            org_slug: record.organization_slug.clone(),
        };

        store.set(record);
        // An unsaved token must not be handed out as committed.
        store.save_to(&self.store_path)?;

        info!(org = %self.org_slug, "session refreshed");
        Ok(context)
    }
}
