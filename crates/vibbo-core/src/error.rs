//! Typed errors for the session and feed-synchronization core.
//!
//! Authentication, session, fetch, and storage failures each get their own
//! enum so callers can match on the failure class instead of parsing strings.

use thiserror::Error;

/// Errors from the SMS login handshake and organization discovery.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The phone number failed local validation; no request was issued.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// The remote endpoint rejected the request with a rate limit.
    #[error("rate limited by the login endpoint")]
    RateLimited,

    /// The verification code was rejected.
    #[error("verification code rejected")]
    InvalidCode,

    /// The login challenge or session is no longer valid.
    #[error("login challenge expired")]
    Expired,

    /// Transport-level failure (timeout, DNS, connection reset, bad payload).
    #[error("login request failed: {0}")]
    Network(String),
}

/// Errors from session lookup and refresh.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No stored session for the organization; onboarding is required.
    #[error("not authenticated; run login first")]
    Unauthenticated,

    /// The stored session is expired (or inside the safety margin) and the
    /// refresh attempt failed.
    #[error("session refresh failed: {0}")]
    RefreshFailed(#[source] AuthError),

    /// The session store could not be read or written. A refreshed token
    /// that was not persisted is never treated as committed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from one feed fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed endpoint rejected the bearer token.
    #[error("feed request was not authorized")]
    Unauthorized,

    /// The feed endpoint rejected the request with a rate limit.
    #[error("rate limited by the feed endpoint")]
    RateLimited,

    /// Transport-level failure (timeout, DNS, connection reset).
    #[error("feed request failed: {0}")]
    Network(String),

    /// The response decoded but did not have the expected shape.
    #[error("malformed feed response: {0}")]
    MalformedResponse(String),

    /// Could not obtain an authorized session for the request.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors from the durable session store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read session store at {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to write session store at {path}: {message}")]
    Write { path: String, message: String },

    #[error("session store at {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
}

/// Coarse failure class recorded on a published snapshot.
///
/// `ErrorKind::Unauthenticated` is the only kind that requires user action
/// (re-login); everything else is transient from the scheduler's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    RateLimited,
    Network,
    MalformedResponse,
    Unauthenticated,
    RefreshFailed,
    Storage,
}

impl FetchError {
    /// Maps a fetch failure to the snapshot-level error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Unauthorized => ErrorKind::Unauthorized,
            FetchError::RateLimited => ErrorKind::RateLimited,
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            FetchError::Session(SessionError::Unauthenticated) => ErrorKind::Unauthenticated,
            FetchError::Session(SessionError::RefreshFailed(_)) => ErrorKind::RefreshFailed,
            FetchError::Session(SessionError::Storage(_)) => ErrorKind::Storage,
        }
    }

    /// True when the failure means the user has to log in again.
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Unauthenticated | ErrorKind::RefreshFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kind_mapping() {
        assert_eq!(FetchError::Unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            FetchError::Network("timeout".to_string()).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            FetchError::Session(SessionError::Unauthenticated).kind(),
            ErrorKind::Unauthenticated
        );
    }

    #[test]
    fn test_relogin_classification() {
        assert!(FetchError::Session(SessionError::Unauthenticated).requires_relogin());
        assert!(
            FetchError::Session(SessionError::RefreshFailed(AuthError::Expired))
                .requires_relogin()
        );
        assert!(!FetchError::RateLimited.requires_relogin());
        assert!(!FetchError::Network("reset".to_string()).requires_relogin());
    }
}
