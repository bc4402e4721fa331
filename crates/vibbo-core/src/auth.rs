//! SMS one-time-code authentication and organization discovery.
//!
//! The login handshake is two steps: request a code for a phone number, then
//! exchange the code for a bearer session. Organization discovery runs right
//! after a successful verification; a discovery failure degrades to an empty
//! membership list instead of failing the login.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::api::{guard_production_url, resolve_base_url};
use crate::config::Config;
use crate::credentials::{OrgRef, Session};
use crate::error::AuthError;

/// Country code applied when the user types a bare national number.
const DEFAULT_COUNTRY_PREFIX: &str = "+47";

/// E.164-style: leading +, 8-15 digits, no leading zero.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").expect("valid phone regex"));

const ORGANIZATIONS_QUERY: &str = "query vibboOrganizations {
  viewer {
    memberships {
      name
      slug: organizationSlug
      vibboEnabled
    }
  }
}";

const ORGANIZATION_QUERY: &str = "query vibboOrganization($organizationSlug: OrganizationID!) {
  organization(id: $organizationSlug) {
    id
    name
    slug
  }
}";

/// Normalizes and validates a phone number.
///
/// Whitespace is stripped; a number without a leading `+` gets the Norwegian
/// country code. Malformed input fails with `InvalidPhone` before any network
/// round trip.
pub fn normalize_phone(input: &str) -> Result<String, AuthError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(AuthError::InvalidPhone(input.to_string()));
    }

    let number = if compact.starts_with('+') {
        compact
    } else {
        format!("{DEFAULT_COUNTRY_PREFIX}{compact}")
    };

    if PHONE_RE.is_match(&number) {
        Ok(number)
    } else {
        Err(AuthError::InvalidPhone(input.to_string()))
    }
}

/// An issued SMS challenge waiting for its code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub challenge_id: String,
    pub phone_number: String,
}

/// Client for the portal's login endpoints.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    /// Creates a client from config (base URL resolution and per-request
    /// timeout included).
    pub fn new(config: &Config) -> Self {
        let base_url = resolve_base_url(config);
        guard_production_url(&base_url);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    /// Requests an SMS code for a phone number.
    ///
    /// The number is validated locally first; no request is issued for
    /// malformed input.
    pub async fn request_code(&self, phone: &str) -> Result<LoginChallenge, AuthError> {
        let phone_number = normalize_phone(phone)?;

        let response = self
            .http
            .post(format!("{}/auth/sms/start", self.base_url))
            .json(&SmsStartRequest {
                phone_number: &phone_number,
            })
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => AuthError::RateLimited,
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    AuthError::InvalidPhone(phone_number)
                }
                _ => AuthError::Network(format!("sms start failed with status {status}")),
            });
        }

        let payload: SmsStartResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        debug!(phone = %phone_number, "SMS code requested");
        Ok(LoginChallenge {
            challenge_id: payload.challenge_id,
            phone_number,
        })
    }

    /// Verifies an SMS code and returns the new session.
    ///
    /// On success, organization discovery runs immediately with the fresh
    /// token; if it fails the session is returned with an empty membership
    /// list and discovery can be retried later.
    pub async fn verify_code(
        &self,
        challenge: &LoginChallenge,
        code: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(format!("{}/auth/sms/verify", self.base_url))
            .json(&SmsVerifyRequest {
                challenge_id: &challenge.challenge_id,
                phone_number: &challenge.phone_number,
                verification_code: code.trim(),
            })
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => AuthError::RateLimited,
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AuthError::InvalidCode
                }
                StatusCode::GONE => AuthError::Expired,
                _ => AuthError::Network(format!("sms verify failed with status {status}")),
            });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let expires_at = payload.expires_at(Utc::now());

        let organizations = match self.discover_organizations(&payload.token).await {
            Ok(organizations) => organizations,
            Err(err) => {
                warn!(error = %err, "organization discovery failed after login; continuing with empty list");
                Vec::new()
            }
        };

        Ok(Session {
            token: payload.token,
            expires_at,
            organizations,
        })
    }

    /// Exchanges the current bearer token for a fresh one.
    pub async fn refresh(
        &self,
        token: &str,
    ) -> Result<(String, Option<DateTime<Utc>>), AuthError> {
        let response = self
            .http
            .post(format!("{}/auth/refresh", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => AuthError::RateLimited,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::GONE => {
                    AuthError::Expired
                }
                _ => AuthError::Network(format!("refresh failed with status {status}")),
            });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let expires_at = payload.expires_at(Utc::now());
        Ok((payload.token, expires_at))
    }

    /// Fetches the user's memberships via GraphQL.
    ///
    /// Only organizations with the portal feature enabled are returned, in
    /// portal order.
    pub async fn discover_organizations(&self, token: &str) -> Result<Vec<OrgRef>, AuthError> {
        let data: OrganizationsData = self
            .graphql(token, "vibboOrganizations", ORGANIZATIONS_QUERY, json!({}))
            .await?;

        let viewer = data
            .viewer
            .ok_or_else(|| AuthError::Network("no viewer data in response".to_string()))?;

        Ok(viewer
            .memberships
            .into_iter()
            .filter(|m| m.vibbo_enabled)
            .map(|m| OrgRef {
                id: String::new(),
                slug: m.slug,
                display_name: m.name,
            })
            .collect())
    }

    /// Resolves the opaque organization id for a slug.
    pub async fn organization_id(&self, token: &str, slug: &str) -> Result<String, AuthError> {
        let data: OrganizationData = self
            .graphql(
                token,
                "vibboOrganization",
                ORGANIZATION_QUERY,
                json!({ "organizationSlug": slug }),
            )
            .await?;

        data.organization
            .map(|org| org.id)
            .ok_or_else(|| AuthError::Network(format!("no organization found for slug {slug}")))
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        token: &str,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<T, AuthError> {
        let response = self
            .http
            .post(format!("{}/graphql?name={operation}", self.base_url))
            .bearer_auth(token)
            .json(&json!({
                "operationName": operation,
                "variables": variables,
                "query": query,
            }))
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthError::Expired,
                StatusCode::TOO_MANY_REQUESTS => AuthError::RateLimited,
                _ => AuthError::Network(format!("GraphQL {operation} failed with status {status}")),
            });
        }

        let payload: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        if let Some(error) = payload.errors.first() {
            return Err(AuthError::Network(format!(
                "GraphQL {operation} error: {}",
                error.message
            )));
        }

        payload
            .data
            .ok_or_else(|| AuthError::Network(format!("GraphQL {operation} returned no data")))
    }
}

/// One login attempt: `Idle -> CodeRequested -> Verified | Failed`.
///
/// Nothing is retained across process restarts; a restart while a code is
/// outstanding forces the user to start over.
pub struct LoginFlow<'a> {
    client: &'a AuthClient,
    state: LoginState,
}

/// State of an in-progress login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    CodeRequested(LoginChallenge),
    Verified,
    Failed,
}

impl<'a> LoginFlow<'a> {
    pub fn new(client: &'a AuthClient) -> Self {
        Self {
            client,
            state: LoginState::Idle,
        }
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Requests an SMS code. Valid only from `Idle`; on failure the flow
    /// stays there so the user can correct the number.
    pub async fn request_code(&mut self, phone: &str) -> Result<(), AuthError> {
        if !matches!(self.state, LoginState::Idle) {
            return Err(AuthError::Expired);
        }
        let challenge = self.client.request_code(phone).await?;
        self.state = LoginState::CodeRequested(challenge);
        Ok(())
    }

    /// Verifies the code for the outstanding challenge.
    ///
    /// A wrong code keeps the challenge open for another try; any other
    /// failure ends the attempt.
    pub async fn verify(&mut self, code: &str) -> Result<Session, AuthError> {
        let challenge = match &self.state {
            LoginState::CodeRequested(challenge) => challenge.clone(),
            _ => return Err(AuthError::Expired),
        };

        match self.client.verify_code(&challenge, code).await {
            Ok(session) => {
                self.state = LoginState::Verified;
                Ok(session)
            }
            Err(err @ AuthError::InvalidCode) => Err(err),
            Err(err) => {
                self.state = LoginState::Failed;
                Err(err)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SmsStartRequest<'a> {
    phone_number: &'a str,
}

#[derive(Debug, Deserialize)]
struct SmsStartResponse {
    challenge_id: String,
}

#[derive(Debug, Serialize)]
struct SmsVerifyRequest<'a> {
    challenge_id: &'a str,
    phone_number: &'a str,
    verification_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| now + chrono::Duration::seconds(secs as i64))
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct GraphQlResponse<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OrganizationsData {
    viewer: Option<Viewer>,
}

#[derive(Debug, Deserialize)]
struct Viewer {
    #[serde(default)]
    memberships: Vec<RawMembership>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMembership {
    name: String,
    slug: String,
    #[serde(default)]
    vibbo_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct OrganizationData {
    organization: Option<RawOrganization>,
}

#[derive(Debug, Deserialize)]
struct RawOrganization {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_adds_country_prefix() {
        assert_eq!(normalize_phone("41234567").unwrap(), "+4741234567");
        assert_eq!(normalize_phone("412 34 567").unwrap(), "+4741234567");
    }

    #[test]
    fn test_normalize_phone_keeps_existing_prefix() {
        assert_eq!(normalize_phone("+4741234567").unwrap(), "+4741234567");
        assert_eq!(normalize_phone("+46 70 123 45 67").unwrap(), "+46701234567");
    }

    #[test]
    fn test_normalize_phone_rejects_malformed() {
        assert!(matches!(
            normalize_phone(""),
            Err(AuthError::InvalidPhone(_))
        ));
        assert!(matches!(
            normalize_phone("not-a-number"),
            Err(AuthError::InvalidPhone(_))
        ));
        assert!(matches!(
            normalize_phone("+0123456789"),
            Err(AuthError::InvalidPhone(_))
        ));
        // too short after the prefix
        assert!(matches!(
            normalize_phone("+4712"),
            Err(AuthError::InvalidPhone(_))
        ));
    }

    fn offline_client() -> AuthClient {
        let mut config = Config::default();
        // nothing listens here; these tests never reach the network
        config.api.base_url = Some("http://127.0.0.1:9".to_string());
        AuthClient::new(&config)
    }

    #[tokio::test]
    async fn test_login_flow_rejects_verify_before_code() {
        let client = offline_client();
        let mut flow = LoginFlow::new(&client);

        assert!(matches!(flow.state(), LoginState::Idle));
        assert!(matches!(
            flow.verify("123456").await,
            Err(AuthError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_login_flow_invalid_phone_stays_idle() {
        let client = offline_client();
        let mut flow = LoginFlow::new(&client);

        assert!(matches!(
            flow.request_code("bogus").await,
            Err(AuthError::InvalidPhone(_))
        ));
        assert!(matches!(flow.state(), LoginState::Idle));
    }

    #[test]
    fn test_token_response_expiry() {
        let now = Utc::now();
        let with_expiry = TokenResponse {
            token: "t".to_string(),
            expires_in: Some(3600),
        };
        assert_eq!(
            with_expiry.expires_at(now),
            Some(now + chrono::Duration::seconds(3600))
        );

        let without = TokenResponse {
            token: "t".to_string(),
            expires_in: None,
        };
        assert_eq!(without.expires_at(now), None);
    }
}
