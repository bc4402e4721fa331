//! Authenticated GraphQL transport for the community portal feed.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::Config;
use crate::error::FetchError;
use crate::session::AuthContext;

/// Default base URL for the community portal.
pub const DEFAULT_BASE_URL: &str = "https://vibbo.no";

const USER_AGENT: &str = concat!("vibbo-bridge/", env!("CARGO_PKG_VERSION"));

const ACTIVITY_QUERY: &str = "query vibboActivityStream(
  $organizationId: OrganizationID!
  $limit: Int
  $filter: OrganizationActivityFilter
) {
  stream: activityInOrganization(
    organizationId: $organizationId
    limit: $limit
    filter: $filter
  ) {
    items {
      happenedAt
      item {
        __typename
        ... on News {
          slug
          title
          ingress
          pinned
          topics {
            title
          }
          commentsCount
          thumbsUpCount: reactionCount(type: THUMBS_UP)
        }
        ... on Post {
          slug
          title
          body
          category {
            label
          }
          updatedBy {
            firstName
          }
          commentsCount
          thumbsUpCount: reactionCount(type: THUMBS_UP)
        }
      }
    }
  }
}";

/// Resolves the portal base URL.
///
/// Resolution order:
/// 1. `VIBBO_BASE_URL` env var (if set and non-empty)
/// 2. `api.base_url` from config (if set and non-empty)
/// 3. Default: `https://vibbo.no`
pub fn resolve_base_url(config: &Config) -> String {
    if let Ok(url) = std::env::var("VIBBO_BASE_URL")
        && !url.trim().is_empty()
    {
        return url.trim().trim_end_matches('/').to_string();
    }

    config
        .api
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Panics when a test would hit the production portal.
///
/// # Panics
/// - In test builds (`#[cfg(test)]`), panics if `base_url` is the production
///   portal.
/// - At runtime, panics if `VIBBO_BLOCK_REAL_API=1` and `base_url` is the
///   production portal.
///
/// This prevents tests from accidentally making real network requests.
/// Use `VIBBO_BASE_URL` env var or config to point to a mock server.
pub(crate) fn guard_production_url(base_url: &str) {
    // Compile-time guard for unit tests
    #[cfg(test)]
    if base_url == DEFAULT_BASE_URL {
        panic!(
            "Tests must not use the production portal!\n\
             Set VIBBO_BASE_URL to a mock server (e.g., wiremock).\n\
             Found base_url: {base_url}"
        );
    }

    // Runtime guard for integration tests (set VIBBO_BLOCK_REAL_API=1 in test harness)
    #[cfg(not(test))]
    if std::env::var("VIBBO_BLOCK_REAL_API").is_ok_and(|v| v == "1") && base_url == DEFAULT_BASE_URL
    {
        panic!(
            "VIBBO_BLOCK_REAL_API=1 but trying to use the production portal!\n\
             Set VIBBO_BASE_URL to a mock server.\n\
             Found base_url: {base_url}"
        );
    }
}

/// Client for the organization-scoped activity feed.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    limit: u32,
}

impl FeedClient {
    /// Creates a feed client from config.
    pub fn new(config: &Config) -> Self {
        let base_url = resolve_base_url(config);
        guard_production_url(&base_url);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url,
            api_version: config.api.version.clone(),
            limit: config.feed.limit,
        }
    }

    /// Issues one activity-stream query for the context's organization.
    ///
    /// This is a single attempt; re-authorization and backoff live in the
    /// poll scheduler.
    pub async fn fetch(&self, ctx: &AuthContext) -> Result<RawFeedPayload, FetchError> {
        let response = self
            .http
            .post(format!("{}/graphql?name=vibboActivityStream", self.base_url))
            .bearer_auth(&ctx.token)
            .header("x-version", &self.api_version)
            .json(&json!({
                "operationName": "vibboActivityStream",
                "variables": {
                    "organizationId": ctx.org_id,
                    "limit": self.limit,
                    "filter": "ALL",
                },
                "query": ACTIVITY_QUERY,
            }))
            .send()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized,
                StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
                _ => FetchError::Network(format!("feed request failed with status {status}")),
            });
        }

        let envelope: FeedEnvelope = response
            .json()
            .await
            .map_err(|err| FetchError::MalformedResponse(err.to_string()))?;

        if let Some(error) = envelope.errors.first() {
            return Err(FetchError::MalformedResponse(error.message.clone()));
        }

        let payload = envelope
            .data
            .and_then(|data| data.stream)
            .ok_or_else(|| FetchError::MalformedResponse("missing stream in response".to_string()))?;

        debug!(
            org = %ctx.org_slug,
            items = payload.items.len(),
            "fetched activity stream"
        );
        Ok(payload)
    }
}

/// Raw activity stream as returned by the portal.
#[derive(Debug, Default, Deserialize)]
pub struct RawFeedPayload {
    #[serde(default)]
    pub items: Vec<RawStreamItem>,
}

/// One stream entry: a timestamp plus a type-tagged item.
///
/// The item is kept as raw JSON here so one malformed entry never fails the
/// whole payload; the normalizer discriminates per entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStreamItem {
    #[serde(default)]
    pub happened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub item: Option<Value>,
}

/// Closed union of known item types, discriminated by `__typename`.
#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
pub enum RawItem {
    News(RawNews),
    Post(RawPost),
    /// Forward-compatible fallback for item types this version doesn't know.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNews {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ingress: Option<String>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub topics: Vec<RawTopic>,
    #[serde(default)]
    pub comments_count: Option<u32>,
    #[serde(default)]
    pub thumbs_up_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub category: Option<RawCategory>,
    #[serde(default)]
    pub updated_by: Option<RawAuthor>,
    #[serde(default)]
    pub comments_count: Option<u32>,
    #[serde(default)]
    pub thumbs_up_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RawTopic {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCategory {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAuthor {
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    #[serde(default)]
    data: Option<FeedData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    stream: Option<RawFeedPayload>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}
