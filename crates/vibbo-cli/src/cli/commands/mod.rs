//! CLI command handlers.

use anyhow::{Result, bail};
use vibbo_core::credentials::SessionStore;

pub mod auth;
pub mod config;
pub mod orgs;
pub mod run;
pub mod status;

/// Resolves the organization slug a command should act on: the explicit
/// `--org` value, or the only configured one.
pub(crate) fn resolve_org(explicit: Option<&str>) -> Result<String> {
    let store = SessionStore::load()?;

    if let Some(slug) = explicit {
        if store.get(slug).is_none() {
            bail!("no session for organization '{slug}'; run `vibbo login`");
        }
        return Ok(slug.to_string());
    }

    match store.slugs().as_slice() {
        [] => bail!("not logged in; run `vibbo login`"),
        [only] => Ok((*only).to_string()),
        slugs => bail!(
            "multiple organizations configured ({}); pass --org <slug>",
            slugs.join(", ")
        ),
    }
}
