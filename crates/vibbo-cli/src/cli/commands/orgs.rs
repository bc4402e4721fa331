//! Organization listing command handlers.

use anyhow::{Context, Result, bail};
use vibbo_core::auth::AuthClient;
use vibbo_core::config::Config;
use vibbo_core::credentials::SessionStore;

pub async fn run(config: &Config, refresh: bool, org: Option<&str>) -> Result<()> {
    let slug = super::resolve_org(org)?;
    let mut store = SessionStore::load()?;
    let Some(record) = store.get(&slug).cloned() else {
        bail!("no session for organization '{slug}'");
    };

    let organizations = if refresh {
        let client = AuthClient::new(config);
        let discovered = client
            .discover_organizations(&record.token)
            .await
            .context("discover organizations")?;

        let mut updated = record;
        updated.organizations = discovered.clone();
        store.set(updated);
        store.save()?;
        discovered
    } else {
        record.organizations
    };

    if organizations.is_empty() {
        println!("No organizations discovered. Try `vibbo orgs --refresh`.");
        return Ok(());
    }

    for org in &organizations {
        let marker = if org.slug == slug { "*" } else { " " };
        println!("{marker} {} ({})", org.display_name, org.slug);
    }
    Ok(())
}
