//! Status command handler. Reads only the local store, never the network.

use anyhow::Result;
use chrono::Utc;
use vibbo_core::config::Config;
use vibbo_core::credentials::{SessionStore, mask_token};

pub fn run(config: &Config) -> Result<()> {
    let store = SessionStore::load()?;

    if store.is_empty() {
        println!("Not logged in. Run `vibbo login`.");
        return Ok(());
    }

    for slug in store.slugs() {
        let Some(record) = store.get(slug) else {
            continue;
        };

        let expiry = match record.expires_at {
            None => "unknown (used as-is)".to_string(),
            Some(at) if at <= Utc::now() => format!("expired {at}"),
            Some(at) if at <= Utc::now() + config.refresh_margin() => {
                format!("refresh due ({at})")
            }
            Some(at) => format!("valid until {at}"),
        };

        println!("{slug}:");
        println!("  organization id: {}", record.organization_id);
        println!("  token: {}", mask_token(&record.token));
        println!("  session: {expiry}");
        println!("  memberships: {}", record.organizations.len());
    }
    Ok(())
}
