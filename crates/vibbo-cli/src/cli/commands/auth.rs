//! Login/logout command handlers.

use anyhow::{Context, Result, bail};
use vibbo_core::auth::{AuthClient, LoginFlow};
use vibbo_core::config::Config;
use vibbo_core::credentials::{OrgRef, SessionRecord, SessionStore};
use vibbo_core::error::AuthError;

/// Interactive onboarding: phone, SMS code, organization pick, persist.
pub async fn login(config: &Config) -> Result<()> {
    let client = AuthClient::new(config);
    let mut flow = LoginFlow::new(&client);

    let phone = prompt("Phone number (bare numbers get +47): ")?;
    flow.request_code(&phone).await.context("request SMS code")?;
    println!("SMS code sent.");

    let session = loop {
        let code = prompt("Verification code: ")?;
        match flow.verify(&code).await {
            Ok(session) => break session,
            Err(AuthError::InvalidCode) => eprintln!("Code rejected, try again."),
            Err(err) => return Err(err).context("verify SMS code"),
        }
    };

    if session.organizations.is_empty() {
        bail!(
            "login succeeded but organization discovery returned nothing; \
             wait a moment and run login again"
        );
    }

    let membership = select_membership(&session.organizations)?;

    let org_id = client
        .organization_id(&session.token, &membership.slug)
        .await
        .context("resolve organization id")?;

    let mut store = SessionStore::load()?;
    store.set(SessionRecord {
        token: session.token,
        expires_at: session.expires_at,
        organization_id: org_id,
        organization_slug: membership.slug.clone(),
        organizations: session.organizations,
    });
    store.save()?;

    println!(
        "Logged in to {} ({}).",
        membership.display_name, membership.slug
    );
    Ok(())
}

pub fn logout(org: Option<&str>) -> Result<()> {
    let mut store = SessionStore::load()?;

    match org {
        Some(slug) => {
            if store.remove(slug).is_some() {
                store.save()?;
                println!("Logged out of {slug}.");
            } else {
                println!("No session for {slug}.");
            }
        }
        None => {
            if store.is_empty() {
                println!("No stored sessions.");
                return Ok(());
            }
            let slugs: Vec<String> = store.slugs().iter().map(ToString::to_string).collect();
            for slug in &slugs {
                store.remove(slug);
            }
            store.save()?;
            println!("Logged out of {}.", slugs.join(", "));
        }
    }
    Ok(())
}

/// A single membership is selected automatically; otherwise the user picks.
fn select_membership(organizations: &[OrgRef]) -> Result<OrgRef> {
    if organizations.len() == 1 {
        return Ok(organizations[0].clone());
    }

    println!("Organizations:");
    for (idx, org) in organizations.iter().enumerate() {
        println!("  {}. {} ({})", idx + 1, org.display_name, org.slug);
    }

    loop {
        let input = prompt("Select organization [number]: ")?;
        if let Ok(choice) = input.parse::<usize>()
            && (1..=organizations.len()).contains(&choice)
        {
            return Ok(organizations[choice - 1].clone());
        }
        eprintln!("Enter a number between 1 and {}.", organizations.len());
    }
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    print!("{label}");
    std::io::stdout().flush().context("flush stdout")?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("read stdin")?;
    Ok(input.trim().to_string())
}
