//! Config command handlers.

use anyhow::{Context, Result};
use vibbo_core::config::{Config, paths};

pub fn path() -> Result<()> {
    println!("{}", paths::config_path().display());
    Ok(())
}

pub fn init() -> Result<()> {
    let config_path = paths::config_path();
    Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn set_interval(minutes: u64) -> Result<()> {
    Config::save_scan_interval(minutes).context("save scan interval")?;
    println!("Scan interval set to {minutes} minutes.");
    Ok(())
}
