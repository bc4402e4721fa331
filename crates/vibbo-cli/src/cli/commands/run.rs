//! Run the feed poller and print sensor updates.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vibbo_core::api::FeedClient;
use vibbo_core::auth::AuthClient;
use vibbo_core::config::Config;
use vibbo_core::credentials::SessionStore;
use vibbo_core::error::ErrorKind;
use vibbo_core::feed::{FeedKind, FeedSnapshot};
use vibbo_core::poller::FeedPoller;
use vibbo_core::sensor::SensorState;
use vibbo_core::session::SessionManager;

pub async fn run(config: &Config, org: Option<&str>) -> Result<()> {
    let slug = super::resolve_org(org)?;

    let session = Arc::new(SessionManager::new(
        AuthClient::new(config),
        SessionStore::store_path(),
        slug.clone(),
        config.refresh_margin(),
    ));
    let (poller, handle) = FeedPoller::new(session, FeedClient::new(config), config);

    let shutdown = CancellationToken::new();
    let poller_task = tokio::spawn(poller.run(shutdown.clone()));

    // Blocking stdin reader on its own thread; the select loop below stays
    // free for snapshots and signals.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line_tx.send(line.trim().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut snapshots = handle.subscribe();
    eprintln!(
        "Polling {} every {} minute(s). 'r' refreshes now, 'q' or Ctrl-C quits.",
        slug,
        config.scan_interval().as_secs() / 60
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot);
            }
            line = line_rx.recv() => {
                match line.as_deref() {
                    Some("r") => handle.request_refresh(),
                    Some("q") => break,
                    Some(_) => {}
                    None => {}
                }
            }
        }
    }

    // let any in-flight cycle finish before teardown
    shutdown.cancel();
    poller_task.await.context("join poller task")?;
    Ok(())
}

fn print_snapshot(snapshot: &FeedSnapshot) {
    let state = SensorState::from_snapshot(snapshot);

    println!(
        "[{}] {}",
        snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S"),
        state.value
    );
    for item in &state.items {
        let kind = match item.kind() {
            FeedKind::News => "news",
            FeedKind::Post => "post",
        };
        println!(
            "  {kind}  {}  ({} thumbs up, {} comments)",
            item.title, item.thumbs_up_count, item.comments_count
        );
    }

    if let Some(error) = snapshot.last_error {
        let since = snapshot
            .last_success_at
            .map_or_else(|| "never".to_string(), |at| at.to_string());
        eprintln!("  stale: last cycle failed ({error:?}); showing data from {since}");
        if matches!(error, ErrorKind::Unauthenticated | ErrorKind::RefreshFailed) {
            eprintln!("  session invalid: run `vibbo login` again");
        }
    }
}
