//! Scheduled feed polling and snapshot publication.
//!
//! One poller per configured organization. A cycle is `Idle -> Fetching ->
//! Success | Failed -> Idle`; at most one cycle runs at a time, and refresh
//! requests arriving mid-cycle are satisfied by the in-flight result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{FeedClient, RawFeedPayload};
use crate::config::Config;
use crate::error::FetchError;
use crate::feed::{self, FeedSnapshot};
use crate::retry::RetryPolicy;
use crate::session::SessionManager;

/// Handle for consumers: observe snapshots, trigger on-demand refreshes.
#[derive(Clone)]
pub struct PollerHandle {
    refresh_tx: mpsc::Sender<()>,
    snapshot_rx: watch::Receiver<FeedSnapshot>,
}

impl PollerHandle {
    /// Requests a refresh now.
    ///
    /// If a cycle is already in flight (or a request is already pending) the
    /// call coalesces into it; it is never queued behind it.
    pub fn request_refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that wakes on every newly published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot_rx.clone()
    }
}

/// Drives fetch + normalize cycles on an interval and on demand.
pub struct FeedPoller {
    session: Arc<SessionManager>,
    client: FeedClient,
    policy: RetryPolicy,
    interval: Duration,
    snapshot_tx: watch::Sender<FeedSnapshot>,
    refresh_rx: mpsc::Receiver<()>,
}

impl FeedPoller {
    pub fn new(
        session: Arc<SessionManager>,
        client: FeedClient,
        config: &Config,
    ) -> (Self, PollerHandle) {
        let (snapshot_tx, snapshot_rx) = watch::channel(FeedSnapshot::empty(session.org_slug()));
        let (refresh_tx, refresh_rx) = mpsc::channel(1);

        let poller = Self {
            session,
            client,
            policy: RetryPolicy::from_config(&config.retry),
            interval: config.scan_interval(),
            snapshot_tx,
            refresh_rx,
        };
        let handle = PollerHandle {
            refresh_tx,
            snapshot_rx,
        };
        (poller, handle)
    }

    /// Runs until `shutdown` is cancelled or every handle is dropped.
    ///
    /// The first cycle starts immediately. An in-flight cycle always finishes
    /// before teardown so the session store is never left half-written.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            org = %self.session.org_slug(),
            interval_secs = self.interval.as_secs(),
            "feed poller started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                request = self.refresh_rx.recv() => {
                    if request.is_none() {
                        break;
                    }
                    debug!(org = %self.session.org_slug(), "on-demand refresh requested");
                }
            }

            self.run_cycle().await;

            // Requests that arrived while the cycle was fetching are
            // satisfied by the snapshot it just published.
            while self.refresh_rx.try_recv().is_ok() {}
        }

        info!(org = %self.session.org_slug(), "feed poller stopped");
    }

    /// One full cycle. On success the published snapshot is replaced; on
    /// failure the previous items are retained and only the error/timestamp
    /// fields move.
    async fn run_cycle(&mut self) {
        let result = self.fetch_with_recovery().await;
        let now = Utc::now();

        match result {
            Ok(payload) => {
                let items = feed::normalize(payload);
                debug!(
                    org = %self.session.org_slug(),
                    items = items.len(),
                    "cycle succeeded"
                );
                let _ = self.snapshot_tx.send(FeedSnapshot {
                    items,
                    org_slug: self.session.org_slug().to_string(),
                    fetched_at: now,
                    last_success_at: Some(now),
                    last_error: None,
                });
            }
            Err(err) => {
                if err.requires_relogin() {
                    error!(
                        org = %self.session.org_slug(),
                        error = %err,
                        "cycle failed: session invalid, re-login required"
                    );
                } else {
                    warn!(
                        org = %self.session.org_slug(),
                        error = %err,
                        "cycle failed, keeping previous snapshot"
                    );
                }

                let mut snapshot = self.snapshot_tx.borrow().clone();
                snapshot.fetched_at = now;
                snapshot.last_error = Some(err.kind());
                let _ = self.snapshot_tx.send(snapshot);
            }
        }
    }

    /// One fetch with the recovery rules of a single cycle: exactly one
    /// re-authorization on `Unauthorized`, bounded backoff for transient
    /// failures, nothing that outlives the cycle.
    async fn fetch_with_recovery(&self) -> Result<RawFeedPayload, FetchError> {
        let mut ctx = self.session.authorized_context().await?;
        let mut reauthorized = false;
        let mut attempt: u32 = 1;

        loop {
            match self.client.fetch(&ctx).await {
                Ok(payload) => return Ok(payload),
                Err(FetchError::Unauthorized) if !reauthorized => {
                    debug!(org = %ctx.org_slug, "token rejected, re-authorizing once");
                    reauthorized = true;
                    ctx = self.session.reauthorize().await?;
                }
                Err(err)
                    if self.policy.is_retryable(&err) && attempt < self.policy.max_attempts =>
                {
                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
