//! Template Poller (§4.B): one background task per configured parent chain.
//! Every 5 seconds it drives the adapter; when `height` changes it publishes
//! a fresh snapshot and wakes the Job Builder for that algorithm.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use pool_core::ParentSnapshot;
use tokio::sync::{watch, Notify};

use crate::ParentAdapter;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const RESERVE_SIZE: usize = 16;

/// Drives one adapter on a timer, publishing every fetched snapshot (not
/// only tip changes — downstream subscribers decide what "fresh" means) and
/// signalling `job_wake` only when the chain tip actually advances.
pub struct TemplatePoller {
    adapter: Arc<dyn ParentAdapter>,
    snapshot_tx: watch::Sender<Option<ParentSnapshot>>,
    job_wake: Arc<Notify>,
}

impl TemplatePoller {
    pub fn new(adapter: Arc<dyn ParentAdapter>, job_wake: Arc<Notify>) -> (Self, watch::Receiver<Option<ParentSnapshot>>) {
        let (tx, rx) = watch::channel(None);
        (
            TemplatePoller {
                adapter,
                snapshot_tx: tx,
                job_wake,
            },
            rx,
        )
    }

    /// Runs until `running` flips to false (§5 cancellation). On transient
    /// daemon failure the previous snapshot (if any) is left untouched and
    /// the next tick retries (§7).
    pub async fn run(self, running: Arc<std::sync::atomic::AtomicBool>) {
        let mut last_height = None;
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        while running.load(std::sync::atomic::Ordering::Relaxed) {
            interval.tick().await;
            match self.adapter.get_block_template(RESERVE_SIZE).await {
                Ok(snapshot) => {
                    let tip_changed = last_height != Some(snapshot.height);
                    last_height = Some(snapshot.height);
                    let _ = self.snapshot_tx.send(Some(snapshot));
                    if tip_changed {
                        debug!("{}: new tip at height {:?}", self.adapter.algorithm(), last_height);
                        self.job_wake.notify_waiters();
                    }
                }
                Err(e) => {
                    warn!(
                        "{}: template poll failed, falling back to cached snapshot: {e}",
                        self.adapter.algorithm()
                    );
                }
            }
        }
    }
}
