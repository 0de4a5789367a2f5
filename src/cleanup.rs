//! Interval-based expiry sweeping.
//!
//! One background task per store instance wakes at a fixed interval, scans
//! the whole bucket, and deletes every record whose expiry is due, in a
//! single transaction. Failures are pushed onto a bounded error channel;
//! while a send is in flight the loop makes no progress, so the consumer
//! must keep draining the channel for as long as the sweeper is active.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bucket::Bucket;
use crate::error::StoreError;

/// Handle to the background sweep task. Dropping it aborts the task;
/// [`Sweeper::join`] waits for a clean exit after shutdown was signalled.
pub(crate) struct Sweeper {
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns the sweep loop. Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        bucket: Bucket,
        every: Duration,
        errors: mpsc::Sender<StoreError>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // A tokio interval fires immediately; skip that tick so the
            // first sweep happens one full interval after construction.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => break,
                    _ = ticker.tick() => match bucket.remove_expired(Utc::now()) {
                        Ok(0) => debug!(bucket = %bucket.name(), "sweep removed nothing"),
                        Ok(deleted) => info!(
                            bucket = %bucket.name(),
                            deleted,
                            remaining = bucket.len().ok(),
                            "expired sessions removed"
                        ),
                        Err(error) => {
                            warn!(bucket = %bucket.name(), %error, "session sweep failed");
                            // Sweeping stalls here until the consumer drains
                            // the channel. Shutdown abandons the send; a
                            // dropped receiver stops the loop for good.
                            tokio::select! {
                                _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => break,
                                sent = errors.send(error) => if sent.is_err() {
                                    break;
                                },
                            }
                        }
                    },
                }
            }

            debug!(bucket = %bucket.name(), "session sweeper stopped");
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Waits for the sweep task to exit. Meaningful only after the shutdown
    /// signal was sent.
    pub(crate) async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
