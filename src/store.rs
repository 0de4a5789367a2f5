//! redb-backed implementation of the [`SessionStore`] contract.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use redb::Database;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::bucket::Bucket;
use crate::cleanup::Sweeper;
use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::session::{Session, SessionStore};

/// Session store persisting records in one bucket of a shared redb
/// database.
///
/// Expired records are removed by one of two policies, chosen at
/// construction: a periodic sweep of the whole bucket ([`RedbStore::new`]
/// with a positive interval) or a deferred single-record delete scheduled
/// on every create ([`RedbStore::with_deferred_expiry`]). Under either
/// policy a record may outlive its expiry instant for a short while; that
/// is expected, not an error.
///
/// The database handle is shared: several stores (and other users) may hold
/// clones of the same `Arc<Database>`. The engine serializes writers
/// internally; this store adds no locking beyond single transactions.
pub struct RedbStore {
    bucket: Bucket,
    deferred: bool,
    shutdown: watch::Sender<bool>,
    errors: Option<mpsc::Receiver<StoreError>>,
    sweeper: Option<Sweeper>,
}

impl RedbStore {
    /// Creates a store bound to `bucket`, sweeping expired records every
    /// `cleanup_interval`. An interval of zero disables sweeping entirely;
    /// a negative interval is a construction error, as is an empty bucket
    /// name. Must be called from within a tokio runtime when sweeping is
    /// enabled.
    ///
    /// While the sweeper is active the caller must keep draining the
    /// channel handed out by [`cleanup_errors`], otherwise sweeping stalls
    /// on the first failure.
    ///
    /// [`cleanup_errors`]: RedbStore::cleanup_errors
    pub fn new(db: Arc<Database>, bucket: &str, cleanup_interval: Duration) -> Result<Self> {
        if bucket.is_empty() {
            return Err(StoreError::InvalidBucket);
        }
        if cleanup_interval < Duration::zero() {
            return Err(StoreError::InvalidInterval);
        }

        let bucket = Bucket::new(db, bucket)?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let (errors, sweeper) = if cleanup_interval.is_zero() {
            (None, None)
        } else {
            let every = cleanup_interval
                .to_std()
                .map_err(|_| StoreError::InvalidInterval)?;
            let (errors_tx, errors_rx) = mpsc::channel(1);
            let sweeper = Sweeper::spawn(bucket.clone(), every, errors_tx, shutdown_rx);
            (Some(errors_rx), Some(sweeper))
        };

        Ok(Self {
            bucket,
            deferred: false,
            shutdown,
            errors,
            sweeper,
        })
    }

    /// Creates a store that schedules a delayed single-record delete for
    /// every session it stores, instead of sweeping periodically. The
    /// scheduled task outlives the create call; it is cancelled only by
    /// [`close`] (or by dropping the store) before the expiry fires.
    ///
    /// [`close`]: RedbStore::close
    pub fn with_deferred_expiry(db: Arc<Database>, bucket: &str) -> Result<Self> {
        if bucket.is_empty() {
            return Err(StoreError::InvalidBucket);
        }

        let bucket = Bucket::new(db, bucket)?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            bucket,
            deferred: true,
            shutdown,
            errors: None,
            sweeper: None,
        })
    }

    /// Hands out the sweep error channel. Yields `Some` exactly once, and
    /// only when interval sweeping is active. Dropping the receiver stops
    /// error reporting and, with it, the sweeper.
    pub fn cleanup_errors(&mut self) -> Option<mpsc::Receiver<StoreError>> {
        self.errors.take()
    }

    /// Stops the sweeper and any pending deferred deletes, then waits for
    /// the sweep task to exit, which closes the error channel. Idempotent.
    /// The underlying database stays open; CRUD calls keep working.
    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.join().await;
        }
    }

    /// Number of records currently stored, expired ones included.
    pub fn session_count(&self) -> Result<u64> {
        self.bucket.len()
    }

    /// Every stored session in storage order, expired ones included.
    /// A maintenance helper; the [`SessionStore`] contract does not use it.
    pub fn all_sessions(&self) -> Result<Vec<Session>> {
        let records = self.bucket.all()?;
        Ok(records.into_iter().map(Session::from).collect())
    }

    fn schedule_deferred_delete(&self, id: String, expires_at: chrono::DateTime<Utc>) {
        let bucket = self.bucket.clone();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let wait = (expires_at - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {
                    debug!(%id, "deferred delete cancelled");
                }
                _ = tokio::time::sleep(wait) => {
                    // Racing with an explicit delete or a sweep is fine;
                    // removing an absent record is a no-op.
                    match bucket.remove(&id) {
                        Ok(_) => debug!(%id, "session expired"),
                        Err(error) => warn!(%id, %error, "deferred delete failed"),
                    }
                }
            }
        });
    }
}

impl Drop for RedbStore {
    fn drop(&mut self) {
        // Stops pending deferred deletes; the sweeper task is aborted by
        // its own handle.
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl SessionStore for RedbStore {
    async fn create(&self, session: &Session) -> Result<()> {
        let record = Record::from(session);
        self.bucket.insert_unique(&record)?;
        debug!(id = %record.id, user_key = %record.user_key, "session stored");

        if self.deferred {
            self.schedule_deferred_delete(record.id, record.expires_at);
        }

        Ok(())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.bucket.get(id)?.map(Session::from))
    }

    async fn fetch_by_user_key(&self, user_key: &str) -> Result<Vec<Session>> {
        let records = self.bucket.find_by_user_key(user_key)?;
        Ok(records.into_iter().map(Session::from).collect())
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let removed = self.bucket.remove(id)?;
        if removed {
            debug!(%id, "session deleted");
        }
        Ok(())
    }

    async fn delete_by_user_key(&self, user_key: &str, exclude_ids: &[&str]) -> Result<()> {
        let removed = self.bucket.remove_by_user_key(user_key, exclude_ids)?;
        if removed > 0 {
            debug!(%user_key, removed, "user sessions deleted");
        }
        Ok(())
    }
}
