//! redb-backed session store.
//!
//! Persists user sessions in one named bucket of an embedded [`redb`]
//! database and exposes the small CRUD-plus-expiry contract of
//! [`SessionStore`]: create with duplicate-ID detection, fetch by session
//! ID or by user key, delete by ID or in bulk per user key, and automatic
//! removal of expired records.
//!
//! Expiry is handled by one of two policies picked at construction:
//! a periodic sweep of the whole bucket at a fixed interval, or a deferred
//! per-record delete scheduled when the session is created. Sweep failures
//! surface on a bounded error channel which the caller must keep draining
//! while the sweeper is active; an undrained channel pauses sweeping after
//! the first failure.
//!
//! Several stores may share one `Arc<Database>` handle under different
//! bucket names; the engine serializes writers internally.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chrono::Duration;
//! use redbstore::{RedbStore, Session, SessionStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(redbstore::redb::Database::create("sessions.redb")?);
//! let mut store = RedbStore::new(db, "sessions", Duration::minutes(5))?;
//!
//! // Drain sweep failures for as long as the sweeper is active.
//! let mut errors = store.cleanup_errors().expect("sweeping is enabled");
//! tokio::spawn(async move {
//!     while let Some(error) = errors.recv().await {
//!         eprintln!("session cleanup: {error}");
//!     }
//! });
//!
//! let session = Session::new("11d4e160", "user-1", Duration::hours(2))
//!     .with_ip("127.0.0.1".parse()?)
//!     .with_agent("gnu/linux", "firefox");
//! store.create(&session).await?;
//!
//! let fetched = store.fetch_by_id("11d4e160").await?;
//! assert!(fetched.is_some());
//!
//! store.close().await;
//! # Ok(())
//! # }
//! ```

mod bucket;
mod cleanup;
mod error;
mod record;
mod session;
mod store;

pub use error::{Result, StoreError};
pub use session::{Agent, Session, SessionStore};
pub use store::RedbStore;

// The engine is part of the public constructor surface; re-export it so
// callers do not need to pin a matching redb version themselves.
pub use redb;
