//! Caller-facing session entity and the persistence contract.
//!
//! [`Session`] is the shape the session-management layer works with; the
//! store keeps its own persisted mirror of it (see `record`). Business
//! concerns such as authentication and cookie issuance live with the caller,
//! not here.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;

/// A user session as seen by the caller.
///
/// `id` is unique across the store; `user_key` groups every session that
/// belongs to one principal and may repeat. Timestamp equality is by
/// instant, not by representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Unique ID used to find this session in the store.
    pub id: String,

    /// Non-unique key shared by all sessions of the same user.
    pub user_key: String,

    /// Point in time when this session was created.
    pub created_at: DateTime<Utc>,

    /// Point in time when this session becomes invalid and may be
    /// deleted from the store.
    pub expires_at: DateTime<Utc>,

    /// Whether this session's ID matches the one in the active request.
    pub current: bool,

    /// IP address the session was created from, when captured.
    pub ip: Option<IpAddr>,

    /// User-Agent data the session was created with.
    pub agent: Agent,

    /// Free-form metadata attached by the caller. Empty when unused.
    pub meta: HashMap<String, String>,
}

/// User-Agent data carried by a [`Session`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Agent {
    pub os: String,
    pub browser: String,
}

impl Session {
    /// Creates a session expiring `lifetime` from now.
    pub fn new(id: impl Into<String>, user_key: impl Into<String>, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_key: user_key.into(),
            created_at: now,
            expires_at: now + lifetime,
            current: false,
            ip: None,
            agent: Agent::default(),
            meta: HashMap::new(),
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_agent(mut self, os: impl Into<String>, browser: impl Into<String>) -> Self {
        self.agent = Agent {
            os: os.into(),
            browser: browser.into(),
        };
        self
    }

    /// Attaches one metadata pair.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Whether the session's expiry instant has passed. An expired session
    /// may still be present in the store until the next sweep removes it.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// The CRUD-plus-expiry contract a session-management library consumes.
///
/// Absence is never an error: fetching a missing ID yields `Ok(None)`,
/// fetching an unknown user key yields an empty vec, and deleting what is
/// not there is a no-op. The only expected failure is [`DuplicateId`] from
/// [`create`]; anything else is an engine fault surfaced verbatim.
///
/// [`DuplicateId`]: crate::StoreError::DuplicateId
/// [`create`]: SessionStore::create
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session. Fails with [`DuplicateId`] if a session with
    /// the same ID already exists; nothing is written or modified then.
    ///
    /// [`DuplicateId`]: crate::StoreError::DuplicateId
    async fn create(&self, session: &Session) -> Result<()>;

    /// Returns the session with the given ID, or `None` if absent.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Returns every session with the given user key in storage order,
    /// or an empty vec if none match.
    async fn fetch_by_user_key(&self, user_key: &str) -> Result<Vec<Session>>;

    /// Deletes the session with the given ID. No-op if absent.
    async fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Deletes every session with the given user key except those whose
    /// IDs are listed in `exclude_ids`, all in one transaction. No-op if
    /// none match.
    async fn delete_by_user_key(&self, user_key: &str, exclude_ids: &[&str]) -> Result<()>;
}
