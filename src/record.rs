//! Persisted mirror of a [`Session`].
//!
//! A [`Record`] copies every session field verbatim and owns the storage
//! encoding (JSON). It carries no derived fields and performs no
//! validation; decoding an encoded session always yields the original.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{Agent, Session};

/// Storage-shaped counterpart of a [`Session`]. `id` is the primary key,
/// `user_key` the secondary index key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub id: String,
    pub user_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    pub agent: AgentRecord,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AgentRecord {
    pub os: String,
    pub browser: String,
}

impl Record {
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<&Session> for Record {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            user_key: session.user_key.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            current: session.current,
            ip: session.ip,
            agent: AgentRecord {
                os: session.agent.os.clone(),
                browser: session.agent.browser.clone(),
            },
            meta: session.meta.clone(),
        }
    }
}

impl From<Record> for Session {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            user_key: record.user_key,
            created_at: record.created_at,
            expires_at: record.expires_at,
            current: record.current,
            ip: record.ip,
            agent: Agent {
                os: record.agent.os,
                browser: record.agent.browser,
            },
            meta: record.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stub_session() -> Session {
        Session::new("11d4e160", "user-1", Duration::hours(2))
            .with_ip("127.0.0.1".parse().unwrap())
            .with_agent("gnu/linux", "firefox")
            .with_meta("locale", "lt")
    }

    #[test]
    fn test_round_trip() {
        let session = stub_session();
        let record = Record::from(&session);
        let back = Session::from(record);
        assert_eq!(session, back);
    }

    #[test]
    fn test_round_trip_minimal() {
        // No IP, no meta, default agent.
        let session = Session::new("a1", "k1", Duration::minutes(5));
        let record = Record::from(&session);
        let back = Session::from(record);
        assert_eq!(session, back);
    }

    #[test]
    fn test_bytes_round_trip() {
        let record = Record::from(&stub_session());
        let bytes = record.to_bytes().unwrap();
        let back = Record::from_bytes(&bytes).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_encoded_field_names() {
        let record = Record::from(&stub_session());
        let json = String::from_utf8(record.to_bytes().unwrap()).unwrap();

        assert!(json.contains("\"id\""));
        assert!(json.contains("\"user_key\""));
        assert!(json.contains("\"created_at\""));
        assert!(json.contains("\"expires_at\""));
        assert!(json.contains("\"ip\""));
        assert!(json.contains("\"os\""));
        assert!(json.contains("\"browser\""));
        assert!(json.contains("\"meta\""));
    }

    #[test]
    fn test_optional_fields_skipped() {
        let record = Record::from(&Session::new("a1", "k1", Duration::minutes(5)));
        let json = String::from_utf8(record.to_bytes().unwrap()).unwrap();

        assert!(!json.contains("\"ip\""));
        assert!(!json.contains("\"meta\""));
    }

    #[test]
    fn test_decodes_record_without_optional_fields() {
        // Records written before the `current` and `meta` fields existed.
        let json = r#"{
            "id": "a1",
            "user_key": "k1",
            "created_at": "2026-02-15T10:30:00Z",
            "expires_at": "2026-02-15T12:30:00Z",
            "agent": {"os": "gnu/linux", "browser": "firefox"}
        }"#;

        let record = Record::from_bytes(json.as_bytes()).unwrap();
        assert!(!record.current);
        assert!(record.ip.is_none());
        assert!(record.meta.is_empty());
    }

    #[test]
    fn test_corrupt_bytes_fail() {
        assert!(Record::from_bytes(b"not a record").is_err());
    }
}
