//! Index-backed table accessor over the embedded engine.
//!
//! A [`Bucket`] scopes one shared [`redb::Database`] handle to a pair of
//! tables bound once at construction: the primary table keyed by session ID
//! and a multimap table keyed by user key, which serves as the secondary
//! index. The two are kept in step inside every write transaction, so
//! readers observe either the pre- or post-write state, never a record
//! without its index row.
//!
//! Absence is normalized here: a missing row comes back as `Ok(None)`,
//! `false`, or an empty vec, never as an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable,
    ReadableTableMetadata, TableDefinition,
};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::record::Record;

/// Capability wrapper over the engine restricted to one named bucket.
#[derive(Clone)]
pub(crate) struct Bucket {
    db: Arc<Database>,
    primary: String,
    index: String,
}

impl Bucket {
    /// Binds the bucket to its tables, creating them if needed. Both tables
    /// are created up front in one write transaction so later read
    /// transactions never observe a missing table.
    pub(crate) fn new(db: Arc<Database>, name: &str) -> Result<Self> {
        let bucket = Self {
            primary: name.to_string(),
            index: format!("{name}.user_key"),
            db,
        };

        let txn = bucket.db.begin_write()?;
        {
            let _ = txn.open_table(bucket.primary_def())?;
            let _ = txn.open_multimap_table(bucket.index_def())?;
        }
        txn.commit()?;

        debug!(bucket = %bucket.primary, "bucket tables ready");
        Ok(bucket)
    }

    pub(crate) fn name(&self) -> &str {
        &self.primary
    }

    fn primary_def(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.primary)
    }

    fn index_def(&self) -> MultimapTableDefinition<'_, &'static str, &'static str> {
        MultimapTableDefinition::new(&self.index)
    }

    /// Returns the record with the given ID, or `None` if absent.
    pub(crate) fn get(&self, id: &str) -> Result<Option<Record>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.primary_def())?;
        match table.get(id)? {
            Some(value) => Ok(Some(Record::from_bytes(value.value())?)),
            None => Ok(None),
        }
    }

    /// Returns every record whose user key matches, resolved through the
    /// index. Rows come back in primary-key order, the storage order of
    /// this engine.
    pub(crate) fn find_by_user_key(&self, user_key: &str) -> Result<Vec<Record>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.primary_def())?;
        let index = txn.open_multimap_table(self.index_def())?;

        let mut records = Vec::new();
        for entry in index.get(user_key)? {
            let id = entry?;
            if let Some(value) = table.get(id.value())? {
                records.push(Record::from_bytes(value.value())?);
            }
        }

        Ok(records)
    }

    /// Every record in the bucket, in storage order.
    pub(crate) fn all(&self) -> Result<Vec<Record>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.primary_def())?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(Record::from_bytes(value.value())?);
        }

        Ok(records)
    }

    /// Number of records currently in the bucket.
    pub(crate) fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.primary_def())?;
        Ok(table.len()?)
    }

    /// Inserts the record, failing with [`StoreError::DuplicateId`] if its
    /// ID is already present. The existence probe and the insert share one
    /// write transaction, so two racing inserts with the same ID cannot
    /// both pass the probe; the engine serializes the transactions and the
    /// loser observes the winner's row.
    pub(crate) fn insert_unique(&self, record: &Record) -> Result<()> {
        let payload = record.to_bytes()?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(self.primary_def())?;
            let taken = table.get(record.id.as_str())?.is_some();
            if taken {
                // Dropping the transaction rolls it back; nothing written.
                return Err(StoreError::DuplicateId);
            }

            table.insert(record.id.as_str(), payload.as_slice())?;
            let mut index = txn.open_multimap_table(self.index_def())?;
            index.insert(record.user_key.as_str(), record.id.as_str())?;
        }
        txn.commit()?;

        Ok(())
    }

    /// Deletes the record with the given ID together with its index row.
    /// Reports whether anything was removed; an absent ID is a no-op.
    pub(crate) fn remove(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(self.primary_def())?;
            let user_key = match table.remove(id)? {
                Some(value) => Some(Record::from_bytes(value.value())?.user_key),
                None => None,
            };

            match user_key {
                Some(user_key) => {
                    let mut index = txn.open_multimap_table(self.index_def())?;
                    index.remove(user_key.as_str(), id)?;
                    true
                }
                None => false,
            }
        };
        txn.commit()?;

        Ok(removed)
    }

    /// Deletes every record whose user key matches, except those whose IDs
    /// are listed in `exclude_ids`. The matching rows are read under the
    /// transaction's view and deleted in the same commit-or-rollback unit,
    /// so a partial delete is never visible.
    pub(crate) fn remove_by_user_key(&self, user_key: &str, exclude_ids: &[&str]) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(self.primary_def())?;
            let mut index = txn.open_multimap_table(self.index_def())?;

            let mut ids = Vec::new();
            for entry in index.get(user_key)? {
                let id = entry?;
                if !exclude_ids.contains(&id.value()) {
                    ids.push(id.value().to_string());
                }
            }

            for id in &ids {
                table.remove(id.as_str())?;
                index.remove(user_key, id.as_str())?;
            }
            ids.len()
        };
        txn.commit()?;

        Ok(removed)
    }

    /// Deletes every record whose expiry instant is at or before `now`,
    /// scanning the whole bucket inside one transaction. Returns the number
    /// of rows removed.
    pub(crate) fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(self.primary_def())?;
            let mut index = txn.open_multimap_table(self.index_def())?;

            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (id, value) = entry?;
                let record = Record::from_bytes(value.value())?;
                if record.expires_at <= now {
                    expired.push((id.value().to_string(), record.user_key));
                }
            }

            for (id, user_key) in &expired {
                table.remove(id.as_str())?;
                index.remove(user_key.as_str(), id.as_str())?;
            }
            expired.len()
        };
        txn.commit()?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn stub_record(user_key: &str, id: &str, expires_at: DateTime<Utc>) -> Record {
        Record {
            id: id.to_string(),
            user_key: user_key.to_string(),
            created_at: Utc::now(),
            expires_at,
            current: false,
            ip: Some("127.0.0.1".parse().unwrap()),
            agent: crate::record::AgentRecord {
                os: "gnu/linux".to_string(),
                browser: "firefox".to_string(),
            },
            meta: Default::default(),
        }
    }

    fn test_bucket() -> (Bucket, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path().join("test.redb")).unwrap();
        let bucket = Bucket::new(Arc::new(db), "sessions").unwrap();
        (bucket, dir)
    }

    #[test]
    fn test_insert_and_get() {
        let (bucket, _dir) = test_bucket();

        let record = stub_record("k1", "a1", Utc::now() + Duration::hours(1));
        bucket.insert_unique(&record).unwrap();

        let loaded = bucket.get("a1").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(bucket.len().unwrap(), 1);
    }

    #[test]
    fn test_get_absent() {
        let (bucket, _dir) = test_bucket();
        assert!(bucket.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_leaves_original() {
        let (bucket, _dir) = test_bucket();

        let original = stub_record("k1", "a1", Utc::now() + Duration::hours(1));
        bucket.insert_unique(&original).unwrap();

        let replacement = stub_record("k2", "a1", Utc::now() + Duration::hours(2));
        let err = bucket.insert_unique(&replacement).unwrap_err();
        assert!(err.is_duplicate());

        // The original row and its index entry are untouched.
        assert_eq!(bucket.get("a1").unwrap().unwrap(), original);
        assert_eq!(bucket.find_by_user_key("k1").unwrap().len(), 1);
        assert!(bucket.find_by_user_key("k2").unwrap().is_empty());
    }

    #[test]
    fn test_find_by_user_key_in_storage_order() {
        let (bucket, _dir) = test_bucket();

        for id in ["c3", "a1", "b2"] {
            let record = stub_record("k1", id, Utc::now() + Duration::hours(1));
            bucket.insert_unique(&record).unwrap();
        }
        let other = stub_record("k2", "d4", Utc::now() + Duration::hours(1));
        bucket.insert_unique(&other).unwrap();

        let found = bucket.find_by_user_key("k1").unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a1", "b2", "c3"]);
    }

    #[test]
    fn test_remove() {
        let (bucket, _dir) = test_bucket();

        let record = stub_record("k1", "a1", Utc::now() + Duration::hours(1));
        bucket.insert_unique(&record).unwrap();

        assert!(bucket.remove("a1").unwrap());
        assert!(bucket.get("a1").unwrap().is_none());
        assert!(bucket.find_by_user_key("k1").unwrap().is_empty());

        // Absent ID is a no-op.
        assert!(!bucket.remove("a1").unwrap());
    }

    #[test]
    fn test_remove_by_user_key_with_exclusions() {
        let (bucket, _dir) = test_bucket();

        for (user_key, id) in [("k1", "a"), ("k1", "b"), ("k1", "c"), ("k2", "d")] {
            let record = stub_record(user_key, id, Utc::now() + Duration::hours(1));
            bucket.insert_unique(&record).unwrap();
        }

        let removed = bucket.remove_by_user_key("k1", &["a"]).unwrap();
        assert_eq!(removed, 2);

        let ids: Vec<String> = bucket.all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["a", "d"]);

        // Index rows of deleted records are gone too.
        let remaining: Vec<String> = bucket
            .find_by_user_key("k1")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(remaining, ["a"]);
    }

    #[test]
    fn test_remove_by_user_key_absent_is_noop() {
        let (bucket, _dir) = test_bucket();
        assert_eq!(bucket.remove_by_user_key("nobody", &[]).unwrap(), 0);
    }

    #[test]
    fn test_remove_expired() {
        let (bucket, _dir) = test_bucket();
        let now = Utc::now();

        bucket
            .insert_unique(&stub_record("k1", "a", now - Duration::seconds(1)))
            .unwrap();
        bucket
            .insert_unique(&stub_record("k1", "b", now + Duration::seconds(30)))
            .unwrap();
        bucket
            .insert_unique(&stub_record("k2", "c", now - Duration::seconds(1)))
            .unwrap();

        let removed = bucket.remove_expired(Utc::now()).unwrap();
        assert_eq!(removed, 2);

        let ids: Vec<String> = bucket.all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["b"]);
        assert!(bucket.find_by_user_key("k2").unwrap().is_empty());
    }

    #[test]
    fn test_buckets_are_isolated() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::create(dir.path().join("test.redb")).unwrap());

        let first = Bucket::new(Arc::clone(&db), "first").unwrap();
        let second = Bucket::new(Arc::clone(&db), "second").unwrap();

        first
            .insert_unique(&stub_record("k1", "a1", Utc::now() + Duration::hours(1)))
            .unwrap();

        assert_eq!(first.len().unwrap(), 1);
        assert_eq!(second.len().unwrap(), 0);
        assert!(second.get("a1").unwrap().is_none());
    }
}
