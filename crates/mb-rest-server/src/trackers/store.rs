// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::clock::{SharedClock, expiry_after, ttl_from_secs};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Entry<R> {
    record: R,
    expires_at: DateTime<Utc>,
}

/// TTL-bounded map of tracker records keyed by session id.
///
/// Updates run under the write lock so appends from concurrent requests for
/// the same session are never lost.
pub(crate) struct TrackerStore<R> {
    records: RwLock<HashMap<String, Entry<R>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<R: Clone + Send + Sync> TrackerStore<R> {
    pub(crate) fn new(ttl_seconds: u64, clock: SharedClock) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl: ttl_from_secs(ttl_seconds),
            clock,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert or replace the record for `session_id`.
    pub(crate) async fn put(&self, session_id: &str, record: R) {
        let expires_at = expiry_after(self.clock.now(), self.ttl);
        self.records
            .write()
            .await
            .insert(session_id.to_string(), Entry { record, expires_at });
    }

    /// Mutate a live record in place, refreshing its TTL.
    pub(crate) async fn update<T, F>(&self, session_id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut R, DateTime<Utc>) -> T,
    {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        if records.get(session_id)?.expires_at <= now {
            records.remove(session_id);
            return None;
        }
        let entry = records.get_mut(session_id)?;
        entry.expires_at = expiry_after(now, self.ttl);
        Some(f(&mut entry.record, now))
    }

    pub(crate) async fn get(&self, session_id: &str) -> Option<R> {
        let now = self.clock.now();
        self.records
            .read()
            .await
            .get(session_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.record.clone())
    }

    pub(crate) async fn contains(&self, session_id: &str) -> bool {
        self.get(session_id).await.is_some()
    }

    pub(crate) async fn remove(&self, session_id: &str) -> bool {
        self.records.write().await.remove(session_id).is_some()
    }

    pub(crate) async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, entry| entry.expires_at > now);
        before - records.len()
    }
}
