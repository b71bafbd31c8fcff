// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test session storage
//!
//! A test session binds an opaque id to the scenario a test run is exercising.
//! Records expire lazily: once `expires_at` is reached the record is treated as
//! absent and removed by the next access. A background purge may also reclaim
//! them, but callers never depend on it.
//!
//! Every mutation runs as one read-modify-write under the store's write lock,
//! so concurrent requests for the same session cannot lose updates.

use crate::clock::{SharedClock, SystemClock, expiry_after, ttl_from_secs};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Prefix that marks an id as a test session id.
pub const SESSION_ID_PREFIX: &str = "maestro_session_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    pub session_id: String,
    pub scenario: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub state: SessionState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub request_count: u64,
    pub last_request_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom_data: Map<String, Value>,
}

impl TestSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Session persistence used by the control API and the interception pipeline.
///
/// Absence is always reported through `Option`/`bool`; no operation fails
/// because a session is missing or expired.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, scenario: &str, metadata: Map<String, Value>) -> TestSession;

    async fn get(&self, session_id: &str) -> Option<TestSession>;

    /// Replace the scenario without extending the expiry.
    async fn switch_scenario(&self, session_id: &str, scenario: &str) -> Option<TestSession>;

    async fn increment_request_count(&self, session_id: &str);

    /// Merge `data` into `state.custom_data`.
    async fn update_session_data(
        &self,
        session_id: &str,
        data: Map<String, Value>,
    ) -> Option<TestSession>;

    /// True only when a live record existed and was removed.
    async fn destroy(&self, session_id: &str) -> bool;

    /// Live sessions, oldest first.
    async fn list_all(&self) -> Vec<TestSession>;

    /// Remove every expired record, returning how many were dropped.
    async fn purge_expired(&self) -> usize;
}

/// Process-local session store
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, TestSession>>,
    ttl: Duration,
    clock: SharedClock,
}

impl InMemorySessionStore {
    pub fn new(ttl_seconds: u64, clock: SharedClock) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: ttl_from_secs(ttl_seconds),
            clock,
        }
    }

    pub fn with_ttl(ttl_seconds: u64) -> Self {
        Self::new(ttl_seconds, Arc::new(SystemClock))
    }

    fn generate_id() -> String {
        format!("{}{}", SESSION_ID_PREFIX, Uuid::new_v4())
    }

    /// Apply `f` to a live session, dropping the record instead if it expired.
    async fn modify<F>(&self, session_id: &str, f: F) -> Option<TestSession>
    where
        F: FnOnce(&mut TestSession, DateTime<Utc>),
    {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let expired = sessions.get(session_id)?.is_expired_at(now);
        if expired {
            sessions.remove(session_id);
            debug!(session_id, "Dropped expired test session");
            return None;
        }
        let session = sessions.get_mut(session_id)?;
        f(session, now);
        Some(session.clone())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, scenario: &str, metadata: Map<String, Value>) -> TestSession {
        let now = self.clock.now();
        let session = TestSession {
            session_id: Self::generate_id(),
            scenario: scenario.to_string(),
            created_at: now,
            expires_at: expiry_after(now, self.ttl),
            metadata,
            state: SessionState::default(),
        };
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        debug!(session_id = %session.session_id, scenario, "Created test session");
        session
    }

    async fn get(&self, session_id: &str) -> Option<TestSession> {
        let now = self.clock.now();
        {
            let sessions = self.sessions.read().await;
            let session = sessions.get(session_id)?;
            if !session.is_expired_at(now) {
                return Some(session.clone());
            }
        }
        // Expired: take the write lock to drop it.
        self.modify(session_id, |_, _| {}).await
    }

    async fn switch_scenario(&self, session_id: &str, scenario: &str) -> Option<TestSession> {
        self.modify(session_id, |session, now| {
            session.scenario = scenario.to_string();
            session.state.last_request_at = Some(now);
        })
        .await
    }

    async fn increment_request_count(&self, session_id: &str) {
        self.modify(session_id, |session, now| {
            session.state.request_count += 1;
            session.state.last_request_at = Some(now);
        })
        .await;
    }

    async fn update_session_data(
        &self,
        session_id: &str,
        data: Map<String, Value>,
    ) -> Option<TestSession> {
        self.modify(session_id, |session, _| {
            session.state.custom_data.extend(data);
        })
        .await
    }

    async fn destroy(&self, session_id: &str) -> bool {
        let now = self.clock.now();
        match self.sessions.write().await.remove(session_id) {
            Some(session) => !session.is_expired_at(now),
            None => false,
        }
    }

    async fn list_all(&self) -> Vec<TestSession> {
        let now = self.clock.now();
        let mut live: Vec<TestSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired_at(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        live
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        before - sessions.len()
    }
}
