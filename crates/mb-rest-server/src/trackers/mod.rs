// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-session accumulators that turn observed client requests into
//! pass/fail oracles for scenario tests.
//!
//! Each tracker keeps one record per session id with its own TTL, refreshed
//! on every write and independent of the session TTL. Track calls never
//! create a record: a session must be initialized first so "never tracked"
//! stays distinguishable from "tracked nothing".

mod camera;
mod remove_listing;
mod rotation;
mod store;

pub use camera::{CameraPerformanceTracker, UploadMediaItem};
pub use remove_listing::{RemovalAction, RemovedListing, RemovedMedia, RemoveListingTracker};
pub use rotation::{MediaChanges, RotationTracker};

use crate::clock::SharedClock;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// The tracker families known to the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackerKind {
    CameraPerformance,
    Rotation,
    RemoveListing,
}

impl TrackerKind {
    /// Scenario a session must be on to use this tracker's endpoints.
    pub fn scenario(self) -> &'static str {
        match self {
            TrackerKind::CameraPerformance => "camera-performance-test",
            TrackerKind::Rotation => "rotation-test",
            TrackerKind::RemoveListing => "remove-listing-test",
        }
    }

    /// Message returned when a session has no record.
    pub fn no_data_message(self) -> &'static str {
        match self {
            TrackerKind::CameraPerformance => {
                "No upload or changes requests have been tracked for this session"
            }
            TrackerKind::Rotation => "No media changes have been tracked for this session",
            TrackerKind::RemoveListing => {
                "No listing removals have been tracked for this session"
            }
        }
    }
}

/// Analysis plus the condensed view the control API puts next to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerReport {
    pub data: Value,
    pub summary: Value,
}

/// Operations shared by every tracker, used by the control API.
#[async_trait]
pub trait Tracker: Send + Sync {
    fn kind(&self) -> TrackerKind;

    /// Create or reset the record with empty accumulators.
    async fn initialize(&self, session_id: &str);

    async fn clear_session(&self, session_id: &str);

    async fn session_exists(&self, session_id: &str) -> bool;

    /// `None` when the session has no record.
    async fn report(&self, session_id: &str) -> Option<TrackerReport>;

    async fn purge_expired(&self) -> usize;
}

/// The three tracker instances, shared by strategies and handlers.
#[derive(Clone)]
pub struct Trackers {
    pub camera: Arc<CameraPerformanceTracker>,
    pub rotation: Arc<RotationTracker>,
    pub remove_listing: Arc<RemoveListingTracker>,
}

impl Trackers {
    pub fn new(ttl_seconds: u64, clock: SharedClock) -> Self {
        Self {
            camera: Arc::new(CameraPerformanceTracker::new(ttl_seconds, clock.clone())),
            rotation: Arc::new(RotationTracker::new(ttl_seconds, clock.clone())),
            remove_listing: Arc::new(RemoveListingTracker::new(ttl_seconds, clock)),
        }
    }

    pub fn get(&self, kind: TrackerKind) -> Arc<dyn Tracker> {
        match kind {
            TrackerKind::CameraPerformance => self.camera.clone(),
            TrackerKind::Rotation => self.rotation.clone(),
            TrackerKind::RemoveListing => self.remove_listing.clone(),
        }
    }

    pub fn all(&self) -> [Arc<dyn Tracker>; 3] {
        [
            self.get(TrackerKind::CameraPerformance),
            self.get(TrackerKind::Rotation),
            self.get(TrackerKind::RemoveListing),
        ]
    }
}

/// Identifier carried by a JSON field.
///
/// Strings and numbers count; empty strings, null and structured values do not.
pub fn identifier_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Distinct identifiers in order of first appearance.
fn distinct<'a, I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_accept_strings_and_numbers_only() {
        assert_eq!(identifier_of(Some(&json!("A"))), Some("A".to_string()));
        assert_eq!(identifier_of(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(identifier_of(Some(&json!(""))), None);
        assert_eq!(identifier_of(Some(&json!(null))), None);
        assert_eq!(identifier_of(Some(&json!({"id": 1}))), None);
        assert_eq!(identifier_of(None), None);
    }

    #[test]
    fn distinct_keeps_first_appearance_order() {
        let ids: Vec<String> = ["B", "A", "B", "", "C", "A"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(distinct(&ids), vec!["B", "A", "C"]);
    }

    #[test]
    fn kinds_map_to_their_scenarios() {
        assert_eq!(TrackerKind::CameraPerformance.scenario(), "camera-performance-test");
        assert_eq!(TrackerKind::Rotation.scenario(), "rotation-test");
        assert_eq!(TrackerKind::RemoveListing.scenario(), "remove-listing-test");
    }
}
