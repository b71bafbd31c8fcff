// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Media add/remove tracking for the rotation scenario
//!
//! A device rotation should produce exactly one new media item and one
//! removed item; anything else means the client re-synced media it should
//! have kept.

use super::store::TrackerStore;
use super::{distinct, Tracker, TrackerKind, TrackerReport};
use crate::clock::SharedClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

const LOG_PREFIX: &str = "[ROTATION-TEST-TRACKER]";
const EXPECTED_PATTERN: &str = "1 new media and 1 removed";

/// Media classified out of one `changes` request. `None` entries were
/// classified but carried no usable identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaChanges {
    pub added: Vec<Option<String>>,
    pub removed: Vec<Option<String>>,
}

impl MediaChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEventType {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaEvent {
    pub identifier: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: MediaEventType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaChangeEvent {
    pub timestamp: DateTime<Utc>,
    pub added_count: usize,
    pub removed_count: usize,
    pub added_identifiers: Vec<String>,
    pub removed_identifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationEvent {
    pub timestamp: DateTime<Utc>,
    pub orientation: String,
    pub media_state: Value,
}

#[derive(Debug, Clone)]
struct RotationRecord {
    started_at: DateTime<Utc>,
    media_changes: Vec<MediaChangeEvent>,
    added_media: Vec<MediaEvent>,
    removed_media: Vec<MediaEvent>,
    rotation_events: Vec<RotationEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationAnalysis {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub analysis_at: DateTime<Utc>,
    pub media_changes: MediaChangeStats,
    pub rotation_events: RotationEvents,
    pub timeline: RotationTimeline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaChangeStats {
    pub total_changes: usize,
    pub total_added: usize,
    pub total_removed: usize,
    pub unique_added: usize,
    pub unique_removed: usize,
    pub added_identifiers: Vec<String>,
    pub removed_identifiers: Vec<String>,
    pub matches_expected_pattern: bool,
    pub expected_pattern: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationEvents {
    pub total_events: usize,
    pub events: Vec<RotationEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationTimeline {
    pub media_changes: Vec<MediaChangeEvent>,
    pub added_media: Vec<MediaEvent>,
    pub removed_media: Vec<MediaEvent>,
}

pub struct RotationTracker {
    store: TrackerStore<RotationRecord>,
}

fn media_events(
    ids: &[Option<String>],
    event_type: MediaEventType,
    timestamp: DateTime<Utc>,
) -> impl Iterator<Item = MediaEvent> + '_ {
    ids.iter().map(move |identifier| MediaEvent {
        identifier: identifier.clone(),
        timestamp,
        event_type,
    })
}

fn present(ids: &[Option<String>]) -> Vec<String> {
    ids.iter().flatten().cloned().collect()
}

impl RotationTracker {
    pub fn new(ttl_seconds: u64, clock: SharedClock) -> Self {
        Self {
            store: TrackerStore::new(ttl_seconds, clock),
        }
    }

    pub async fn track_media_changes(&self, session_id: &str, changes: &MediaChanges) {
        let totals = self
            .store
            .update(session_id, |record, now| {
                record
                    .added_media
                    .extend(media_events(&changes.added, MediaEventType::Added, now));
                record
                    .removed_media
                    .extend(media_events(&changes.removed, MediaEventType::Removed, now));
                record.media_changes.push(MediaChangeEvent {
                    timestamp: now,
                    added_count: changes.added.len(),
                    removed_count: changes.removed.len(),
                    added_identifiers: present(&changes.added),
                    removed_identifiers: present(&changes.removed),
                });
                (record.added_media.len(), record.removed_media.len())
            })
            .await;

        match totals {
            Some((total_added, total_removed)) => info!(
                session_id,
                added = changes.added.len(),
                removed = changes.removed.len(),
                total_added,
                total_removed,
                "{} Media changes tracked",
                LOG_PREFIX
            ),
            None => warn!(
                session_id,
                "{} Session not found for changes tracking", LOG_PREFIX
            ),
        }
    }

    pub async fn track_rotation_event(
        &self,
        session_id: &str,
        orientation: Option<&str>,
        media_state: Option<Value>,
    ) {
        let orientation = orientation.unwrap_or("unknown").to_string();
        let event_count = self
            .store
            .update(session_id, |record, now| {
                record.rotation_events.push(RotationEvent {
                    timestamp: now,
                    orientation: orientation.clone(),
                    media_state: media_state.unwrap_or_else(|| json!([])),
                });
                record.rotation_events.len()
            })
            .await;

        match event_count {
            Some(event_count) => info!(
                session_id,
                orientation = %orientation,
                event_count,
                "{} Rotation event tracked",
                LOG_PREFIX
            ),
            None => warn!(
                session_id,
                "{} Session not found for rotation tracking", LOG_PREFIX
            ),
        }
    }

    pub async fn analysis(&self, session_id: &str) -> Option<RotationAnalysis> {
        let record = self.store.get(session_id).await?;

        let added: Vec<String> = record
            .added_media
            .iter()
            .filter_map(|event| event.identifier.clone())
            .collect();
        let removed: Vec<String> = record
            .removed_media
            .iter()
            .filter_map(|event| event.identifier.clone())
            .collect();
        let unique_added = distinct(&added);
        let unique_removed = distinct(&removed);

        Some(RotationAnalysis {
            session_id: session_id.to_string(),
            started_at: record.started_at,
            analysis_at: self.store.now(),
            media_changes: MediaChangeStats {
                total_changes: record.media_changes.len(),
                total_added: record.added_media.len(),
                total_removed: record.removed_media.len(),
                unique_added: unique_added.len(),
                unique_removed: unique_removed.len(),
                matches_expected_pattern: unique_added.len() == 1 && unique_removed.len() == 1,
                added_identifiers: unique_added,
                removed_identifiers: unique_removed,
                expected_pattern: EXPECTED_PATTERN,
            },
            rotation_events: RotationEvents {
                total_events: record.rotation_events.len(),
                events: record.rotation_events,
            },
            timeline: RotationTimeline {
                media_changes: record.media_changes,
                added_media: record.added_media,
                removed_media: record.removed_media,
            },
        })
    }
}

#[async_trait]
impl Tracker for RotationTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Rotation
    }

    async fn initialize(&self, session_id: &str) {
        let now = self.store.now();
        let record = RotationRecord {
            started_at: now,
            media_changes: Vec::new(),
            added_media: Vec::new(),
            removed_media: Vec::new(),
            rotation_events: Vec::new(),
        };
        self.store.put(session_id, record).await;
        info!(session_id, timestamp = %now, "{} Session initialized", LOG_PREFIX);
    }

    async fn clear_session(&self, session_id: &str) {
        self.store.remove(session_id).await;
        info!(session_id, "{} Session cleared", LOG_PREFIX);
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        self.store.contains(session_id).await
    }

    async fn report(&self, session_id: &str) -> Option<TrackerReport> {
        let analysis = self.analysis(session_id).await?;
        let changes = &analysis.media_changes;
        info!(
            session_id,
            unique_added = changes.unique_added,
            unique_removed = changes.unique_removed,
            matches_pattern = changes.matches_expected_pattern,
            "[ROTATION-TEST-ANALYSIS] Analysis requested"
        );
        let summary = json!({
            "total_unique_added": changes.unique_added,
            "total_unique_removed": changes.unique_removed,
            "matches_expected_pattern": changes.matches_expected_pattern,
            "expected_pattern": changes.expected_pattern,
            "rotation_events_count": analysis.rotation_events.total_events,
        });
        Some(TrackerReport {
            data: serde_json::to_value(&analysis).unwrap_or(Value::Null),
            summary,
        })
    }

    async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn tracker() -> RotationTracker {
        RotationTracker::new(7200, Arc::new(ManualClock::default()))
    }

    fn ids(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[tokio::test]
    async fn one_add_and_one_remove_matches_the_pattern() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        tracker
            .track_media_changes(
                "s1",
                &MediaChanges {
                    added: ids(&["new-1"]),
                    removed: ids(&["old-1"]),
                },
            )
            .await;

        let stats = tracker.analysis("s1").await.expect("analysis").media_changes;
        assert_eq!(stats.unique_added, 1);
        assert_eq!(stats.unique_removed, 1);
        assert!(stats.matches_expected_pattern);
        assert_eq!(stats.expected_pattern, "1 new media and 1 removed");
    }

    #[tokio::test]
    async fn two_adds_and_three_removes_do_not_match() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        tracker
            .track_media_changes(
                "s1",
                &MediaChanges {
                    added: ids(&["a1", "a2"]),
                    removed: ids(&["r1", "r2", "r3"]),
                },
            )
            .await;

        let stats = tracker.analysis("s1").await.expect("analysis").media_changes;
        assert_eq!(stats.unique_added, 2);
        assert_eq!(stats.unique_removed, 3);
        assert!(!stats.matches_expected_pattern);
    }

    #[tokio::test]
    async fn repeated_identifiers_count_once() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        for _ in 0..2 {
            tracker
                .track_media_changes(
                    "s1",
                    &MediaChanges {
                        added: vec![Some("n".to_string()), None],
                        removed: ids(&["o"]),
                    },
                )
                .await;
        }

        let analysis = tracker.analysis("s1").await.expect("analysis");
        assert_eq!(analysis.media_changes.total_changes, 2);
        assert_eq!(analysis.media_changes.total_added, 4);
        assert_eq!(analysis.media_changes.unique_added, 1);
        assert!(analysis.media_changes.matches_expected_pattern);
        assert_eq!(analysis.timeline.media_changes[0].added_count, 2);
        assert_eq!(analysis.timeline.media_changes[0].added_identifiers, vec!["n"]);
    }

    #[tokio::test]
    async fn rotation_events_default_to_unknown_orientation() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        tracker
            .track_rotation_event("s1", Some("landscape"), Some(json!({"count": 3})))
            .await;
        tracker.track_rotation_event("s1", None, None).await;

        let report = tracker.report("s1").await.expect("report");
        assert_eq!(report.summary["rotation_events_count"], 2);
        let events = &report.data["rotation_events"]["events"];
        assert_eq!(events[0]["orientation"], "landscape");
        assert_eq!(events[1]["orientation"], "unknown");
        assert_eq!(events[1]["media_state"], json!([]));
    }

    #[tokio::test]
    #[traced_test]
    async fn tracking_an_unknown_session_is_ignored() {
        let tracker = tracker();
        tracker
            .track_media_changes("ghost", &MediaChanges::default())
            .await;
        tracker.track_rotation_event("ghost", None, None).await;

        assert!(tracker.report("ghost").await.is_none());
        assert!(logs_contain("Session not found for changes tracking"));
        assert!(logs_contain("Session not found for rotation tracking"));
    }
}
