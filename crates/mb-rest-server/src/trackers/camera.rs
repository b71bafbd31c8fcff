// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Upload and changes tracking for the camera performance scenario
//!
//! Answers "did the client upload the same media more than once?" by
//! counting upload identifiers across `request-upload` calls and the
//! `temp_id`s sent through `changes`.

use super::store::TrackerStore;
use super::{distinct, identifier_of, Tracker, TrackerKind, TrackerReport};
use crate::clock::SharedClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

const LOG_PREFIX: &str = "[CAMERA-PERFORMANCE-TRACKER]";

/// One entry of a `request-upload` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadMediaItem {
    pub identifier: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

impl UploadMediaItem {
    pub fn from_json(item: &Value) -> Self {
        Self {
            identifier: identifier_of(item.get("identifier")),
            filename: item.get("filename").and_then(Value::as_str).map(str::to_string),
            content_type: item
                .get("content_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            size: item.get("size").and_then(Value::as_u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEvent {
    pub timestamp: DateTime<Utc>,
    pub media_count: usize,
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone)]
struct UploadRecord {
    started_at: DateTime<Utc>,
    upload_identifiers: Vec<String>,
    changes_identifiers: Vec<String>,
    upload_requests: Vec<RequestEvent>,
    changes_requests: Vec<RequestEvent>,
}

impl UploadRecord {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            upload_identifiers: Vec::new(),
            changes_identifiers: Vec::new(),
            upload_requests: Vec::new(),
            changes_requests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadAnalysis {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub analysis_at: DateTime<Utc>,
    pub upload_requests: UploadStats,
    pub changes_requests: ChangesStats,
    pub timeline: UploadTimeline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadStats {
    pub total_requests: usize,
    pub total_media_items: usize,
    pub unique_media_items: usize,
    pub duplicate_items: usize,
    pub unique_identifiers: Vec<String>,
    /// Identifier to occurrence count, only for identifiers seen more than once
    pub duplicates: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangesStats {
    pub total_requests: usize,
    pub total_media_items: usize,
    pub unique_media_items: usize,
    pub unique_identifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadTimeline {
    pub upload_requests: Vec<RequestEvent>,
    pub changes_requests: Vec<RequestEvent>,
}

pub struct CameraPerformanceTracker {
    store: TrackerStore<UploadRecord>,
}

impl CameraPerformanceTracker {
    pub fn new(ttl_seconds: u64, clock: SharedClock) -> Self {
        Self {
            store: TrackerStore::new(ttl_seconds, clock),
        }
    }

    pub async fn track_upload_request(&self, session_id: &str, items: &[UploadMediaItem]) {
        let identifiers: Vec<String> =
            items.iter().filter_map(|item| item.identifier.clone()).collect();

        let totals = self
            .store
            .update(session_id, |record, now| {
                record.upload_identifiers.extend(identifiers.iter().cloned());
                record.upload_requests.push(RequestEvent {
                    timestamp: now,
                    media_count: items.len(),
                    identifiers,
                });
                (
                    record.upload_identifiers.len(),
                    distinct(&record.upload_identifiers).len(),
                )
            })
            .await;

        match totals {
            Some((total_uploads, unique_uploads)) => info!(
                session_id,
                media_count = items.len(),
                total_uploads,
                unique_uploads,
                "{} Upload request tracked",
                LOG_PREFIX
            ),
            None => warn!(
                session_id,
                "{} Session not found for upload tracking", LOG_PREFIX
            ),
        }
    }

    /// Record the `media[].temp_id`s of a `changes` payload.
    pub async fn track_changes_request(&self, session_id: &str, changes: &Value) {
        let media: &[Value] = changes
            .get("media")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let identifiers: Vec<String> = media
            .iter()
            .filter_map(|item| identifier_of(item.get("temp_id")))
            .collect();

        let totals = self
            .store
            .update(session_id, |record, now| {
                record.changes_identifiers.extend(identifiers.iter().cloned());
                record.changes_requests.push(RequestEvent {
                    timestamp: now,
                    media_count: media.len(),
                    identifiers,
                });
                (
                    record.changes_identifiers.len(),
                    distinct(&record.changes_identifiers).len(),
                )
            })
            .await;

        match totals {
            Some((total_changes, unique_changes)) => info!(
                session_id,
                media_count = media.len(),
                total_changes,
                unique_changes,
                "{} Changes request tracked",
                LOG_PREFIX
            ),
            None => warn!(
                session_id,
                "{} Session not found for changes tracking", LOG_PREFIX
            ),
        }
    }

    pub async fn analysis(&self, session_id: &str) -> Option<UploadAnalysis> {
        let record = self.store.get(session_id).await?;

        let unique_uploads = distinct(&record.upload_identifiers);
        let unique_changes = distinct(&record.changes_identifiers);

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for id in &record.upload_identifiers {
            *counts.entry(id.clone()).or_default() += 1;
        }
        counts.retain(|_, count| *count > 1);

        Some(UploadAnalysis {
            session_id: session_id.to_string(),
            started_at: record.started_at,
            analysis_at: self.store.now(),
            upload_requests: UploadStats {
                total_requests: record.upload_requests.len(),
                total_media_items: record.upload_identifiers.len(),
                unique_media_items: unique_uploads.len(),
                duplicate_items: record.upload_identifiers.len() - unique_uploads.len(),
                unique_identifiers: unique_uploads,
                duplicates: counts,
            },
            changes_requests: ChangesStats {
                total_requests: record.changes_requests.len(),
                total_media_items: record.changes_identifiers.len(),
                unique_media_items: unique_changes.len(),
                unique_identifiers: unique_changes,
            },
            timeline: UploadTimeline {
                upload_requests: record.upload_requests,
                changes_requests: record.changes_requests,
            },
        })
    }
}

#[async_trait]
impl Tracker for CameraPerformanceTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::CameraPerformance
    }

    async fn initialize(&self, session_id: &str) {
        let now = self.store.now();
        self.store.put(session_id, UploadRecord::new(now)).await;
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
        let uploads = &analysis.upload_requests;
        let changes = &analysis.changes_requests;
        info!(
            session_id,
            unique_uploads = uploads.unique_media_items,
            total_uploads = uploads.total_media_items,
            unique_changes = changes.unique_media_items,
            total_changes = changes.total_media_items,
            "[CAMERA-PERFORMANCE-ANALYSIS] Analysis requested"
        );
        let summary = json!({
            "total_unique_uploads": uploads.unique_media_items,
            "total_upload_requests": uploads.total_requests,
            "total_duplicate_uploads": uploads.duplicate_items,
            "duplicate_upload_identifiers": uploads.duplicates,
            "total_unique_changes": changes.unique_media_items,
            "total_changes_requests": changes.total_requests,
            "has_duplicates": uploads.duplicate_items > 0,
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

    fn tracker() -> CameraPerformanceTracker {
        CameraPerformanceTracker::new(7200, Arc::new(ManualClock::default()))
    }

    fn items(ids: &[&str]) -> Vec<UploadMediaItem> {
        ids.iter()
            .map(|id| UploadMediaItem {
                identifier: Some(id.to_string()),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn repeated_uploads_are_counted_as_duplicates() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        tracker.track_upload_request("s1", &items(&["A", "B"])).await;
        tracker.track_upload_request("s1", &items(&["C", "B"])).await;

        let analysis = tracker.analysis("s1").await.expect("analysis");
        let uploads = analysis.upload_requests;
        assert_eq!(uploads.total_requests, 2);
        assert_eq!(uploads.total_media_items, 4);
        assert_eq!(uploads.unique_media_items, 3);
        assert_eq!(uploads.duplicate_items, 1);
        assert_eq!(uploads.unique_identifiers, vec!["A", "B", "C"]);
        assert_eq!(uploads.duplicates, BTreeMap::from([("B".to_string(), 2)]));
        assert_eq!(analysis.timeline.upload_requests[1].identifiers, vec!["C", "B"]);
    }

    #[tokio::test]
    async fn items_without_identifiers_only_count_toward_media_count() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        let mut batch = items(&["A"]);
        batch.push(UploadMediaItem::from_json(&json!({"identifier": "", "filename": "x.jpg"})));
        batch.push(UploadMediaItem::from_json(&json!({"filename": "y.jpg"})));
        tracker.track_upload_request("s1", &batch).await;

        let analysis = tracker.analysis("s1").await.expect("analysis");
        assert_eq!(analysis.upload_requests.total_media_items, 1);
        assert_eq!(analysis.timeline.upload_requests[0].media_count, 3);
    }

    #[tokio::test]
    async fn changes_use_media_temp_ids() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        tracker
            .track_changes_request(
                "s1",
                &json!({"media": [{"temp_id": "t1"}, {"temp_id": "t2"}, {"id": 9}]}),
            )
            .await;
        tracker
            .track_changes_request("s1", &json!({"media": [{"temp_id": "t1"}]}))
            .await;

        let changes = tracker.analysis("s1").await.expect("analysis").changes_requests;
        assert_eq!(changes.total_requests, 2);
        assert_eq!(changes.total_media_items, 3);
        assert_eq!(changes.unique_media_items, 2);
        assert_eq!(changes.unique_identifiers, vec!["t1", "t2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tracking_for_one_session_loses_nothing() {
        let tracker = Arc::new(tracker());
        tracker.initialize("s1").await;

        let tasks: Vec<_> = (0..40)
            .map(|n| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    let id = format!("m{n}");
                    tracker.track_upload_request("s1", &items(&[id.as_str()])).await;
                    tracker
                        .track_changes_request("s1", &json!({"media": [{"temp_id": id}]}))
                        .await;
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join");
        }

        let analysis = tracker.analysis("s1").await.expect("analysis");
        assert_eq!(analysis.upload_requests.total_requests, 40);
        assert_eq!(analysis.upload_requests.unique_media_items, 40);
        assert_eq!(analysis.changes_requests.total_requests, 40);
        assert_eq!(analysis.changes_requests.unique_media_items, 40);
        assert_eq!(analysis.timeline.upload_requests.len(), 40);
    }

    #[tokio::test]
    #[traced_test]
    async fn tracking_without_initialize_is_dropped_with_a_warning() {
        let tracker = tracker();
        tracker.track_upload_request("ghost", &items(&["A"])).await;

        assert!(tracker.analysis("ghost").await.is_none());
        assert!(!tracker.session_exists("ghost").await);
        assert!(logs_contain("Session not found for upload tracking"));
    }

    #[tokio::test]
    async fn clear_then_initialize_gives_an_empty_record() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        tracker.track_upload_request("s1", &items(&["A", "A"])).await;

        tracker.clear_session("s1").await;
        assert!(tracker.report("s1").await.is_none());

        tracker.initialize("s1").await;
        let report = tracker.report("s1").await.expect("report");
        assert_eq!(report.summary["total_upload_requests"], 0);
        assert_eq!(report.summary["has_duplicates"], false);
        assert_eq!(report.data["upload_requests"]["unique_media_items"], 0);
    }

    #[tokio::test]
    async fn summary_condenses_the_analysis() {
        let tracker = tracker();
        tracker.initialize("s1").await;
        tracker.track_upload_request("s1", &items(&["A", "B", "A"])).await;

        let report = tracker.report("s1").await.expect("report");
        assert_eq!(
            report.summary,
            json!({
                "total_unique_uploads": 2,
                "total_upload_requests": 1,
                "total_duplicate_uploads": 1,
                "duplicate_upload_identifiers": {"A": 2},
                "total_unique_changes": 0,
                "total_changes_requests": 0,
                "has_duplicates": true,
            })
        );
    }
}
