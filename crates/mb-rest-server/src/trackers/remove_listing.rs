// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Listing-removal tracking for the remove-listing scenario
//!
//! The oracle is "exactly one listing was removed"; the media removed along
//! with it are grouped by parent listing for inspection.

use super::store::TrackerStore;
use super::{distinct, Tracker, TrackerKind, TrackerReport};
use crate::clock::SharedClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

const LOG_PREFIX: &str = "[REMOVE-LISTING-TEST-TRACKER]";
const EXPECTED_PATTERN: &str = "1 listing removed with all associated media";
const UNKNOWN_LISTING: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemovedListing {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemovedMedia {
    pub identifier: Option<String>,
    pub listing_id: Option<String>,
}

/// A client action that led to a removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovalAction {
    pub action: Option<String>,
    pub target_listing: Option<Value>,
    pub associated_media_count: u64,
    pub context: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedListingEvent {
    #[serde(flatten)]
    pub listing: RemovedListing,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedMediaEvent {
    #[serde(flatten)]
    pub media: RemovedMedia,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalChangeEvent {
    pub timestamp: DateTime<Utc>,
    pub removed_listings_count: usize,
    pub removed_media_count: usize,
    pub removed_listing_ids: Vec<String>,
    pub removed_media_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalActionEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub target_listing: Option<Value>,
    pub associated_media_count: u64,
    pub context: Value,
}

#[derive(Debug, Clone)]
struct RemovalRecord {
    started_at: DateTime<Utc>,
    removal_changes: Vec<RemovalChangeEvent>,
    removed_listings: Vec<RemovedListingEvent>,
    removed_media: Vec<RemovedMediaEvent>,
    removal_events: Vec<RemovalActionEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalAnalysis {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub analysis_at: DateTime<Utc>,
    pub removal_summary: RemovalSummary,
    /// Distinct media identifiers per parent listing; media without a listing
    /// are grouped under `unknown`
    pub media_by_listing: BTreeMap<String, Vec<String>>,
    pub removal_events: RemovalEvents,
    pub timeline: RemovalTimeline,
    pub test_result: TestResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalSummary {
    pub total_removal_events: usize,
    pub total_listings_removed: usize,
    pub total_media_removed: usize,
    pub unique_listings_removed: usize,
    pub unique_media_removed: usize,
    pub listings_removed: Vec<String>,
    pub media_removed: Vec<String>,
    pub matches_expected_pattern: bool,
    pub expected_pattern: &'static str,
    pub avg_media_per_listing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalEvents {
    pub total_events: usize,
    pub events: Vec<RemovalActionEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalTimeline {
    pub removal_changes: Vec<RemovalChangeEvent>,
    pub removed_listings: Vec<RemovedListingEvent>,
    pub removed_media: Vec<RemovedMediaEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub success: bool,
    pub message: String,
    pub details: TestResultDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResultDetails {
    pub listings_removed: usize,
    pub media_items_removed: usize,
    pub expected_listings: usize,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct RemoveListingTracker {
    store: TrackerStore<RemovalRecord>,
}

impl RemoveListingTracker {
    pub fn new(ttl_seconds: u64, clock: SharedClock) -> Self {
        Self {
            store: TrackerStore::new(ttl_seconds, clock),
        }
    }

    pub async fn track_removal_changes(
        &self,
        session_id: &str,
        listings: &[RemovedListing],
        media: &[RemovedMedia],
    ) {
        let totals = self
            .store
            .update(session_id, |record, now| {
                record
                    .removed_listings
                    .extend(listings.iter().map(|listing| RemovedListingEvent {
                        listing: listing.clone(),
                        timestamp: now,
                        event_type: "listing_removed",
                    }));
                record
                    .removed_media
                    .extend(media.iter().map(|item| RemovedMediaEvent {
                        media: item.clone(),
                        timestamp: now,
                        event_type: "media_removed",
                    }));
                record.removal_changes.push(RemovalChangeEvent {
                    timestamp: now,
                    removed_listings_count: listings.len(),
                    removed_media_count: media.len(),
                    removed_listing_ids: listings
                        .iter()
                        .filter_map(|l| l.identifier.clone())
                        .collect(),
                    removed_media_ids: media.iter().filter_map(|m| m.identifier.clone()).collect(),
                });
                (record.removed_listings.len(), record.removed_media.len())
            })
            .await;

        match totals {
            Some((total_removed_listings, total_removed_media)) => info!(
                session_id,
                removed_listings = listings.len(),
                removed_media = media.len(),
                total_removed_listings,
                total_removed_media,
                "{} Removal changes tracked",
                LOG_PREFIX
            ),
            None => warn!(
                session_id,
                "{} Session not found for changes tracking", LOG_PREFIX
            ),
        }
    }

    pub async fn track_removal_event(&self, session_id: &str, event: RemovalAction) {
        let action = event.action.unwrap_or_else(|| "unknown".to_string());
        let logged_action = action.clone();
        let event_count = self
            .store
            .update(session_id, |record, now| {
                record.removal_events.push(RemovalActionEvent {
                    timestamp: now,
                    action,
                    target_listing: event.target_listing,
                    associated_media_count: event.associated_media_count,
                    context: event.context.unwrap_or_else(|| json!([])),
                });
                record.removal_events.len()
            })
            .await;

        match event_count {
            Some(event_count) => info!(
                session_id,
                action = %logged_action,
                event_count,
                "{} Removal event tracked",
                LOG_PREFIX
            ),
            None => warn!(
                session_id,
                "{} Session not found for removal tracking", LOG_PREFIX
            ),
        }
    }

    pub async fn analysis(&self, session_id: &str) -> Option<RemovalAnalysis> {
        let record = self.store.get(session_id).await?;

        let listing_ids: Vec<String> = record
            .removed_listings
            .iter()
            .filter_map(|event| event.listing.identifier.clone())
            .collect();
        let media_ids: Vec<String> = record
            .removed_media
            .iter()
            .filter_map(|event| event.media.identifier.clone())
            .collect();
        let unique_listings = distinct(&listing_ids);
        let unique_media = distinct(&media_ids);

        let mut media_by_listing: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for event in &record.removed_media {
            let Some(id) = event.media.identifier.as_ref().filter(|id| !id.is_empty()) else {
                continue;
            };
            let listing = event
                .media
                .listing_id
                .clone()
                .unwrap_or_else(|| UNKNOWN_LISTING.to_string());
            let group = media_by_listing.entry(listing).or_default();
            if !group.contains(id) {
                group.push(id.clone());
            }
        }

        let matches = unique_listings.len() == 1;
        let avg_media_per_listing = if unique_listings.is_empty() {
            0.0
        } else {
            round2(unique_media.len() as f64 / unique_listings.len() as f64)
        };
        let message = if matches {
            "Test passed: One listing successfully removed with all associated media".to_string()
        } else {
            format!(
                "Test failed: Expected 1 listing removal, found {}",
                unique_listings.len()
            )
        };

        Some(RemovalAnalysis {
            session_id: session_id.to_string(),
            started_at: record.started_at,
            analysis_at: self.store.now(),
            test_result: TestResult {
                success: matches,
                message,
                details: TestResultDetails {
                    listings_removed: unique_listings.len(),
                    media_items_removed: unique_media.len(),
                    expected_listings: 1,
                },
            },
            removal_summary: RemovalSummary {
                total_removal_events: record.removal_changes.len(),
                total_listings_removed: record.removed_listings.len(),
                total_media_removed: record.removed_media.len(),
                unique_listings_removed: unique_listings.len(),
                unique_media_removed: unique_media.len(),
                listings_removed: unique_listings,
                media_removed: unique_media,
                matches_expected_pattern: matches,
                expected_pattern: EXPECTED_PATTERN,
                avg_media_per_listing,
            },
            media_by_listing,
            removal_events: RemovalEvents {
                total_events: record.removal_events.len(),
                events: record.removal_events,
            },
            timeline: RemovalTimeline {
                removal_changes: record.removal_changes,
                removed_listings: record.removed_listings,
                removed_media: record.removed_media,
            },
        })
    }
}

#[async_trait]
impl Tracker for RemoveListingTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::RemoveListing
    }

    async fn initialize(&self, session_id: &str) {
        let now = self.store.now();
        let record = RemovalRecord {
            started_at: now,
            removal_changes: Vec::new(),
            removed_listings: Vec::new(),
            removed_media: Vec::new(),
            removal_events: Vec::new(),
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
        let summary = &analysis.removal_summary;
        info!(
            session_id,
            unique_listings_removed = summary.unique_listings_removed,
            unique_media_removed = summary.unique_media_removed,
            matches_pattern = summary.matches_expected_pattern,
            test_success = analysis.test_result.success,
            "[REMOVE-LISTING-TEST-ANALYSIS] Analysis requested"
        );
        let condensed = json!({
            "total_listings_removed": summary.unique_listings_removed,
            "total_media_removed": summary.unique_media_removed,
            "matches_expected_pattern": summary.matches_expected_pattern,
            "expected_pattern": summary.expected_pattern,
            "avg_media_per_listing": summary.avg_media_per_listing,
            "test_passed": analysis.test_result.success,
        });
        Some(TrackerReport {
            data: serde_json::to_value(&analysis).unwrap_or(Value::Null),
            summary: condensed,
        })
    }

    async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }
}
