// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use super::{
    InterceptedRequest, PreHookOutcome, ScenarioStrategy, apply_fixed_last_modified,
    changes_section, id_or_temp_id,
};
use crate::scenarios::ResolvedOverride;
use crate::session_store::TestSession;
use crate::trackers::{RemoveListingTracker, RemovedListing, RemovedMedia, Tracker, identifier_of};
use async_trait::async_trait;
use axum::response::Response;
use mb_logging::SCENARIO_LOG_TARGET;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Records listings and media the client deletes in `changes` requests.
pub struct RemoveListingStrategy {
    tracker: Arc<RemoveListingTracker>,
}

fn is_removal(item: &Value) -> bool {
    matches!(
        item.get("action").and_then(Value::as_str),
        Some("delete") | Some("remove")
    )
}

fn text(item: &Value, key: &str) -> Option<String> {
    identifier_of(item.get(key))
}

impl RemoveListingStrategy {
    pub fn new(tracker: Arc<RemoveListingTracker>) -> Self {
        Self { tracker }
    }

    fn removed_listings(listings: &[Value]) -> Vec<RemovedListing> {
        listings
            .iter()
            .filter(|item| is_removal(item))
            .map(|item| RemovedListing {
                identifier: id_or_temp_id(item),
                title: text(item, "title"),
                status: text(item, "status"),
            })
            .collect()
    }

    fn removed_media(media: &[Value]) -> Vec<RemovedMedia> {
        media
            .iter()
            .filter(|item| is_removal(item))
            .map(|item| RemovedMedia {
                identifier: id_or_temp_id(item),
                listing_id: text(item, "listing_id"),
            })
            .collect()
    }
}

#[async_trait]
impl ScenarioStrategy for RemoveListingStrategy {
    fn name(&self) -> &str {
        "remove-listing-test"
    }

    async fn process_request(
        &self,
        request: &InterceptedRequest,
        config: &ResolvedOverride,
        session: &TestSession,
    ) -> PreHookOutcome {
        let session_id = session.session_id.as_str();
        if !self.tracker.session_exists(session_id).await {
            self.tracker.initialize(session_id).await;
        }

        let logging = config.config.parameter_flag("enable_logging");
        if logging {
            info!(
                target: SCENARIO_LOG_TARGET,
                session_id,
                endpoint = %request.endpoint,
                method = %request.method,
                "[REMOVE-LISTING-TEST] Request received"
            );
        }

        if request.path.contains("changes") && request.input("changes").is_some() {
            let listings = changes_section(request, "listings");
            let media = changes_section(request, "media");
            info!(
                target: SCENARIO_LOG_TARGET,
                session_id,
                listings_count = listings.len(),
                media_count = media.len(),
                "[REMOVE-LISTING-TEST] Received changes request"
            );

            let removed_listings = Self::removed_listings(&listings);
            let removed_media = Self::removed_media(&media);
            if !removed_listings.is_empty() || !removed_media.is_empty() {
                self.tracker
                    .track_removal_changes(session_id, &removed_listings, &removed_media)
                    .await;
                info!(
                    target: SCENARIO_LOG_TARGET,
                    session_id,
                    removed_listings_count = removed_listings.len(),
                    removed_media_count = removed_media.len(),
                    "[REMOVE-LISTING-TEST] Removal changes tracked"
                );
            }
        }

        PreHookOutcome::proceed()
            .with("tracking_enabled", config.config.parameter_flag("track_changes"))
            .with("logging_enabled", logging)
    }

    async fn process_response(
        &self,
        response: Response,
        config: &ResolvedOverride,
        _session: &TestSession,
    ) -> Response {
        apply_fixed_last_modified(response, config).await
    }
}
