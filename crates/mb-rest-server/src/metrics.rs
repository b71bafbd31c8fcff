// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Interception pipeline counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the interception pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    requests_seen: AtomicU64,
    intercepted: AtomicU64,
    overridden: AtomicU64,
    passed_through: AtomicU64,
    post_processed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineMetricsSnapshot {
    /// Requests that reached the pipeline, including control API calls
    pub requests_seen: u64,
    /// Requests that matched a session, scenario and response config
    pub intercepted: u64,
    /// Intercepted requests answered without running the controller
    pub overridden: u64,
    /// Requests handed to the controller untouched
    pub passed_through: u64,
    /// Controller responses run through a strategy post-hook
    pub post_processed: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seen(&self) {
        self.requests_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intercepted(&self) {
        self.intercepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overridden(&self) {
        self.overridden.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passed_through(&self) {
        self.passed_through.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_processed(&self) {
        self.post_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            requests_seen: self.requests_seen.load(Ordering::Relaxed),
            intercepted: self.intercepted.load(Ordering::Relaxed),
            overridden: self.overridden.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            post_processed: self.post_processed.load(Ordering::Relaxed),
        }
    }
}
