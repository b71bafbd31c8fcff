// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use super::{InterceptedRequest, PreHookOutcome, ScenarioStrategy};
use crate::scenarios::ResolvedOverride;
use crate::session_store::TestSession;
use async_trait::async_trait;

/// Leaves requests and responses alone.
pub struct DefaultStrategy;

#[async_trait]
impl ScenarioStrategy for DefaultStrategy {
    fn name(&self) -> &str {
        "default"
    }

    async fn process_request(
        &self,
        _request: &InterceptedRequest,
        _config: &ResolvedOverride,
        _session: &TestSession,
    ) -> PreHookOutcome {
        PreHookOutcome::proceed()
    }
}
