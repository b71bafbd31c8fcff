// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! HTTP request handlers

pub mod control;
pub mod health;
pub mod mobile;
pub mod trackers;
