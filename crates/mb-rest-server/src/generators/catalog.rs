// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Catalog-shaped payloads for the catalog scenarios

use super::ResponseGenerator;
use crate::session_store::TestSession;
use anyhow::{bail, Context};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

const MAX_GENERATED: u64 = 500;

fn categories() -> Value {
    json!([
        {"id": 1, "name": "Sports", "slug": "sports"},
        {"id": 2, "name": "Music", "slug": "music"},
        {"id": 3, "name": "Theater", "slug": "theater"},
        {"id": 4, "name": "Comedy", "slug": "comedy"},
    ])
}

fn qualities() -> Value {
    json!([
        {"id": 1, "name": "Standard", "code": "STD"},
        {"id": 2, "name": "Premium", "code": "PRM"},
        {"id": 3, "name": "VIP", "code": "VIP"},
    ])
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Catalog with no events, listings or sellers.
pub struct EmptyCatalogGenerator;

impl ResponseGenerator for EmptyCatalogGenerator {
    fn name(&self) -> &str {
        "EmptyCatalogGenerator"
    }

    fn description(&self) -> &str {
        "Generates an empty catalog response with no events or listings"
    }

    fn generate(
        &self,
        parameters: &Map<String, Value>,
        _session: &TestSession,
    ) -> anyhow::Result<Value> {
        let include_defaults = match parameters.get("include_defaults") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => bail!("include_defaults must be a boolean, got {}", other),
        };
        let (categories, qualities) = if include_defaults {
            (categories(), qualities())
        } else {
            (json!([]), json!([]))
        };
        Ok(json!({
            "events": [],
            "listings": [],
            "sellers": [],
            "categories": categories,
            "qualities": qualities,
            "last_modified": now_iso(),
            "incremental_id": Uuid::new_v4().to_string(),
        }))
    }
}

/// Catalog with a configurable number of events, each with its listings.
///
/// Parameters: `event_count` (1), `listing_count` per event (5), `status`
/// (`active`).
pub struct SingleEventGenerator;

fn count_parameter(parameters: &Map<String, Value>, key: &str, default: u64) -> anyhow::Result<u64> {
    let Some(value) = parameters.get(key).filter(|v| !v.is_null()) else {
        return Ok(default);
    };
    let count = value
        .as_u64()
        .with_context(|| format!("{} must be a non-negative integer, got {}", key, value))?;
    if count > MAX_GENERATED {
        bail!("{} must be at most {}, got {}", key, MAX_GENERATED, count);
    }
    Ok(count)
}

impl SingleEventGenerator {
    fn event(id: u64, status: &str) -> Value {
        let starts = Utc::now() + Duration::days(7 + (id as i64 * 3) % 84);
        let venue = (id - 1) % 10 + 1;
        json!({
            "id": id,
            "external_id": format!("EVT-{:06}", id),
            "name": format!("Mock Event {}", id),
            "description": format!("Generated event {} for scenario testing", id),
            "venue": {
                "id": venue,
                "name": format!("Venue {} Arena", venue),
                "city": "Springfield",
                "state": "IL",
                "country": "US",
            },
            "date": starts.format("%Y-%m-%d").to_string(),
            "time": starts.format("%H:%M:%S").to_string(),
            "datetime": starts.to_rfc3339_opts(SecondsFormat::Secs, false),
            "status": status,
            "category_id": (id - 1) % 4 + 1,
            "created_at": now_iso(),
            "updated_at": now_iso(),
        })
    }

    fn listing(event_id: u64, id: u64) -> Value {
        let price = 50.0 + ((event_id * 37 + id * 53) % 450) as f64;
        let quantity = (id - 1) % 4 + 1;
        let row = ["A", "B", "C", "D", "E", "F", "G", "H"][(id as usize - 1) % 8];
        json!({
            "id": id,
            "event_id": event_id,
            "seller_id": (id - 1) % 3 + 1,
            "section": format!("Section {}", 100 + (id * 17) % 300),
            "row": row,
            "quantity": quantity,
            "seats": (1..=quantity).map(|s| s.to_string()).collect::<Vec<_>>().join(","),
            "price": price,
            "fees": (price * 0.15 * 100.0).round() / 100.0,
            "total_price": (price * 1.15 * 100.0).round() / 100.0,
            "quality_id": (id - 1) % 3 + 1,
            "delivery_method": "electronic",
            "split_type": "any",
            "status": "available",
            "created_at": now_iso(),
            "updated_at": now_iso(),
        })
    }

    fn sellers() -> Value {
        Value::Array(
            (1..=3u64)
                .map(|id| {
                    json!({
                        "id": id,
                        "name": format!("Mock Seller {}", id),
                        "rating": 4.0 + id as f64 * 0.3,
                        "total_sales": id * 1000,
                        "response_time": id * 4,
                        "verified": id != 3,
                    })
                })
                .collect(),
        )
    }
}

impl ResponseGenerator for SingleEventGenerator {
    fn name(&self) -> &str {
        "SingleEventGenerator"
    }

    fn description(&self) -> &str {
        "Generates catalog with configurable number of events and listings"
    }

    fn generate(
        &self,
        parameters: &Map<String, Value>,
        _session: &TestSession,
    ) -> anyhow::Result<Value> {
        let event_count = count_parameter(parameters, "event_count", 1)?;
        let listing_count = count_parameter(parameters, "listing_count", 5)?;
        let status = parameters
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("active");

        let mut events = Vec::new();
        let mut listings = Vec::new();
        for event_id in 1..=event_count {
            events.push(Self::event(event_id, status));
            for listing_id in 1..=listing_count {
                listings.push(Self::listing(event_id, listing_id));
            }
        }

        Ok(json!({
            "events": events,
            "listings": listings,
            "sellers": Self::sellers(),
            "categories": categories(),
            "qualities": qualities(),
            "last_modified": now_iso(),
            "incremental_id": Uuid::new_v4().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::SessionState;

    fn session() -> TestSession {
        TestSession {
            session_id: "maestro_session_x".to_string(),
            scenario: "default".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now(),
            metadata: Map::new(),
            state: SessionState::default(),
        }
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn empty_catalog_optionally_omits_defaults() {
        let body = EmptyCatalogGenerator
            .generate(&Map::new(), &session())
            .expect("generate");
        assert_eq!(body["events"], json!([]));
        assert_eq!(body["categories"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["qualities"].as_array().map(Vec::len), Some(3));

        let body = EmptyCatalogGenerator
            .generate(&params(json!({"include_defaults": false})), &session())
            .expect("generate");
        assert_eq!(body["categories"], json!([]));
    }

    #[test]
    fn single_event_honours_counts_and_status() {
        let body = SingleEventGenerator
            .generate(
                &params(json!({"event_count": 2, "listing_count": 3, "status": "cancelled"})),
                &session(),
            )
            .expect("generate");

        let events = body["events"].as_array().expect("events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["external_id"], "EVT-000002");
        assert_eq!(events[0]["status"], "cancelled");
        assert_eq!(body["listings"].as_array().map(Vec::len), Some(6));
        assert_eq!(body["listings"][0]["row"], "A");
        assert_eq!(body["listings"][2]["row"], "C");
        assert_eq!(body["listings"][3]["row"], "A");
        assert_eq!(body["sellers"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn invalid_counts_are_generation_errors() {
        let err = SingleEventGenerator
            .generate(&params(json!({"event_count": "many"})), &session())
            .expect_err("non-numeric count");
        assert!(err.to_string().contains("event_count"));

        assert!(SingleEventGenerator
            .generate(&params(json!({"listing_count": 10_000})), &session())
            .is_err());
    }
}
