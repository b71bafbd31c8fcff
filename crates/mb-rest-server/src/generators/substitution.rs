// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Placeholder substitution for static override payloads

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Values a payload's placeholders resolve to.
///
/// `{{uuid}}` and `{{random_int}}` are drawn fresh at each occurrence.
#[derive(Debug, Clone, Copy)]
pub struct Variables {
    now: DateTime<Utc>,
}

impl Variables {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Replace every known placeholder in every string leaf of `value`.
    pub fn apply(&self, value: &mut Value) {
        match value {
            Value::String(s) if s.contains("{{") => *s = self.substitute(s),
            Value::Array(items) => items.iter_mut().for_each(|item| self.apply(item)),
            Value::Object(map) => map.values_mut().for_each(|item| self.apply(item)),
            _ => {}
        }
    }

    fn substitute(&self, input: &str) -> String {
        let mut out = input
            .replace(
                "{{timestamp}}",
                &self.now.to_rfc3339_opts(SecondsFormat::Secs, false),
            )
            .replace("{{date}}", &self.now.format("%Y-%m-%d").to_string())
            .replace("{{time}}", &self.now.format("%H:%M:%S").to_string());
        while out.contains("{{uuid}}") {
            out = out.replacen("{{uuid}}", &Uuid::new_v4().to_string(), 1);
        }
        while out.contains("{{random_int}}") {
            out = out.replacen("{{random_int}}", &random_int().to_string(), 1);
        }
        out
    }
}

/// Uniform enough integer in `1..=1_000_000` for mock payloads.
fn random_int() -> u32 {
    let bits = Uuid::new_v4().as_u128();
    (bits % 1_000_000) as u32 + 1
}
