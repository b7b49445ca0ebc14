// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sectioned configuration lookup, used by the strategy safety gates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Values that enable a safety gate.
const TRUTHY: [&str; 4] = ["1", "true", "yes", "on"];

/// Local configuration as nested `{section: {key: value}}` maps.
///
/// Mirrors an INI-style local configuration file; persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(flatten)]
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Look up `key` within `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn set(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Whether `section.key` is present with a truthy value
    /// ("1", "true", "yes", or "on", case-insensitive).
    pub fn truthy(&self, section: &str, key: &str) -> bool {
        self.get(section, key)
            .map(|v| TRUTHY.contains(&v.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}
