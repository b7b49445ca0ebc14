// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Report definitions and the rendering collaborator boundary.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use lprelay_core::error::Result;
use lprelay_core::types::ReportFormat;

/// Model name used by printer test-page reports.
pub const PRINTER_MODEL: &str = "printer";

/// A named report rendering one record type into one output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDef {
    pub name: String,
    /// Record type the report renders.
    pub model: String,
    pub format: ReportFormat,
}

impl ReportDef {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        format: ReportFormat,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            format,
        }
    }
}

/// Registry of known reports.
///
/// One report name may carry several definitions, one per output format.
/// External references (data-file ids) are a second namespace that
/// aliases internal names.
#[derive(Debug, Default)]
pub struct ReportRegistry {
    defs: Vec<ReportDef>,
    refs: HashMap<String, String>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: ReportDef) {
        self.defs.push(def);
    }

    /// Alias `external_ref` to the internal report `name`.
    pub fn register_ref(&mut self, external_ref: impl Into<String>, name: impl Into<String>) {
        self.refs.insert(external_ref.into(), name.into());
    }

    /// All definitions registered under the internal `name`.
    pub fn by_name(&self, name: &str) -> Vec<ReportDef> {
        self.defs.iter().filter(|d| d.name == name).cloned().collect()
    }

    /// Resolve `name` as an internal name first, then as an external
    /// reference.  Empty when neither matches.
    pub fn lookup(&self, name: &str) -> Vec<ReportDef> {
        let defs = self.by_name(name);
        if !defs.is_empty() {
            return defs;
        }
        match self.refs.get(name) {
            Some(aliased) => self.by_name(aliased),
            None => Vec::new(),
        }
    }

    /// Test-page reports for the printer model.
    pub fn test_pages(&self) -> Vec<ReportDef> {
        self.defs
            .iter()
            .filter(|d| d.model == PRINTER_MODEL)
            .cloned()
            .collect()
    }
}

/// Reference to the report(s) to spool.
#[derive(Debug, Clone)]
pub enum ReportRef {
    /// Internal report name or external reference, resolved via the registry.
    Name(String),
    /// Already-resolved report definitions.
    Defs(Vec<ReportDef>),
}

impl From<&str> for ReportRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ReportRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<ReportDef> for ReportRef {
    fn from(def: ReportDef) -> Self {
        Self::Defs(vec![def])
    }
}

impl From<Vec<ReportDef>> for ReportRef {
    fn from(defs: Vec<ReportDef>) -> Self {
        Self::Defs(defs)
    }
}

/// The rendering collaborator: turns a report definition plus target
/// records into document bytes of the definition's format.
pub trait Renderer {
    fn render(&self, report: &ReportDef, targets: &[Uuid], data: Option<&Value>)
    -> Result<Vec<u8>>;
}
