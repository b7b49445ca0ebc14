// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the lprelay print router.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::LprelayError;

/// Unique identifier for a printer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrinterId(pub Uuid);

impl PrinterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrinterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PrinterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output encoding of a rendered document.
///
/// Every printer accepts exactly one format; the dispatcher renders each
/// report once per format required by the resolved printer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Html,
    /// Label-printer markup (CPCL wrapped in XML).
    Cpcl,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [Self::Pdf, Self::Html, Self::Cpcl];

    /// Storage key used in database columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Cpcl => "cpcl",
        }
    }

    /// Human-readable label used in error messages and UIs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Html => "HTML",
            Self::Cpcl => "CPCL/XML",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = LprelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "html" => Ok(Self::Html),
            "cpcl" => Ok(Self::Cpcl),
            other => Err(LprelayError::UnknownFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A printer or printer group record.
///
/// Groups are not printable themselves; they scope default selection for
/// their children. Group membership forms a tree via `group_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Printer {
    pub id: PrinterId,
    pub name: String,
    /// Group chain joined by " / ", recomputed by the store on every read.
    pub full_name: String,
    /// Physical label barcode; unique across all printers when present.
    pub barcode: Option<String>,
    /// Destination queue passed to the spooler via `-P`; the spooler's own
    /// default queue is used when absent.
    pub queue: Option<String>,
    pub format: ReportFormat,
    /// System default within its (group, format) scope.
    pub is_default: bool,
    /// Dropped from user preferences at logout.
    pub is_ephemeral: bool,
    pub is_group: bool,
    pub group_id: Option<PrinterId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Printer {
    pub fn new(name: impl Into<String>, format: ReportFormat) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: PrinterId::new(),
            full_name: name.clone(),
            name,
            barcode: None,
            queue: None,
            format,
            is_default: false,
            is_ephemeral: false,
            is_group: false,
            group_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a printer group.
    pub fn new_group(name: impl Into<String>) -> Self {
        let mut printer = Self::new(name, ReportFormat::Pdf);
        printer.is_group = true;
        printer
    }
}

/// Binds a named report to an optional printer behind a safety gate.
///
/// Applied to a context record, a strategy yields zero or more target ids
/// to render and print.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintStrategy {
    pub id: Uuid,
    pub name: String,
    /// Record type this strategy targets.
    pub model: String,
    /// Report rendered for each selected record.
    pub report_name: String,
    /// Printer override; the resolver falls back to defaults when absent.
    pub printer_id: Option<PrinterId>,
    /// Configuration option that must be truthy for the strategy to fire.
    pub safety: Option<String>,
}

impl PrintStrategy {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        report_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            model: model.into(),
            report_name: report_name.into(),
            printer_id: None,
            safety: None,
        }
    }

    /// The (section, key) pair of the safety gate, if one is configured.
    ///
    /// A safety string containing a separator splits on its last "."; with
    /// no separator (or an empty section) the strategy's own model name is
    /// the section.
    pub fn safety_key(&self) -> Option<(&str, &str)> {
        let safety = self.safety.as_deref()?;
        match safety.rsplit_once('.') {
            Some((section, key)) if !section.is_empty() => Some((section, key)),
            Some((_, key)) => Some((self.model.as_str(), key)),
            None => Some((self.model.as_str(), safety)),
        }
    }

    /// Whether this strategy may fire under `config`.
    ///
    /// A strategy with no safety gate is always enabled. A disabled
    /// strategy is logged so the operator can see what to configure.
    pub fn enabled(&self, config: &RelayConfig) -> bool {
        let Some((section, key)) = self.safety_key() else {
            return true;
        };
        if config.truthy(section, key) {
            true
        } else {
            info!(
                strategy = %self.name,
                safety = %format!("{section}.{key}"),
                "print strategy disabled, enable by configuring safety"
            );
            false
        }
    }
}
