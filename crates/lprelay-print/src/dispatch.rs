// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Report dispatch.
//
// Renders each required format once and routes the rendered document to
// every printer resolved for that format.  A job runs render → resolve →
// spool to completion before returning; nothing is queued.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use lprelay_core::error::{LprelayError, Result};
use lprelay_core::types::{Printer, PrinterId, ReportFormat, UserId};
use lprelay_store::PrintStore;

use crate::report::{Renderer, ReportDef, ReportRef, ReportRegistry};
use crate::resolve::PrinterResolver;
use crate::spool::Spooler;

/// Routes rendered reports to resolved printers.
pub struct PrintDispatcher<'a> {
    store: &'a PrintStore,
    registry: &'a ReportRegistry,
    renderer: &'a dyn Renderer,
    spooler: &'a Spooler,
}

impl<'a> PrintDispatcher<'a> {
    pub fn new(
        store: &'a PrintStore,
        registry: &'a ReportRegistry,
        renderer: &'a dyn Renderer,
        spooler: &'a Spooler,
    ) -> Self {
        Self {
            store,
            registry,
            renderer,
            spooler,
        }
    }

    pub fn store(&self) -> &PrintStore {
        self.store
    }

    /// Render `report` for `targets` and spool it to the printers resolved
    /// for `user` and `explicit`.
    ///
    /// The formats of the resolved printer set decide which report
    /// definitions are rendered; each format is rendered once, not once
    /// per printer.  With several formats in play, a format that cannot
    /// be resolved to a printer is dropped rather than failing the batch.
    #[instrument(skip_all, fields(targets = targets.len(), copies = copies))]
    pub fn spool_report(
        &self,
        user: Option<&UserId>,
        explicit: &[PrinterId],
        targets: &[Uuid],
        report: impl Into<ReportRef>,
        data: Option<&Value>,
        title: Option<&str>,
        copies: u32,
    ) -> Result<()> {
        let reports = self.resolve_reports(report.into())?;
        let resolver = self.resolver(user);

        let all = resolver.resolve(explicit, None, true)?;
        let required: BTreeSet<ReportFormat> = all.iter().map(|p| p.format).collect();
        let sole = required.len() == 1;

        let mut by_format: BTreeMap<ReportFormat, Vec<Printer>> = BTreeMap::new();
        for format in required {
            let printers = resolver.resolve(explicit, Some(format), sole)?;
            if printers.is_empty() {
                info!(format = format.label(), "no printer for format, dropped from batch");
                continue;
            }
            by_format.insert(format, printers);
        }

        let available: BTreeSet<ReportFormat> = reports.iter().map(|r| r.format).collect();
        let missing: Vec<&str> = by_format
            .keys()
            .filter(|format| !available.contains(format))
            .map(|format| format.label())
            .collect();
        if !missing.is_empty() {
            return Err(LprelayError::MissingReportTypes(missing.join(", ")));
        }

        // Render once per required format.
        let mut documents: BTreeMap<ReportFormat, (String, Vec<u8>)> = BTreeMap::new();
        for def in &reports {
            if !by_format.contains_key(&def.format) || documents.contains_key(&def.format) {
                continue;
            }
            let payload = render_data(def.format, data, copies);
            let document = self.renderer.render(def, targets, payload.as_ref())?;
            let job_title = match title {
                Some(title) => title.to_string(),
                None => format!("{} {:?}", def.name, targets),
            };
            debug!(
                report = %def.name,
                format = def.format.label(),
                document_sha256 = %hex::encode(Sha256::digest(&document)),
                "report rendered"
            );
            documents.insert(def.format, (job_title, document));
        }

        for (format, printers) in &by_format {
            let Some((job_title, document)) = documents.get(format) else {
                continue;
            };
            for printer in printers {
                self.spooler
                    .spool(printer, document, Some(job_title), copies)?;
            }
        }

        Ok(())
    }

    /// Print a test page on each resolved printer.
    pub fn spool_test_page(&self, user: Option<&UserId>, explicit: &[PrinterId]) -> Result<()> {
        let reports = self.registry.test_pages();
        if reports.is_empty() {
            return Err(LprelayError::ReportNotFound("printer test page".into()));
        }

        for printer in self.resolver(user).resolve(explicit, None, true)? {
            self.spool_report(
                user,
                &[printer.id],
                &[printer.id.0],
                reports.clone(),
                None,
                Some("Test page"),
                1,
            )?;
        }
        Ok(())
    }

    fn resolver(&self, user: Option<&UserId>) -> PrinterResolver<'a> {
        match user {
            Some(user) => PrinterResolver::for_user(self.store, *user),
            None => PrinterResolver::new(self.store),
        }
    }

    fn resolve_reports(&self, report: ReportRef) -> Result<Vec<ReportDef>> {
        match report {
            ReportRef::Defs(defs) if !defs.is_empty() => Ok(defs),
            ReportRef::Defs(_) => Err(LprelayError::ReportNotFound("(no definitions)".into())),
            ReportRef::Name(name) => {
                let defs = self.registry.lookup(&name);
                if defs.is_empty() {
                    Err(LprelayError::ReportNotFound(name))
                } else {
                    Ok(defs)
                }
            }
        }
    }
}

/// Render data for one format.
///
/// CPCL templates emit a print-quantity attribute, so the requested copy
/// count rides along in the render data; caller data takes precedence.
fn render_data(format: ReportFormat, data: Option<&Value>, copies: u32) -> Option<Value> {
    if format != ReportFormat::Cpcl {
        return data.cloned();
    }
    let mut map = Map::new();
    map.insert("copies".to_string(), Value::from(copies));
    match data {
        Some(Value::Object(extra)) => map.extend(extra.clone()),
        // Non-object payloads pass through untouched.
        Some(other) => return Some(other.clone()),
        None => {}
    }
    Some(Value::Object(map))
}
