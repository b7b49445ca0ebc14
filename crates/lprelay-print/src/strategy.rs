// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Strategy-driven print actions.
//
// A print action, run against a context record, executes every strategy
// registered for the record's type: enabled strategies select their
// target records and spool the strategy's report to the strategy's
// printer (or whatever the resolver picks when none is bound).

use tracing::info;
use uuid::Uuid;

use lprelay_core::RelayConfig;
use lprelay_core::error::Result;
use lprelay_core::types::{PrintStrategy, PrinterId, UserId};

use crate::dispatch::PrintDispatcher;
use crate::report::ReportRef;

/// Selects the records a strategy renders for a context record.
/// Returning `None` skips the strategy.
pub type RecordSelector<'s> = dyn Fn(&PrintStrategy, Uuid) -> Option<Vec<Uuid>> + 's;

/// Runs the print strategies registered for a record type.
pub struct PrintAction<'a> {
    dispatcher: &'a PrintDispatcher<'a>,
    config: &'a RelayConfig,
}

impl<'a> PrintAction<'a> {
    pub fn new(dispatcher: &'a PrintDispatcher<'a>, config: &'a RelayConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Run all strategies for `model` against `record`, printing each
    /// strategy's report for the record itself.
    pub fn run(&self, user: Option<&UserId>, model: &str, record: Uuid) -> Result<()> {
        self.run_with(user, model, record, &|_, record| Some(vec![record]))
    }

    /// Run all strategies for `model` with a custom record selector.
    pub fn run_with(
        &self,
        user: Option<&UserId>,
        model: &str,
        record: Uuid,
        selector: &RecordSelector<'_>,
    ) -> Result<()> {
        for strategy in self.dispatcher.store().strategies_for_model(model)? {
            info!(strategy = %strategy.name, model, record = %record, "executing print strategy");
            if !strategy.enabled(self.config) {
                continue;
            }
            let Some(targets) = selector(&strategy, record) else {
                continue;
            };
            if targets.is_empty() {
                info!(strategy = %strategy.name, "strategy selected no records, skipping");
                continue;
            }
            let explicit: Vec<PrinterId> = strategy.printer_id.into_iter().collect();
            self.dispatcher.spool_report(
                user,
                &explicit,
                &targets,
                ReportRef::Name(strategy.report_name.clone()),
                None,
                None,
                1,
            )?;
        }
        Ok(())
    }
}
