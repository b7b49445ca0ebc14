// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lprelay Print — printer resolution, lpr spooling, report dispatch, and
// strategy-driven print actions.  This crate bridges the stored printer
// registry and the rendering collaborator to the operating system's print
// spooler.

pub mod dispatch;
pub mod report;
pub mod resolve;
pub mod spool;
pub mod strategy;

pub use dispatch::PrintDispatcher;
pub use report::{Renderer, ReportDef, ReportRef, ReportRegistry};
pub use resolve::PrinterResolver;
pub use spool::Spooler;
pub use strategy::PrintAction;
