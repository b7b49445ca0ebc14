// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lprelay Store — SQLite-backed registry for printers (including group
// trees and system defaults), per-user default-printer preferences, and
// print strategies.  Entity invariants (unique barcodes, one default per
// scope, one preference per scope, acyclic groups) are enforced in the
// write path before commit.

mod prefs;
mod printers;
mod store;
mod strategies;

pub use store::PrintStore;
