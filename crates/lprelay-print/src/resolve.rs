// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer resolution.
//
// Maps a request context — explicit selection, user preference, system
// default, required format — down to concrete (non-group) printers.
// Groups are iteratively replaced by the user's preferred children or,
// failing that, their default children.

use std::collections::HashSet;

use tracing::debug;

use lprelay_core::error::{LprelayError, Result};
use lprelay_core::types::{Printer, PrinterId, ReportFormat, UserId};
use lprelay_store::PrintStore;

/// Resolves request context down to concrete printers.
pub struct PrinterResolver<'a> {
    store: &'a PrintStore,
    user: Option<UserId>,
}

impl<'a> PrinterResolver<'a> {
    /// Resolver with no requesting user (system context).
    pub fn new(store: &'a PrintStore) -> Self {
        Self { store, user: None }
    }

    /// Resolver consulting `user`'s preferences.
    pub fn for_user(store: &'a PrintStore, user: UserId) -> Self {
        Self {
            store,
            user: Some(user),
        }
    }

    /// Determine the printers to use.
    ///
    /// A non-empty `explicit` selection wins; otherwise the user's
    /// ungrouped preference for `format`, otherwise the ungrouped system
    /// defaults.  An explicit selection that matches nothing resolves
    /// empty rather than falling back to preferences or defaults.
    ///
    /// When `required` is set, an empty result is an error naming the
    /// format (when one was given).
    pub fn resolve(
        &self,
        explicit: &[PrinterId],
        format: Option<ReportFormat>,
        required: bool,
    ) -> Result<Vec<Printer>> {
        let prefs = match &self.user {
            Some(user) => self.store.user_preferences(user)?,
            None => Vec::new(),
        };

        let mut candidates = self.starting_set(explicit, format)?;
        dedup_printers(&mut candidates);

        // Iteratively reduce groups to their preferred or default
        // children.  Group membership is a tree; the visited set stops a
        // corrupted store from looping forever.
        let mut visited: HashSet<PrinterId> = HashSet::new();
        while candidates.iter().any(|p| p.is_group) {
            let mut next = Vec::new();
            for printer in candidates {
                if !printer.is_group {
                    next.push(printer);
                    continue;
                }
                if !visited.insert(printer.id) {
                    return Err(LprelayError::GroupCycle(printer.full_name));
                }
                let children = self.store.children_of(&printer.id)?;
                let preferred: Vec<Printer> = children
                    .iter()
                    .filter(|child| prefs.iter().any(|pref| pref.id == child.id))
                    .cloned()
                    .collect();
                if preferred.is_empty() {
                    next.extend(children.into_iter().filter(|child| child.is_default));
                } else {
                    next.extend(preferred);
                }
            }
            candidates = next;
            dedup_printers(&mut candidates);
        }

        if let Some(format) = format {
            candidates.retain(|p| p.format == format);
        }

        if required && candidates.is_empty() {
            return Err(match format {
                Some(format) => LprelayError::NoPrinterForFormat(format.label().to_string()),
                None => LprelayError::NoPrinter,
            });
        }

        debug!(count = candidates.len(), "printers resolved");
        Ok(candidates)
    }

    /// The initial candidate set, before group expansion.
    fn starting_set(
        &self,
        explicit: &[PrinterId],
        format: Option<ReportFormat>,
    ) -> Result<Vec<Printer>> {
        if !explicit.is_empty() {
            let mut printers = Vec::with_capacity(explicit.len());
            for id in explicit {
                let printer = self
                    .store
                    .get_printer(id)?
                    .ok_or_else(|| LprelayError::PrinterNotFound(id.to_string()))?;
                printers.push(printer);
            }
            if let Some(format) = format {
                // Groups stay; their children are filtered after expansion.
                printers.retain(|p| p.is_group || p.format == format);
            }
            return Ok(printers);
        }

        if let Some(user) = &self.user {
            if let Some(preference) = self.store.user_preference(user, format)? {
                return Ok(vec![preference]);
            }
        }

        self.store.ungrouped_defaults(format)
    }
}

/// Order-preserving dedup by printer id.
fn dedup_printers(printers: &mut Vec<Printer>) {
    let mut seen = HashSet::new();
    printers.retain(|p| seen.insert(p.id));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer(store: &PrintStore, name: &str, format: ReportFormat) -> Printer {
        let mut printer = Printer::new(name, format);
        printer.queue = Some(name.to_lowercase());
        store.insert_printer(&printer).expect("insert printer");
        printer
    }

    fn group(store: &PrintStore, name: &str) -> Printer {
        let group = Printer::new_group(name);
        store.insert_printer(&group).expect("insert group");
        group
    }

    fn member(store: &PrintStore, name: &str, format: ReportFormat, group: &Printer) -> Printer {
        let mut printer = Printer::new(name, format);
        printer.group_id = Some(group.id);
        store.insert_printer(&printer).expect("insert member");
        printer
    }

    fn ids(printers: &[Printer]) -> Vec<PrinterId> {
        printers.iter().map(|p| p.id).collect()
    }

    #[test]
    fn falls_back_to_system_default() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", ReportFormat::Pdf);
        store.set_system_default(&laser.id).expect("set default");

        let resolved = PrinterResolver::new(&store)
            .resolve(&[], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [laser.id]);
    }

    #[test]
    fn user_default_wins_over_system_default() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", ReportFormat::Pdf);
        let inkjet = printer(&store, "Inkjet", ReportFormat::Pdf);
        store.set_system_default(&laser.id).expect("set default");

        let alice = UserId::new();
        let bob = UserId::new();
        store.set_user_default(&alice, &inkjet.id).expect("set");

        let for_alice = PrinterResolver::for_user(&store, alice)
            .resolve(&[], None, true)
            .expect("resolve");
        assert_eq!(ids(&for_alice), [inkjet.id]);

        let for_bob = PrinterResolver::for_user(&store, bob)
            .resolve(&[], None, true)
            .expect("resolve");
        assert_eq!(ids(&for_bob), [laser.id]);
    }

    #[test]
    fn clearing_user_default_restores_system_default() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", ReportFormat::Pdf);
        let inkjet = printer(&store, "Inkjet", ReportFormat::Pdf);
        store.set_system_default(&laser.id).expect("set default");

        let alice = UserId::new();
        store.set_user_default(&alice, &inkjet.id).expect("set");
        store.clear_user_default(&alice, &inkjet.id).expect("clear");

        let resolved = PrinterResolver::for_user(&store, alice)
            .resolve(&[], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [laser.id]);
    }

    #[test]
    fn no_printer_is_an_error_when_required() {
        let store = PrintStore::open_in_memory().expect("open");
        let err = PrinterResolver::new(&store)
            .resolve(&[], None, true)
            .unwrap_err();
        assert!(matches!(err, LprelayError::NoPrinter));

        let err = PrinterResolver::new(&store)
            .resolve(&[], Some(ReportFormat::Cpcl), true)
            .unwrap_err();
        match err {
            LprelayError::NoPrinterForFormat(label) => assert_eq!(label, "CPCL/XML"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_result_is_fine_when_not_required() {
        let store = PrintStore::open_in_memory().expect("open");
        let resolved = PrinterResolver::new(&store)
            .resolve(&[], None, false)
            .expect("resolve");
        assert!(resolved.is_empty());
    }

    #[test]
    fn explicit_selection_wins() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", ReportFormat::Pdf);
        let inkjet = printer(&store, "Inkjet", ReportFormat::Pdf);
        store.set_system_default(&laser.id).expect("set default");

        let resolved = PrinterResolver::new(&store)
            .resolve(&[inkjet.id], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [inkjet.id]);
    }

    #[test]
    fn explicit_selection_filters_to_matching_format() {
        let store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", ReportFormat::Pdf);
        let dotmatrix = printer(&store, "Dot matrix", ReportFormat::Cpcl);

        let resolved = PrinterResolver::new(&store)
            .resolve(&[laser.id, dotmatrix.id], Some(ReportFormat::Cpcl), true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [dotmatrix.id]);
    }

    #[test]
    fn non_matching_explicit_selection_does_not_fall_back() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", ReportFormat::Pdf);
        let dotmatrix = printer(&store, "Dot matrix", ReportFormat::Cpcl);
        store.set_system_default(&dotmatrix.id).expect("set default");

        // The system has a CPCL default, but the explicit selection only
        // holds a PDF printer: resolution stays empty.
        let err = PrinterResolver::new(&store)
            .resolve(&[laser.id], Some(ReportFormat::Cpcl), true)
            .unwrap_err();
        assert!(matches!(err, LprelayError::NoPrinterForFormat(_)));

        let resolved = PrinterResolver::new(&store)
            .resolve(&[laser.id], Some(ReportFormat::Cpcl), false)
            .expect("resolve");
        assert!(resolved.is_empty());
    }

    #[test]
    fn unknown_explicit_printer_is_an_error() {
        let store = PrintStore::open_in_memory().expect("open");
        let err = PrinterResolver::new(&store)
            .resolve(&[PrinterId::new()], None, true)
            .unwrap_err();
        assert!(matches!(err, LprelayError::PrinterNotFound(_)));
    }

    #[test]
    fn groups_reduce_to_default_children() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");
        let downstairs = group(&store, "Downstairs");
        let dotmatrix = member(&store, "Dot matrix", ReportFormat::Pdf, &upstairs);
        let _plotter = member(&store, "Plotter", ReportFormat::Pdf, &upstairs);
        let _laser = member(&store, "Laser", ReportFormat::Pdf, &downstairs);
        let inkjet = member(&store, "Inkjet", ReportFormat::Pdf, &downstairs);

        // No defaults yet: groups resolve to nothing.
        let resolver = PrinterResolver::new(&store);
        assert!(resolver.resolve(&[upstairs.id], None, false).expect("resolve").is_empty());

        store.set_system_default(&dotmatrix.id).expect("set");
        store.set_system_default(&inkjet.id).expect("set");

        let resolver = PrinterResolver::new(&store);
        assert_eq!(
            ids(&resolver.resolve(&[upstairs.id], None, true).expect("resolve")),
            [dotmatrix.id]
        );
        assert_eq!(
            ids(&resolver.resolve(&[downstairs.id], None, true).expect("resolve")),
            [inkjet.id]
        );
    }

    #[test]
    fn user_preference_beats_group_default() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");
        let dotmatrix = member(&store, "Dot matrix", ReportFormat::Pdf, &upstairs);
        let plotter = member(&store, "Plotter", ReportFormat::Pdf, &upstairs);
        store.set_system_default(&dotmatrix.id).expect("set");

        let alice = UserId::new();
        store.set_user_default(&alice, &plotter.id).expect("set");

        let resolved = PrinterResolver::for_user(&store, alice)
            .resolve(&[upstairs.id], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [plotter.id]);

        // A user without a preference still gets the group default.
        let resolved = PrinterResolver::for_user(&store, UserId::new())
            .resolve(&[upstairs.id], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [dotmatrix.id]);
    }

    #[test]
    fn grouped_user_preference_expands_from_ungrouped_group_preference() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let downstairs = group(&store, "Downstairs");
        let _laser = member(&store, "Laser", ReportFormat::Pdf, &downstairs);
        let inkjet = member(&store, "Inkjet", ReportFormat::Pdf, &downstairs);

        // Bob prefers the Downstairs group itself, plus one of its members.
        let bob = UserId::new();
        store.set_user_default(&bob, &inkjet.id).expect("set member");
        store.set_user_default(&bob, &downstairs.id).expect("set group");

        let resolved = PrinterResolver::for_user(&store, bob)
            .resolve(&[], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [inkjet.id]);
    }

    #[test]
    fn nested_groups_terminate() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let building = group(&store, "Building");
        let mut floor = Printer::new_group("Floor");
        floor.group_id = Some(building.id);
        floor.is_default = true;
        store.insert_printer(&floor).expect("insert");

        let mut laser = Printer::new("Laser", ReportFormat::Pdf);
        laser.group_id = Some(floor.id);
        store.insert_printer(&laser).expect("insert");
        store.set_system_default(&laser.id).expect("set");

        let resolved = PrinterResolver::new(&store)
            .resolve(&[building.id], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [laser.id]);
        assert!(resolved.iter().all(|p| !p.is_group));
    }

    #[test]
    fn duplicate_explicit_entries_resolve_once() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");
        let dotmatrix = member(&store, "Dot matrix", ReportFormat::Pdf, &upstairs);
        store.set_system_default(&dotmatrix.id).expect("set");

        let resolved = PrinterResolver::new(&store)
            .resolve(&[upstairs.id, upstairs.id, dotmatrix.id], None, true)
            .expect("resolve");
        assert_eq!(ids(&resolved), [dotmatrix.id]);
    }

    #[test]
    fn all_ungrouped_defaults_resolve_without_format() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", ReportFormat::Pdf);
        let dotmatrix = printer(&store, "Dot matrix", ReportFormat::Cpcl);
        store.set_system_default(&laser.id).expect("set");
        store.set_system_default(&dotmatrix.id).expect("set");

        let resolved = PrinterResolver::new(&store)
            .resolve(&[], None, true)
            .expect("resolve");
        let mut resolved_ids = ids(&resolved);
        resolved_ids.sort();
        let mut expected = vec![laser.id, dotmatrix.id];
        expected.sort();
        assert_eq!(resolved_ids, expected);
    }

    #[test]
    fn cycle_in_corrupted_store_is_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.db");

        let (upstairs_id, downstairs_id);
        {
            let store = PrintStore::open(&path).expect("open");
            let upstairs = group(&store, "Upstairs");
            let mut downstairs = Printer::new_group("Downstairs");
            downstairs.group_id = Some(upstairs.id);
            store.insert_printer(&downstairs).expect("insert");
            upstairs_id = upstairs.id;
            downstairs_id = downstairs.id;
        }

        // Close the cycle behind the store's back.
        {
            let conn = rusqlite::Connection::open(&path).expect("raw open");
            conn.execute(
                "UPDATE printers SET group_id = ?1 WHERE id = ?2",
                rusqlite::params![downstairs_id.to_string(), upstairs_id.to_string()],
            )
            .expect("corrupt");
        }

        let store = PrintStore::open(&path).expect("reopen");
        let err = PrinterResolver::new(&store)
            .resolve(&[upstairs_id], None, false)
            .unwrap_err();
        assert!(matches!(err, LprelayError::GroupCycle(_)));
    }
}
