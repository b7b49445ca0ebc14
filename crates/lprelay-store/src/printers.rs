// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer CRUD and system-default management.
//
// The uniqueness rules (barcode, one default per (group, format) scope)
// and the group-tree rules are explicit checks run before every write,
// returning a validation error instead of a bare constraint failure.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, instrument};

use lprelay_core::error::{LprelayError, Result};
use lprelay_core::types::{Printer, PrinterId, ReportFormat};

use crate::store::{PRINTER_COLUMNS, PrintStore, row_to_printer};

impl PrintStore {
    /// Insert a new printer or printer group.
    #[instrument(skip(self, printer), fields(printer = %printer.name))]
    pub fn insert_printer(&self, printer: &Printer) -> Result<()> {
        self.validate_printer(printer)?;

        self.conn
            .execute(
                "INSERT INTO printers (id, name, barcode, queue, format, is_default,
                 is_ephemeral, is_group, group_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    printer.id.to_string(),
                    printer.name,
                    printer.barcode,
                    printer.queue,
                    printer.format.as_str(),
                    printer.is_default,
                    printer.is_ephemeral,
                    printer.is_group,
                    printer.group_id.map(|g| g.to_string()),
                    printer.created_at.to_rfc3339(),
                    printer.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| LprelayError::Database(format!("insert printer: {e}")))?;

        info!(printer = %printer.name, "printer registered");
        Ok(())
    }

    /// Update an existing printer.
    ///
    /// Runs the same invariant checks as insertion and bumps `updated_at`.
    #[instrument(skip(self, printer), fields(printer_id = %printer.id))]
    pub fn update_printer(&self, printer: &Printer) -> Result<()> {
        self.validate_printer(printer)?;

        let rows = self
            .conn
            .execute(
                "UPDATE printers SET name = ?1, barcode = ?2, queue = ?3, format = ?4,
                 is_default = ?5, is_ephemeral = ?6, is_group = ?7, group_id = ?8,
                 updated_at = ?9
                 WHERE id = ?10",
                params![
                    printer.name,
                    printer.barcode,
                    printer.queue,
                    printer.format.as_str(),
                    printer.is_default,
                    printer.is_ephemeral,
                    printer.is_group,
                    printer.group_id.map(|g| g.to_string()),
                    Utc::now().to_rfc3339(),
                    printer.id.to_string(),
                ],
            )
            .map_err(|e| LprelayError::Database(format!("update printer: {e}")))?;

        if rows == 0 {
            return Err(LprelayError::PrinterNotFound(printer.id.to_string()));
        }

        debug!(printer = %printer.name, "printer updated");
        Ok(())
    }

    /// Delete a printer.  Children of a deleted group and any preference
    /// rows go with it.  Deleting an unknown id is a no-op.
    #[instrument(skip(self), fields(printer_id = %printer_id))]
    pub fn delete_printer(&self, printer_id: &PrinterId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM printers WHERE id = ?1",
                params![printer_id.to_string()],
            )
            .map_err(|e| LprelayError::Database(format!("delete printer: {e}")))?;

        info!(printer_id = %printer_id, "printer deleted");
        Ok(())
    }

    /// Retrieve a single printer by id, `None` if it does not exist.
    pub fn get_printer(&self, printer_id: &PrinterId) -> Result<Option<Printer>> {
        let printer = self
            .conn
            .query_row(
                &format!("SELECT {PRINTER_COLUMNS} FROM printers WHERE id = ?1"),
                params![printer_id.to_string()],
                row_to_printer,
            )
            .optional()
            .map_err(|e| LprelayError::Database(format!("get printer: {e}")))?;

        match printer {
            Some(printer) => Ok(Some(self.with_full_name(printer)?)),
            None => Ok(None),
        }
    }

    /// Look a printer up by its barcode.
    pub fn printer_by_barcode(&self, barcode: &str) -> Result<Option<Printer>> {
        let printer = self
            .conn
            .query_row(
                &format!("SELECT {PRINTER_COLUMNS} FROM printers WHERE barcode = ?1"),
                params![barcode],
                row_to_printer,
            )
            .optional()
            .map_err(|e| LprelayError::Database(format!("printer by barcode: {e}")))?;

        match printer {
            Some(printer) => Ok(Some(self.with_full_name(printer)?)),
            None => Ok(None),
        }
    }

    /// All printers and groups, ordered by name.
    pub fn all_printers(&self) -> Result<Vec<Printer>> {
        self.select_printers(
            &format!("SELECT {PRINTER_COLUMNS} FROM printers ORDER BY name"),
            params![],
        )
    }

    /// Direct children of a group, ordered by name.
    pub fn children_of(&self, group_id: &PrinterId) -> Result<Vec<Printer>> {
        self.select_printers(
            &format!("SELECT {PRINTER_COLUMNS} FROM printers WHERE group_id = ?1 ORDER BY name"),
            params![group_id.to_string()],
        )
    }

    /// Ungrouped system default printers, optionally restricted to a format.
    pub fn ungrouped_defaults(&self, format: Option<ReportFormat>) -> Result<Vec<Printer>> {
        match format {
            Some(format) => self.select_printers(
                &format!(
                    "SELECT {PRINTER_COLUMNS} FROM printers
                     WHERE is_default = 1 AND group_id IS NULL AND format = ?1
                     ORDER BY name"
                ),
                params![format.as_str()],
            ),
            None => self.select_printers(
                &format!(
                    "SELECT {PRINTER_COLUMNS} FROM printers
                     WHERE is_default = 1 AND group_id IS NULL
                     ORDER BY name"
                ),
                params![],
            ),
        }
    }

    /// Make `printer_id` the system default for its (group, format) scope.
    ///
    /// Any previous default in the same scope is demoted in the same
    /// transaction, so the scope never holds two defaults.
    #[instrument(skip(self), fields(printer_id = %printer_id))]
    pub fn set_system_default(&mut self, printer_id: &PrinterId) -> Result<()> {
        let printer = self
            .get_printer(printer_id)?
            .ok_or_else(|| LprelayError::PrinterNotFound(printer_id.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| LprelayError::Database(format!("begin set default: {e}")))?;

        tx.execute(
            "UPDATE printers SET is_default = 0, updated_at = ?1
             WHERE is_default = 1 AND format = ?2 AND group_id IS ?3",
            params![
                now,
                printer.format.as_str(),
                printer.group_id.map(|g| g.to_string()),
            ],
        )
        .map_err(|e| LprelayError::Database(format!("demote default: {e}")))?;

        tx.execute(
            "UPDATE printers SET is_default = 1, updated_at = ?1 WHERE id = ?2",
            params![now, printer_id.to_string()],
        )
        .map_err(|e| LprelayError::Database(format!("set default: {e}")))?;

        tx.commit()
            .map_err(|e| LprelayError::Database(format!("commit set default: {e}")))?;

        info!(printer = %printer.full_name, "system default printer set");
        Ok(())
    }

    /// Clear the system default flag of `printer_id`.
    #[instrument(skip(self), fields(printer_id = %printer_id))]
    pub fn clear_system_default(&self, printer_id: &PrinterId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE printers SET is_default = 0, updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), printer_id.to_string()],
            )
            .map_err(|e| LprelayError::Database(format!("clear default: {e}")))?;

        info!(printer_id = %printer_id, "system default cleared");
        Ok(())
    }

    fn select_printers(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Printer>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| LprelayError::Database(format!("prepare printers query: {e}")))?;

        let printers = stmt
            .query_map(params, row_to_printer)
            .map_err(|e| LprelayError::Database(format!("query printers: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LprelayError::Database(format!("collect printers: {e}")))?;

        printers
            .into_iter()
            .map(|printer| self.with_full_name(printer))
            .collect()
    }

    /// Invariant checks shared by insert and update.
    fn validate_printer(&self, printer: &Printer) -> Result<()> {
        if let Some(barcode) = &printer.barcode {
            let clash: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM printers WHERE barcode = ?1 AND id != ?2",
                    params![barcode, printer.id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| LprelayError::Database(format!("barcode check: {e}")))?;
            if clash.is_some() {
                return Err(LprelayError::DuplicateBarcode(barcode.clone()));
            }
        }

        if let Some(group_id) = &printer.group_id {
            let Some(group) = self.get_printer(group_id)? else {
                return Err(LprelayError::PrinterNotFound(group_id.to_string()));
            };
            if !group.is_group {
                return Err(LprelayError::NotAGroup(group.name));
            }
            self.check_acyclic(printer, *group_id)?;
        }

        if !printer.is_group && self.has_children(&printer.id)? {
            return Err(LprelayError::NotAGroup(printer.name.clone()));
        }

        if printer.is_default {
            let clash: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM printers
                     WHERE is_default = 1 AND format = ?1 AND group_id IS ?2 AND id != ?3",
                    params![
                        printer.format.as_str(),
                        printer.group_id.map(|g| g.to_string()),
                        printer.id.to_string(),
                    ],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| LprelayError::Database(format!("default check: {e}")))?;
            if clash.is_some() {
                return Err(LprelayError::DuplicateDefault(
                    self.default_scope(printer)?,
                ));
            }
        }

        Ok(())
    }

    /// Reject a `group_id` assignment that would close a cycle.
    fn check_acyclic(&self, printer: &Printer, group_id: PrinterId) -> Result<()> {
        let mut seen: HashSet<PrinterId> = HashSet::new();
        let mut cursor = Some(group_id);
        while let Some(ancestor) = cursor {
            if ancestor == printer.id {
                return Err(LprelayError::GroupCycle(printer.name.clone()));
            }
            if !seen.insert(ancestor) {
                // Pre-existing cycle above us; surface it rather than loop.
                return Err(LprelayError::GroupCycle(ancestor.to_string()));
            }
            cursor = match self.conn
                .query_row(
                    "SELECT group_id FROM printers WHERE id = ?1",
                    params![ancestor.to_string()],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()
                .map_err(|e| LprelayError::Database(format!("ancestor lookup: {e}")))?
                .flatten()
            {
                Some(raw) => Some(
                    crate::store::parse_printer_id(&raw)
                        .map_err(|e| LprelayError::Database(format!("ancestor id: {e}")))?,
                ),
                None => None,
            };
        }
        Ok(())
    }

    fn has_children(&self, printer_id: &PrinterId) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM printers WHERE group_id = ?1",
                params![printer_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| LprelayError::Database(format!("children count: {e}")))?;
        Ok(count > 0)
    }

    /// Human description of a printer's default scope for error messages.
    fn default_scope(&self, printer: &Printer) -> Result<String> {
        Ok(match printer.group_id {
            Some(group_id) => match self.get_printer(&group_id)? {
                Some(group) => {
                    format!("{} printers in {}", printer.format.label(), group.full_name)
                }
                None => format!("{} printers", printer.format.label()),
            },
            None => format!("ungrouped {} printers", printer.format.label()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer(store: &PrintStore, name: &str, queue: &str, format: ReportFormat) -> Printer {
        let mut printer = Printer::new(name, format);
        printer.queue = Some(queue.to_string());
        store.insert_printer(&printer).expect("insert printer");
        printer
    }

    fn group(store: &PrintStore, name: &str) -> Printer {
        let group = Printer::new_group(name);
        store.insert_printer(&group).expect("insert group");
        group
    }

    #[test]
    fn insert_and_retrieve_printer() {
        let store = PrintStore::open_in_memory().expect("open");
        let mut laser = Printer::new("Laser", ReportFormat::Pdf);
        laser.queue = Some("laser".into());
        laser.barcode = Some("LASER01".into());
        store.insert_printer(&laser).expect("insert");

        let found = store.get_printer(&laser.id).expect("get").expect("found");
        assert_eq!(found.name, "Laser");
        assert_eq!(found.queue.as_deref(), Some("laser"));
        assert_eq!(found.barcode.as_deref(), Some("LASER01"));
        assert_eq!(found.format, ReportFormat::Pdf);
        assert_eq!(found.full_name, "Laser");
    }

    #[test]
    fn get_nonexistent_printer_returns_none() {
        let store = PrintStore::open_in_memory().expect("open");
        assert!(store.get_printer(&PrinterId::new()).expect("get").is_none());
    }

    #[test]
    fn barcode_must_be_unique() {
        let store = PrintStore::open_in_memory().expect("open");
        let mut dotmatrix = Printer::new("Dot matrix", ReportFormat::Pdf);
        dotmatrix.barcode = Some("DOTMATRIX".into());
        store.insert_printer(&dotmatrix).expect("insert");

        let mut plotter = Printer::new("Plotter", ReportFormat::Pdf);
        plotter.barcode = Some("DOTMATRIX".into());
        let err = store.insert_printer(&plotter).unwrap_err();
        assert!(matches!(err, LprelayError::DuplicateBarcode(b) if b == "DOTMATRIX"));
    }

    #[test]
    fn lookup_by_barcode() {
        let store = PrintStore::open_in_memory().expect("open");
        let mut dotmatrix = Printer::new("Dot matrix", ReportFormat::Cpcl);
        dotmatrix.barcode = Some("DOTMATRIX".into());
        store.insert_printer(&dotmatrix).expect("insert");

        let found = store
            .printer_by_barcode("DOTMATRIX")
            .expect("lookup")
            .expect("found");
        assert_eq!(found.id, dotmatrix.id);
        assert!(store.printer_by_barcode("NOPE").expect("lookup").is_none());
    }

    #[test]
    fn group_reference_must_be_a_group() {
        let store = PrintStore::open_in_memory().expect("open");
        let plotter = printer(&store, "Plotter", "plotter", ReportFormat::Pdf);

        let mut dotmatrix = Printer::new("Dot matrix", ReportFormat::Pdf);
        dotmatrix.group_id = Some(plotter.id);
        let err = store.insert_printer(&dotmatrix).unwrap_err();
        assert!(matches!(err, LprelayError::NotAGroup(name) if name == "Plotter"));
    }

    #[test]
    fn group_with_children_cannot_clear_is_group() {
        let store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");

        let mut dotmatrix = Printer::new("Dot matrix", ReportFormat::Pdf);
        dotmatrix.group_id = Some(upstairs.id);
        store.insert_printer(&dotmatrix).expect("insert");

        let mut demoted = upstairs.clone();
        demoted.is_group = false;
        let err = store.update_printer(&demoted).unwrap_err();
        assert!(matches!(err, LprelayError::NotAGroup(name) if name == "Upstairs"));
    }

    #[test]
    fn full_name_follows_group_chain() {
        let store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");
        let mut downstairs = Printer::new_group("Downstairs");
        store.insert_printer(&downstairs).expect("insert");

        let mut dotmatrix = Printer::new("Dot matrix", ReportFormat::Pdf);
        store.insert_printer(&dotmatrix).expect("insert");
        assert_eq!(
            store.get_printer(&dotmatrix.id).unwrap().unwrap().full_name,
            "Dot matrix"
        );

        dotmatrix.group_id = Some(downstairs.id);
        store.update_printer(&dotmatrix).expect("regroup");
        assert_eq!(
            store.get_printer(&dotmatrix.id).unwrap().unwrap().full_name,
            "Downstairs / Dot matrix"
        );

        downstairs.group_id = Some(upstairs.id);
        store.update_printer(&downstairs).expect("regroup");
        assert_eq!(
            store.get_printer(&dotmatrix.id).unwrap().unwrap().full_name,
            "Upstairs / Downstairs / Dot matrix"
        );
    }

    #[test]
    fn group_cycle_is_rejected() {
        let store = PrintStore::open_in_memory().expect("open");
        let mut upstairs = group(&store, "Upstairs");
        let mut downstairs = Printer::new_group("Downstairs");
        downstairs.group_id = Some(upstairs.id);
        store.insert_printer(&downstairs).expect("insert");

        upstairs.group_id = Some(downstairs.id);
        let err = store.update_printer(&upstairs).unwrap_err();
        assert!(matches!(err, LprelayError::GroupCycle(_)));
    }

    #[test]
    fn set_system_default_demotes_previous_in_scope() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", "laser", ReportFormat::Pdf);
        let inkjet = printer(&store, "Inkjet", "inkjet", ReportFormat::Pdf);

        store.set_system_default(&laser.id).expect("set laser");
        store.set_system_default(&inkjet.id).expect("set inkjet");

        assert!(!store.get_printer(&laser.id).unwrap().unwrap().is_default);
        assert!(store.get_printer(&inkjet.id).unwrap().unwrap().is_default);
        let defaults = store.ungrouped_defaults(None).expect("defaults");
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, inkjet.id);
    }

    #[test]
    fn system_default_is_scoped_per_format() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", "laser", ReportFormat::Pdf);
        let dotmatrix = printer(&store, "Dot matrix", "dotmatrix", ReportFormat::Cpcl);

        store.set_system_default(&laser.id).expect("set laser");
        store.set_system_default(&dotmatrix.id).expect("set dotmatrix");

        // Different formats are different scopes; both stay default.
        assert!(store.get_printer(&laser.id).unwrap().unwrap().is_default);
        assert!(store.get_printer(&dotmatrix.id).unwrap().unwrap().is_default);
        assert_eq!(
            store.ungrouped_defaults(Some(ReportFormat::Pdf)).unwrap()[0].id,
            laser.id
        );
    }

    #[test]
    fn system_default_is_scoped_per_group() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");
        let downstairs = group(&store, "Downstairs");

        let mut dotmatrix = Printer::new("Dot matrix", ReportFormat::Pdf);
        dotmatrix.group_id = Some(upstairs.id);
        store.insert_printer(&dotmatrix).expect("insert");
        let mut laser = Printer::new("Laser", ReportFormat::Pdf);
        laser.group_id = Some(downstairs.id);
        store.insert_printer(&laser).expect("insert");

        store.set_system_default(&dotmatrix.id).expect("set");
        store.set_system_default(&laser.id).expect("set");

        assert!(store.get_printer(&dotmatrix.id).unwrap().unwrap().is_default);
        assert!(store.get_printer(&laser.id).unwrap().unwrap().is_default);
    }

    #[test]
    fn duplicate_default_insert_is_rejected() {
        let store = PrintStore::open_in_memory().expect("open");
        let mut laser = Printer::new("Laser", ReportFormat::Pdf);
        laser.is_default = true;
        store.insert_printer(&laser).expect("insert");

        let mut inkjet = Printer::new("Inkjet", ReportFormat::Pdf);
        inkjet.is_default = true;
        let err = store.insert_printer(&inkjet).unwrap_err();
        assert!(matches!(err, LprelayError::DuplicateDefault(_)));
    }

    #[test]
    fn clear_system_default() {
        let mut store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", "laser", ReportFormat::Pdf);
        store.set_system_default(&laser.id).expect("set");
        store.clear_system_default(&laser.id).expect("clear");
        assert!(store.ungrouped_defaults(None).expect("defaults").is_empty());
    }

    #[test]
    fn deleting_a_group_cascades_to_children() {
        let store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");
        let mut dotmatrix = Printer::new("Dot matrix", ReportFormat::Pdf);
        dotmatrix.group_id = Some(upstairs.id);
        store.insert_printer(&dotmatrix).expect("insert");

        store.delete_printer(&upstairs.id).expect("delete");
        assert!(store.get_printer(&dotmatrix.id).expect("get").is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = PrintStore::open_in_memory().expect("open");
        let laser = printer(&store, "Laser", "laser", ReportFormat::Pdf);
        store.delete_printer(&laser.id).expect("delete");
        store.delete_printer(&laser.id).expect("delete again");
    }

    #[test]
    fn update_nonexistent_printer_fails() {
        let store = PrintStore::open_in_memory().expect("open");
        let ghost = Printer::new("Ghost", ReportFormat::Pdf);
        let err = store.update_printer(&ghost).unwrap_err();
        assert!(matches!(err, LprelayError::PrinterNotFound(_)));
    }

    #[test]
    fn children_of_lists_direct_children_by_name() {
        let store = PrintStore::open_in_memory().expect("open");
        let upstairs = group(&store, "Upstairs");
        for name in ["Zebra", "Alpha"] {
            let mut child = Printer::new(name, ReportFormat::Pdf);
            child.group_id = Some(upstairs.id);
            store.insert_printer(&child).expect("insert");
        }

        let children = store.children_of(&upstairs.id).expect("children");
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Zebra"]);
        assert_eq!(children[0].full_name, "Upstairs / Alpha");
    }
}
