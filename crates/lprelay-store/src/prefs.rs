// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-user default-printer preferences.
//
// A user holds at most one preferred printer per (group, format) pair.
// `set_user_default` replaces within that scope; `add_user_preference` is
// the strict variant that refuses a conflicting preference.

use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, instrument};

use lprelay_core::error::{LprelayError, Result};
use lprelay_core::types::{Printer, PrinterId, ReportFormat, UserId};

use crate::store::{PRINTER_COLUMNS, PrintStore, row_to_printer};

impl PrintStore {
    /// Add `printer_id` to the user's preferences.
    ///
    /// Fails with a validation error when the user already prefers another
    /// printer in the same (group, format) scope.  Re-adding the same
    /// printer is a no-op.
    #[instrument(skip(self), fields(user = %user, printer_id = %printer_id))]
    pub fn add_user_preference(&self, user: &UserId, printer_id: &PrinterId) -> Result<()> {
        let printer = self
            .get_printer(printer_id)?
            .ok_or_else(|| LprelayError::PrinterNotFound(printer_id.to_string()))?;

        let conflict: Option<String> = self
            .conn
            .query_row(
                "SELECT p.name FROM printers p
                 JOIN user_printers up ON up.printer_id = p.id
                 WHERE up.user_id = ?1 AND p.group_id IS ?2 AND p.format = ?3
                   AND p.id != ?4",
                params![
                    user.to_string(),
                    printer.group_id.map(|g| g.to_string()),
                    printer.format.as_str(),
                    printer_id.to_string(),
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LprelayError::Database(format!("preference check: {e}")))?;
        if conflict.is_some() {
            return Err(LprelayError::DuplicatePreference);
        }

        self.conn
            .execute(
                "INSERT OR IGNORE INTO user_printers (user_id, printer_id) VALUES (?1, ?2)",
                params![user.to_string(), printer_id.to_string()],
            )
            .map_err(|e| LprelayError::Database(format!("add preference: {e}")))?;

        debug!(printer = %printer.full_name, "user preference added");
        Ok(())
    }

    /// Make `printer_id` the user's default within its (group, format)
    /// scope, replacing any existing preference for that scope.
    #[instrument(skip(self), fields(user = %user, printer_id = %printer_id))]
    pub fn set_user_default(&mut self, user: &UserId, printer_id: &PrinterId) -> Result<()> {
        let printer = self
            .get_printer(printer_id)?
            .ok_or_else(|| LprelayError::PrinterNotFound(printer_id.to_string()))?;

        let tx = self
            .conn
            .transaction()
            .map_err(|e| LprelayError::Database(format!("begin set user default: {e}")))?;

        tx.execute(
            "DELETE FROM user_printers WHERE user_id = ?1 AND printer_id IN (
                 SELECT id FROM printers WHERE group_id IS ?2 AND format = ?3)",
            params![
                user.to_string(),
                printer.group_id.map(|g| g.to_string()),
                printer.format.as_str(),
            ],
        )
        .map_err(|e| LprelayError::Database(format!("replace preference: {e}")))?;

        tx.execute(
            "INSERT INTO user_printers (user_id, printer_id) VALUES (?1, ?2)",
            params![user.to_string(), printer_id.to_string()],
        )
        .map_err(|e| LprelayError::Database(format!("insert preference: {e}")))?;

        tx.commit()
            .map_err(|e| LprelayError::Database(format!("commit set user default: {e}")))?;

        info!(user = %user, printer = %printer.full_name, "user default printer set");
        Ok(())
    }

    /// Remove `printer_id` from the user's preferences.  No-op when the
    /// preference does not exist.
    #[instrument(skip(self), fields(user = %user, printer_id = %printer_id))]
    pub fn clear_user_default(&self, user: &UserId, printer_id: &PrinterId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM user_printers WHERE user_id = ?1 AND printer_id = ?2",
                params![user.to_string(), printer_id.to_string()],
            )
            .map_err(|e| LprelayError::Database(format!("clear preference: {e}")))?;

        info!(user = %user, "user default printer cleared");
        Ok(())
    }

    /// All of the user's preferred printers, ordered by name.
    pub fn user_preferences(&self, user: &UserId) -> Result<Vec<Printer>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PRINTER_COLUMNS} FROM printers
                 JOIN user_printers up ON up.printer_id = printers.id
                 WHERE up.user_id = ?1 ORDER BY printers.name"
            ))
            .map_err(|e| LprelayError::Database(format!("prepare preferences: {e}")))?;

        let printers = stmt
            .query_map(params![user.to_string()], row_to_printer)
            .map_err(|e| LprelayError::Database(format!("query preferences: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LprelayError::Database(format!("collect preferences: {e}")))?;

        printers
            .into_iter()
            .map(|printer| self.with_full_name(printer))
            .collect()
    }

    /// The user's first ungrouped preference, optionally restricted to a
    /// format.  This is the preference consulted when no explicit printer
    /// is supplied.
    pub fn user_preference(
        &self,
        user: &UserId,
        format: Option<ReportFormat>,
    ) -> Result<Option<Printer>> {
        let printer = match format {
            Some(format) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {PRINTER_COLUMNS} FROM printers
                         JOIN user_printers up ON up.printer_id = printers.id
                         WHERE up.user_id = ?1 AND printers.group_id IS NULL
                           AND printers.format = ?2
                         ORDER BY printers.name LIMIT 1"
                    ),
                    params![user.to_string(), format.as_str()],
                    row_to_printer,
                )
                .optional(),
            None => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {PRINTER_COLUMNS} FROM printers
                         JOIN user_printers up ON up.printer_id = printers.id
                         WHERE up.user_id = ?1 AND printers.group_id IS NULL
                         ORDER BY printers.name LIMIT 1"
                    ),
                    params![user.to_string()],
                    row_to_printer,
                )
                .optional(),
        }
        .map_err(|e| LprelayError::Database(format!("user preference: {e}")))?;

        match printer {
            Some(printer) => Ok(Some(self.with_full_name(printer)?)),
            None => Ok(None),
        }
    }

    /// Users who hold `printer_id` as a preference.
    pub fn users_preferring(&self, printer_id: &PrinterId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM user_printers WHERE printer_id = ?1 ORDER BY user_id")
            .map_err(|e| LprelayError::Database(format!("prepare users: {e}")))?;

        let users = stmt
            .query_map(params![printer_id.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| LprelayError::Database(format!("query users: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LprelayError::Database(format!("collect users: {e}")))?;

        users
            .into_iter()
            .map(|raw| {
                uuid::Uuid::parse_str(&raw)
                    .map(UserId)
                    .map_err(|e| LprelayError::Database(format!("user id: {e}")))
            })
            .collect()
    }

    /// Drop every preference of `user` whose printer is flagged ephemeral.
    ///
    /// Called from the session logout hook; returns the number of
    /// preferences dropped.
    #[instrument(skip(self), fields(user = %user))]
    pub fn clear_ephemeral(&self, user: &UserId) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM user_printers WHERE user_id = ?1 AND printer_id IN (
                     SELECT id FROM printers WHERE is_ephemeral = 1)",
                params![user.to_string()],
            )
            .map_err(|e| LprelayError::Database(format!("clear ephemeral: {e}")))?;

        info!(user = %user, cleared = rows, "ephemeral printer preferences cleared");
        Ok(rows)
    }
}
