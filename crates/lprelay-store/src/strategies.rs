// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print strategy records.

use rusqlite::{OptionalExtension, params};
use tracing::{info, instrument};
use uuid::Uuid;

use lprelay_core::error::{LprelayError, Result};
use lprelay_core::types::PrintStrategy;

use crate::store::{PrintStore, parse_printer_id};

/// Column list matching `row_to_strategy`.
const STRATEGY_COLUMNS: &str = "id, name, model, report_name, printer_id, safety";

impl PrintStore {
    /// Insert a new print strategy.
    #[instrument(skip(self, strategy), fields(strategy = %strategy.name))]
    pub fn insert_strategy(&self, strategy: &PrintStrategy) -> Result<()> {
        if let Some(printer_id) = &strategy.printer_id {
            if self.get_printer(printer_id)?.is_none() {
                return Err(LprelayError::PrinterNotFound(printer_id.to_string()));
            }
        }

        self.conn
            .execute(
                "INSERT INTO strategies (id, name, model, report_name, printer_id, safety)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    strategy.id.to_string(),
                    strategy.name,
                    strategy.model,
                    strategy.report_name,
                    strategy.printer_id.map(|p| p.to_string()),
                    strategy.safety,
                ],
            )
            .map_err(|e| LprelayError::Database(format!("insert strategy: {e}")))?;

        info!(strategy = %strategy.name, model = %strategy.model, "print strategy registered");
        Ok(())
    }

    /// Retrieve a strategy by id, `None` if it does not exist.
    pub fn get_strategy(&self, id: &Uuid) -> Result<Option<PrintStrategy>> {
        self.conn
            .query_row(
                &format!("SELECT {STRATEGY_COLUMNS} FROM strategies WHERE id = ?1"),
                params![id.to_string()],
                row_to_strategy,
            )
            .optional()
            .map_err(|e| LprelayError::Database(format!("get strategy: {e}")))
    }

    /// All strategies targeting `model`, ordered by name.
    pub fn strategies_for_model(&self, model: &str) -> Result<Vec<PrintStrategy>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {STRATEGY_COLUMNS} FROM strategies WHERE model = ?1 ORDER BY name"
            ))
            .map_err(|e| LprelayError::Database(format!("prepare strategies: {e}")))?;

        stmt.query_map(params![model], row_to_strategy)
            .map_err(|e| LprelayError::Database(format!("query strategies: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LprelayError::Database(format!("collect strategies: {e}")))
    }

    /// Delete a strategy.  Deleting an unknown id is a no-op.
    #[instrument(skip(self), fields(strategy_id = %id))]
    pub fn delete_strategy(&self, id: &Uuid) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM strategies WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| LprelayError::Database(format!("delete strategy: {e}")))?;

        info!(strategy_id = %id, "print strategy deleted");
        Ok(())
    }
}

/// Map a SQLite row to a `PrintStrategy`.
fn row_to_strategy(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrintStrategy> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let model: String = row.get(2)?;
    let report_name: String = row.get(3)?;
    let printer_id_str: Option<String> = row.get(4)?;
    let safety: Option<String> = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let printer_id = printer_id_str
        .map(|raw| parse_printer_id(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(PrintStrategy {
        id,
        name,
        model,
        report_name,
        printer_id,
        safety,
    })
}
