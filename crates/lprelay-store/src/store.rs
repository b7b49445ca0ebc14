// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent printer registry backed by SQLite.
//
// The store holds printer records (with their group tree and default
// flags), per-user printer preferences, and print strategies.  Reads are
// point-in-time queries; transactional guarantees for the demote-then-set
// default operations live here as well.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, instrument};

use lprelay_core::error::{LprelayError, Result};
use lprelay_core::types::{Printer, PrinterId};

/// Separator between group names in a printer's full name.
pub(crate) const FULL_NAME_SEPARATOR: &str = " / ";

/// Column list matching `row_to_printer`.
pub(crate) const PRINTER_COLUMNS: &str = "id, name, barcode, queue, format, is_default, \
     is_ephemeral, is_group, group_id, created_at, updated_at";

/// SQLite schema for the registry.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS printers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        barcode TEXT,
        queue TEXT,
        format TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        is_ephemeral INTEGER NOT NULL DEFAULT 0,
        is_group INTEGER NOT NULL DEFAULT 0,
        group_id TEXT REFERENCES printers (id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_printers_group ON printers (group_id);
    CREATE INDEX IF NOT EXISTS idx_printers_barcode ON printers (barcode);

    CREATE TABLE IF NOT EXISTS user_printers (
        user_id TEXT NOT NULL,
        printer_id TEXT NOT NULL REFERENCES printers (id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, printer_id)
    );

    CREATE TABLE IF NOT EXISTS strategies (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        model TEXT NOT NULL,
        report_name TEXT NOT NULL,
        printer_id TEXT REFERENCES printers (id) ON DELETE SET NULL,
        safety TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_strategies_model ON strategies (model);
"#;

/// Printer, preference, and strategy registry backed by a SQLite database.
///
/// All methods are synchronous; group deletion cascades to children and
/// preference rows via foreign keys.
pub struct PrintStore {
    /// The open SQLite connection.
    pub(crate) conn: Connection,
}

impl PrintStore {
    /// Open (or create) the registry database at the given path.
    ///
    /// Applies WAL journal mode and enables foreign-key enforcement so
    /// that group deletion cascades.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| LprelayError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| LprelayError::Database(format!("WAL pragma: {e}")))?;

        Self::init(conn)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LprelayError::Database(format!("open in-memory: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| LprelayError::Database(format!("foreign_keys pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| LprelayError::Database(format!("create tables: {e}")))?;

        info!("printer registry database opened");
        Ok(Self { conn })
    }

    /// Fill in the computed full name of `printer`.
    pub(crate) fn with_full_name(&self, mut printer: Printer) -> Result<Printer> {
        printer.full_name = self.full_name_of(&printer)?;
        Ok(printer)
    }

    /// Group chain of `printer` joined by the separator, outermost first.
    ///
    /// Walks `group_id` links with a visited set; the schema forbids
    /// cycles, but a corrupted database must not hang a read.
    fn full_name_of(&self, printer: &Printer) -> Result<String> {
        let mut segments = vec![printer.name.clone()];
        let mut seen: HashSet<PrinterId> = HashSet::from([printer.id]);
        let mut cursor = printer.group_id;
        while let Some(group_id) = cursor {
            let Some((name, parent)) = self.name_and_group(&group_id)? else {
                break;
            };
            if !seen.insert(group_id) {
                return Err(LprelayError::GroupCycle(name));
            }
            segments.push(name);
            cursor = parent;
        }
        segments.reverse();
        Ok(segments.join(FULL_NAME_SEPARATOR))
    }

    /// Name and parent group of a printer, without the full record.
    fn name_and_group(&self, id: &PrinterId) -> Result<Option<(String, Option<PrinterId>)>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT name, group_id FROM printers WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| LprelayError::Database(format!("group lookup: {e}")))?;

        match row {
            Some((name, group_id)) => {
                let group_id = group_id
                    .map(|raw| parse_printer_id(&raw))
                    .transpose()
                    .map_err(|e| LprelayError::Database(format!("group id: {e}")))?;
                Ok(Some((name, group_id)))
            }
            None => Ok(None),
        }
    }
}

/// Parse a stored UUID string into a `PrinterId`.
pub(crate) fn parse_printer_id(raw: &str) -> std::result::Result<PrinterId, uuid::Error> {
    uuid::Uuid::parse_str(raw).map(PrinterId)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a SQLite row to a `Printer`.
///
/// Column indices must match `PRINTER_COLUMNS`.  The full name is filled
/// in afterwards by `PrintStore::with_full_name`.
pub(crate) fn row_to_printer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Printer> {
    use chrono::{DateTime, Utc};

    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let barcode: Option<String> = row.get(2)?;
    let queue: Option<String> = row.get(3)?;
    let format_str: String = row.get(4)?;
    let is_default: bool = row.get(5)?;
    let is_ephemeral: bool = row.get(6)?;
    let is_group: bool = row.get(7)?;
    let group_id_str: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let id = parse_printer_id(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let format = format_str.parse().map_err(|e: LprelayError| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let group_id = group_id_str
        .map(|raw| parse_printer_id(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Printer {
        id,
        full_name: name.clone(),
        name,
        barcode,
        queue,
        format,
        is_default,
        is_ephemeral,
        is_group,
        group_id,
        created_at,
        updated_at,
    })
}
