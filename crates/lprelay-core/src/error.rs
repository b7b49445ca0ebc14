// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for lprelay.

use thiserror::Error;

/// Top-level error type for all lprelay operations.
#[derive(Debug, Error)]
pub enum LprelayError {
    // -- Resolution errors --
    #[error("no printer resolved")]
    NoPrinter,

    #[error("no printer resolved for {0} documents")]
    NoPrinterForFormat(String),

    #[error("unknown printer: {0}")]
    PrinterNotFound(String),

    #[error("undefined report {0}")]
    ReportNotFound(String),

    #[error("missing reports of types: {0}")]
    MissingReportTypes(String),

    #[error("unsupported report format: {0}")]
    UnknownFormat(String),

    // -- Spooling errors --
    #[error("lpr failed (error code: {code}). Message: {output}")]
    SpoolFailed { code: i32, output: String },

    #[error("cannot find {0} executable")]
    ExecutableNotFound(String),

    #[error("cannot print on OS family: {0}")]
    UnsupportedPlatform(String),

    #[error("render failed: {0}")]
    Render(String),

    // -- Validation errors --
    #[error("the barcode must be unique: {0}")]
    DuplicateBarcode(String),

    #[error("there is already a system default printer for {0}")]
    DuplicateDefault(String),

    #[error("user may have at most one default printer per group for each report type")]
    DuplicatePreference,

    #[error("{0} is not a printer group")]
    NotAGroup(String),

    #[error("printer group cycle detected at {0}")]
    GroupCycle(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LprelayError>;
