// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job spooling via the system `lpr` command.
//
// The document is piped to lpr's stdin; queue, title, and copy count map
// to `-P`, `-T`, and `-#`.  Only POSIX line-printer spooling is defined —
// other platforms fail up front without spawning anything.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use lprelay_core::error::{LprelayError, Result};
use lprelay_core::types::Printer;

/// Name of the system print command.
pub const LPR_PROGRAM: &str = "lpr";

/// Spools rendered documents to printers via an external print command.
pub struct Spooler {
    /// Path of the print executable.
    program: PathBuf,
}

impl Spooler {
    /// Locate `lpr` on the `PATH`.
    ///
    /// Failing to find the executable is distinct from a failed print job.
    pub fn new() -> Result<Self> {
        let path = std::env::var_os("PATH").unwrap_or_default();
        let program = find_program(LPR_PROGRAM, &path)
            .ok_or_else(|| LprelayError::ExecutableNotFound(LPR_PROGRAM.to_string()))?;
        Ok(Self { program })
    }

    /// Use a specific print program (site wrappers, tests).
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Spool `document` to `printer`.
    ///
    /// `copies == 0` sends nothing and succeeds.
    pub fn spool(
        &self,
        printer: &Printer,
        document: &[u8],
        title: Option<&str>,
        copies: u32,
    ) -> Result<()> {
        if copies == 0 {
            debug!(printer = %printer.full_name, "zero copies requested, nothing spooled");
            return Ok(());
        }
        self.spool_on(std::env::consts::FAMILY, printer, document, title, copies)
    }

    /// Platform dispatch; `spool` passes the build-time OS family.
    fn spool_on(
        &self,
        family: &str,
        printer: &Printer,
        document: &[u8],
        title: Option<&str>,
        copies: u32,
    ) -> Result<()> {
        if family != "unix" {
            return Err(LprelayError::UnsupportedPlatform(family.to_string()));
        }
        self.spool_lpr(printer, document, title, copies)
    }

    /// Pipe `document` into the print command and wait for it to exit.
    fn spool_lpr(
        &self,
        printer: &Printer,
        document: &[u8],
        title: Option<&str>,
        copies: u32,
    ) -> Result<()> {
        let mut args: Vec<String> = Vec::new();
        if let Some(queue) = &printer.queue {
            args.push("-P".into());
            args.push(queue.clone());
        }
        if let Some(title) = title {
            args.push("-T".into());
            args.push(title.to_string());
        }
        if copies > 1 {
            args.push("-#".into());
            args.push(copies.to_string());
        }

        info!(
            printer = %printer.full_name,
            command = %format!("{} {}", self.program.display(), args.join(" ")),
            "printing via lpr"
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    LprelayError::ExecutableNotFound(self.program.display().to_string())
                }
                _ => LprelayError::Io(e),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| LprelayError::Io(std::io::Error::other("lpr stdin not available")))?;
        if let Err(e) = stdin.write_all(document) {
            // lpr may exit before draining stdin; report its exit status
            // below instead of the broken pipe.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }
        drop(stdin);

        let output = child.wait_with_output().map_err(LprelayError::Io)?;
        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(LprelayError::SpoolFailed {
                code: output.status.code().unwrap_or(-1),
                output: combined.trim().to_string(),
            });
        }

        debug!(printer = %printer.full_name, bytes = document.len(), "document spooled");
        Ok(())
    }
}

/// Search the given `PATH`-style value for an executable named `program`.
fn find_program(program: &str, path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
