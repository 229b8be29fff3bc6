//! Append-only operation log for privileged shell traffic.
//!
//! Every command issued through the gateway is recorded as `SHELL_IN:` and
//! every produced line as `SHELL_OUT:`, giving a replayable trace of what the
//! engine actually did on the device. The log is an explicit handle passed to
//! the gateway at construction, not a process-wide singleton.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Cloneable handle to the operation log.
///
/// Writes are best-effort: a full disk or revoked permission must never take
/// the engine down, so I/O errors are swallowed after the file is open.
#[derive(Clone)]
pub struct OpLog {
    inner: Arc<Mutex<Option<File>>>,
}

impl OpLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory for {}", path.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open operation log {}", path.display()))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Some(file))),
        })
    }

    /// A log handle that discards everything. Used by tests and by callers
    /// that explicitly opt out of logging.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Record a command about to be issued.
    pub fn shell_in(&self, cmd: &str) {
        self.write_line("SHELL_IN", cmd);
    }

    /// Record one line of command output.
    pub fn shell_out(&self, line: &str) {
        self.write_line("SHELL_OUT", line);
    }

    fn write_line(&self, tag: &str, line: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = writeln!(file, "{}: {}", tag, line);
            }
        }
    }
}
