//! Privileged shell gateway.
//!
//! All device mutation goes through one root shell session. Commands are
//! handed to `su -c`, output is streamed line by line, and both directions
//! are recorded in the operation log. The gateway itself never returns an
//! error: spawn failures and non-zero exits both surface as
//! `ShellResult::success == false`, and callers must check the flag.

use std::process::Stdio;
use std::sync::Mutex as StdMutex;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::oplog::OpLog;

/// Line-oriented progress sink handed to streaming operations.
pub type ProgressSink = dyn Fn(&str) + Send + Sync;

/// Outcome of one shell invocation.
#[derive(Debug, Clone)]
pub struct ShellResult {
    /// True if the command exited with status zero.
    pub success: bool,
    /// Output lines in arrival order (stdout first, then stderr).
    pub out: Vec<String>,
}

impl ShellResult {
    /// All output joined with newlines.
    pub fn joined(&self) -> String {
        self.out.join("\n")
    }

    /// First output line, trimmed, or the empty string.
    pub fn first_line(&self) -> &str {
        self.out.first().map(|s| s.trim()).unwrap_or("")
    }
}

/// One logical root shell session.
///
/// At most one command executes at a time; concurrent callers queue on the
/// internal session lock. Higher-level parallelism means acquiring
/// independent `Shell` instances.
pub struct Shell {
    su_binary: String,
    log: OpLog,
    session: Mutex<()>,
}

impl Shell {
    /// Create a gateway that runs commands as `<su_binary> -c <command>`.
    ///
    /// Tests substitute a plain `sh` for the root binary.
    pub fn new(su_binary: impl Into<String>, log: OpLog) -> Self {
        Self {
            su_binary: su_binary.into(),
            log,
            session: Mutex::new(()),
        }
    }

    /// Run a command with logging enabled and no streaming callback.
    pub async fn execute(&self, cmd: &str) -> ShellResult {
        self.execute_streamed(cmd, true, None).await
    }

    /// Run a command, delivering each output line to `on_line` as it
    /// arrives. Lines are also accumulated into the result and, when
    /// `log_enabled`, appended to the operation log.
    pub async fn execute_streamed(
        &self,
        cmd: &str,
        log_enabled: bool,
        on_line: Option<&ProgressSink>,
    ) -> ShellResult {
        let _session = self.session.lock().await;

        if log_enabled {
            self.log.shell_in(cmd);
        }

        let mut child = match Command::new(&self.su_binary)
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let line = format!("failed to spawn {}: {}", self.su_binary, e);
                if log_enabled {
                    self.log.shell_out(&line);
                }
                return ShellResult {
                    success: false,
                    out: vec![line],
                };
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes are drained concurrently so neither can fill up and
        // stall the child. stdout lines keep their order, stderr lines are
        // appended after them in the accumulated result.
        let deliver = |line: &str, sink: &StdMutex<Vec<String>>| {
            if log_enabled {
                self.log.shell_out(line);
            }
            if let Some(cb) = on_line {
                cb(line);
            }
            if let Ok(mut out) = sink.lock() {
                out.push(line.to_string());
            }
        };

        let out_lines = StdMutex::new(Vec::new());
        let err_lines = StdMutex::new(Vec::new());

        let read_stdout = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    deliver(&line, &out_lines);
                }
            }
        };
        let read_stderr = async {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    deliver(&line, &err_lines);
                }
            }
        };
        tokio::join!(read_stdout, read_stderr);

        let success = matches!(child.wait().await, Ok(status) if status.success());

        let mut out = out_lines.into_inner().unwrap_or_default();
        out.extend(err_lines.into_inner().unwrap_or_default());

        ShellResult { success, out }
    }

    /// Verify the privileged session is usable. Every other operation treats
    /// a missing root session as a fatal precondition failure.
    pub async fn check_root_access(&self) -> bool {
        let result = self.execute("id -u").await;
        result.success && result.out.iter().any(|l| l.trim() == "0")
    }

    /// Probe a path with `ls`.
    pub async fn exists(&self, path: &str) -> bool {
        self.execute(&format!("ls -i \"{}\"", path)).await.success
    }

    /// Count directory entries with `ls`.
    pub async fn count_files(&self, path: &str) -> usize {
        let result = self.execute(&format!("ls -i \"{}\"", path)).await;
        if result.success {
            result.out.len()
        } else {
            0
        }
    }

    /// Recursive delete.
    pub async fn rm_rf(&self, path: &str) -> bool {
        self.execute(&format!("rm -rf \"{}\"", path)).await.success
    }

    /// Recursive create. Succeeds if the directory already exists.
    pub async fn mkdir_p(&self, path: &str) -> bool {
        if self.exists(path).await {
            return true;
        }
        self.execute(&format!("mkdir -p \"{}\"", path)).await.success
    }

    /// Copy a single file.
    pub async fn cp(&self, src: &str, dst: &str) -> bool {
        self.execute(&format!("cp \"{}\" \"{}\"", src, dst))
            .await
            .success
    }
}
