//! Preflight command - verifies the privileged environment.
//!
//! Checks root access, the `su` binary on the host, and the tools the
//! pipeline shells out to on the device side, before any backup or restore
//! touches data.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::layout::Layout;
use crate::shell::Shell;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Check failed - backup/restore will fail.
    Fail,
    /// Check passed but with a warning.
    Warn,
}

impl CheckResult {
    pub fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: None,
        }
    }

    pub fn pass_with(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: Some(details.to_string()),
        }
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: Some(details.to_string()),
        }
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            details: Some(details.to_string()),
        }
    }
}

/// Results of all preflight checks.
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Returns true if all checks passed (no failures).
    pub fn all_passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    pub fn fail_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .count()
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let (icon, status) = match check.status {
                CheckStatus::Pass => ("✓", "PASS"),
                CheckStatus::Fail => ("✗", "FAIL"),
                CheckStatus::Warn => ("⚠", "WARN"),
            };
            print!("  {} [{}] {}", icon, status, check.name);
            match &check.details {
                Some(details) => println!(": {}", details),
                None => println!(),
            }
        }

        println!();
        let passed = self
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Pass)
            .count();
        println!("Summary: {}/{} passed", passed, self.checks.len());
        if self.fail_count() > 0 {
            println!("         {} FAILED - fix before running backup/restore", self.fail_count());
        }
    }
}

/// Run all preflight checks.
pub async fn run_preflight(shell: &Shell, config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    // Host side: is the root binary even present?
    match which::which(&config.su_binary) {
        Ok(path) => checks.push(CheckResult::pass_with(
            "su binary",
            &path.to_string_lossy(),
        )),
        Err(_) => checks.push(CheckResult::fail(
            "su binary",
            &format!("'{}' not found in PATH", config.su_binary),
        )),
    }

    // Session side: can we actually become root?
    if shell.check_root_access().await {
        checks.push(CheckResult::pass("root access"));
    } else {
        checks.push(CheckResult::fail(
            "root access",
            "privileged session rejected or not uid 0",
        ));
    }

    // Tools the pipeline invokes inside the session.
    for tool in ["tar", "du", "find", "pm", "zstd", "lz4"] {
        let result = shell.execute(&format!("command -v {}", tool)).await;
        if result.success {
            checks.push(CheckResult::pass_with(tool, result.first_line()));
        } else if tool == config.compression.as_str() {
            checks.push(CheckResult::fail(
                tool,
                "configured compression codec is missing",
            ));
        } else if tool == "zstd" || tool == "lz4" {
            checks.push(CheckResult::warn(tool, "codec unavailable"));
        } else {
            checks.push(CheckResult::fail(tool, "not found in session PATH"));
        }
    }

    // Backup tree must be creatable and writable.
    let layout = Layout::new(&config.backup_root);
    let base = layout.base().to_string_lossy().to_string();
    if shell.mkdir_p(&base).await {
        checks.push(CheckResult::pass_with("backup root", &base));
    } else {
        checks.push(CheckResult::fail("backup root", &format!("cannot create {}", base)));
    }

    println!();
    PreflightReport { checks }
}

/// Execute the preflight command.
pub async fn cmd_preflight(shell: &Shell, config: &Config, strict: bool) -> Result<()> {
    let report = run_preflight(shell, config).await;
    report.print();

    if !report.all_passed() {
        if strict {
            bail!(
                "Preflight failed: {} check(s) failed. Fix the issues above.",
                report.fail_count()
            );
        }
        println!("Some checks failed. Use --strict to fail the command.");
    } else {
        println!("All preflight checks passed!");
    }
    Ok(())
}
