//! Directory size fingerprints.
//!
//! A fingerprint is an opaque textual token compared for equality only,
//! never parsed into a number. "No change since last backup" is detected as
//! `fingerprint(now) == fingerprint(at-time-of-last-archive)`.

use crate::shell::Shell;

/// Which accounting `du` should use. Directories and sparse files differ
/// between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    /// Apparent byte size (`du --apparent-size`).
    Apparent,
    /// Disk-occupied size (plain `du`).
    Occupied,
}

/// Compute the size fingerprint of a path.
///
/// Returns `"0"` on any failure or empty output so that callers always have
/// a comparable token.
pub async fn size_of(shell: &Shell, path: &str, mode: SizeMode) -> String {
    let cmd = match mode {
        SizeMode::Apparent => format!("du -sk --apparent-size \"{}\"", path),
        SizeMode::Occupied => format!("du -sk \"{}\"", path),
    };
    let result = shell.execute(&cmd).await;
    if !result.success {
        return "0".to_string();
    }
    parse_du_output(&result.joined()).unwrap_or_else(|| "0".to_string())
}

/// Extract the size column from `du -s` output.
///
/// `du` prints `<size>\t<path>`; with `-s` the summary is the last line.
pub fn parse_du_output(output: &str) -> Option<String> {
    let token = output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .last()?
        .split_whitespace()
        .next()?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_du_single_line() {
        assert_eq!(parse_du_output("1234\t/data/user/0/com.app"), Some("1234".to_string()));
    }

    #[test]
    fn test_parse_du_takes_summary_line() {
        let out = "12\t/a/b\n34\t/a/c\n46\t/a";
        assert_eq!(parse_du_output(out), Some("46".to_string()));
    }

    #[test]
    fn test_parse_du_empty() {
        assert_eq!(parse_du_output(""), None);
        assert_eq!(parse_du_output("\n\n"), None);
    }
}
