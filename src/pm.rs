//! Package manager facade.
//!
//! Narrow interface over `pm` and `dumpsys package`, the only two tools the
//! engine consults for package identity. All output parsing lives in pure
//! functions so it can be exercised without a device.

use crate::shell::Shell;

/// Base descriptor of an installed package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMeta {
    pub package_name: String,
    pub label: String,
    pub version_name: String,
    pub version_code: i64,
    pub system_app: bool,
    pub first_install_time: String,
}

pub struct PackageRegistry<'a> {
    shell: &'a Shell,
}

impl<'a> PackageRegistry<'a> {
    pub fn new(shell: &'a Shell) -> Self {
        Self { shell }
    }

    /// Package names installed for the given user.
    pub async fn list_packages(&self, user_id: &str) -> Vec<String> {
        let result = self
            .shell
            .execute(&format!("pm list packages --user {}", user_id))
            .await;
        if !result.success {
            return Vec::new();
        }
        parse_package_list(&result.out)
    }

    /// Directory holding the installed APK (and split APKs) of a package.
    pub async fn apk_dir(&self, package: &str, user_id: &str) -> Option<String> {
        let result = self
            .shell
            .execute(&format!("pm path --user {} {}", user_id, package))
            .await;
        if !result.success {
            return None;
        }
        parse_apk_dir(&result.out)
    }

    /// Currently-installed version code, if the package exists for the user.
    pub async fn installed_version_code(&self, user_id: &str, package: &str) -> Option<i64> {
        Some(self.dumpsys(user_id, package).await?.version_code)
    }

    /// The kernel uid the package's data files belong to, for the given user.
    pub async fn data_uid(&self, user_id: &str, package: &str) -> Option<u32> {
        let result = self
            .shell
            .execute(&format!("dumpsys package {}", package))
            .await;
        if !result.success {
            return None;
        }
        let app_id = parse_app_id(&result.joined())?;
        per_user_uid(user_id, app_id)
    }

    /// Full base descriptor of a package.
    pub async fn dumpsys(&self, _user_id: &str, package: &str) -> Option<PackageMeta> {
        let result = self
            .shell
            .execute(&format!("dumpsys package {}", package))
            .await;
        if !result.success {
            return None;
        }
        let text = result.joined();
        let version_code = parse_field(&text, "versionCode")?.parse().ok()?;
        Some(PackageMeta {
            package_name: package.to_string(),
            // `pm`/`dumpsys` expose no display label; identity is the key.
            label: package.to_string(),
            version_name: parse_field(&text, "versionName").unwrap_or_default().to_string(),
            version_code,
            system_app: parse_system_flag(&text),
            first_install_time: parse_line_value(&text, "firstInstallTime")
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Compose the per-user kernel uid from an Android user id and an app id.
pub fn per_user_uid(user_id: &str, app_id: u32) -> Option<u32> {
    let user: u32 = user_id.trim().parse().ok()?;
    Some(user * 100_000 + app_id % 100_000)
}

/// Strip the `package:` prefix `pm list packages` puts on every line.
pub fn parse_package_list(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.trim().strip_prefix("package:"))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parent directory of the base APK from `pm path` output.
pub fn parse_apk_dir(lines: &[String]) -> Option<String> {
    let apk = lines
        .iter()
        .filter_map(|l| l.trim().strip_prefix("package:"))
        .find(|p| p.ends_with("base.apk"))?;
    let (dir, _) = apk.rsplit_once('/')?;
    if dir.is_empty() {
        None
    } else {
        Some(dir.to_string())
    }
}

/// Value of a `key=value` field terminated by whitespace, as `dumpsys`
/// prints them (`versionCode=42 minSdk=26 ...`).
pub fn parse_field<'t>(text: &'t str, key: &str) -> Option<&'t str> {
    let marker = format!("{}=", key);
    let start = text.find(&marker)? + marker.len();
    let rest = &text[start..];
    let end = rest
        .find(|c: char| c.is_whitespace())
        .unwrap_or(rest.len());
    let value = &rest[..end];
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Value of a `key=value` line where the value runs to the end of the line
/// (`firstInstallTime=2024-01-01 10:30:00`).
pub fn parse_line_value<'t>(text: &'t str, key: &str) -> Option<&'t str> {
    let marker = format!("{}=", key);
    for line in text.lines() {
        if let Some(pos) = line.find(&marker) {
            let value = line[pos + marker.len()..].trim();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// App id (uid within user 0) from the `userId=` field.
pub fn parse_app_id(text: &str) -> Option<u32> {
    parse_field(text, "userId")?.parse().ok()
}

/// Whether `pkgFlags=[ ... ]` names the SYSTEM flag.
pub fn parse_system_flag(text: &str) -> bool {
    let Some(start) = text.find("pkgFlags=[") else {
        return false;
    };
    let rest = &text[start..];
    let Some(end) = rest.find(']') else {
        return false;
    };
    rest[..end].contains(" SYSTEM")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_package_list() {
        let out = lines(&[
            "package:com.android.chrome",
            "package:org.fdroid.fdroid",
            "",
        ]);
        assert_eq!(
            parse_package_list(&out),
            vec!["com.android.chrome".to_string(), "org.fdroid.fdroid".to_string()]
        );
    }

    #[test]
    fn test_parse_apk_dir_prefers_base_apk() {
        let out = lines(&[
            "package:/data/app/~~abc==/com.app-xyz==/base.apk",
            "package:/data/app/~~abc==/com.app-xyz==/split_config.arm64_v8a.apk",
        ]);
        assert_eq!(
            parse_apk_dir(&out),
            Some("/data/app/~~abc==/com.app-xyz==".to_string())
        );
    }

    #[test]
    fn test_parse_apk_dir_empty() {
        assert_eq!(parse_apk_dir(&lines(&[])), None);
        assert_eq!(parse_apk_dir(&lines(&["garbage"])), None);
    }

    #[test]
    fn test_parse_field_terminates_at_whitespace() {
        let text = "    versionCode=443021533 minSdk=29 targetSdk=34";
        assert_eq!(parse_field(text, "versionCode"), Some("443021533"));
        assert_eq!(parse_field(text, "minSdk"), Some("29"));
        assert_eq!(parse_field(text, "missing"), None);
    }

    #[test]
    fn test_parse_line_value_runs_to_eol() {
        let text = "    firstInstallTime=2024-01-01 10:30:00\n    lastUpdateTime=2024-02-02 11:00:00";
        assert_eq!(
            parse_line_value(text, "firstInstallTime"),
            Some("2024-01-01 10:30:00")
        );
    }

    #[test]
    fn test_parse_app_id() {
        let text = "    userId=10234\n    pkgFlags=[ HAS_CODE ALLOW_CLEAR_USER_DATA ]";
        assert_eq!(parse_app_id(text), Some(10234));
    }

    #[test]
    fn test_parse_system_flag() {
        assert!(parse_system_flag("pkgFlags=[ SYSTEM HAS_CODE ]"));
        assert!(!parse_system_flag("pkgFlags=[ HAS_CODE ]"));
        assert!(!parse_system_flag("no flags here"));
    }

    #[test]
    fn test_per_user_uid() {
        assert_eq!(per_user_uid("0", 10234), Some(10234));
        assert_eq!(per_user_uid("10", 10234), Some(1_010_234));
        assert_eq!(per_user_uid("x", 10234), None);
    }
}
