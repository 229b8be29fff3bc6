//! Compress / decompress / install / repair pipeline.
//!
//! Every operation is a privileged external-process invocation that can
//! fail, partially succeed, or hang; each returns a plain `bool` and leaves
//! retry policy to the caller. Progress narration goes through an optional
//! line sink that has no effect on control flow: streams always terminate
//! with a `finished` marker, success or not.

use crate::config::{BackupStrategy, Config};
use crate::pm::PackageRegistry;
use crate::shell::{ProgressSink, Shell};
use crate::size::{size_of, SizeMode};

pub const STAGE_COMPRESSING: &str = "compressing";
pub const STAGE_SKIPPED: &str = "skipped";
pub const STAGE_TESTING: &str = "testing";
pub const STAGE_DECOMPRESSING: &str = "decompressing";
pub const STAGE_INSTALLING: &str = "installing apk";
pub const STAGE_SELINUX: &str = "setting SELinux context";
pub const STAGE_FINISHED: &str = "finished";

/// Archive codec. The tar container is shared; lz4/zstd wrap it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    Tar,
    Lz4,
    Zstd,
}

impl CompressionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tar" => Some(Self::Tar),
            "lz4" => Some(Self::Lz4),
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Archive file suffix for this codec.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Lz4 => "tar.lz4",
            Self::Zstd => "tar.zst",
        }
    }

    /// Inverse of `suffix`: sniff the codec from an existing archive's name.
    pub fn from_archive_path(path: &str) -> Option<Self> {
        let file = path.rsplit('/').next()?;
        match file.rsplit('.').next()? {
            "tar" => Some(Self::Tar),
            "lz4" => Some(Self::Lz4),
            "zst" => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// Data partition backed up per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCategory {
    Apk,
    Data,
    Obb,
    User,
    UserDe,
    Media,
}

impl DataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::Data => "data",
            Self::Obb => "obb",
            Self::User => "user",
            Self::UserDe => "user_de",
            Self::Media => "media",
        }
    }

    /// Archive file name inside a dated directory. Media archives are named
    /// after the medium itself.
    pub fn archive_name(&self, key: &str, kind: CompressionType) -> String {
        match self {
            Self::Media => format!("{}.{}", key, kind.suffix()),
            _ => format!("{}.{}", self.as_str(), kind.suffix()),
        }
    }

    /// Device tree this category's per-app data lives under. `None` for apk
    /// (resolved through the package manager) and media (self-describing).
    pub fn source_root(&self, user_id: &str) -> Option<String> {
        match self {
            Self::Apk | Self::Media => None,
            Self::Data => Some(format!("/data/media/{}/Android/data", user_id)),
            Self::Obb => Some(format!("/data/media/{}/Android/obb", user_id)),
            Self::User => Some(format!("/data/user/{}", user_id)),
            Self::UserDe => Some(format!("/data/user_de/{}", user_id)),
        }
    }
}

/// The non-apk categories of an app backup, in pipeline order.
pub const APP_DATA_CATEGORIES: [DataCategory; 4] = [
    DataCategory::User,
    DataCategory::UserDe,
    DataCategory::Data,
    DataCategory::Obb,
];

/// SELinux context for app data files of a secondary user.
///
/// Android derives the MLS categories from the app id and user id; restoring
/// another user's archive with the naive context leaves data unreadable.
pub fn multiuser_context(app_id: u32, user_id: u32) -> String {
    let n = app_id.saturating_sub(10_000);
    format!(
        "u:object_r:app_data_file:s0:c{},c{},c{},c{}",
        n & 0xff,
        256 + ((n >> 8) & 0xff),
        512 + (user_id & 0xff),
        768 + ((user_id >> 8) & 0xff)
    )
}

fn emit(on_line: Option<&ProgressSink>, line: &str) {
    if let Some(cb) = on_line {
        cb(line);
    }
}

fn tar_create(kind: CompressionType, archive: &str, parent: &str, name: &str) -> String {
    match kind {
        CompressionType::Tar => {
            format!("tar --totals -cpf \"{}\" -C \"{}\" \"{}\"", archive, parent, name)
        }
        CompressionType::Lz4 => format!(
            "tar --totals -cpf - -C \"{}\" \"{}\" | lz4 -qc > \"{}\"",
            parent, name, archive
        ),
        CompressionType::Zstd => format!(
            "tar --totals -cpf - -C \"{}\" \"{}\" | zstd -q -T0 > \"{}\"",
            parent, name, archive
        ),
    }
}

fn tar_create_apks(kind: CompressionType, apk_dir: &str, archive: &str) -> String {
    match kind {
        CompressionType::Tar => format!(
            "cd \"{}\" && tar --totals -cpf \"{}\" *.apk",
            apk_dir, archive
        ),
        CompressionType::Lz4 => format!(
            "cd \"{}\" && tar --totals -cpf - *.apk | lz4 -qc > \"{}\"",
            apk_dir, archive
        ),
        CompressionType::Zstd => format!(
            "cd \"{}\" && tar --totals -cpf - *.apk | zstd -q -T0 > \"{}\"",
            apk_dir, archive
        ),
    }
}

fn tar_extract(kind: CompressionType, input: &str, dest: &str) -> String {
    match kind {
        CompressionType::Tar => format!(
            "mkdir -p \"{}\" && tar -mxpf \"{}\" -C \"{}\"",
            dest, input, dest
        ),
        CompressionType::Lz4 => format!(
            "mkdir -p \"{}\" && lz4 -dqc \"{}\" | tar -mxpf - -C \"{}\"",
            dest, input, dest
        ),
        CompressionType::Zstd => format!(
            "mkdir -p \"{}\" && zstd -dqc \"{}\" | tar -mxpf - -C \"{}\"",
            dest, input, dest
        ),
    }
}

fn tar_test(kind: CompressionType, path: &str) -> String {
    match kind {
        CompressionType::Tar => format!("tar -tf \"{}\" > /dev/null", path),
        CompressionType::Lz4 => format!("lz4 -tq \"{}\"", path),
        CompressionType::Zstd => format!("zstd -tq \"{}\"", path),
    }
}

/// Drives the archive state machine for one backup/restore invocation.
pub struct Pipeline<'a> {
    shell: &'a Shell,
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(shell: &'a Shell, config: &'a Config) -> Self {
        Self { shell, config }
    }

    /// Compress one data category into `<out_dir>/<name>.<suffix>`.
    ///
    /// With the overwrite strategy and a previous fingerprint, an unchanged
    /// source whose archive is already on disk is skipped. A missing output
    /// file is a hard failure regardless of the skip decision.
    pub async fn compress(
        &self,
        kind: CompressionType,
        category: DataCategory,
        key: &str,
        out_dir: &str,
        source_dir: &str,
        prev_fingerprint: Option<&str>,
        on_line: Option<&ProgressSink>,
    ) -> bool {
        let archive = format!("{}/{}", out_dir, category.archive_name(key, kind));

        let mut update = true;
        if self.config.strategy == BackupStrategy::Overwrite {
            if let Some(prev) = prev_fingerprint {
                let probe = match category {
                    DataCategory::Media => source_dir.to_string(),
                    _ => format!("{}/{}", source_dir, key),
                };
                let current = size_of(self.shell, &probe, SizeMode::Occupied).await;
                if current == prev {
                    update = false;
                }
                // A vanished archive forces an update even when unchanged.
                if !self.shell.exists(&archive).await {
                    update = true;
                }
            }
        }

        let mut ok = true;
        if update {
            emit(on_line, STAGE_COMPRESSING);
            let (parent, name) = match category {
                DataCategory::Media => split_parent(source_dir),
                _ => (source_dir.to_string(), key.to_string()),
            };
            let cmd = tar_create(kind, &archive, &parent, &name);
            ok = self.shell.execute_streamed(&cmd, true, on_line).await.success;
        } else {
            emit(on_line, STAGE_SKIPPED);
        }

        ok = self.verify_output(kind, &archive, ok, on_line).await;
        emit(on_line, STAGE_FINISHED);
        ok
    }

    /// Compress the installed APK set of a package.
    ///
    /// The shell's working directory is moved into the APK directory for the
    /// duration of the compression command; a failed directory change
    /// propagates as pipeline failure.
    pub async fn compress_apk(
        &self,
        kind: CompressionType,
        package: &str,
        out_dir: &str,
        user_id: &str,
        prev_fingerprint: Option<&str>,
        on_line: Option<&ProgressSink>,
    ) -> bool {
        let archive = format!("{}/apk.{}", out_dir, kind.suffix());

        let registry = PackageRegistry::new(self.shell);
        let Some(apk_dir) = registry.apk_dir(package, user_id).await else {
            emit(on_line, STAGE_FINISHED);
            return false;
        };

        let mut update = true;
        if self.config.strategy == BackupStrategy::Overwrite {
            if let Some(prev) = prev_fingerprint {
                let current = size_of(self.shell, &apk_dir, SizeMode::Occupied).await;
                if current == prev {
                    update = false;
                }
                if !self.shell.exists(&archive).await {
                    update = true;
                }
            }
        }

        let mut ok = true;
        if update {
            emit(on_line, STAGE_COMPRESSING);
            if !self
                .shell
                .execute(&format!("cd \"{}\"", apk_dir))
                .await
                .success
            {
                emit(on_line, STAGE_FINISHED);
                return false;
            }
            let cmd = tar_create_apks(kind, &apk_dir, &archive);
            ok = self.shell.execute_streamed(&cmd, true, on_line).await.success;
        } else {
            emit(on_line, STAGE_SKIPPED);
        }

        ok = self.verify_output(kind, &archive, ok, on_line).await;
        emit(on_line, STAGE_FINISHED);
        ok
    }

    /// Extract an archive into `dest_dir`. Restore always runs when
    /// requested; there is no skip fast path.
    pub async fn decompress(
        &self,
        kind: CompressionType,
        input_path: &str,
        dest_dir: &str,
        on_line: Option<&ProgressSink>,
    ) -> bool {
        emit(on_line, STAGE_DECOMPRESSING);
        let cmd = tar_extract(kind, input_path, dest_dir);
        let ok = self.shell.execute_streamed(&cmd, true, on_line).await.success;
        emit(on_line, STAGE_FINISHED);
        ok
    }

    /// Install the APK set found in `apk_dir` for the given user.
    ///
    /// The installed version code is read and reported for observability,
    /// but never gates the install: callers that want skip-if-not-newer
    /// semantics query the registry and decide before calling. Success is
    /// the install command's own exit status.
    pub async fn install_apk(
        &self,
        apk_dir: &str,
        package: &str,
        user_id: &str,
        candidate_version_code: i64,
        on_line: Option<&ProgressSink>,
    ) -> bool {
        let registry = PackageRegistry::new(self.shell);
        if let Some(installed) = registry.installed_version_code(user_id, package).await {
            emit(
                on_line,
                &format!(
                    "installed versionCode {}, archive versionCode {}",
                    installed, candidate_version_code
                ),
            );
        }

        // Archives produced by this engine are not signed through any store
        // channel; package verification would reject them.
        self.shell
            .execute("settings put global verifier_verify_adb_installs 0")
            .await;
        self.shell
            .execute("settings put global package_verifier_enable 0")
            .await;

        emit(on_line, STAGE_INSTALLING);
        let cmd = install_script(apk_dir, user_id);
        let ok = self.shell.execute_streamed(&cmd, true, on_line).await.success;
        emit(on_line, STAGE_FINISHED);
        ok
    }

    /// Repair ownership and SELinux context on a restored data tree.
    ///
    /// Failures are reported but the restored files are left as-is; callers
    /// decide whether a mislabeled tree is worth keeping.
    pub async fn set_owner_and_selinux(
        &self,
        category: DataCategory,
        package: &str,
        path: &str,
        user_id: &str,
        context: &str,
        on_line: Option<&ProgressSink>,
    ) -> bool {
        emit(on_line, STAGE_SELINUX);

        let ok = if category == DataCategory::Media {
            // Shared storage is owned by media_rw; restorecon knows its label.
            self.shell
                .execute(&format!(
                    "chown -R media_rw:media_rw \"{}\" && restorecon -RFD \"{}\"",
                    path, path
                ))
                .await
                .success
        } else {
            let registry = PackageRegistry::new(self.shell);
            match registry.data_uid(user_id, package).await {
                None => false,
                Some(uid) => {
                    let mut ok = self
                        .shell
                        .execute(&format!("chown -R {}:{} \"{}\"", uid, uid, path))
                        .await
                        .success;

                    let effective = if self.config.auto_fix_multiuser_context && user_id != "0" {
                        let user: u32 = user_id.parse().unwrap_or(0);
                        multiuser_context(uid % 100_000, user)
                    } else {
                        context.to_string()
                    };

                    ok = if effective.is_empty() {
                        self.shell
                            .execute(&format!("restorecon -RFD \"{}\"", path))
                            .await
                            .success
                            && ok
                    } else {
                        self.shell
                            .execute(&format!("chcon -hR \"{}\" \"{}\"", effective, path))
                            .await
                            .success
                            && ok
                    };
                    ok
                }
            }
        };

        emit(on_line, STAGE_FINISHED);
        ok
    }

    /// Codec-appropriate integrity check. The archive is left in place on
    /// failure so the user can inspect or retry.
    pub async fn test_archive(&self, kind: CompressionType, path: &str) -> bool {
        self.shell.execute(&tar_test(kind, path)).await.success
    }

    /// Shared tail of the compression paths: the output file must exist, and
    /// when verification is on it must pass its integrity test.
    async fn verify_output(
        &self,
        kind: CompressionType,
        archive: &str,
        ok_so_far: bool,
        on_line: Option<&ProgressSink>,
    ) -> bool {
        if !self.shell.exists(archive).await {
            return false;
        }
        if self.config.verify_archives {
            emit(on_line, STAGE_TESTING);
            return self.test_archive(kind, archive).await && ok_so_far;
        }
        ok_so_far
    }
}

/// Split a path into (parent, final segment) for `tar -C`.
fn split_parent(path: &str) -> (String, String) {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((parent, name)) if !parent.is_empty() => (parent.to_string(), name.to_string()),
        _ => ("/".to_string(), path.trim_matches('/').to_string()),
    }
}

fn install_script(apk_dir: &str, user_id: &str) -> String {
    format!(
        r#"tmp=/data/local/tmp/rootstash-install
rm -rf "$tmp" && mkdir -p "$tmp" && cp "{apk_dir}"/*.apk "$tmp/" || exit 1
count=$(ls "$tmp"/*.apk | wc -l)
if [ "$count" -eq 1 ]; then
    pm install --user {user_id} -r -t "$tmp"/*.apk
else
    session=$(pm install-create --user {user_id} -t | grep -E -o '[0-9]+')
    for apk in "$tmp"/*.apk; do
        pm install-write "$session" "$(basename "$apk")" "$apk" || exit 1
    done
    pm install-commit "$session"
fi
status=$?
rm -rf "$tmp"
exit $status"#,
        apk_dir = apk_dir,
        user_id = user_id
    )
}
