//! Snapshot management.
//!
//! CephFS exposes snapshots as directories below a reserved, per-directory
//! snapshot directory whose name comes from the `client_snapdir` client
//! setting. Creating, listing and removing snapshots are plain directory
//! operations below that name.

use crate::client::{CephFsClient, CLIENT_SNAPDIR_KEY};
use crate::error::{CephFsError, Result};
use crate::session::CephFs;
use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

/// Permissions given to a snapshot directory unless the caller overrides them.
pub const DEFAULT_SNAPSHOT_MODE: u32 = 0o755;

/// One snapshot of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: String,
    /// Creation time, RFC 3339 in UTC with a `Z` suffix.
    pub created: String,
}

/// Snapshot name for `now`: RFC 3339 with an explicit offset, e.g.
/// `2024-05-01T14:03:12+02:00`.
pub fn snapshot_name_at<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    now.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Default snapshot name derived from the local clock.
pub fn default_snapshot_name() -> String {
    snapshot_name_at(&Local::now())
}

/// Renders a snapshot creation time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_created(ctime: SystemTime) -> String {
    DateTime::<Utc>::from(ctime).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(CephFsError::InvalidArgument {
            msg: format!("invalid snapshot name: {:?}", name),
        });
    }
    Ok(())
}

impl<C: CephFsClient> CephFs<C> {
    /// Name of the reserved snapshot directory, read from the client
    /// configuration on every call.
    pub fn snapshot_dir(&self) -> Result<String> {
        self.client().conf_get(CLIENT_SNAPDIR_KEY)
    }

    fn snapshot_path(&self, path: &Path, name: &str) -> Result<PathBuf> {
        let client_snapdir = self.snapshot_dir()?;
        Ok(path.join(client_snapdir).join(name))
    }

    /// Creates a snapshot of `path` and returns its name.
    ///
    /// Without a `name` the current local time is used. An existing
    /// snapshot with the same name makes the underlying `mkdir` fail.
    pub fn mk_snapshot(
        &self,
        path: impl AsRef<Path>,
        name: Option<&str>,
        mode: u32,
    ) -> Result<String> {
        let name = match name {
            Some(name) => name.to_string(),
            None => default_snapshot_name(),
        };
        validate_name(&name)?;
        let snapshot_path = self.snapshot_path(path.as_ref(), &name)?;
        info!("[CephFS] Creating snapshot: {}", snapshot_path.display());
        self.client().mkdir(&snapshot_path, mode)?;
        Ok(name)
    }

    /// Lists the snapshots of `path` in directory-stream order.
    pub fn ls_snapshots(&self, path: impl AsRef<Path>) -> Result<Vec<SnapshotInfo>> {
        let client_snapdir = self.snapshot_dir()?;
        let path = path.as_ref().join(client_snapdir);
        let mut result = Vec::new();
        let mut dir = self.opendir(&path)?;
        while let Some(entry) = dir.next_entry()? {
            if !entry.is_dir() || entry.is_dot() {
                continue;
            }
            let snapshot_path = path.join(entry.name_os());
            let stat = self.client().stat(&snapshot_path)?;
            result.push(SnapshotInfo {
                name: entry.name_os().to_string_lossy().into_owned(),
                path: snapshot_path.to_string_lossy().into_owned(),
                created: format_created(stat.ctime),
            });
        }
        Ok(result)
    }

    /// Removes snapshot `name` of `path`; fails if it does not exist.
    pub fn rm_snapshot(&self, path: impl AsRef<Path>, name: &str) -> Result<()> {
        validate_name(name)?;
        let snapshot_path = self.snapshot_path(path.as_ref(), name)?;
        info!("[CephFS] Removing snapshot: {}", snapshot_path.display());
        self.client().rmdir(&snapshot_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::{FaultOp, MemFs};
    use chrono::FixedOffset;
    use std::time::{Duration, UNIX_EPOCH};

    fn session() -> CephFs<MemFs> {
        let fs = CephFs::mount(MemFs::new(), None).unwrap();
        fs.mk_dirs("/photos").unwrap();
        fs
    }

    #[test]
    fn test_snapshot_name_keeps_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let t = tz.with_ymd_and_hms(2024, 5, 1, 14, 3, 12).unwrap();
        assert_eq!(snapshot_name_at(&t), "2024-05-01T14:03:12+02:00");

        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(snapshot_name_at(&t), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_format_created_is_utc() {
        let ctime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(format_created(ctime), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_mk_snapshot_with_name() {
        let fs = session();
        let name = fs.mk_snapshot("/photos", Some("snap1"), DEFAULT_SNAPSHOT_MODE).unwrap();
        assert_eq!(name, "snap1");

        let snaps = fs.ls_snapshots("/photos").unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].name, "snap1");
        assert_eq!(snaps[0].path, "/photos/.snap/snap1");
        assert!(snaps[0].created.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&snaps[0].created).is_ok());
    }

    #[test]
    fn test_mk_snapshot_default_name_is_timestamp() {
        let fs = session();
        let name = fs.mk_snapshot("/photos", None, DEFAULT_SNAPSHOT_MODE).unwrap();
        assert!(!name.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&name).is_ok());

        let snaps = fs.ls_snapshots("/photos").unwrap();
        assert!(snaps.iter().any(|s| s.name == name));
    }

    #[test]
    fn test_mk_snapshot_duplicate_fails() {
        let fs = session();
        fs.mk_snapshot("/photos", Some("dup"), DEFAULT_SNAPSHOT_MODE).unwrap();
        let result = fs.mk_snapshot("/photos", Some("dup"), DEFAULT_SNAPSHOT_MODE);
        assert!(matches!(result, Err(CephFsError::AlreadyExists { .. })));
    }

    #[test]
    fn test_mk_snapshot_rejects_bad_names() {
        let fs = session();
        for name in ["", ".", "..", "a/b"] {
            let result = fs.mk_snapshot("/photos", Some(name), DEFAULT_SNAPSHOT_MODE);
            assert!(matches!(result, Err(CephFsError::InvalidArgument { .. })));
        }
    }

    #[test]
    fn test_mk_snapshot_of_missing_dir_fails() {
        let fs = session();
        let result = fs.mk_snapshot("/nope", Some("s"), DEFAULT_SNAPSHOT_MODE);
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_ls_snapshots_empty() {
        let fs = session();
        assert!(fs.ls_snapshots("/photos").unwrap().is_empty());
        assert_eq!(fs.client().stats().open_streams, 0);
    }

    #[test]
    fn test_ls_snapshots_missing_dir_is_error() {
        let fs = session();
        assert!(fs.ls_snapshots("/nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_ls_snapshots_stat_failure_closes_stream() {
        let fs = session();
        fs.mk_snapshot("/photos", Some("s1"), DEFAULT_SNAPSHOT_MODE).unwrap();
        fs.client().inject_fault(FaultOp::Stat, libc::EIO).unwrap();
        assert!(fs.ls_snapshots("/photos").is_err());
        assert_eq!(fs.client().stats().open_streams, 0);
    }

    #[test]
    fn test_rm_snapshot() {
        let fs = session();
        fs.mk_snapshot("/photos", Some("a"), DEFAULT_SNAPSHOT_MODE).unwrap();
        fs.mk_snapshot("/photos", Some("b"), DEFAULT_SNAPSHOT_MODE).unwrap();
        fs.rm_snapshot("/photos", "a").unwrap();
        let names: Vec<String> = fs
            .ls_snapshots("/photos")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[test]
    fn test_rm_missing_snapshot_fails() {
        let fs = session();
        assert!(fs.rm_snapshot("/photos", "ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_snapdir_change_applies_to_next_call() {
        let fs = session();
        fs.mk_snapshot("/photos", Some("s1"), DEFAULT_SNAPSHOT_MODE).unwrap();
        assert_eq!(fs.snapshot_dir().unwrap(), ".snap");

        fs.client().set_conf(CLIENT_SNAPDIR_KEY, ".snapshots").unwrap();
        assert_eq!(fs.snapshot_dir().unwrap(), ".snapshots");
        let snaps = fs.ls_snapshots("/photos").unwrap();
        assert_eq!(snaps[0].path, "/photos/.snapshots/s1");
    }
}
