//! Boundary with the low-level CephFS client.
//!
//! Everything above this module talks to the filesystem through
//! [`CephFsClient`]. Paths are absolute paths inside the volume and are
//! handled as raw bytes ([`Path`] on Unix), never decoded to text.

use crate::error::Result;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Configuration key holding the name of the reserved snapshot directory.
pub const CLIENT_SNAPDIR_KEY: &str = "client_snapdir";

/// Snapshot directory name used when nothing else is configured.
pub const DEFAULT_SNAPDIR: &str = ".snap";

/// Type of a directory entry as reported by the directory stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

/// One item read from an open directory stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Raw entry name; not guaranteed to be valid UTF-8.
    pub name: Vec<u8>,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<Vec<u8>>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// True for the `.` and `..` pseudo entries.
    pub fn is_dot(&self) -> bool {
        self.name == b"." || self.name == b".."
    }

    pub fn name_os(&self) -> &OsStr {
        OsStr::from_bytes(&self.name)
    }
}

/// Subset of `stat` the administration layer consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfo {
    pub mode: u32,
    pub size: u64,
    pub is_dir: bool,
    /// Inode change time (`st_ctime`); for snapshots this is the creation time.
    pub ctime: SystemTime,
}

/// Flags for [`CephFsClient::setxattr`], matching `setxattr(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XattrFlags {
    /// Create or replace.
    #[default]
    Any,
    /// Fail if the attribute already exists.
    Create,
    /// Fail if the attribute does not exist.
    Replace,
}

impl XattrFlags {
    pub fn bits(self) -> i32 {
        match self {
            XattrFlags::Any => 0,
            XattrFlags::Create => 1,
            XattrFlags::Replace => 2,
        }
    }
}

/// Low-level filesystem client bound to one cluster connection.
///
/// Implementations are not required to be safe for concurrent use; callers
/// serialize access per session. Every call is a blocking round-trip.
pub trait CephFsClient {
    /// Open directory stream.
    type DirHandle;

    /// Mounts `fs_name`, or the cluster default volume when `None`.
    fn mount(&self, fs_name: Option<&str>) -> Result<()>;

    /// Releases the connection. Must tolerate being called without a mount.
    fn shutdown(&self) -> Result<()>;

    /// Fails with `NotFound` when `path` does not exist.
    fn opendir(&self, path: &Path) -> Result<Self::DirHandle>;

    /// Returns `None` once the stream is exhausted.
    fn readdir(&self, dir: &mut Self::DirHandle) -> Result<Option<DirEntry>>;

    fn closedir(&self, dir: Self::DirHandle) -> Result<()>;

    fn stat(&self, path: &Path) -> Result<StatInfo>;

    /// Fails with `NoData` when the attribute is not set.
    fn getxattr(&self, path: &Path, name: &str) -> Result<Vec<u8>>;

    fn setxattr(&self, path: &Path, name: &str, value: &[u8], flags: XattrFlags) -> Result<()>;

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()>;

    /// Creates `path` and any missing parents.
    fn mkdirs(&self, path: &Path, mode: u32) -> Result<()>;

    /// Non-recursive; fails on a non-empty directory.
    fn rmdir(&self, path: &Path) -> Result<()>;

    /// Reads a client configuration value.
    fn conf_get(&self, key: &str) -> Result<String>;
}

impl<T: CephFsClient + ?Sized> CephFsClient for Arc<T> {
    type DirHandle = T::DirHandle;

    fn mount(&self, fs_name: Option<&str>) -> Result<()> {
        (**self).mount(fs_name)
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }

    fn opendir(&self, path: &Path) -> Result<Self::DirHandle> {
        (**self).opendir(path)
    }

    fn readdir(&self, dir: &mut Self::DirHandle) -> Result<Option<DirEntry>> {
        (**self).readdir(dir)
    }

    fn closedir(&self, dir: Self::DirHandle) -> Result<()> {
        (**self).closedir(dir)
    }

    fn stat(&self, path: &Path) -> Result<StatInfo> {
        (**self).stat(path)
    }

    fn getxattr(&self, path: &Path, name: &str) -> Result<Vec<u8>> {
        (**self).getxattr(path, name)
    }

    fn setxattr(&self, path: &Path, name: &str, value: &[u8], flags: XattrFlags) -> Result<()> {
        (**self).setxattr(path, name, value, flags)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        (**self).mkdir(path, mode)
    }

    fn mkdirs(&self, path: &Path, mode: u32) -> Result<()> {
        (**self).mkdirs(path, mode)
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        (**self).rmdir(path)
    }

    fn conf_get(&self, key: &str) -> Result<String> {
        (**self).conf_get(key)
    }
}
