//! Client for volumes mounted through the kernel CephFS client.
//!
//! The kernel mount exposes everything the administration layer needs
//! through ordinary POSIX calls: snapshots are the `.snap` directories and
//! quotas are the `ceph.quota.*` virtual xattrs. Volume-absolute paths are
//! resolved below the mountpoint configured for the mounted volume.

use crate::client::{
    CephFsClient, DirEntry, EntryKind, StatInfo, XattrFlags, CLIENT_SNAPDIR_KEY, DEFAULT_SNAPDIR,
};
use crate::error::{CephFsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{DirBuilder, ReadDir};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelClientConfig {
    /// Mountpoint of the default volume.
    pub default_mountpoint: PathBuf,
    /// Mountpoints of named volumes.
    pub volumes: BTreeMap<String, PathBuf>,
    pub client_snapdir: String,
    /// Other values answered by `conf_get`.
    pub client_conf: BTreeMap<String, String>,
}

impl Default for KernelClientConfig {
    fn default() -> Self {
        Self {
            default_mountpoint: PathBuf::from("/mnt/cephfs"),
            volumes: BTreeMap::new(),
            client_snapdir: DEFAULT_SNAPDIR.to_string(),
            client_conf: BTreeMap::new(),
        }
    }
}

/// Open directory stream on a kernel mount.
///
/// `std::fs::read_dir` hides `.` and `..`; they are replayed first so the
/// stream looks like `readdir(3)`.
pub struct KernelDir {
    path: PathBuf,
    pending_dots: Vec<&'static str>,
    iter: ReadDir,
}

pub struct KernelClient {
    config: KernelClientConfig,
    root: Mutex<Option<PathBuf>>,
}

impl KernelClient {
    pub fn new(config: KernelClientConfig) -> Self {
        Self {
            config,
            root: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &KernelClientConfig {
        &self.config
    }

    /// Host path of the current mountpoint.
    pub fn mountpoint(&self) -> Option<PathBuf> {
        self.root.lock().ok().and_then(|root| root.clone())
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if !path.has_root() {
            return Err(CephFsError::InvalidArgument {
                msg: format!("path must be absolute: {}", path.display()),
            });
        }
        let mut resolved = self.mountpoint().ok_or(CephFsError::NotMounted)?;
        for component in path.components() {
            match component {
                Component::Normal(n) => resolved.push(n),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(CephFsError::InvalidArgument {
                        msg: format!("path must be normalized: {}", path.display()),
                    })
                }
            }
        }
        Ok(resolved)
    }
}

fn entry_kind(file_type: std::fs::FileType) -> EntryKind {
    if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else if file_type.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::Other
    }
}

fn ctime_of(meta: &std::fs::Metadata) -> SystemTime {
    let secs = meta.ctime();
    let nanos = meta.ctime_nsec().clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

#[cfg(target_os = "linux")]
mod xattr {
    use super::*;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    fn c_strings(path: &Path, name: &str) -> Result<(CString, CString)> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            CephFsError::InvalidArgument {
                msg: format!("path contains NUL: {}", path.display()),
            }
        })?;
        let c_name = CString::new(name).map_err(|_| CephFsError::InvalidArgument {
            msg: format!("xattr name contains NUL: {}", name),
        })?;
        Ok((c_path, c_name))
    }

    fn last_error(path: &Path, name: &str) -> CephFsError {
        match CephFsError::from_io(std::io::Error::last_os_error(), path) {
            CephFsError::NoData { path, .. } => CephFsError::NoData {
                path,
                name: name.to_string(),
            },
            other => other,
        }
    }

    pub(super) fn get(path: &Path, name: &str) -> Result<Vec<u8>> {
        let (c_path, c_name) = c_strings(path, name)?;
        loop {
            // SAFETY: both strings are NUL-terminated; a null buffer of
            // length 0 only queries the value size.
            let size = unsafe {
                libc::getxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0)
            };
            if size < 0 {
                return Err(last_error(path, name));
            }
            let mut buf = vec![0u8; size as usize];
            // SAFETY: `buf` is valid for `buf.len()` bytes.
            let read = unsafe {
                libc::getxattr(
                    c_path.as_ptr(),
                    c_name.as_ptr(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if read >= 0 {
                let read = read as usize;
                // a zero-length buffer turns the read into another size query
                if read > buf.len() {
                    continue;
                }
                buf.truncate(read);
                return Ok(buf);
            }
            // value grew between the two calls
            if std::io::Error::last_os_error().raw_os_error() != Some(libc::ERANGE) {
                return Err(last_error(path, name));
            }
        }
    }

    pub(super) fn set(path: &Path, name: &str, value: &[u8], flags: XattrFlags) -> Result<()> {
        let (c_path, c_name) = c_strings(path, name)?;
        // SAFETY: `value` is valid for `value.len()` bytes.
        let rc = unsafe {
            libc::setxattr(
                c_path.as_ptr(),
                c_name.as_ptr(),
                value.as_ptr() as *const libc::c_void,
                value.len(),
                flags.bits(),
            )
        };
        if rc < 0 {
            return Err(last_error(path, name));
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod xattr {
    use super::*;

    pub(super) fn get(_path: &Path, _name: &str) -> Result<Vec<u8>> {
        Err(CephFsError::NotSupported {
            op: "getxattr".to_string(),
        })
    }

    pub(super) fn set(_path: &Path, _name: &str, _value: &[u8], _flags: XattrFlags) -> Result<()> {
        Err(CephFsError::NotSupported {
            op: "setxattr".to_string(),
        })
    }
}

impl CephFsClient for KernelClient {
    type DirHandle = KernelDir;

    fn mount(&self, fs_name: Option<&str>) -> Result<()> {
        let mountpoint = match fs_name {
            Some(name) => self.config.volumes.get(name).cloned().ok_or_else(|| {
                CephFsError::MountFailed {
                    fs_name: name.to_string(),
                    reason: "no mountpoint configured for volume".to_string(),
                }
            })?,
            None => self.config.default_mountpoint.clone(),
        };
        let label = fs_name.unwrap_or("<default>").to_string();
        let meta = std::fs::metadata(&mountpoint).map_err(|e| CephFsError::MountFailed {
            fs_name: label.clone(),
            reason: format!("{}: {}", mountpoint.display(), e),
        })?;
        if !meta.is_dir() {
            return Err(CephFsError::MountFailed {
                fs_name: label,
                reason: format!("{} is not a directory", mountpoint.display()),
            });
        }
        let mut root = self.root.lock().map_err(|_| CephFsError::MountFailed {
            fs_name: label.clone(),
            reason: "client state poisoned".to_string(),
        })?;
        if root.is_some() {
            return Err(CephFsError::InvalidArgument {
                msg: "client is already mounted".to_string(),
            });
        }
        debug!("[CephFS] using mountpoint {} for {}", mountpoint.display(), label);
        *root = Some(mountpoint);
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        if let Ok(mut root) = self.root.lock() {
            *root = None;
        }
        Ok(())
    }

    fn opendir(&self, path: &Path) -> Result<KernelDir> {
        let resolved = self.resolve(path)?;
        let iter = std::fs::read_dir(&resolved).map_err(|e| CephFsError::from_io(e, path))?;
        Ok(KernelDir {
            path: path.to_path_buf(),
            pending_dots: vec!["..", "."],
            iter,
        })
    }

    fn readdir(&self, dir: &mut KernelDir) -> Result<Option<DirEntry>> {
        if let Some(dot) = dir.pending_dots.pop() {
            return Ok(Some(DirEntry::new(dot, EntryKind::Directory)));
        }
        match dir.iter.next() {
            None => Ok(None),
            Some(Err(e)) => Err(CephFsError::from_io(e, &dir.path)),
            Some(Ok(entry)) => {
                let kind = entry
                    .file_type()
                    .map(entry_kind)
                    .map_err(|e| CephFsError::from_io(e, &dir.path))?;
                Ok(Some(DirEntry::new(entry.file_name().into_vec(), kind)))
            }
        }
    }

    fn closedir(&self, _dir: KernelDir) -> Result<()> {
        Ok(())
    }

    fn stat(&self, path: &Path) -> Result<StatInfo> {
        let resolved = self.resolve(path)?;
        let meta = std::fs::metadata(&resolved).map_err(|e| CephFsError::from_io(e, path))?;
        Ok(StatInfo {
            mode: meta.permissions().mode() & 0o7777,
            size: meta.len(),
            is_dir: meta.is_dir(),
            ctime: ctime_of(&meta),
        })
    }

    fn getxattr(&self, path: &Path, name: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path)?;
        xattr::get(&resolved, name)
    }

    fn setxattr(&self, path: &Path, name: &str, value: &[u8], flags: XattrFlags) -> Result<()> {
        let resolved = self.resolve(path)?;
        xattr::set(&resolved, name, value, flags)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let resolved = self.resolve(path)?;
        DirBuilder::new()
            .mode(mode)
            .create(&resolved)
            .map_err(|e| CephFsError::from_io(e, path))
    }

    fn mkdirs(&self, path: &Path, mode: u32) -> Result<()> {
        let resolved = self.resolve(path)?;
        if resolved.exists() {
            return Err(CephFsError::AlreadyExists {
                path: path.display().to_string(),
            });
        }
        DirBuilder::new()
            .mode(mode)
            .recursive(true)
            .create(&resolved)
            .map_err(|e| CephFsError::from_io(e, path))
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path)?;
        std::fs::remove_dir(&resolved).map_err(|e| CephFsError::from_io(e, path))
    }

    fn conf_get(&self, key: &str) -> Result<String> {
        if let Some(value) = self.config.client_conf.get(key) {
            return Ok(value.clone());
        }
        if key == CLIENT_SNAPDIR_KEY {
            return Ok(self.config.client_snapdir.clone());
        }
        Err(CephFsError::UnknownConfigKey {
            key: key.to_string(),
        })
    }
}
