//! Directory streams, tree listing and idempotent directory mutation.

use crate::client::{CephFsClient, DirEntry};
use crate::error::{CephFsError, Result};
use crate::session::CephFs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Mode used for directories created through [`CephFs::mk_dirs`].
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Open directory stream, closed exactly once when dropped.
pub struct DirGuard<'a, C: CephFsClient> {
    client: &'a C,
    path: PathBuf,
    handle: Option<C::DirHandle>,
}

impl<'a, C: CephFsClient> DirGuard<'a, C> {
    pub fn open(client: &'a C, path: &Path) -> Result<Self> {
        let handle = client.opendir(path)?;
        Ok(Self {
            client,
            path: path.to_path_buf(),
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the next entry; `None` once the stream is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<DirEntry>> {
        match self.handle.as_mut() {
            Some(handle) => self.client.readdir(handle),
            None => Ok(None),
        }
    }
}

impl<C: CephFsClient> Drop for DirGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.client.closedir(handle) {
                warn!("[CephFS] closedir failed for {}: {}", self.path.display(), e);
            }
        }
    }
}

/// True when `path` names the volume root (`/`, `//`, `/a/..`, ...).
///
/// `.` and `..` components are folded lexically; `..` never climbs above
/// the root.
pub fn is_root(path: &Path) -> bool {
    if !path.has_root() {
        return false;
    }
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => depth = depth.saturating_sub(1),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    depth == 0
}

impl<C: CephFsClient> CephFs<C> {
    /// Opens a directory stream scoped to the returned guard.
    pub fn opendir(&self, path: impl AsRef<Path>) -> Result<DirGuard<'_, C>> {
        DirGuard::open(self.client(), path.as_ref())
    }

    /// Lists directories below `path`, descending `level` steps.
    ///
    /// The result always starts with `path` itself, followed by each
    /// subdirectory and its own listing in directory-stream order. Paths are
    /// joined from raw entry names and are never decoded.
    ///
    /// ```text
    /// ls_dir("/photos", 1) => ["/photos", "/photos/flowers", "/photos/cars"]
    /// ```
    pub fn ls_dir(&self, path: impl AsRef<Path>, level: usize) -> Result<Vec<PathBuf>> {
        let path = path.as_ref();
        debug!("[CephFS] get_dir_list dir_path={} level={}", path.display(), level);
        if level == 0 {
            return Ok(vec![path.to_path_buf()]);
        }
        debug!("[CephFS] opening dir_path={}", path.display());
        let mut dir = self.opendir(path)?;
        let mut paths = vec![path.to_path_buf()];
        while let Some(entry) = dir.next_entry()? {
            debug!("[CephFS] found entry={}", entry.name_os().to_string_lossy());
            if entry.is_dot() || !entry.is_dir() {
                continue;
            }
            let subdir_path = path.join(entry.name_os());
            debug!("[CephFS] found dir={}", subdir_path.display());
            paths.extend(self.ls_dir(&subdir_path, level - 1)?);
        }
        Ok(paths)
    }

    /// Whether `path` can be opened as a directory.
    ///
    /// Only `NotFound` maps to `false`; every other failure is returned.
    pub fn dir_exists(&self, path: impl AsRef<Path>) -> Result<bool> {
        match self.opendir(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates `path` and missing parents; a no-op if it already exists.
    pub fn mk_dirs(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if is_root(path) {
            return Err(CephFsError::InvalidArgument {
                msg: "Cannot create root directory \"/\"".to_string(),
            });
        }
        if self.dir_exists(path)? {
            return Ok(());
        }
        info!("[CephFS] Creating directory: {}", path.display());
        self.client().mkdirs(path, DEFAULT_DIR_MODE)
    }

    /// Removes the empty directory `path`; a no-op if it does not exist.
    pub fn rm_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if is_root(path) {
            return Err(CephFsError::InvalidArgument {
                msg: "Cannot remove root directory \"/\"".to_string(),
            });
        }
        if !self.dir_exists(path)? {
            return Ok(());
        }
        info!("[CephFS] Removing directory: {}", path.display());
        self.client().rmdir(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::{FaultOp, MemFs};
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    fn session() -> CephFs<MemFs> {
        CephFs::mount(MemFs::new(), None).unwrap()
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let fs = session();
        {
            let mut dir = fs.opendir("/").unwrap();
            assert_eq!(dir.path(), Path::new("/"));
            assert!(dir.next_entry().unwrap().is_some());
            assert_eq!(fs.client().stats().open_streams, 1);
        }
        let stats = fs.client().stats();
        assert_eq!(stats.open_streams, 0);
        assert_eq!(stats.closedirs, 1);
    }

    #[test]
    fn test_guard_closes_when_read_fails() {
        let fs = session();
        fs.client().create_dir_all("/a/b").unwrap();
        fs.client().inject_fault(FaultOp::Readdir, libc::EIO).unwrap();
        let result = fs.ls_dir("/a", 2);
        assert!(matches!(result, Err(CephFsError::Errno { errno, .. }) if errno == libc::EIO));
        assert_eq!(fs.client().stats().open_streams, 0);
    }

    #[test]
    fn test_failed_close_is_swallowed() {
        let fs = session();
        fs.client().inject_fault(FaultOp::Closedir, libc::EIO).unwrap();
        assert_eq!(fs.ls_dir("/", 1).unwrap(), paths(&["/"]));
    }

    #[test]
    fn test_ls_dir_level_zero_does_not_open() {
        let fs = session();
        let result = fs.ls_dir("/does/not/exist", 0).unwrap();
        assert_eq!(result, paths(&["/does/not/exist"]));
        assert_eq!(fs.client().stats().opendirs, 0);
    }

    #[test]
    fn test_ls_dir_skips_files_and_dots() {
        let fs = session();
        fs.client().create_dir_all("/photos/cars").unwrap();
        fs.client().create_dir_all("/photos/flowers").unwrap();
        fs.client().create_file("/photos/readme.txt", 12).unwrap();
        let result = fs.ls_dir("/photos", 1).unwrap();
        assert_eq!(result, paths(&["/photos", "/photos/cars", "/photos/flowers"]));
    }

    #[test]
    fn test_ls_dir_respects_depth() {
        let fs = session();
        fs.client().create_dir_all("/a/b/c/d").unwrap();
        assert_eq!(fs.ls_dir("/a", 1).unwrap(), paths(&["/a", "/a/b"]));
        assert_eq!(
            fs.ls_dir("/a", 2).unwrap(),
            paths(&["/a", "/a/b", "/a/b/c"])
        );
        assert_eq!(
            fs.ls_dir("/a", 10).unwrap(),
            paths(&["/a", "/a/b", "/a/b/c", "/a/b/c/d"])
        );
        assert_eq!(fs.client().stats().open_streams, 0);
    }

    #[test]
    fn test_ls_dir_depth_first_order() {
        let fs = session();
        fs.client().create_dir_all("/r/a/x").unwrap();
        fs.client().create_dir_all("/r/b").unwrap();
        assert_eq!(
            fs.ls_dir("/r", 2).unwrap(),
            paths(&["/r", "/r/a", "/r/a/x", "/r/b"])
        );
    }

    #[test]
    fn test_ls_dir_missing_root_is_not_found() {
        let fs = session();
        assert!(fs.ls_dir("/missing", 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_ls_dir_keeps_non_utf8_names() {
        let fs = session();
        let name = OsStr::from_bytes(&[b'd', 0xff]);
        let dir = Path::new("/raw").join(name);
        fs.client().create_dir_all(&dir).unwrap();
        let result = fs.ls_dir("/raw", 1).unwrap();
        assert_eq!(result, vec![PathBuf::from("/raw"), dir]);
        assert!(result[1].to_str().is_none());
    }

    #[test]
    fn test_dir_exists() {
        let fs = session();
        fs.client().create_dir_all("/here").unwrap();
        assert!(fs.dir_exists("/here").unwrap());
        assert!(!fs.dir_exists("/gone").unwrap());
        assert_eq!(fs.client().stats().open_streams, 0);
    }

    #[test]
    fn test_dir_exists_propagates_other_errors() {
        let fs = session();
        fs.client().inject_fault(FaultOp::Opendir, libc::EACCES).unwrap();
        assert!(matches!(
            fs.dir_exists("/here"),
            Err(CephFsError::PermissionDenied { .. })
        ));
        fs.client().create_file("/file", 1).unwrap();
        assert!(matches!(
            fs.dir_exists("/file"),
            Err(CephFsError::NotDirectory { .. })
        ));
    }

    #[test]
    fn test_mk_dirs_is_idempotent() {
        let fs = session();
        fs.mk_dirs("/a/b/c").unwrap();
        fs.mk_dirs("/a/b/c").unwrap();
        assert_eq!(fs.client().stats().mkdirs, 1);
        assert_eq!(fs.ls_dir("/a/b", 1).unwrap(), paths(&["/a/b", "/a/b/c"]));
    }

    #[test]
    fn test_root_is_protected() {
        let fs = session();
        for root in ["/", "//"] {
            assert!(matches!(
                fs.mk_dirs(root),
                Err(CephFsError::InvalidArgument { .. })
            ));
            assert!(matches!(
                fs.rm_dir(root),
                Err(CephFsError::InvalidArgument { .. })
            ));
        }
        assert_eq!(fs.client().stats().opendirs, 0);
    }

    #[test]
    fn test_rm_dir_missing_is_noop() {
        let fs = session();
        fs.rm_dir("/nothing").unwrap();
        assert_eq!(fs.client().stats().rmdirs, 0);
    }

    #[test]
    fn test_rm_dir_is_not_recursive() {
        let fs = session();
        fs.mk_dirs("/a/b").unwrap();
        assert!(matches!(
            fs.rm_dir("/a"),
            Err(CephFsError::NotEmpty { .. })
        ));
        fs.rm_dir("/a/b").unwrap();
        fs.rm_dir("/a").unwrap();
        assert!(!fs.dir_exists("/a").unwrap());
    }

    #[test]
    fn test_is_root() {
        assert!(is_root(Path::new("/")));
        assert!(is_root(Path::new("//")));
        assert!(!is_root(Path::new("/a")));
        assert!(!is_root(Path::new("")));
        assert!(is_root(Path::new("/a/..")));
        assert!(is_root(Path::new("/./")));
        assert!(is_root(Path::new("/..")));
        assert!(is_root(Path::new("/a/b/../..")));
        assert!(!is_root(Path::new("/a/b/..")));
        assert!(!is_root(Path::new("a/..")));
    }

    #[test]
    fn test_dotted_root_is_protected() {
        let fs = session();
        fs.mk_dirs("/a").unwrap();
        for root in ["/a/..", "/.", "/a/./.."] {
            assert!(matches!(
                fs.mk_dirs(root),
                Err(CephFsError::InvalidArgument { .. })
            ));
            assert!(matches!(
                fs.rm_dir(root),
                Err(CephFsError::InvalidArgument { .. })
            ));
        }
        assert!(fs.dir_exists("/a").unwrap());
    }
}
