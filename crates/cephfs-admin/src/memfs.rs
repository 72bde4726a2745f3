//! In-process CephFS volume model.
//!
//! `MemFs` implements [`CephFsClient`] against an in-memory directory tree.
//! It reproduces the client behaviors the administration layer depends on:
//! `.`/`..` in every directory stream, a virtual snapshot directory under
//! every directory (named by the `client_snapdir` configuration value),
//! per-inode xattrs with `NoData` for unset attributes, and non-recursive
//! `rmdir`. Call counters and one-shot fault injection make lifecycle and
//! error paths observable.

use crate::client::{
    CephFsClient, DirEntry, EntryKind, StatInfo, XattrFlags, CLIENT_SNAPDIR_KEY, DEFAULT_SNAPDIR,
};
use crate::error::{CephFsError, Result};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

/// Volume mounted when no name is given.
pub const DEFAULT_VOLUME: &str = "cephfs";

/// Client operations that can be made to fail on their next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Mount,
    Opendir,
    Readdir,
    Closedir,
    Stat,
    Getxattr,
    Setxattr,
    Mkdir,
    Rmdir,
    ConfGet,
}

/// Counters of lifecycle-relevant client calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub mounts: u64,
    pub shutdowns: u64,
    pub opendirs: u64,
    pub closedirs: u64,
    /// Streams opened and not yet closed.
    pub open_streams: u64,
    pub mkdirs: u64,
    pub rmdirs: u64,
}

#[derive(Debug, Clone)]
struct Snapshot {
    ctime: SystemTime,
    entries: Vec<DirEntry>,
}

#[derive(Debug, Clone)]
struct Node {
    kind: EntryKind,
    mode: u32,
    size: u64,
    ctime: SystemTime,
    xattrs: HashMap<String, Vec<u8>>,
    snapshots: BTreeMap<Vec<u8>, Snapshot>,
}

impl Node {
    fn new(kind: EntryKind, mode: u32) -> Self {
        Self {
            kind,
            mode,
            size: 0,
            ctime: SystemTime::now(),
            xattrs: HashMap::new(),
            snapshots: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Volume {
    nodes: BTreeMap<PathBuf, Node>,
}

impl Volume {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::new(EntryKind::Directory, 0o755));
        Self { nodes }
    }

    fn dir(&self, path: &Path) -> Result<&Node> {
        let node = self.nodes.get(path).ok_or_else(|| not_found(path))?;
        if node.kind != EntryKind::Directory {
            return Err(CephFsError::NotDirectory {
                path: path.display().to_string(),
            });
        }
        Ok(node)
    }

    fn dir_mut(&mut self, path: &Path) -> Result<&mut Node> {
        let node = self.nodes.get_mut(path).ok_or_else(|| not_found(path))?;
        if node.kind != EntryKind::Directory {
            return Err(CephFsError::NotDirectory {
                path: path.display().to_string(),
            });
        }
        Ok(node)
    }

    fn children(&self, path: &Path) -> Vec<DirEntry> {
        self.nodes
            .iter()
            .filter(|(p, _)| p.as_path() != path && p.parent() == Some(path))
            .filter_map(|(p, node)| {
                p.file_name()
                    .map(|name| DirEntry::new(name.as_bytes(), node.kind))
            })
            .collect()
    }

    fn insert(&mut self, path: &Path, kind: EntryKind, mode: u32) -> Result<()> {
        if self.nodes.contains_key(path) {
            return Err(CephFsError::AlreadyExists {
                path: path.display().to_string(),
            });
        }
        let parent = path.parent().ok_or_else(|| CephFsError::AlreadyExists {
            path: path.display().to_string(),
        })?;
        self.dir(parent)?;
        self.nodes.insert(path.to_path_buf(), Node::new(kind, mode));
        Ok(())
    }
}

/// Where a normalized path lands once the snapshot directory is accounted for.
#[derive(Debug, PartialEq)]
enum Target {
    Node(PathBuf),
    SnapDir(PathBuf),
    Snapshot(PathBuf, Vec<u8>),
    InsideSnapshot,
}

struct MemState {
    volumes: HashMap<String, Volume>,
    mounted: Option<String>,
    conf: HashMap<String, String>,
    faults: HashMap<FaultOp, i32>,
    stats: CallStats,
    next_stream: u64,
}

impl MemState {
    fn take_fault(&mut self, op: FaultOp, path: &Path) -> Result<()> {
        match self.faults.remove(&op) {
            Some(errno) => Err(CephFsError::from_errno(errno, path)),
            None => Ok(()),
        }
    }

    fn snapdir(&self) -> &str {
        self.conf
            .get(CLIENT_SNAPDIR_KEY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_SNAPDIR)
    }

    fn volume(&self) -> Result<&Volume> {
        let name = self.mounted.as_ref().ok_or(CephFsError::NotMounted)?;
        self.volumes.get(name).ok_or(CephFsError::NotMounted)
    }

    fn volume_mut(&mut self) -> Result<&mut Volume> {
        let name = self.mounted.as_ref().ok_or(CephFsError::NotMounted)?;
        self.volumes.get_mut(name).ok_or(CephFsError::NotMounted)
    }

    /// Volume used for seeding: the mounted one, else the default.
    fn seed_volume(&mut self) -> &mut Volume {
        let name = self
            .mounted
            .clone()
            .unwrap_or_else(|| DEFAULT_VOLUME.to_string());
        self.volumes.entry(name).or_insert_with(Volume::new)
    }

    fn classify(&self, path: &Path) -> Result<Target> {
        let path = normalize(path)?;
        let snapdir = OsStr::new(self.snapdir());
        let names: Vec<&OsStr> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(n) => Some(n),
                _ => None,
            })
            .collect();
        let snap_pos = names.iter().position(|n| *n == snapdir);
        let owner = |upto: usize| -> PathBuf {
            let mut p = PathBuf::from("/");
            for n in &names[..upto] {
                p.push(n);
            }
            p
        };
        Ok(match snap_pos {
            None => Target::Node(path),
            Some(pos) if pos + 1 == names.len() => Target::SnapDir(owner(pos)),
            Some(pos) if pos + 2 == names.len() => {
                Target::Snapshot(owner(pos), names[pos + 1].as_bytes().to_vec())
            }
            Some(_) => Target::InsideSnapshot,
        })
    }
}

/// Open directory stream on a [`MemFs`].
#[derive(Debug)]
pub struct MemDir {
    id: u64,
    entries: VecDeque<DirEntry>,
}

impl MemDir {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// In-memory CephFS client.
pub struct MemFs {
    state: Mutex<MemState>,
}

impl MemFs {
    /// Creates a client knowing one empty volume, [`DEFAULT_VOLUME`].
    pub fn new() -> Self {
        let mut volumes = HashMap::new();
        volumes.insert(DEFAULT_VOLUME.to_string(), Volume::new());
        Self {
            state: Mutex::new(MemState {
                volumes,
                mounted: None,
                conf: HashMap::new(),
                faults: HashMap::new(),
                stats: CallStats::default(),
                next_stream: 1,
            }),
        }
    }

    /// Adds an empty volume that can be mounted by name.
    pub fn with_volume(self, name: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.volumes.entry(name.to_string()).or_insert_with(Volume::new);
        }
        self
    }

    pub fn set_conf(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.conf.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Makes the next call of `op` fail with `errno`.
    pub fn inject_fault(&self, op: FaultOp, errno: i32) -> Result<()> {
        let mut state = self.lock()?;
        state.faults.insert(op, errno);
        Ok(())
    }

    pub fn stats(&self) -> CallStats {
        self.lock().map(|s| s.stats.clone()).unwrap_or_default()
    }

    pub fn mounted_volume(&self) -> Option<String> {
        self.lock().ok().and_then(|s| s.mounted.clone())
    }

    /// Creates a regular file, mounted or not.
    pub fn create_file(&self, path: impl AsRef<Path>, size: u64) -> Result<()> {
        let path = normalize(path.as_ref())?;
        let mut state = self.lock()?;
        let volume = state.seed_volume();
        volume.insert(&path, EntryKind::File, 0o644)?;
        if let Some(node) = volume.nodes.get_mut(&path) {
            node.size = size;
        }
        Ok(())
    }

    /// Creates a directory and its parents, mounted or not.
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = normalize(path.as_ref())?;
        let mut state = self.lock()?;
        let volume = state.seed_volume();
        let mut current = PathBuf::from("/");
        for component in path.components().skip(1) {
            current.push(component);
            if !volume.nodes.contains_key(&current) {
                volume.insert(&current, EntryKind::Directory, 0o755)?;
            }
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemState>> {
        self.state.lock().map_err(|_| CephFsError::Errno {
            path: String::new(),
            errno: libc::EIO,
        })
    }

    fn mkdir_at(state: &mut MemState, path: &Path, mode: u32) -> Result<()> {
        match state.classify(path)? {
            Target::Node(p) => state.volume_mut()?.insert(&p, EntryKind::Directory, mode),
            Target::SnapDir(_) => Err(CephFsError::AlreadyExists {
                path: path.display().to_string(),
            }),
            Target::Snapshot(owner, name) => {
                let volume = state.volume_mut()?;
                let entries = volume.children(&owner);
                let node = volume.dir_mut(&owner)?;
                if node.snapshots.contains_key(&name) {
                    return Err(CephFsError::AlreadyExists {
                        path: path.display().to_string(),
                    });
                }
                node.snapshots.insert(
                    name,
                    Snapshot {
                        ctime: SystemTime::now(),
                        entries,
                    },
                );
                Ok(())
            }
            Target::InsideSnapshot => Err(read_only_snapshot(path)),
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl CephFsClient for MemFs {
    type DirHandle = MemDir;

    fn mount(&self, fs_name: Option<&str>) -> Result<()> {
        let mut state = self.lock()?;
        state.stats.mounts += 1;
        let name = fs_name.unwrap_or(DEFAULT_VOLUME);
        if let Some(errno) = state.faults.remove(&FaultOp::Mount) {
            return Err(CephFsError::MountFailed {
                fs_name: name.to_string(),
                reason: format!("errno {}", errno),
            });
        }
        if state.mounted.is_some() {
            return Err(CephFsError::InvalidArgument {
                msg: "client is already mounted".to_string(),
            });
        }
        if !state.volumes.contains_key(name) {
            return Err(CephFsError::MountFailed {
                fs_name: name.to_string(),
                reason: "no such filesystem".to_string(),
            });
        }
        state.mounted = Some(name.to_string());
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.stats.shutdowns += 1;
        state.mounted = None;
        Ok(())
    }

    fn opendir(&self, path: &Path) -> Result<MemDir> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Opendir, path)?;
        let mut entries: VecDeque<DirEntry> = VecDeque::new();
        entries.push_back(DirEntry::new(".", EntryKind::Directory));
        entries.push_back(DirEntry::new("..", EntryKind::Directory));
        match state.classify(path)? {
            Target::Node(p) => {
                let volume = state.volume()?;
                volume.dir(&p)?;
                entries.extend(volume.children(&p));
            }
            Target::SnapDir(owner) => {
                let node = state.volume()?.dir(&owner)?;
                entries.extend(
                    node.snapshots
                        .keys()
                        .map(|name| DirEntry::new(name.clone(), EntryKind::Directory)),
                );
            }
            Target::Snapshot(owner, name) => {
                let node = state.volume()?.dir(&owner)?;
                let snap = node.snapshots.get(&name).ok_or_else(|| not_found(path))?;
                entries.extend(snap.entries.iter().cloned());
            }
            Target::InsideSnapshot => {
                return Err(CephFsError::NotSupported {
                    op: format!("opendir below a snapshot: {}", path.display()),
                })
            }
        }
        let id = state.next_stream;
        state.next_stream += 1;
        state.stats.opendirs += 1;
        state.stats.open_streams += 1;
        Ok(MemDir { id, entries })
    }

    fn readdir(&self, dir: &mut MemDir) -> Result<Option<DirEntry>> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Readdir, Path::new(""))?;
        Ok(dir.entries.pop_front())
    }

    fn closedir(&self, _dir: MemDir) -> Result<()> {
        let mut state = self.lock()?;
        state.stats.closedirs += 1;
        state.stats.open_streams = state.stats.open_streams.saturating_sub(1);
        state.take_fault(FaultOp::Closedir, Path::new(""))
    }

    fn stat(&self, path: &Path) -> Result<StatInfo> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Stat, path)?;
        match state.classify(path)? {
            Target::Node(p) => {
                let node = state.volume()?.nodes.get(&p).ok_or_else(|| not_found(path))?;
                Ok(StatInfo {
                    mode: node.mode,
                    size: node.size,
                    is_dir: node.kind == EntryKind::Directory,
                    ctime: node.ctime,
                })
            }
            Target::SnapDir(owner) => {
                let node = state.volume()?.dir(&owner)?;
                Ok(StatInfo {
                    mode: 0o755,
                    size: node.snapshots.len() as u64,
                    is_dir: true,
                    ctime: node.ctime,
                })
            }
            Target::Snapshot(owner, name) => {
                let node = state.volume()?.dir(&owner)?;
                let snap = node.snapshots.get(&name).ok_or_else(|| not_found(path))?;
                Ok(StatInfo {
                    mode: node.mode,
                    size: snap.entries.len() as u64,
                    is_dir: true,
                    ctime: snap.ctime,
                })
            }
            Target::InsideSnapshot => Err(CephFsError::NotSupported {
                op: format!("stat below a snapshot: {}", path.display()),
            }),
        }
    }

    fn getxattr(&self, path: &Path, name: &str) -> Result<Vec<u8>> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Getxattr, path)?;
        let p = match state.classify(path)? {
            Target::Node(p) => p,
            _ => {
                return Err(CephFsError::NotSupported {
                    op: format!("getxattr on snapshot path {}", path.display()),
                })
            }
        };
        let node = state.volume()?.nodes.get(&p).ok_or_else(|| not_found(path))?;
        node.xattrs
            .get(name)
            .cloned()
            .ok_or_else(|| CephFsError::NoData {
                path: path.display().to_string(),
                name: name.to_string(),
            })
    }

    fn setxattr(&self, path: &Path, name: &str, value: &[u8], flags: XattrFlags) -> Result<()> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Setxattr, path)?;
        let p = match state.classify(path)? {
            Target::Node(p) => p,
            _ => return Err(read_only_snapshot(path)),
        };
        let node = state
            .volume_mut()?
            .nodes
            .get_mut(&p)
            .ok_or_else(|| not_found(path))?;
        let exists = node.xattrs.contains_key(name);
        match flags {
            XattrFlags::Create if exists => {
                return Err(CephFsError::AlreadyExists {
                    path: format!("{}@{}", path.display(), name),
                })
            }
            XattrFlags::Replace if !exists => {
                return Err(CephFsError::NoData {
                    path: path.display().to_string(),
                    name: name.to_string(),
                })
            }
            _ => {}
        }
        node.xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Mkdir, path)?;
        state.stats.mkdirs += 1;
        Self::mkdir_at(&mut state, path, mode)
    }

    fn mkdirs(&self, path: &Path, mode: u32) -> Result<()> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Mkdir, path)?;
        state.stats.mkdirs += 1;
        let target = state.classify(path)?;
        let p = match target {
            Target::Node(p) => p,
            _ => return Self::mkdir_at(&mut state, path, mode),
        };
        let volume = state.volume_mut()?;
        if volume.nodes.contains_key(&p) {
            return Err(CephFsError::AlreadyExists {
                path: path.display().to_string(),
            });
        }
        let mut current = PathBuf::from("/");
        for component in p.components().skip(1) {
            current.push(component);
            match volume.nodes.get(&current) {
                Some(node) if node.kind == EntryKind::Directory => {}
                Some(_) => {
                    return Err(CephFsError::NotDirectory {
                        path: current.display().to_string(),
                    })
                }
                None => volume.insert(&current, EntryKind::Directory, mode)?,
            }
        }
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::Rmdir, path)?;
        state.stats.rmdirs += 1;
        match state.classify(path)? {
            Target::Node(p) => {
                if p.parent().is_none() {
                    return Err(CephFsError::Errno {
                        path: path.display().to_string(),
                        errno: libc::EBUSY,
                    });
                }
                let volume = state.volume_mut()?;
                let node = volume.dir(&p)?;
                if !node.snapshots.is_empty() || !volume.children(&p).is_empty() {
                    return Err(CephFsError::NotEmpty {
                        path: path.display().to_string(),
                    });
                }
                volume.nodes.remove(&p);
                Ok(())
            }
            Target::SnapDir(_) => Err(CephFsError::PermissionDenied {
                path: path.display().to_string(),
            }),
            Target::Snapshot(owner, name) => {
                let node = state.volume_mut()?.dir_mut(&owner)?;
                node.snapshots
                    .remove(&name)
                    .map(|_| ())
                    .ok_or_else(|| not_found(path))
            }
            Target::InsideSnapshot => Err(read_only_snapshot(path)),
        }
    }

    fn conf_get(&self, key: &str) -> Result<String> {
        let mut state = self.lock()?;
        state.take_fault(FaultOp::ConfGet, Path::new(key))?;
        if let Some(value) = state.conf.get(key) {
            return Ok(value.clone());
        }
        if key == CLIENT_SNAPDIR_KEY {
            return Ok(DEFAULT_SNAPDIR.to_string());
        }
        Err(CephFsError::UnknownConfigKey {
            key: key.to_string(),
        })
    }
}

fn not_found(path: &Path) -> CephFsError {
    CephFsError::NotFound {
        path: path.display().to_string(),
    }
}

fn read_only_snapshot(path: &Path) -> CephFsError {
    CephFsError::Errno {
        path: path.display().to_string(),
        errno: libc::EROFS,
    }
}

/// Resolves `.`/`..` and trailing separators; paths must be absolute.
fn normalize(path: &Path) -> Result<PathBuf> {
    if !path.has_root() {
        return Err(CephFsError::InvalidArgument {
            msg: format!("path must be absolute: {}", path.display()),
        });
    }
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(n) => out.push(n),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    Ok(out)
}
