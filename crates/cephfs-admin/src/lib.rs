#![warn(missing_docs)]

//! CephFS administration layer: directory trees, snapshots and quotas on a
//! mounted volume.

pub mod cli;
pub mod client;
pub mod config;
pub mod dir;
pub mod error;
pub mod fsmap;
pub mod local;
pub mod memfs;
pub mod quota;
pub mod session;
pub mod snapshot;

pub use client::{CephFsClient, DirEntry, EntryKind, StatInfo, XattrFlags};
pub use config::AdminConfig;
pub use dir::DirGuard;
pub use error::{CephFsError, Result};
pub use fsmap::{FilesystemInfo, FsMap};
pub use local::{KernelClient, KernelClientConfig};
pub use memfs::MemFs;
pub use quota::Quotas;
pub use session::CephFs;
pub use snapshot::SnapshotInfo;
