//! Shared fixtures for integration tests.

#![allow(dead_code)]

use cephfs_admin::{CephFs, MemFs};
use std::path::PathBuf;
use std::sync::Arc;

/// Session on a fresh in-memory volume named `volume`.
pub fn mounted(volume: &str) -> CephFs<Arc<MemFs>> {
    let client = Arc::new(MemFs::new().with_volume(volume));
    CephFs::mount(client, Some(volume)).expect("mount in-memory volume")
}

pub fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}
