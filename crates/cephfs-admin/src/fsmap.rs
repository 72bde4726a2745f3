//! Filesystem map as reported by the cluster (`ceph fs dump --format json`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MdsMap {
    #[serde(default)]
    pub fs_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FsMapEntry {
    /// Numeric in cluster output; kept raw so string ids compare too.
    pub id: Value,
    #[serde(default)]
    pub mdsmap: MdsMap,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FsMap {
    #[serde(default)]
    pub filesystems: Vec<FsMapEntry>,
}

/// Identifier and display name of one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemInfo {
    pub id: String,
    pub name: String,
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl FsMap {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn list_filesystems(&self) -> Vec<FilesystemInfo> {
        self.filesystems
            .iter()
            .map(|fs| FilesystemInfo {
                id: id_string(&fs.id),
                name: fs.mdsmap.fs_name.clone(),
            })
            .collect()
    }

    /// Name of the volume whose id matches `fs_id` by string form.
    pub fn fs_name_from_id(&self, fs_id: &str) -> Option<String> {
        self.filesystems
            .iter()
            .find(|fs| id_string(&fs.id) == fs_id)
            .map(|fs| fs.mdsmap.fs_name.clone())
    }
}
