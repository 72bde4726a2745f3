use crate::client::DEFAULT_SNAPDIR;
use crate::local::KernelClientConfig;
use crate::snapshot::DEFAULT_SNAPSHOT_MODE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Volume to mount; `None` mounts the cluster default.
    pub fs_name: Option<String>,
    pub default_mountpoint: PathBuf,
    pub volumes: BTreeMap<String, PathBuf>,
    pub client_snapdir: String,
    pub client_conf: BTreeMap<String, String>,
    pub snapshot_mode: u32,
    pub default_depth: usize,
    pub op_timeout_secs: Option<u64>,
    pub fs_map_path: Option<PathBuf>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            fs_name: None,
            default_mountpoint: PathBuf::from("/mnt/cephfs"),
            volumes: BTreeMap::new(),
            client_snapdir: String::from(DEFAULT_SNAPDIR),
            client_conf: BTreeMap::new(),
            snapshot_mode: DEFAULT_SNAPSHOT_MODE,
            default_depth: 1,
            op_timeout_secs: None,
            fs_map_path: None,
        }
    }
}

impl AdminConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: AdminConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: AdminConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    pub fn client_config(&self) -> KernelClientConfig {
        KernelClientConfig {
            default_mountpoint: self.default_mountpoint.clone(),
            volumes: self.volumes.clone(),
            client_snapdir: self.client_snapdir.clone(),
            client_conf: self.client_conf.clone(),
        }
    }
}
