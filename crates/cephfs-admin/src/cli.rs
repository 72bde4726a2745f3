use crate::config::AdminConfig;
use crate::fsmap::FsMap;
use crate::local::KernelClient;
use crate::session::CephFs;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cephfs-admin")]
#[command(about = "CephFS directory, snapshot and quota administration", long_about = None)]
pub struct Cli {
    #[arg(short, long, env = "CEPHFS_ADMIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Volume to mount instead of the configured one.
    #[arg(long)]
    pub fs: Option<String>,

    /// Kernel mountpoint of the selected volume.
    #[arg(short, long)]
    pub mountpoint: Option<PathBuf>,

    /// Give up waiting on the filesystem after this many seconds.
    #[arg(short, long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    Ls {
        path: PathBuf,
        #[arg(short, long)]
        depth: Option<usize>,
    },
    Mkdir {
        path: PathBuf,
    },
    Rmdir {
        path: PathBuf,
    },
    Snapshot {
        #[command(subcommand)]
        cmd: SnapshotCmd,
    },
    Quota {
        #[command(subcommand)]
        cmd: QuotaCmd,
    },
    Fs {
        #[command(subcommand)]
        cmd: FsCmd,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SnapshotCmd {
    Create {
        path: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
        /// Octal permissions, e.g. 755.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<u32>,
    },
    List {
        path: PathBuf,
    },
    Remove {
        path: PathBuf,
        name: String,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum QuotaCmd {
    Get {
        path: PathBuf,
    },
    Set {
        path: PathBuf,
        #[arg(long)]
        max_bytes: Option<u64>,
        #[arg(long)]
        max_files: Option<u64>,
        /// Keep the current value of a limit that is not given.
        #[arg(long)]
        merge: bool,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum FsCmd {
    List {
        #[arg(long)]
        fs_map: Option<PathBuf>,
    },
    Name {
        id: String,
        #[arg(long)]
        fs_map: Option<PathBuf>,
    },
}

fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    let digits = s.trim_start_matches("0o");
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode {:?}: {}", s, e))
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let value = match self.command {
            Command::Fs { ref cmd } => Self::fs(&config, cmd)?,
            command => {
                let timeout = self.timeout.or(config.op_timeout_secs);
                run_blocking(timeout, move || execute(&config, &command)).await?
            }
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    fn load_config(&self) -> Result<AdminConfig> {
        let mut config = match &self.config {
            Some(path) => AdminConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AdminConfig::default(),
        };
        if let Some(ref fs) = self.fs {
            config.fs_name = Some(fs.clone());
        }
        if let Some(ref mountpoint) = self.mountpoint {
            match config.fs_name {
                Some(ref name) => {
                    config.volumes.insert(name.clone(), mountpoint.clone());
                }
                None => config.default_mountpoint = mountpoint.clone(),
            }
        }
        Ok(config)
    }

    fn fs(config: &AdminConfig, cmd: &FsCmd) -> Result<Value> {
        let load = |path: &Option<PathBuf>| -> Result<FsMap> {
            let path = path
                .as_ref()
                .or(config.fs_map_path.as_ref())
                .context("no fs map given (--fs-map or fs_map_path)")?;
            FsMap::from_file(path)
        };
        match cmd {
            FsCmd::List { fs_map } => Ok(serde_json::to_value(load(fs_map)?.list_filesystems())?),
            FsCmd::Name { id, fs_map } => Ok(json!({
                "id": id,
                "name": load(fs_map)?.fs_name_from_id(id),
            })),
        }
    }
}

/// Runs a filesystem operation off the async runtime, bounded by `timeout`.
async fn run_blocking<F>(timeout: Option<u64>, op: F) -> Result<Value>
where
    F: FnOnce() -> Result<Value> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(op);
    let joined = match timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), task)
            .await
            .map_err(|_| anyhow::anyhow!("operation timed out after {}s", secs))?,
        None => task.await,
    };
    joined?
}

fn execute(config: &AdminConfig, command: &Command) -> Result<Value> {
    let client = KernelClient::new(config.client_config());
    let fs = CephFs::mount(client, config.fs_name.as_deref())?;
    let value = match command {
        Command::Ls { path, depth } => {
            let paths = fs.ls_dir(path, depth.unwrap_or(config.default_depth))?;
            let paths: Vec<String> = paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            json!(paths)
        }
        Command::Mkdir { path } => {
            fs.mk_dirs(path)?;
            json!({ "created": path })
        }
        Command::Rmdir { path } => {
            fs.rm_dir(path)?;
            json!({ "removed": path })
        }
        Command::Snapshot { cmd } => match cmd {
            SnapshotCmd::Create { path, name, mode } => {
                let name = fs.mk_snapshot(
                    path,
                    name.as_deref(),
                    mode.unwrap_or(config.snapshot_mode),
                )?;
                json!({ "name": name })
            }
            SnapshotCmd::List { path } => serde_json::to_value(fs.ls_snapshots(path)?)?,
            SnapshotCmd::Remove { path, name } => {
                fs.rm_snapshot(path, name)?;
                json!({ "removed": name })
            }
        },
        Command::Quota { cmd } => match cmd {
            QuotaCmd::Get { path } => serde_json::to_value(fs.get_quotas(path)?)?,
            QuotaCmd::Set {
                path,
                max_bytes,
                max_files,
                merge,
            } => {
                if *merge {
                    serde_json::to_value(fs.update_quotas(path, *max_bytes, *max_files)?)?
                } else {
                    fs.set_quotas(path, *max_bytes, *max_files)?;
                    serde_json::to_value(fs.get_quotas(path)?)?
                }
            }
        },
        Command::Fs { .. } => anyhow::bail!("fs commands do not need a mounted volume"),
    };
    fs.shutdown()?;
    Ok(value)
}
