//! Directory quotas stored in the `ceph.quota.*` virtual xattrs.
//!
//! A value of `0` means "no limit"; an unset attribute reads as `0` too.

use crate::client::{CephFsClient, XattrFlags};
use crate::error::{CephFsError, Result};
use crate::session::CephFs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const MAX_BYTES_XATTR: &str = "ceph.quota.max_bytes";
pub const MAX_FILES_XATTR: &str = "ceph.quota.max_files";

/// Byte and file-count limits of a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    pub max_bytes: u64,
    pub max_files: u64,
}

impl Quotas {
    pub fn is_unlimited(&self) -> bool {
        self.max_bytes == 0 && self.max_files == 0
    }
}

fn parse_quota_value(name: &str, raw: &[u8]) -> Result<u64> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_ascii_whitespace());
    trimmed.parse().map_err(|_| CephFsError::InvalidXattrValue {
        name: name.to_string(),
        value: text.to_string(),
    })
}

impl<C: CephFsClient> CephFs<C> {
    fn get_quota(&self, path: &Path, name: &str) -> Result<u64> {
        match self.client().getxattr(path, name) {
            Ok(raw) => parse_quota_value(name, &raw),
            Err(e) if e.is_no_data() => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn set_quota(&self, path: &Path, name: &str, value: u64) -> Result<()> {
        self.client()
            .setxattr(path, name, value.to_string().as_bytes(), XattrFlags::Any)
    }

    /// Reads both quota limits of `path`; unset limits read as `0`.
    pub fn get_quotas(&self, path: impl AsRef<Path>) -> Result<Quotas> {
        let path = path.as_ref();
        Ok(Quotas {
            max_bytes: self.get_quota(path, MAX_BYTES_XATTR)?,
            max_files: self.get_quota(path, MAX_FILES_XATTR)?,
        })
    }

    /// Writes both quota limits of `path`. A limit left as `None` is written
    /// as `0`, clearing any previous value. The two writes are not atomic.
    pub fn set_quotas(
        &self,
        path: impl AsRef<Path>,
        max_bytes: Option<u64>,
        max_files: Option<u64>,
    ) -> Result<()> {
        let path = path.as_ref();
        let max_bytes = max_bytes.unwrap_or(0);
        let max_files = max_files.unwrap_or(0);
        info!(
            "[CephFS] Setting quotas on {}: max_bytes={} max_files={}",
            path.display(),
            max_bytes,
            max_files
        );
        self.set_quota(path, MAX_BYTES_XATTR, max_bytes)?;
        self.set_quota(path, MAX_FILES_XATTR, max_files)
    }

    /// Like [`CephFs::set_quotas`], but a limit left as `None` keeps its
    /// current value.
    pub fn update_quotas(
        &self,
        path: impl AsRef<Path>,
        max_bytes: Option<u64>,
        max_files: Option<u64>,
    ) -> Result<Quotas> {
        let path = path.as_ref();
        let current = self.get_quotas(path)?;
        let merged = Quotas {
            max_bytes: max_bytes.unwrap_or(current.max_bytes),
            max_files: max_files.unwrap_or(current.max_files),
        };
        self.set_quotas(path, Some(merged.max_bytes), Some(merged.max_files))?;
        Ok(merged)
    }
}
