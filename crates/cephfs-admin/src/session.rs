//! Mounted volume session.
//!
//! A [`CephFs`] owns one filesystem client for its whole lifetime: the
//! volume is mounted when the session is built and the client is shut down
//! exactly once when the session ends, either through [`CephFs::shutdown`]
//! or on drop.

use crate::client::CephFsClient;
use crate::error::Result;
use tracing::{debug, warn};

/// Session over one mounted CephFS volume.
pub struct CephFs<C: CephFsClient> {
    client: C,
    fs_name: Option<String>,
    shut_down: bool,
}

impl<C: CephFsClient> CephFs<C> {
    /// Mounts `fs_name` (or the cluster default volume) on `client`.
    ///
    /// If mounting fails the client is still shut down before the error is
    /// returned.
    pub fn mount(client: C, fs_name: Option<&str>) -> Result<Self> {
        debug!("[CephFS] mounting cephfs filesystem: {:?}", fs_name);
        let mut session = Self {
            client,
            fs_name: fs_name.map(str::to_string),
            shut_down: false,
        };
        session.client.mount(fs_name)?;
        debug!("[CephFS] mounted cephfs filesystem");
        Ok(session)
    }

    /// Volume name used at mount time; `None` means the default volume.
    pub fn fs_name(&self) -> Option<&str> {
        self.fs_name.as_deref()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Shuts the client down and reports the outcome.
    pub fn shutdown(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        debug!("[CephFS] shutting down cephfs filesystem");
        self.client.shutdown()
    }
}

impl<C: CephFsClient> Drop for CephFs<C> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("[CephFS] shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CephFsError;
    use crate::memfs::{FaultOp, MemFs};
    use std::sync::Arc;

    #[test]
    fn test_mount_calls_client_once() {
        let fs = CephFs::mount(MemFs::new(), None).unwrap();
        assert_eq!(fs.client().stats().mounts, 1);
        assert_eq!(fs.client().stats().shutdowns, 0);
        assert_eq!(fs.fs_name(), None);
    }

    #[test]
    fn test_mount_named_volume() {
        let fs = CephFs::mount(MemFs::new().with_volume("data"), Some("data")).unwrap();
        assert_eq!(fs.fs_name(), Some("data"));
        assert_eq!(fs.client().mounted_volume().as_deref(), Some("data"));
    }

    #[test]
    fn test_drop_shuts_down_once() {
        let client = Arc::new(MemFs::new());
        {
            let _fs = CephFs::mount(Arc::clone(&client), None).unwrap();
        }
        assert_eq!(client.stats().shutdowns, 1);
        assert_eq!(client.mounted_volume(), None);
    }

    #[test]
    fn test_explicit_shutdown_is_not_repeated_on_drop() {
        let client = Arc::new(MemFs::new());
        let fs = CephFs::mount(Arc::clone(&client), None).unwrap();
        fs.shutdown().unwrap();
        assert_eq!(client.stats().shutdowns, 1);
    }

    #[test]
    fn test_failed_mount_still_shuts_down() {
        let client = Arc::new(MemFs::new());
        let result = CephFs::mount(Arc::clone(&client), Some("missing"));
        assert!(matches!(result, Err(CephFsError::MountFailed { .. })));
        assert_eq!(client.stats().mounts, 1);
        assert_eq!(client.stats().shutdowns, 1);
    }

    #[test]
    fn test_injected_mount_failure() {
        let client = Arc::new(MemFs::new());
        client.inject_fault(FaultOp::Mount, libc::ETIMEDOUT).unwrap();
        assert!(CephFs::mount(Arc::clone(&client), None).is_err());
        assert_eq!(client.stats().shutdowns, 1);
    }
}
