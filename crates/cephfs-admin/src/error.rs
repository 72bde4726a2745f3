use std::path::Path;
use thiserror::Error;

#[cfg(target_os = "linux")]
const ENOATTR: i32 = libc::ENODATA;
#[cfg(not(target_os = "linux"))]
const ENOATTR: i32 = libc::ENOATTR;

/// Errors surfaced by the CephFS administration layer.
#[derive(Debug, Error)]
pub enum CephFsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to mount filesystem {fs_name}: {reason}")]
    MountFailed { fs_name: String, reason: String },

    #[error("Filesystem is not mounted")]
    NotMounted,

    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    #[error("Extended attribute {name} is not set on {path}")]
    NoData { path: String, name: String },

    #[error("Invalid argument: {msg}")]
    InvalidArgument { msg: String },

    #[error("Already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("Not a directory: {path}")]
    NotDirectory { path: String },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Invalid value for extended attribute {name}: {value:?}")]
    InvalidXattrValue { name: String, value: String },

    #[error("Unknown client configuration key: {key}")]
    UnknownConfigKey { key: String },

    #[error("Operation not supported: {op}")]
    NotSupported { op: String },

    #[error("{path}: errno {errno}")]
    Errno { path: String, errno: i32 },
}

pub type Result<T> = std::result::Result<T, CephFsError>;

impl CephFsError {
    /// Maps a raw errno reported by the filesystem client for `path`.
    pub fn from_errno(errno: i32, path: &Path) -> Self {
        let path = path.display().to_string();
        match errno {
            libc::ENOENT => CephFsError::NotFound { path },
            e if e == ENOATTR => CephFsError::NoData {
                path,
                name: String::new(),
            },
            libc::EEXIST => CephFsError::AlreadyExists { path },
            libc::ENOTEMPTY => CephFsError::NotEmpty { path },
            libc::ENOTDIR => CephFsError::NotDirectory { path },
            libc::EACCES | libc::EPERM => CephFsError::PermissionDenied { path },
            libc::EINVAL => CephFsError::InvalidArgument {
                msg: format!("rejected by filesystem: {}", path),
            },
            errno => CephFsError::Errno { path, errno },
        }
    }

    /// Maps a `std::io::Error` raised while operating on `path`.
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        match err.raw_os_error() {
            Some(errno) => Self::from_errno(errno, path),
            None => match err.kind() {
                std::io::ErrorKind::NotFound => CephFsError::NotFound {
                    path: path.display().to_string(),
                },
                std::io::ErrorKind::PermissionDenied => CephFsError::PermissionDenied {
                    path: path.display().to_string(),
                },
                std::io::ErrorKind::AlreadyExists => CephFsError::AlreadyExists {
                    path: path.display().to_string(),
                },
                _ => CephFsError::Io(err),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CephFsError::NotFound { .. })
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, CephFsError::NoData { .. })
    }

    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            CephFsError::Io(e) => e.raw_os_error().unwrap_or(EIO),
            CephFsError::MountFailed { .. } => ENOENT,
            CephFsError::NotMounted => ENOTCONN,
            CephFsError::NotFound { .. } => ENOENT,
            CephFsError::NoData { .. } => ENOATTR,
            CephFsError::InvalidArgument { .. } => EINVAL,
            CephFsError::AlreadyExists { .. } => EEXIST,
            CephFsError::NotEmpty { .. } => ENOTEMPTY,
            CephFsError::NotDirectory { .. } => ENOTDIR,
            CephFsError::PermissionDenied { .. } => EACCES,
            CephFsError::InvalidXattrValue { .. } => EINVAL,
            CephFsError::UnknownConfigKey { .. } => ENOENT,
            CephFsError::NotSupported { .. } => ENOTSUP,
            CephFsError::Errno { errno: code, .. } => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_errno() {
        let err = CephFsError::NotFound {
            path: "/a".to_string(),
        };
        assert_eq!(err.to_errno(), libc::ENOENT);
        assert!(err.is_not_found());
        assert!(!err.is_no_data());
    }

    #[test]
    fn test_no_data_round_trips_through_errno() {
        let err = CephFsError::from_errno(ENOATTR, Path::new("/a"));
        assert!(err.is_no_data());
        assert_eq!(err.to_errno(), ENOATTR);
    }

    #[test]
    fn test_from_errno_maps_common_codes() {
        let p = Path::new("/dir");
        assert!(matches!(
            CephFsError::from_errno(libc::ENOENT, p),
            CephFsError::NotFound { .. }
        ));
        assert!(matches!(
            CephFsError::from_errno(libc::EEXIST, p),
            CephFsError::AlreadyExists { .. }
        ));
        assert!(matches!(
            CephFsError::from_errno(libc::ENOTEMPTY, p),
            CephFsError::NotEmpty { .. }
        ));
        assert!(matches!(
            CephFsError::from_errno(libc::ENOTDIR, p),
            CephFsError::NotDirectory { .. }
        ));
        assert!(matches!(
            CephFsError::from_errno(libc::EPERM, p),
            CephFsError::PermissionDenied { .. }
        ));
    }

    #[test]
    fn test_unknown_errno_is_preserved() {
        let err = CephFsError::from_errno(libc::EIO, Path::new("/x"));
        assert!(matches!(err, CephFsError::Errno { errno, .. } if errno == libc::EIO));
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_from_io_uses_raw_os_error() {
        let io_err = std::io::Error::from_raw_os_error(libc::ENOENT);
        let err = CephFsError::from_io(io_err, Path::new("/gone"));
        assert!(matches!(err, CephFsError::NotFound { ref path } if path == "/gone"));
    }

    #[test]
    fn test_from_io_without_os_error_falls_back_to_kind() {
        let io_err = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(CephFsError::from_io(io_err, Path::new("/x")).is_not_found());

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(
            CephFsError::from_io(io_err, Path::new("/x")),
            CephFsError::Io(_)
        ));
    }

    #[test]
    fn test_display_messages_non_empty() {
        let errors = [
            CephFsError::NotMounted,
            CephFsError::NotFound {
                path: "/a".to_string(),
            },
            CephFsError::InvalidArgument {
                msg: "bad".to_string(),
            },
            CephFsError::InvalidXattrValue {
                name: "ceph.quota.max_bytes".to_string(),
                value: "abc".to_string(),
            },
            CephFsError::NotSupported {
                op: "getxattr".to_string(),
            },
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
