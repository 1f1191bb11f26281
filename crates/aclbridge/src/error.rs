//! crates/aclbridge/src/error.rs
//!
//! Engine error taxonomy.
//!
//! Storage failures keep the underlying `io::Error` as their source.
//! The "no ACL support" errno set is classified separately because the
//! apply layer falls back to plain mode bits for it instead of failing
//! the call.

use std::io;

use secdesc::Sid;
use thiserror::Error;

/// Errors returned by the translation engine.
#[derive(Debug, Error)]
pub enum AclError {
    /// The incoming descriptor cannot be translated as sent.
    #[error("malformed security descriptor: {0}")]
    MalformedInput(&'static str),

    /// A trustee SID has no POSIX identity and no fallback is configured.
    #[error("no POSIX identity for SID {0}")]
    UnmappableIdentity(Sid),

    /// The filesystem cannot express the request at all.
    #[error("ACL storage unsupported while {context}")]
    StorageUnsupported { context: &'static str },

    /// The caller lacks permission, after any group-override retry.
    #[error("permission denied while {context}")]
    PermissionDenied {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// Any other storage-layer failure.
    #[error("storage error while {context}")]
    Storage {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl AclError {
    /// Classifies an `io::Error` from the VFS into the taxonomy.
    pub fn from_io(context: &'static str, source: io::Error) -> Self {
        if is_no_acl_support(&source) {
            Self::StorageUnsupported { context }
        } else if is_permission_denied(&source) {
            Self::PermissionDenied { context, source }
        } else {
            Self::Storage { context, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, AclError>;

/// The fixed errno set meaning "this filesystem has no ACL syscalls",
/// as opposed to a genuine failure.
pub fn is_no_acl_support(err: &io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) => {
            code == libc::ENOSYS || code == libc::ENOTSUP || code == libc::EOPNOTSUPP
        }
        None => err.kind() == io::ErrorKind::Unsupported,
    }
}

/// True for EACCES/EPERM, the errors eligible for the one-shot
/// group-override retry.
pub fn is_permission_denied(err: &io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) => code == libc::EACCES || code == libc::EPERM,
        None => err.kind() == io::ErrorKind::PermissionDenied,
    }
}
