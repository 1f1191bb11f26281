//! crates/aclbridge/src/lib.rs
//!
//! Translation engine between Windows NT security descriptors and POSIX
//! ACLs, for files exported by an SMB-style server over a Unix
//! filesystem.
//!
//! NT clients edit permissions as ordered allow/deny ACE lists keyed by
//! SIDs; the filesystem only stores unordered, purely-additive POSIX ACL
//! entries plus a mode. The engine collapses the ordered deny semantics
//! into additive permission sets on the write path and synthesizes a
//! descriptor Windows can display and re-edit on the read path.
//!
//! The two entry points live on [`engine::AclEngine`]:
//! [`engine::AclEngine::get_security_descriptor`] and
//! [`engine::AclEngine::set_security_descriptor`]. Storage access goes
//! through the [`vfs::Vfs`] trait, SID mapping through
//! [`identity::IdentityResolver`], and privilege escalation through
//! [`privilege::PrivilegeBroker`], so the pipeline itself never touches
//! a concrete filesystem.

pub mod apply;
pub mod compose;
pub mod decompose;
pub mod engine;
pub mod error;
pub mod identity;
pub mod model;
pub mod pai;
pub mod perms;
pub mod policy;
pub mod privilege;
pub mod reduce;
#[cfg(all(unix, feature = "acl", feature = "xattr"))]
pub mod unix;
pub mod vfs;

pub use engine::AclEngine;
pub use error::{AclError, Result};
pub use identity::{CallerContext, IdentityResolver, UnixIdentities};
pub use model::{AceAttr, AceList, CanonicalAce, PosixRole, PrincipalKind};
pub use pai::InheritanceMetadata;
pub use perms::{ModeClass, Perms};
pub use policy::SharePolicy;
pub use privilege::{NoPrivileges, PrivilegeBroker, PrivilegeGuard};
#[cfg(all(unix, feature = "acl", feature = "xattr"))]
pub use unix::UnixVfs;
pub use vfs::{AclKind, FileStat, PosixAclEntry, PosixTag, Vfs};
