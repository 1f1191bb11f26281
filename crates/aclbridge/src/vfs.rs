//! crates/aclbridge/src/vfs.rs
//!
//! The storage interface the engine speaks, plus an in-memory
//! implementation used by the pipeline tests.

use std::io;

use crate::perms::Perms;

/// Which of a file's two POSIX ACLs an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclKind {
    Access,
    /// Directories only; the template inherited by children.
    Default,
}

/// POSIX ACL entry tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosixTag {
    OwnerObj,
    NamedUser(u32),
    GroupObj,
    NamedGroup(u32),
    Mask,
    Other,
}

/// One POSIX ACL entry as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixAclEntry {
    pub tag: PosixTag,
    pub perms: Perms,
}

impl PosixAclEntry {
    pub const fn new(tag: PosixTag, perms: Perms) -> Self {
        Self { tag, perms }
    }
}

/// Stat snapshot, reduced to what translation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub uid: u32,
    pub gid: u32,
    /// Permission bits only; file-type bits are not interpreted.
    pub mode: u32,
    pub is_directory: bool,
}

/// The narrow filesystem surface the engine relies on. Every operation
/// targets the single file the engine instance was created for.
pub trait Vfs {
    fn stat(&self) -> io::Result<FileStat>;
    /// `Ok(None)` when no ACL of that kind exists.
    fn get_acl(&self, kind: AclKind) -> io::Result<Option<Vec<PosixAclEntry>>>;
    fn set_acl(&mut self, kind: AclKind, entries: &[PosixAclEntry]) -> io::Result<()>;
    fn delete_default_acl(&mut self) -> io::Result<()>;
    fn chmod(&mut self, mode: u32) -> io::Result<()>;
    /// `None` leaves the respective id unchanged.
    fn chown(&mut self, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;
    fn get_xattr(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
    fn set_xattr(&mut self, name: &str, value: &[u8]) -> io::Result<()>;
    fn remove_xattr(&mut self, name: &str) -> io::Result<()>;
}

pub mod memory {
    //! In-memory [`Vfs`] double.
    //!
    //! Supports fault injection for the unsupported-filesystem fallback
    //! and for the group-override retry, and records the order of
    //! mutating operations so tests can assert on chown sequencing.

    use std::cell::Cell;
    use std::collections::BTreeMap;
    use std::io;
    use std::rc::Rc;

    use super::{AclKind, FileStat, PosixAclEntry, Vfs};
    use crate::privilege::PrivilegeBroker;

    /// Shared flag standing in for effective-root state.
    #[derive(Debug, Clone, Default)]
    pub struct ElevationFlag(Rc<Cell<bool>>);

    impl ElevationFlag {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_raised(&self) -> bool {
            self.0.get()
        }
    }

    impl PrivilegeBroker for ElevationFlag {
        fn raise(&self) {
            self.0.set(true);
        }

        fn lower(&self) {
            self.0.set(false);
        }
    }

    #[derive(Debug)]
    pub struct MemoryVfs {
        stat: FileStat,
        access_acl: Option<Vec<PosixAclEntry>>,
        default_acl: Option<Vec<PosixAclEntry>>,
        xattrs: BTreeMap<String, Vec<u8>>,
        acl_supported: bool,
        /// When set, mutations fail with EACCES unless the elevation
        /// flag is raised.
        write_gate: Option<ElevationFlag>,
        ops: Vec<&'static str>,
    }

    impl MemoryVfs {
        pub fn new(stat: FileStat) -> Self {
            Self {
                stat,
                access_acl: None,
                default_acl: None,
                xattrs: BTreeMap::new(),
                acl_supported: true,
                write_gate: None,
                ops: Vec::new(),
            }
        }

        pub fn with_access_acl(mut self, entries: Vec<PosixAclEntry>) -> Self {
            self.access_acl = Some(entries);
            self
        }

        pub fn with_default_acl(mut self, entries: Vec<PosixAclEntry>) -> Self {
            self.default_acl = Some(entries);
            self
        }

        pub fn with_xattr(mut self, name: &str, value: Vec<u8>) -> Self {
            self.xattrs.insert(name.to_string(), value);
            self
        }

        /// ACL syscalls report ENOTSUP, as on a filesystem without ACLs.
        pub fn without_acl_support(mut self) -> Self {
            self.acl_supported = false;
            self
        }

        /// Gate mutations on the given elevation flag.
        pub fn with_write_gate(mut self, gate: ElevationFlag) -> Self {
            self.write_gate = Some(gate);
            self
        }

        pub fn access_acl(&self) -> Option<&[PosixAclEntry]> {
            self.access_acl.as_deref()
        }

        pub fn default_acl(&self) -> Option<&[PosixAclEntry]> {
            self.default_acl.as_deref()
        }

        pub fn xattr(&self, name: &str) -> Option<&[u8]> {
            self.xattrs.get(name).map(Vec::as_slice)
        }

        pub fn current_stat(&self) -> FileStat {
            self.stat
        }

        /// Mutating operations in the order they were attempted.
        pub fn ops(&self) -> &[&'static str] {
            &self.ops
        }

        fn check_write(&self) -> io::Result<()> {
            match &self.write_gate {
                Some(gate) if !gate.is_raised() => {
                    Err(io::Error::from_raw_os_error(libc::EACCES))
                }
                _ => Ok(()),
            }
        }

        fn check_acl_support(&self) -> io::Result<()> {
            if self.acl_supported {
                Ok(())
            } else {
                Err(io::Error::from_raw_os_error(libc::ENOTSUP))
            }
        }
    }

    impl Vfs for MemoryVfs {
        fn stat(&self) -> io::Result<FileStat> {
            Ok(self.stat)
        }

        fn get_acl(&self, kind: AclKind) -> io::Result<Option<Vec<PosixAclEntry>>> {
            self.check_acl_support()?;
            Ok(match kind {
                AclKind::Access => self.access_acl.clone(),
                AclKind::Default => self.default_acl.clone(),
            })
        }

        fn set_acl(&mut self, kind: AclKind, entries: &[PosixAclEntry]) -> io::Result<()> {
            self.ops.push(match kind {
                AclKind::Access => "set_acl",
                AclKind::Default => "set_default_acl",
            });
            self.check_acl_support()?;
            self.check_write()?;
            match kind {
                AclKind::Access => self.access_acl = Some(entries.to_vec()),
                AclKind::Default => self.default_acl = Some(entries.to_vec()),
            }
            Ok(())
        }

        fn delete_default_acl(&mut self) -> io::Result<()> {
            self.ops.push("delete_default_acl");
            self.check_acl_support()?;
            self.check_write()?;
            self.default_acl = None;
            Ok(())
        }

        fn chmod(&mut self, mode: u32) -> io::Result<()> {
            self.ops.push("chmod");
            self.check_write()?;
            self.stat.mode = mode & 0o7777;
            Ok(())
        }

        fn chown(&mut self, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
            self.ops.push("chown");
            self.check_write()?;
            if let Some(uid) = uid {
                self.stat.uid = uid;
            }
            if let Some(gid) = gid {
                self.stat.gid = gid;
            }
            Ok(())
        }

        fn get_xattr(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
            Ok(self.xattrs.get(name).cloned())
        }

        fn set_xattr(&mut self, name: &str, value: &[u8]) -> io::Result<()> {
            self.ops.push("set_xattr");
            self.check_write()?;
            self.xattrs.insert(name.to_string(), value.to_vec());
            Ok(())
        }

        fn remove_xattr(&mut self, name: &str) -> io::Result<()> {
            self.ops.push("remove_xattr");
            self.check_write()?;
            self.xattrs.remove(name);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{ElevationFlag, MemoryVfs};
    use super::*;
    use crate::error::is_no_acl_support;
    use crate::privilege::PrivilegeBroker;

    fn file_stat() -> FileStat {
        FileStat {
            uid: 1000,
            gid: 100,
            mode: 0o644,
            is_directory: false,
        }
    }

    #[test]
    fn test_memory_vfs_acl_roundtrip() {
        let mut vfs = MemoryVfs::new(file_stat());
        assert_eq!(vfs.get_acl(AclKind::Access).unwrap(), None);
        let entries = vec![PosixAclEntry::new(PosixTag::OwnerObj, Perms::ALL)];
        vfs.set_acl(AclKind::Access, &entries).unwrap();
        assert_eq!(vfs.get_acl(AclKind::Access).unwrap().unwrap(), entries);
    }

    #[test]
    fn test_memory_vfs_reports_no_support() {
        let mut vfs = MemoryVfs::new(file_stat()).without_acl_support();
        let err = vfs
            .set_acl(AclKind::Access, &[PosixAclEntry::new(PosixTag::Other, Perms::READ)])
            .unwrap_err();
        assert!(is_no_acl_support(&err));
    }

    #[test]
    fn test_write_gate_honours_elevation() {
        let gate = ElevationFlag::new();
        let mut vfs = MemoryVfs::new(file_stat()).with_write_gate(gate.clone());
        assert!(vfs.chmod(0o600).is_err());
        gate.raise();
        vfs.chmod(0o600).unwrap();
        assert_eq!(vfs.current_stat().mode, 0o600);
    }

    #[test]
    fn test_chown_partial_update() {
        let mut vfs = MemoryVfs::new(file_stat());
        vfs.chown(Some(2000), None).unwrap();
        let stat = vfs.current_stat();
        assert_eq!(stat.uid, 2000);
        assert_eq!(stat.gid, 100);
    }
}
