//! crates/aclbridge/src/unix.rs
//!
//! Real-filesystem [`Vfs`] backed by the platform POSIX ACL and
//! extended-attribute syscalls.
//!
//! ACL I/O goes through `exacl`, which exposes one entry model across
//! Linux, macOS and FreeBSD. `exacl` resolves numeric ids to account
//! names on read, so conversion back to the numeric form used
//! internally goes through `getpwnam_r`/`getgrnam_r` when the name is
//! not already numeric. Entries naming accounts that no longer exist
//! are skipped rather than failing the whole read.

#![allow(unsafe_code)]

use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::path::{Path, PathBuf};
use std::ptr;

use exacl::{AclEntry, AclEntryKind, AclOption, Flag, Perm};
use rustix::fs::Mode;
use tracing::debug;

use crate::perms::Perms;
use crate::vfs::{AclKind, FileStat, PosixAclEntry, PosixTag, Vfs};

/// [`Vfs`] implementation bound to one path.
#[derive(Debug, Clone)]
pub struct UnixVfs {
    path: PathBuf,
}

impl UnixVfs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

const fn uid_from_raw(raw: u32) -> rustix::fs::Uid {
    // SAFETY: any u32 is a representable uid.
    unsafe { rustix::fs::Uid::from_raw(raw) }
}

const fn gid_from_raw(raw: u32) -> rustix::fs::Gid {
    // SAFETY: any u32 is a representable gid.
    unsafe { rustix::fs::Gid::from_raw(raw) }
}

const fn acl_options(kind: AclKind) -> AclOption {
    match kind {
        // Without this, Linux getfacl also folds a directory's default
        // ACL into the result.
        AclKind::Access => AclOption::ACCESS_ACL,
        AclKind::Default => AclOption::DEFAULT_ACL,
    }
}

fn perm_to_perms(perm: Perm) -> Perms {
    let mut perms = Perms::NONE;
    if perm.contains(Perm::READ) {
        perms |= Perms::READ;
    }
    if perm.contains(Perm::WRITE) {
        perms |= Perms::WRITE;
    }
    if perm.contains(Perm::EXECUTE) {
        perms |= Perms::EXECUTE;
    }
    perms
}

fn perms_to_perm(perms: Perms) -> Perm {
    let mut perm = Perm::empty();
    if perms.contains(Perms::READ) {
        perm |= Perm::READ;
    }
    if perms.contains(Perms::WRITE) {
        perm |= Perm::WRITE;
    }
    if perms.contains(Perms::EXECUTE) {
        perm |= Perm::EXECUTE;
    }
    perm
}

/// Maps one `exacl` entry to the internal form. `None` for entry kinds
/// outside the POSIX.1e set and for names that resolve to no account.
fn entry_from_exacl(entry: &AclEntry) -> Option<PosixAclEntry> {
    let tag = match entry.kind {
        AclEntryKind::User if entry.name.is_empty() => PosixTag::OwnerObj,
        AclEntryKind::User => PosixTag::NamedUser(resolve_user(&entry.name)?),
        AclEntryKind::Group if entry.name.is_empty() => PosixTag::GroupObj,
        AclEntryKind::Group => PosixTag::NamedGroup(resolve_group(&entry.name)?),
        AclEntryKind::Mask => PosixTag::Mask,
        AclEntryKind::Other => PosixTag::Other,
        _ => {
            debug!(kind = ?entry.kind, "skipping non-POSIX ACL entry");
            return None;
        }
    };
    Some(PosixAclEntry::new(tag, perm_to_perms(entry.perms)))
}

fn entry_to_exacl(entry: &PosixAclEntry) -> AclEntry {
    let (kind, name) = match entry.tag {
        PosixTag::OwnerObj => (AclEntryKind::User, String::new()),
        PosixTag::NamedUser(uid) => (AclEntryKind::User, uid.to_string()),
        PosixTag::GroupObj => (AclEntryKind::Group, String::new()),
        PosixTag::NamedGroup(gid) => (AclEntryKind::Group, gid.to_string()),
        PosixTag::Mask => (AclEntryKind::Mask, String::new()),
        PosixTag::Other => (AclEntryKind::Other, String::new()),
    };
    AclEntry {
        kind,
        name,
        perms: perms_to_perm(entry.perms),
        flags: Flag::empty(),
        allow: true,
    }
}

fn resolve_user(name: &str) -> Option<u32> {
    if let Ok(uid) = name.parse::<u32>() {
        return Some(uid);
    }
    let uid = lookup_uid(name);
    if uid.is_none() {
        debug!(name, "ACL names unknown user, skipping entry");
    }
    uid
}

fn resolve_group(name: &str) -> Option<u32> {
    if let Ok(gid) = name.parse::<u32>() {
        return Some(gid);
    }
    let gid = lookup_gid(name);
    if gid.is_none() {
        debug!(name, "ACL names unknown group, skipping entry");
    }
    gid
}

fn lookup_uid(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    let mut buffer = vec![0_u8; 4096];
    loop {
        let mut pwd = MaybeUninit::<libc::passwd>::zeroed();
        let mut result: *mut libc::passwd = ptr::null_mut();
        // SAFETY: all pointers are valid for the duration of the call;
        // `buffer` is the scratch space getpwnam_r writes into.
        let errno = unsafe {
            libc::getpwnam_r(
                c_name.as_ptr(),
                pwd.as_mut_ptr(),
                buffer.as_mut_ptr().cast::<libc::c_char>(),
                buffer.len(),
                &mut result,
            )
        };
        if errno == 0 {
            if result.is_null() {
                return None;
            }
            // SAFETY: `result` is non-null, so `pwd` was initialized.
            let pwd = unsafe { pwd.assume_init() };
            return Some(pwd.pw_uid);
        }
        if errno == libc::ERANGE && buffer.len() < 1024 * 1024 {
            buffer.resize(buffer.len().saturating_mul(2), 0);
            continue;
        }
        return None;
    }
}

fn lookup_gid(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    let mut buffer = vec![0_u8; 4096];
    loop {
        let mut grp = MaybeUninit::<libc::group>::zeroed();
        let mut result: *mut libc::group = ptr::null_mut();
        // SAFETY: all pointers are valid for the duration of the call;
        // `buffer` is the scratch space getgrnam_r writes into.
        let errno = unsafe {
            libc::getgrnam_r(
                c_name.as_ptr(),
                grp.as_mut_ptr(),
                buffer.as_mut_ptr().cast::<libc::c_char>(),
                buffer.len(),
                &mut result,
            )
        };
        if errno == 0 {
            if result.is_null() {
                return None;
            }
            // SAFETY: `result` is non-null, so `grp` was initialized.
            let grp = unsafe { grp.assume_init() };
            return Some(grp.gr_gid);
        }
        if errno == libc::ERANGE && buffer.len() < 1024 * 1024 {
            buffer.resize(buffer.len().saturating_mul(2), 0);
            continue;
        }
        return None;
    }
}

#[cfg(target_os = "linux")]
const NO_SUCH_XATTR: i32 = libc::ENODATA;
#[cfg(not(target_os = "linux"))]
const NO_SUCH_XATTR: i32 = libc::ENOATTR;

impl Vfs for UnixVfs {
    fn stat(&self) -> io::Result<FileStat> {
        let st = rustix::fs::stat(&self.path)?;
        let mode = u32::from(st.st_mode);
        Ok(FileStat {
            uid: st.st_uid,
            gid: st.st_gid,
            mode: mode & 0o7777,
            is_directory: rustix::fs::FileType::from_raw_mode(st.st_mode)
                == rustix::fs::FileType::Directory,
        })
    }

    fn get_acl(&self, kind: AclKind) -> io::Result<Option<Vec<PosixAclEntry>>> {
        let raw = exacl::getfacl(&self.path, acl_options(kind))?;
        if raw.is_empty() {
            return Ok(None);
        }
        let entries: Vec<PosixAclEntry> = raw.iter().filter_map(entry_from_exacl).collect();
        Ok(Some(entries))
    }

    fn set_acl(&mut self, kind: AclKind, entries: &[PosixAclEntry]) -> io::Result<()> {
        let raw: Vec<AclEntry> = entries.iter().map(entry_to_exacl).collect();
        exacl::setfacl(&[&self.path], &raw, acl_options(kind))
    }

    fn delete_default_acl(&mut self) -> io::Result<()> {
        exacl::setfacl(&[&self.path], &[], AclOption::DEFAULT_ACL)
    }

    fn chmod(&mut self, mode: u32) -> io::Result<()> {
        rustix::fs::chmod(&self.path, Mode::from_bits_truncate(mode))?;
        Ok(())
    }

    fn chown(&mut self, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        rustix::fs::chown(&self.path, uid.map(uid_from_raw), gid.map(gid_from_raw))?;
        Ok(())
    }

    fn get_xattr(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        xattr::get(&self.path, name)
    }

    fn set_xattr(&mut self, name: &str, value: &[u8]) -> io::Result<()> {
        xattr::set(&self.path, name, value)
    }

    fn remove_xattr(&mut self, name: &str) -> io::Result<()> {
        match xattr::remove(&self.path, name) {
            Err(err) if err.raw_os_error() == Some(NO_SUCH_XATTR) => Ok(()),
            other => other,
        }
    }
}
