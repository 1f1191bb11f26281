//! crates/aclbridge/src/apply.rs
//!
//! Applying canonical lists to storage: the POSIX ACL write, the
//! group-override retry, the chmod fallback for filesystems without
//! ACL support, and the chown privilege ladder.

use std::io;

use tracing::debug;

use crate::error::{is_no_acl_support, is_permission_denied, AclError, Result};
use crate::identity::CallerContext;
use crate::model::{AceList, PosixRole, PrincipalKind};
use crate::perms::{mode_from_classes, ModeClass, Perms};
use crate::policy::SharePolicy;
use crate::privilege::{PrivilegeBroker, PrivilegeGuard};
use crate::vfs::{AclKind, PosixAclEntry, PosixTag, Vfs};

/// How an ACL write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclSetOutcome {
    Applied,
    /// The filesystem has no ACL support; the caller should fall back
    /// to a plain mode change.
    Unsupported,
}

/// Whether a denied write may be retried with privileges: the share
/// must allow the override and the caller must be in the file's owning
/// group.
pub fn acl_group_override(
    err: &io::Error,
    policy: &SharePolicy,
    caller: &CallerContext,
    prim_gid: u32,
) -> bool {
    is_permission_denied(err)
        && (policy.group_override || policy.dos_filemode)
        && caller.in_group(prim_gid)
}

fn entry_for(ace: &crate::model::CanonicalAce) -> PosixAclEntry {
    let tag = match ace.role {
        PosixRole::OwnerObj => PosixTag::OwnerObj,
        PosixRole::NamedUser => PosixTag::NamedUser(ace.id.unwrap_or(u32::MAX)),
        PosixRole::GroupObj => PosixTag::GroupObj,
        PosixRole::NamedGroup => PosixTag::NamedGroup(ace.id.unwrap_or(u32::MAX)),
        PosixRole::Mask => PosixTag::Mask,
        PosixRole::Other => PosixTag::Other,
    };
    PosixAclEntry::new(tag, ace.perms)
}

/// Writes one canonical list as a POSIX ACL.
///
/// A mask entry is added when the list carries named users or named
/// groups; it holds the union of the named and owning-group bits so it
/// never takes away anything an entry grants. A write denied by the
/// filesystem is retried once with privileges when the group override
/// applies.
pub fn set_canon_ace_list(
    vfs: &mut dyn Vfs,
    list: &AceList,
    kind: AclKind,
    prim_gid: u32,
    policy: &SharePolicy,
    caller: &CallerContext,
    broker: &dyn PrivilegeBroker,
) -> Result<AclSetOutcome> {
    let mut entries: Vec<PosixAclEntry> = Vec::with_capacity(list.len() + 1);
    let mut needs_mask = false;
    let mut mask_perms = Perms::NONE;

    for ace in list {
        match ace.role {
            PosixRole::NamedUser | PosixRole::NamedGroup => {
                needs_mask = true;
                mask_perms |= ace.perms;
            }
            PosixRole::GroupObj => mask_perms |= ace.perms,
            _ => {}
        }
        entries.push(entry_for(ace));
    }

    if needs_mask && !entries.iter().any(|e| e.tag == PosixTag::Mask) {
        entries.push(PosixAclEntry::new(PosixTag::Mask, mask_perms));
    }

    match vfs.set_acl(kind, &entries) {
        Ok(()) => Ok(AclSetOutcome::Applied),
        Err(err) if is_no_acl_support(&err) => Ok(AclSetOutcome::Unsupported),
        Err(err) if acl_group_override(&err, policy, caller, prim_gid) => {
            debug!(?kind, "retrying denied ACL write with privileges");
            let _guard = PrivilegeGuard::escalate(broker);
            vfs.set_acl(kind, &entries)
                .map_err(|err| AclError::from_io("setting posix acl", err))?;
            Ok(AclSetOutcome::Applied)
        }
        Err(err) => Err(AclError::from_io("setting posix acl", err)),
    }
}

/// Deletes a directory's default ACL, with the same group-override
/// retry as the write path.
pub fn delete_default_acl(
    vfs: &mut dyn Vfs,
    prim_gid: u32,
    policy: &SharePolicy,
    caller: &CallerContext,
    broker: &dyn PrivilegeBroker,
) -> Result<()> {
    match vfs.delete_default_acl() {
        Ok(()) => Ok(()),
        Err(err) if acl_group_override(&err, policy, caller, prim_gid) => {
            debug!("retrying denied default-ACL delete with privileges");
            let _guard = PrivilegeGuard::escalate(broker);
            vfs.delete_default_acl()
                .map_err(|err| AclError::from_io("deleting default acl", err))
        }
        Err(err) => Err(AclError::from_io("deleting default acl", err)),
    }
}

/// Collapses a canonical list into a plain mode, when it will fit.
///
/// Only a three-entry list (owner, group, other) converts; anything
/// richer would silently lose named entries. The owner always keeps at
/// least read access, and the share masks apply to the result.
pub fn convert_canon_to_mode(
    list: &AceList,
    is_directory: bool,
    policy: &SharePolicy,
) -> Option<u32> {
    if list.len() != 3 {
        debug!(entries = list.len(), "list will not collapse to a plain mode");
        return None;
    }

    let mut owner = None;
    let mut group = None;
    let mut other = None;
    for ace in list {
        match ace.kind {
            PrincipalKind::User => owner = Some(ace.perms),
            PrincipalKind::Group => group = Some(ace.perms),
            PrincipalKind::World => other = Some(ace.perms),
        }
    }
    let (owner, group, other) = (owner?, group?, other?);

    let mut mode = mode_from_classes(owner, group, other);
    mode |= 0o400;
    if is_directory {
        mode |= 0o300;
    }
    let (and_bits, or_bits) = policy.security_mask_pair(is_directory);
    Some((mode & and_bits) | or_bits)
}

/// Changes a file's owner and group, escalating when plain chown fails.
///
/// The ladder: a direct chown; then, with privileges enabled, a
/// privileged chown when the caller holds take-ownership (and is taking
/// ownership for themselves) or restore; finally, under DOS filemode
/// emulation, a privileged chown to the caller's own identity. The
/// privileged rungs never change the group, taking ownership does not
/// imply a group change.
pub fn try_chown(
    vfs: &mut dyn Vfs,
    uid: Option<u32>,
    gid: Option<u32>,
    policy: &SharePolicy,
    caller: &CallerContext,
    broker: &dyn PrivilegeBroker,
) -> Result<()> {
    let direct_err = match vfs.chown(uid, gid) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    if policy.enable_privileges
        && ((caller.can_take_ownership && uid == Some(caller.uid)) || caller.can_restore)
    {
        debug!(?uid, "chown with privileges");
        let _guard = PrivilegeGuard::escalate(broker);
        return vfs
            .chown(uid, None)
            .map_err(|err| AclError::from_io("privileged chown", err));
    }

    if !policy.dos_filemode {
        return Err(AclError::from_io("chown", direct_err));
    }

    // Chown to the caller only. This also copes with take-ownership
    // descriptors carrying a SID local to the client's workstation.
    debug!(uid = caller.uid, "chown to self under dos filemode");
    let _guard = PrivilegeGuard::escalate(broker);
    vfs.chown(Some(caller.uid), None)
        .map_err(|err| AclError::from_io("chown to self", err))
}

/// Rewrites the class entries of a stored ACL from a plain mode,
/// keeping any named entries intact. The mask opens up to full access
/// so it cannot take away what the named entries grant.
///
/// Returns `Ok(false)` when the file has no ACL, or one with no named
/// entries; a plain chmod covers those and preserves nothing.
pub fn refresh_acl_mode(vfs: &mut dyn Vfs, mode: u32) -> Result<bool> {
    let entries = match vfs.get_acl(AclKind::Access) {
        Ok(Some(entries)) => entries,
        Ok(None) => return Ok(false),
        Err(err) if is_no_acl_support(&err) => return Ok(false),
        Err(err) => return Err(AclError::from_io("reading posix acl", err)),
    };

    if entries.len() <= 3 {
        return Ok(false);
    }

    let updated: Vec<PosixAclEntry> = entries
        .iter()
        .map(|entry| {
            let perms = match entry.tag {
                PosixTag::OwnerObj => crate::perms::mode_class_bits(mode, ModeClass::Owner),
                PosixTag::GroupObj => crate::perms::mode_class_bits(mode, ModeClass::Group),
                PosixTag::Other => crate::perms::mode_class_bits(mode, ModeClass::Other),
                PosixTag::Mask => Perms::ALL,
                PosixTag::NamedUser(_) | PosixTag::NamedGroup(_) => entry.perms,
            };
            PosixAclEntry::new(entry.tag, perms)
        })
        .collect();

    vfs.set_acl(AclKind::Access, &updated)
        .map_err(|err| AclError::from_io("rewriting posix acl", err))?;
    Ok(true)
}
