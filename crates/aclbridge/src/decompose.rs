//! crates/aclbridge/src/decompose.rs
//!
//! NT security descriptor to canonical list translation, the first half
//! of the write path. The output lists still contain deny entries; the
//! reduction passes run on them afterwards.

use tracing::debug;

use secdesc::access_mask::{FILE_ALL_ACCESS, UNIX_ACCESS_NONE};
use secdesc::{AceFlags, AceType, SecAce, SecurityDescriptor, SecurityInfo, Sid};

use crate::error::{AclError, Result};
use crate::identity::{CallerContext, IdentityResolver};
use crate::model::{AceAttr, AceList, CanonicalAce, PosixRole, PrincipalKind};
use crate::perms::nt_mask_to_perms;
use crate::policy::SharePolicy;
use crate::reduce::{create_default_mode, ensure_canon_entry_valid, merge_aces, process_deny_list};
use crate::vfs::FileStat;

const INHERIT_BOTH: AceFlags =
    AceFlags::new(AceFlags::OBJECT_INHERIT.bits() | AceFlags::CONTAINER_INHERIT.bits());

/// The canonical lists unpacked from one DACL. `file_list` holds the
/// entries governing the object itself; `dir_list` is the inheritable
/// template and only exists for directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedDacl {
    pub file_list: AceList,
    pub dir_list: Option<AceList>,
}

/// Rewrites a DACL the way an NT 4 client means it: generic bits become
/// specific bits, anything outside the file rights and the no-access
/// sentinel is discarded, and the sentinel is dropped whenever any real
/// bit accompanies it.
pub fn normalize_nt4(dacl: &[SecAce]) -> Vec<SecAce> {
    dacl.iter()
        .map(|ace| {
            let mut mask = ace.access_mask.expand_generic().bits();
            mask &= UNIX_ACCESS_NONE | FILE_ALL_ACCESS;
            if mask != UNIX_ACCESS_NONE {
                mask &= !UNIX_ACCESS_NONE;
            }
            let mut out = ace.clone();
            out.access_mask = mask.into();
            out
        })
        .collect()
}

/// Undoes the NT 4 rewrite of inheritable entry pairs. When a directory
/// entry is identical to an inherited one, NT splits the inheritance
/// flags across the pair: one entry keeps inherit-only plus one of the
/// inheritance bits, the other gets the remaining bit. Both entries of
/// such a pair get the full flag set back on the inherit-only side.
pub fn repair_inherit_split(dacl: &mut [SecAce]) {
    for i in 0..dacl.len() {
        for j in i + 1..dacl.len() {
            if dacl[i].access_mask != dacl[j].access_mask || dacl[i].trustee != dacl[j].trustee {
                continue;
            }
            if dacl[i].flags.contains(AceFlags::INHERIT_ONLY) {
                let moved = AceFlags::new(dacl[j].flags.bits() & INHERIT_BOTH.bits());
                dacl[i].flags = dacl[i].flags.union(moved);
                dacl[j].flags = dacl[j].flags.difference(INHERIT_BOTH);
            } else if dacl[j].flags.contains(AceFlags::INHERIT_ONLY) {
                let moved = AceFlags::new(dacl[i].flags.bits() & INHERIT_BOTH.bits());
                dacl[j].flags = dacl[j].flags.union(moved);
                dacl[i].flags = dacl[i].flags.difference(INHERIT_BOTH);
            }
        }
    }
}

struct MappedTrustee {
    kind: PrincipalKind,
    id: Option<u32>,
    role: PosixRole,
    force_inherit_only: bool,
}

fn map_trustee(
    sid: &Sid,
    stat: &FileStat,
    policy: &SharePolicy,
    ids: &dyn IdentityResolver,
) -> Result<MappedTrustee> {
    if sid.is_world() {
        return Ok(MappedTrustee {
            kind: PrincipalKind::World,
            id: None,
            role: PosixRole::Other,
            force_inherit_only: false,
        });
    }
    // Creator Owner / Creator Group name whoever will own a child, so
    // they only ever describe inheritable permissions. NT 4 does not
    // reliably mark them inherit-only itself.
    if sid.is_creator_owner() {
        return Ok(MappedTrustee {
            kind: PrincipalKind::User,
            id: Some(stat.uid),
            role: PosixRole::OwnerObj,
            force_inherit_only: policy.nt4_compatible,
        });
    }
    if sid.is_creator_group() {
        return Ok(MappedTrustee {
            kind: PrincipalKind::Group,
            id: Some(stat.gid),
            role: PosixRole::GroupObj,
            force_inherit_only: policy.nt4_compatible,
        });
    }
    if let Some(uid) = ids.sid_to_uid(sid) {
        return Ok(MappedTrustee {
            kind: PrincipalKind::User,
            id: Some(uid),
            role: PosixRole::NamedUser,
            force_inherit_only: false,
        });
    }
    if let Some(gid) = ids.sid_to_gid(sid) {
        return Ok(MappedTrustee {
            kind: PrincipalKind::Group,
            id: Some(gid),
            role: PosixRole::NamedGroup,
            force_inherit_only: false,
        });
    }
    Err(AclError::UnmappableIdentity(sid.clone()))
}

/// Retags plain user/group entries naming the file's owner or owning
/// group as the owner and owning-group entries, when those are missing.
/// Access DACLs usually carry only the named forms.
fn check_owning_objs(list: &mut AceList, owner_sid: &Sid, group_sid: &Sid) {
    let mut got_user_obj = list.iter().any(|ace| ace.role == PosixRole::OwnerObj);
    let mut got_group_obj = list.iter().any(|ace| ace.role == PosixRole::GroupObj);
    if got_user_obj && got_group_obj {
        return;
    }
    for ace in list.iter_mut() {
        if !got_user_obj && ace.kind == PrincipalKind::User && &ace.trustee == owner_sid {
            ace.role = PosixRole::OwnerObj;
            got_user_obj = true;
        }
        if !got_group_obj && ace.kind == PrincipalKind::Group && &ace.trustee == group_sid {
            ace.role = PosixRole::GroupObj;
            got_group_obj = true;
        }
    }
}

/// Converts a DACL into raw canonical lists.
///
/// Entries naming non-mappable SIDs (NT Authority, BUILTIN) are skipped;
/// any other unmappable trustee is an error. For directories an entry
/// inheritable by both files and subdirectories lands in the directory
/// list, and additionally in the file list unless marked inherit-only.
/// Both lists must keep deny entries ahead of allow entries.
///
/// Returns `Ok(None)` when every entry was inherit-only on a directory:
/// that is how Windows 2000 expresses an inheritance traverse, and the
/// DACL carries no intent about this object.
pub fn create_canon_lists(
    dacl: &[SecAce],
    stat: &FileStat,
    owner_sid: &Sid,
    group_sid: &Sid,
    policy: &SharePolicy,
    ids: &dyn IdentityResolver,
) -> Result<Option<UnpackedDacl>> {
    let mut file_list = AceList::new();
    let mut dir_list = AceList::new();
    let mut got_file_allow = false;
    let mut got_dir_allow = false;
    let mut all_inherit_only = stat.is_directory;

    for ace in dacl {
        if ace.trustee.is_non_mappable() {
            debug!(trustee = %ace.trustee, "skipping non-mappable trustee");
            continue;
        }

        let mapped = map_trustee(&ace.trustee, stat, policy, ids)?;
        let mut flags = ace.flags;
        if mapped.force_inherit_only {
            flags = flags.union(AceFlags::INHERIT_ONLY);
        }

        let canon = CanonicalAce {
            trustee: ace.trustee.clone(),
            kind: mapped.kind,
            id: mapped.id,
            perms: nt_mask_to_perms(ace.access_mask),
            attr: if ace.ace_type == AceType::AccessDenied {
                AceAttr::Deny
            } else {
                AceAttr::Allow
            },
            role: mapped.role,
            inherited: flags.contains(AceFlags::INHERITED),
        };

        if stat.is_directory && flags.contains(INHERIT_BOTH) {
            if canon.is_deny() && got_dir_allow {
                return Err(AclError::MalformedInput(
                    "deny entry after allow entry in inheritable list",
                ));
            }
            got_dir_allow |= canon.is_allow();
            dir_list.push(canon.clone());
        }

        // Inherit-only entries exist purely for children.
        if !flags.contains(AceFlags::INHERIT_ONLY) {
            if canon.is_deny() && got_file_allow {
                return Err(AclError::MalformedInput(
                    "deny entry after allow entry in file list",
                ));
            }
            got_file_allow |= canon.is_allow();
            file_list.push(canon);
            all_inherit_only = false;
        }
    }

    if stat.is_directory && all_inherit_only {
        debug!("inheritance traverse, ignoring list");
        return Ok(None);
    }

    check_owning_objs(&mut file_list, owner_sid, group_sid);
    if !dir_list.is_empty() {
        check_owning_objs(&mut dir_list, owner_sid, group_sid);
    }

    Ok(Some(UnpackedDacl {
        file_list,
        dir_list: if dir_list.is_empty() {
            None
        } else {
            Some(dir_list)
        },
    }))
}

/// Unpacks the owner and group a descriptor asks for. An unmappable SID
/// falls back to the caller's identity when the share allows it, which
/// is what makes take-ownership from foreign domains workable.
pub fn unpack_owners(
    sd: &SecurityDescriptor,
    security_info: SecurityInfo,
    policy: &SharePolicy,
    caller: &CallerContext,
    ids: &dyn IdentityResolver,
) -> Result<(Option<u32>, Option<u32>)> {
    let mut uid = None;
    let mut gid = None;

    if security_info.contains(SecurityInfo::OWNER) {
        if let Some(owner) = &sd.owner {
            uid = match ids.sid_to_uid(owner) {
                Some(uid) => Some(uid),
                None if policy.force_unknown_acl_user => Some(caller.uid),
                None => return Err(AclError::UnmappableIdentity(owner.clone())),
            };
        }
    }

    if security_info.contains(SecurityInfo::GROUP) {
        if let Some(group) = &sd.group {
            gid = match ids.sid_to_gid(group) {
                Some(gid) => Some(gid),
                None if policy.force_unknown_acl_user => Some(caller.gid),
                None => return Err(AclError::UnmappableIdentity(group.clone())),
            };
        }
    }

    Ok((uid, gid))
}

/// The full descriptor-to-lists path: NT 4 rewrites, split repair,
/// canonical conversion, merging, deny reduction, and validity.
///
/// `Ok(None)` means the descriptor carries no usable DACL, either
/// because none was sent (an ownership-only change) or because it was
/// an inheritance traverse.
#[allow(clippy::too_many_arguments)]
pub fn unpack_canon_lists(
    sd: &SecurityDescriptor,
    security_info: SecurityInfo,
    stat: &FileStat,
    owner_sid: &Sid,
    group_sid: &Sid,
    policy: &SharePolicy,
    caller: &CallerContext,
    ids: &dyn IdentityResolver,
) -> Result<Option<UnpackedDacl>> {
    let Some(dacl) = sd.dacl.as_deref() else {
        return Ok(None);
    };
    if !security_info.contains(SecurityInfo::DACL) {
        return Ok(None);
    }

    let mut dacl = if policy.nt4_compatible {
        normalize_nt4(dacl)
    } else {
        dacl.to_vec()
    };
    repair_inherit_split(&mut dacl);

    let Some(mut unpacked) =
        create_canon_lists(&dacl, stat, owner_sid, group_sid, policy, ids)?
    else {
        return Ok(None);
    };

    merge_aces(&mut unpacked.file_list);
    process_deny_list(&mut unpacked.file_list, caller, ids);
    if let Some(dir_list) = unpacked.dir_list.as_mut() {
        merge_aces(dir_list);
        process_deny_list(dir_list, caller, ids);
    }

    let mut file_stat = *stat;
    file_stat.mode = create_default_mode(policy, stat.is_directory, false);
    ensure_canon_entry_valid(
        &mut unpacked.file_list,
        &file_stat,
        owner_sid,
        group_sid,
        policy,
        caller,
        ids,
        true,
    );

    if let Some(dir_list) = unpacked.dir_list.as_mut() {
        let mut dir_stat = *stat;
        dir_stat.mode = create_default_mode(policy, stat.is_directory, true);
        ensure_canon_entry_valid(
            dir_list, &dir_stat, owner_sid, group_sid, policy, caller, ids, true,
        );
    }

    Ok(Some(unpacked))
}
