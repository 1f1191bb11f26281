//! crates/aclbridge/src/compose.rs
//!
//! POSIX ACL to NT DACL translation, the read path. Stored ACLs are
//! lifted into canonical lists, arranged for NT display semantics, and
//! rendered as allow entries; deny is never produced here, an entry
//! with an empty permission set says everything a deny would.

use tracing::debug;

use secdesc::{AceFlags, SecAce, Sid};

use crate::identity::{CallerContext, IdentityResolver};
use crate::model::{
    demote_to_end, find_role, promote_to_front, AceAttr, AceList, CanonicalAce, PosixRole,
    PrincipalKind,
};
use crate::pai::InheritanceMetadata;
use crate::perms::{perms_to_nt_mask, Perms};
use crate::policy::SharePolicy;
use crate::reduce::ensure_canon_entry_valid;
use crate::vfs::{AclKind, FileStat, PosixAclEntry, PosixTag};

/// Lifts one stored POSIX ACL into a canonical list.
///
/// The mask entry is captured rather than emitted: its bits are applied
/// to every entry except the owner and other entries, which POSIX does
/// not subject to the mask. A named-user entry for the file's owner is
/// dropped from access ACLs because it is shadowed by the owner entry
/// and Windows cannot represent it. Entries left with no permissions
/// are moved to the front so NT evaluates them before any grant, and
/// the final list runs owner first, other last.
#[allow(clippy::too_many_arguments)]
pub fn canonicalise_acl(
    entries: &[PosixAclEntry],
    kind: AclKind,
    stat: &FileStat,
    owner_sid: &Sid,
    group_sid: &Sid,
    metadata: Option<&InheritanceMetadata>,
    policy: &SharePolicy,
    caller: &CallerContext,
    ids: &dyn IdentityResolver,
) -> AceList {
    let mut acl_mask = Perms::ALL;
    let mut list = AceList::new();

    for entry in entries {
        let (trustee, principal, id, role) = match entry.tag {
            PosixTag::OwnerObj => (
                owner_sid.clone(),
                PrincipalKind::User,
                Some(stat.uid),
                PosixRole::OwnerObj,
            ),
            PosixTag::NamedUser(uid) => {
                if kind == AclKind::Access && uid == stat.uid {
                    // Shadowed by the owner entry; a get/set cycle
                    // drops it rather than inventing a phantom grant.
                    continue;
                }
                (
                    ids.uid_to_sid(uid),
                    PrincipalKind::User,
                    Some(uid),
                    PosixRole::NamedUser,
                )
            }
            PosixTag::GroupObj => (
                group_sid.clone(),
                PrincipalKind::Group,
                Some(stat.gid),
                PosixRole::GroupObj,
            ),
            PosixTag::NamedGroup(gid) => (
                ids.gid_to_sid(gid),
                PrincipalKind::Group,
                Some(gid),
                PosixRole::NamedGroup,
            ),
            PosixTag::Mask => {
                acl_mask = entry.perms;
                continue;
            }
            PosixTag::Other => (Sid::world(), PrincipalKind::World, None, PosixRole::Other),
        };

        let mut ace = CanonicalAce {
            trustee,
            kind: principal,
            id,
            perms: entry.perms,
            attr: AceAttr::Allow,
            role,
            inherited: false,
        };
        ace.inherited = metadata
            .is_some_and(|meta| meta.is_inherited(&ace, kind == AclKind::Default));
        list.push(ace);
    }

    ensure_canon_entry_valid(
        &mut list, stat, owner_sid, group_sid, policy, caller, ids, false,
    );

    for i in 0..list.len() {
        if list[i].role != PosixRole::Other && list[i].role != PosixRole::OwnerObj {
            list[i].perms &= acl_mask;
        }
        if list[i].perms.is_empty() {
            promote_to_front(&mut list, i);
        }
    }

    if let Some(idx) = find_role(&list, PosixRole::OwnerObj) {
        promote_to_front(&mut list, idx);
    }
    if let Some(idx) = find_role(&list, PosixRole::Other) {
        demote_to_end(&mut list, idx);
    }

    debug!(entries = list.len(), ?kind, "canonicalised stored list");
    list
}

const DIR_INHERIT_FLAGS: u8 = AceFlags::OBJECT_INHERIT.bits()
    | AceFlags::CONTAINER_INHERIT.bits()
    | AceFlags::INHERIT_ONLY.bits();

/// NT 4 chokes on an inherit-only entry with no plain sibling for the
/// same SID, so empty entries that would only confuse it are removed:
/// the default list's other entry when empty, the file list's other
/// entry alongside it, and the file list's owning-group entry.
fn strip_nt4_zero_entries(file_list: &mut AceList, dir_list: &mut AceList) {
    if let Some(idx) = find_role(dir_list, PosixRole::Other) {
        if dir_list[idx].perms.is_empty() {
            dir_list.remove(idx);
            if let Some(fidx) = find_role(file_list, PosixRole::Other) {
                if file_list[fidx].perms.is_empty() {
                    file_list.remove(fidx);
                }
            }
        }
    }
    if let Some(idx) = find_role(file_list, PosixRole::GroupObj) {
        if file_list[idx].perms.is_empty() {
            file_list.remove(idx);
        }
    }
}

/// Collapses file/default entry pairs that differ only in inheritance
/// flags. Windows 2000 needs the collapsed form to track inheritance
/// when replacing ACLs down a tree. A pair merges when the first entry
/// carries no flags, the second is inherit-only for both object kinds,
/// and type, mask, trustee, and inherited marking all match; the
/// surviving entry inherits to both kinds without being inherit-only.
/// For a zero mask the inheritable entry survives, since W2K expects
/// allow-nothing entries at the end of the list.
pub fn merge_default_aces(aces: &mut Vec<SecAce>) {
    let mut i = 0;
    while i < aces.len() {
        let mut j = i + 1;
        while j < aces.len() {
            let i_flags_ni = aces[i].flags.bits() & !AceFlags::INHERITED.bits();
            let j_flags_ni = aces[j].flags.bits() & !AceFlags::INHERITED.bits();
            let i_inh = aces[i].flags.contains(AceFlags::INHERITED);
            let j_inh = aces[j].flags.contains(AceFlags::INHERITED);

            if aces[i].ace_type == aces[j].ace_type
                && aces[i].access_mask == aces[j].access_mask
                && aces[i].trustee == aces[j].trustee
                && i_inh == j_inh
                && i_flags_ni == 0
                && j_flags_ni == DIR_INHERIT_FLAGS
            {
                let merged = AceFlags::new(
                    AceFlags::OBJECT_INHERIT.bits()
                        | AceFlags::CONTAINER_INHERIT.bits()
                        | if i_inh { AceFlags::INHERITED.bits() } else { 0 },
                );
                if aces[i].access_mask.is_empty() {
                    aces[j].flags = merged;
                    aces.remove(i);
                } else {
                    aces[i].flags = merged;
                    aces.remove(j);
                }
                break;
            }
            j += 1;
        }
        i += 1;
    }
}

/// Renders the canonical lists as an NT DACL. File entries come first
/// with only the inherited flag; default entries follow marked
/// inherit-only for both files and subdirectories, then identical
/// pairs are collapsed.
pub fn build_nt_dacl(
    mut file_list: AceList,
    mut dir_list: Option<AceList>,
    policy: &SharePolicy,
) -> Vec<SecAce> {
    if policy.nt4_compatible {
        if let Some(dir) = dir_list.as_mut() {
            strip_nt4_zero_entries(&mut file_list, dir);
        }
    }

    let mut aces = Vec::with_capacity(
        file_list.len() + dir_list.as_ref().map_or(0, Vec::len),
    );

    for ace in &file_list {
        let flags = if ace.inherited {
            AceFlags::INHERITED
        } else {
            AceFlags::EMPTY
        };
        aces.push(SecAce::allowed(
            ace.trustee.clone(),
            perms_to_nt_mask(ace.perms, policy.map_full_control, policy.nt4_compatible),
            flags,
        ));
    }

    for ace in dir_list.iter().flatten() {
        let flags = AceFlags::new(
            DIR_INHERIT_FLAGS
                | if ace.inherited {
                    AceFlags::INHERITED.bits()
                } else {
                    0
                },
        );
        aces.push(SecAce::allowed(
            ace.trustee.clone(),
            perms_to_nt_mask(ace.perms, policy.map_full_control, policy.nt4_compatible),
            flags,
        ));
    }

    merge_default_aces(&mut aces);
    aces
}

/// The owning-group bits of a stored ACL, used to answer mode queries
/// without re-running the whole translation.
pub fn acl_group_bits(entries: &[PosixAclEntry]) -> Option<Perms> {
    entries
        .iter()
        .find(|entry| entry.tag == PosixTag::GroupObj)
        .map(|entry| entry.perms)
}
