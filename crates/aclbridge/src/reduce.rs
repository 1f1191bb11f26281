//! crates/aclbridge/src/reduce.rs
//!
//! Deny-entry reduction and list validity.
//!
//! POSIX ACLs cannot express deny entries, so the write path folds every
//! deny into the allow entries it shadows before anything touches the
//! filesystem. Reduction is order dependent: callers present lists with
//! deny entries ahead of allow entries, and each pass only looks forward
//! from the entry it is processing.

use tracing::debug;

use secdesc::Sid;

use crate::identity::{CallerContext, IdentityResolver};
use crate::model::{demote_to_end, AceAttr, AceList, CanonicalAce, PosixRole, PrincipalKind};
use crate::perms::{mode_class_bits, ModeClass, Perms};
use crate::policy::SharePolicy;
use crate::vfs::FileStat;

/// Merges entries naming the same trustee.
///
/// Two entries with the same trustee and the same attribute collapse
/// into one carrying the union of their bits. A deny followed by an
/// allow for the same trustee masks the denied bits off the allow; the
/// allow is dropped when nothing remains, otherwise the deny is dropped
/// because its effect is now recorded in the allow.
pub fn merge_aces(list: &mut AceList) {
    let mut i = 0;
    while i < list.len() {
        let mut j = i + 1;
        while j < list.len() {
            if list[j].trustee == list[i].trustee && list[j].attr == list[i].attr {
                let merged = list[j].perms;
                list[i].perms |= merged;
                list.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }

    // Each trustee now appears at most once per attribute, and denies
    // precede allows, so a deny/allow pair is always (i, j) with i < j.
    let mut i = 0;
    'outer: while i < list.len() {
        let mut j = i + 1;
        while j < list.len() {
            if list[j].trustee == list[i].trustee
                && list[i].attr == AceAttr::Deny
                && list[j].attr == AceAttr::Allow
            {
                let denied = list[i].perms;
                list[j].perms = list[j].perms.mask_off(denied);
                if list[j].perms.is_empty() {
                    list.remove(j);
                } else {
                    list.remove(i);
                    continue 'outer;
                }
            } else {
                j += 1;
            }
        }
        i += 1;
    }
}

/// Whether the user named by `uid_ace` belongs to the group named by
/// `group_ace`. World matches every user, and the caller is assumed to
/// be in their own primary group without consulting the resolver.
pub fn uid_entry_in_group(
    uid_ace: &CanonicalAce,
    group_ace: &CanonicalAce,
    caller: &CallerContext,
    ids: &dyn IdentityResolver,
) -> bool {
    if group_ace.kind == PrincipalKind::World {
        return true;
    }
    let Some(uid) = uid_ace.id else {
        return false;
    };
    if uid == caller.uid && group_ace.id == Some(caller.gid) {
        return true;
    }
    ids.uid_in_group_sid(uid, &group_ace.trustee)
}

/// Folds every remaining deny entry into the allow entries after it.
///
/// Pass 1 handles world denies: a deny-all truncates the list at that
/// entry, a partial deny masks its bits off every later allow. Pass 2
/// converts each user deny into an allow holding whatever the user's
/// later group and world allows grant minus the denied bits, demoted to
/// the end of the list. Pass 3 does the same for group denies, first
/// masking the denied bits off later allows for member users.
///
/// There is no pass folding group allows into member users' allow
/// entries: a POSIX user entry already overrides the group entries, and
/// widening it would grant bits an explicit entry withheld.
pub fn process_deny_list(list: &mut AceList, caller: &CallerContext, ids: &dyn IdentityResolver) {
    // Pass 1: world denies (and empty denies of any kind).
    let mut i = 0;
    while i < list.len() {
        if list[i].attr != AceAttr::Deny {
            i += 1;
            continue;
        }
        if list[i].perms.is_empty() {
            list.remove(i);
            continue;
        }
        if list[i].kind != PrincipalKind::World {
            i += 1;
            continue;
        }
        if list[i].perms.is_all() {
            debug!(entries = list.len() - i, "deny-all to world, truncating list");
            list.truncate(i);
            break;
        }
        let denied = list[i].perms;
        for ace in list[i + 1..].iter_mut() {
            if ace.attr == AceAttr::Allow {
                ace.perms = ace.perms.mask_off(denied);
            }
        }
        list.remove(i);
    }

    // Pass 2: user denies.
    let mut i = 0;
    while i < list.len() {
        if list[i].attr != AceAttr::Deny || list[i].kind != PrincipalKind::User {
            i += 1;
            continue;
        }
        if list[i].perms.is_all() {
            list[i].attr = AceAttr::Allow;
            list[i].perms = Perms::NONE;
            demote_to_end(list, i);
            continue;
        }
        let mut granted = Perms::NONE;
        for j in i + 1..list.len() {
            if list[j].attr != AceAttr::Allow || list[j].kind == PrincipalKind::User {
                continue;
            }
            if uid_entry_in_group(&list[i], &list[j], caller, ids) {
                granted |= list[j].perms;
            }
        }
        let denied = list[i].perms;
        list[i].attr = AceAttr::Allow;
        list[i].perms = granted.mask_off(denied);
        demote_to_end(list, i);
    }

    // Pass 3: group denies.
    let mut i = 0;
    while i < list.len() {
        if list[i].attr != AceAttr::Deny || list[i].kind != PrincipalKind::Group {
            i += 1;
            continue;
        }
        let denied = list[i].perms;
        let mut everyone: Option<Perms> = None;
        for j in i + 1..list.len() {
            if list[j].attr != AceAttr::Allow {
                continue;
            }
            if list[j].kind == PrincipalKind::World {
                everyone = Some(list[j].perms);
            }
            if list[j].kind != PrincipalKind::User {
                continue;
            }
            if uid_entry_in_group(&list[j], &list[i], caller, ids) {
                list[j].perms = list[j].perms.mask_off(denied);
            }
        }
        list[i].attr = AceAttr::Allow;
        list[i].perms = match everyone {
            Some(perms) => perms.mask_off(denied),
            None => Perms::NONE,
        };
        demote_to_end(list, i);
    }
}

/// Applies the share's AND/OR permission masks to one entry, forcing
/// read access (plus write and traverse for directories) onto the owner
/// entry first.
pub fn apply_default_perms(
    ace: &mut CanonicalAce,
    class: ModeClass,
    policy: &SharePolicy,
    is_directory: bool,
) {
    if class == ModeClass::Owner {
        ace.perms |= Perms::READ;
        if is_directory {
            ace.perms |= Perms::WRITE | Perms::EXECUTE;
        }
    }
    let (and_bits, or_bits) = policy.security_mask_pair(is_directory);
    ace.perms = (ace.perms & mode_class_bits(and_bits, class)) | mode_class_bits(or_bits, class);
}

fn synthesized(role: PosixRole, kind: PrincipalKind, id: Option<u32>, trustee: Sid) -> CanonicalAce {
    CanonicalAce {
        trustee,
        kind,
        id,
        perms: Perms::NONE,
        attr: AceAttr::Allow,
        role,
        inherited: false,
    }
}

/// Completes a list so it forms a valid POSIX ACL: owner, owning-group,
/// and other entries must all exist.
///
/// On the write path (`setting_acl`) the share masks are applied to the
/// entries already present, and synthesized entries borrow permissions
/// from the list itself: the owner picks up the union of every group
/// entry they belong to, and both owner and group fall back to the
/// other entry's bits when no group matched. On the read path missing
/// entries take their bits straight from the file mode.
pub fn ensure_canon_entry_valid(
    list: &mut AceList,
    stat: &FileStat,
    owner_sid: &Sid,
    group_sid: &Sid,
    policy: &SharePolicy,
    caller: &CallerContext,
    ids: &dyn IdentityResolver,
    setting_acl: bool,
) {
    let mut got_user = false;
    let mut got_grp = false;
    let mut other_idx = None;

    for (idx, ace) in list.iter_mut().enumerate() {
        match ace.role {
            PosixRole::OwnerObj => {
                if setting_acl {
                    apply_default_perms(ace, ModeClass::Owner, policy, stat.is_directory);
                }
                got_user = true;
            }
            PosixRole::GroupObj => {
                if setting_acl {
                    apply_default_perms(ace, ModeClass::Group, policy, stat.is_directory);
                }
                got_grp = true;
            }
            PosixRole::Other => {
                if setting_acl {
                    apply_default_perms(ace, ModeClass::Other, policy, stat.is_directory);
                }
                other_idx = Some(idx);
            }
            _ => {}
        }
    }

    let other_perms = other_idx.map(|idx| list[idx].perms);

    if !got_user {
        let mut pace = synthesized(
            PosixRole::OwnerObj,
            PrincipalKind::User,
            Some(stat.uid),
            owner_sid.clone(),
        );
        if setting_acl {
            let mut group_matched = false;
            for ace in list.iter() {
                if matches!(ace.role, PosixRole::GroupObj | PosixRole::NamedGroup)
                    && uid_entry_in_group(&pace, ace, caller, ids)
                {
                    pace.perms |= ace.perms;
                    group_matched = true;
                }
            }
            if !group_matched {
                pace.perms = other_perms.unwrap_or(Perms::NONE);
            }
            apply_default_perms(&mut pace, ModeClass::Owner, policy, stat.is_directory);
        } else {
            pace.perms = mode_class_bits(stat.mode, ModeClass::Owner);
        }
        list.insert(0, pace);
    }

    if !got_grp {
        let mut pace = synthesized(
            PosixRole::GroupObj,
            PrincipalKind::Group,
            Some(stat.gid),
            group_sid.clone(),
        );
        if setting_acl {
            pace.perms = other_perms.unwrap_or(Perms::NONE);
            apply_default_perms(&mut pace, ModeClass::Group, policy, stat.is_directory);
        } else {
            pace.perms = mode_class_bits(stat.mode, ModeClass::Group);
        }
        list.insert(0, pace);
    }

    if other_idx.is_none() {
        let mut pace = synthesized(PosixRole::Other, PrincipalKind::World, None, Sid::world());
        if setting_acl {
            apply_default_perms(&mut pace, ModeClass::Other, policy, stat.is_directory);
        } else {
            pace.perms = mode_class_bits(stat.mode, ModeClass::Other);
        }
        list.insert(0, pace);
    }
}

/// The mode assumed for a descriptor that carries no owner, group, or
/// world entries at all. The inheritable variant starts from the mode a
/// newly created file would get; the plain variant only guarantees the
/// owner can read. Share masks apply either way.
pub fn create_default_mode(policy: &SharePolicy, is_directory: bool, inheritable: bool) -> u32 {
    let mut mode = if inheritable { 0o644 } else { 0o400 };
    if is_directory {
        mode |= 0o300;
    }
    let (and_bits, or_bits) = policy.security_mask_pair(is_directory);
    (mode & and_bits) | or_bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UnixIdentities;
    use crate::model::testutil::{group_ace, user_ace, world_ace};

    fn caller() -> CallerContext {
        CallerContext::new(1000, 100, vec![])
    }

    fn owner_obj(uid: u32, perms: Perms) -> CanonicalAce {
        let mut ace = user_ace(uid, perms, AceAttr::Allow);
        ace.role = PosixRole::OwnerObj;
        ace
    }

    #[test]
    fn test_merge_unions_same_trustee_same_attr() {
        let mut list = vec![
            user_ace(7, Perms::READ, AceAttr::Allow),
            user_ace(7, Perms::WRITE, AceAttr::Allow),
        ];
        merge_aces(&mut list);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].perms, Perms::READ | Perms::WRITE);
    }

    #[test]
    fn test_merge_deny_absorbs_allow() {
        // Deny covers the whole allow: the allow goes away, the deny stays.
        let mut list = vec![
            user_ace(7, Perms::READ, AceAttr::Deny),
            user_ace(7, Perms::READ, AceAttr::Allow),
        ];
        merge_aces(&mut list);
        assert_eq!(list.len(), 1);
        assert!(list[0].is_deny());

        // Allow survives with the denied bit removed; the deny's effect
        // is recorded, so the deny goes away.
        let mut list = vec![
            user_ace(7, Perms::WRITE, AceAttr::Deny),
            user_ace(7, Perms::READ | Perms::WRITE, AceAttr::Allow),
        ];
        merge_aces(&mut list);
        assert_eq!(list.len(), 1);
        assert!(list[0].is_allow());
        assert_eq!(list[0].perms, Perms::READ);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut list = vec![
            user_ace(7, Perms::WRITE, AceAttr::Deny),
            group_ace(100, Perms::READ, AceAttr::Allow),
            user_ace(7, Perms::ALL, AceAttr::Allow),
        ];
        merge_aces(&mut list);
        let once = list.clone();
        merge_aces(&mut list);
        assert_eq!(list, once);
    }

    #[test]
    fn test_deny_all_world_truncates() {
        let ids = UnixIdentities::new();
        let mut list = vec![
            world_ace(Perms::ALL, AceAttr::Deny),
            user_ace(7, Perms::ALL, AceAttr::Allow),
            group_ace(100, Perms::READ, AceAttr::Allow),
        ];
        process_deny_list(&mut list, &caller(), &ids);
        assert!(list.is_empty());
    }

    #[test]
    fn test_partial_world_deny_masks_later_allows() {
        let ids = UnixIdentities::new();
        let mut list = vec![
            world_ace(Perms::WRITE, AceAttr::Deny),
            user_ace(7, Perms::READ | Perms::WRITE, AceAttr::Allow),
            world_ace(Perms::READ | Perms::WRITE, AceAttr::Allow),
        ];
        process_deny_list(&mut list, &caller(), &ids);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].perms, Perms::READ);
        assert_eq!(list[1].perms, Perms::READ);
        assert!(list.iter().all(CanonicalAce::is_allow));
    }

    #[test]
    fn test_empty_deny_is_dropped() {
        let ids = UnixIdentities::new();
        let mut list = vec![
            user_ace(7, Perms::NONE, AceAttr::Deny),
            user_ace(7, Perms::READ, AceAttr::Allow),
        ];
        process_deny_list(&mut list, &caller(), &ids);
        assert_eq!(list.len(), 1);
        assert!(list[0].is_allow());
    }

    #[test]
    fn test_user_deny_converts_using_group_grants() {
        // User 7 is in group 100. The group grants rw, the deny removes
        // write, so the user ends with an explicit read-only entry at
        // the end of the list.
        let ids = UnixIdentities::new().with_membership(7, 100);
        let mut list = vec![
            user_ace(7, Perms::WRITE, AceAttr::Deny),
            group_ace(100, Perms::READ | Perms::WRITE, AceAttr::Allow),
        ];
        process_deny_list(&mut list, &caller(), &ids);
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(CanonicalAce::is_allow));
        let user = &list[1];
        assert_eq!(user.kind, PrincipalKind::User);
        assert_eq!(user.perms, Perms::READ);
    }

    #[test]
    fn test_user_deny_all_becomes_allow_nothing() {
        let ids = UnixIdentities::new().with_membership(7, 100);
        let mut list = vec![
            user_ace(7, Perms::ALL, AceAttr::Deny),
            group_ace(100, Perms::ALL, AceAttr::Allow),
        ];
        process_deny_list(&mut list, &caller(), &ids);
        assert_eq!(list.len(), 2);
        let user = &list[1];
        assert_eq!(user.kind, PrincipalKind::User);
        assert!(user.is_allow());
        assert!(user.perms.is_empty());
    }

    #[test]
    fn test_group_deny_masks_member_users() {
        // User 7 is in the denied group; user 8 is not. World grants
        // read, so the converted group entry keeps read.
        let ids = UnixIdentities::new().with_membership(7, 100);
        let mut list = vec![
            group_ace(100, Perms::WRITE, AceAttr::Deny),
            user_ace(7, Perms::READ | Perms::WRITE, AceAttr::Allow),
            user_ace(8, Perms::READ | Perms::WRITE, AceAttr::Allow),
            world_ace(Perms::READ, AceAttr::Allow),
        ];
        process_deny_list(&mut list, &caller(), &ids);
        assert_eq!(list.len(), 4);
        assert!(list.iter().all(CanonicalAce::is_allow));
        assert_eq!(list[0].perms, Perms::READ);
        assert_eq!(list[1].perms, Perms::READ | Perms::WRITE);
        let group = &list[3];
        assert_eq!(group.kind, PrincipalKind::Group);
        assert_eq!(group.perms, Perms::READ);
    }

    #[test]
    fn test_group_deny_without_everyone_allows_nothing() {
        let ids = UnixIdentities::new();
        let mut list = vec![
            group_ace(100, Perms::WRITE, AceAttr::Deny),
            user_ace(8, Perms::READ, AceAttr::Allow),
        ];
        process_deny_list(&mut list, &caller(), &ids);
        let group = list.last().unwrap();
        assert_eq!(group.kind, PrincipalKind::Group);
        assert!(group.is_allow());
        assert!(group.perms.is_empty());
    }

    #[test]
    fn test_apply_default_perms_forces_owner_read() {
        let policy = SharePolicy::new();
        let mut ace = owner_obj(1000, Perms::NONE);
        apply_default_perms(&mut ace, ModeClass::Owner, &policy, false);
        assert_eq!(ace.perms, Perms::READ);

        let mut ace = owner_obj(1000, Perms::NONE);
        apply_default_perms(&mut ace, ModeClass::Owner, &policy, true);
        assert_eq!(ace.perms, Perms::ALL);
    }

    #[test]
    fn test_apply_default_perms_respects_masks() {
        let policy = SharePolicy::new().with_security_masks(0o700, 0o020);
        let mut ace = group_ace(100, Perms::ALL, AceAttr::Allow);
        ace.role = PosixRole::GroupObj;
        apply_default_perms(&mut ace, ModeClass::Group, &policy, false);
        // Group class of the AND mask is 0, OR mask forces write back.
        assert_eq!(ace.perms, Perms::WRITE);
    }

    #[test]
    fn test_ensure_valid_fills_from_mode_on_get() {
        let stat = FileStat {
            uid: 1000,
            gid: 100,
            mode: 0o754,
            is_directory: false,
        };
        let ids = UnixIdentities::new();
        let mut list = vec![user_ace(7, Perms::READ, AceAttr::Allow)];
        ensure_canon_entry_valid(
            &mut list,
            &stat,
            &Sid::unix_user(1000),
            &Sid::unix_group(100),
            &SharePolicy::new(),
            &caller(),
            &ids,
            false,
        );
        assert_eq!(list.len(), 4);
        let owner = &list[find_role_idx(&list, PosixRole::OwnerObj)];
        assert_eq!(owner.perms, Perms::ALL);
        assert_eq!(owner.id, Some(1000));
        let group = &list[find_role_idx(&list, PosixRole::GroupObj)];
        assert_eq!(group.perms, Perms::READ | Perms::EXECUTE);
        let other = &list[find_role_idx(&list, PosixRole::Other)];
        assert_eq!(other.perms, Perms::READ);
    }

    #[test]
    fn test_ensure_valid_owner_borrows_group_perms_on_set() {
        // Owner uid 1000 is a member of group 100, so the synthesized
        // owner entry picks up that group's bits (plus forced read).
        let stat = FileStat {
            uid: 1000,
            gid: 100,
            mode: 0o644,
            is_directory: false,
        };
        let ids = UnixIdentities::new().with_membership(1000, 100);
        let mut list = vec![
            group_ace(100, Perms::WRITE, AceAttr::Allow),
            world_ace(Perms::READ, AceAttr::Allow),
        ];
        ensure_canon_entry_valid(
            &mut list,
            &stat,
            &Sid::unix_user(1000),
            &Sid::unix_group(100),
            &SharePolicy::new(),
            &caller(),
            &ids,
            true,
        );
        let owner = &list[find_role_idx(&list, PosixRole::OwnerObj)];
        assert_eq!(owner.perms, Perms::READ | Perms::WRITE);
        let group = &list[find_role_idx(&list, PosixRole::GroupObj)];
        assert_eq!(group.perms, Perms::READ);
    }

    #[test]
    fn test_ensure_valid_falls_back_to_everyone_on_set() {
        let stat = FileStat {
            uid: 1000,
            gid: 100,
            mode: 0o644,
            is_directory: false,
        };
        let ids = UnixIdentities::new();
        let mut list = vec![world_ace(Perms::READ | Perms::WRITE, AceAttr::Allow)];
        ensure_canon_entry_valid(
            &mut list,
            &stat,
            &Sid::unix_user(1000),
            &Sid::unix_group(100),
            &SharePolicy::new(),
            &caller(),
            &ids,
            true,
        );
        assert_eq!(list.len(), 3);
        let owner = &list[find_role_idx(&list, PosixRole::OwnerObj)];
        assert_eq!(owner.perms, Perms::READ | Perms::WRITE);
        let group = &list[find_role_idx(&list, PosixRole::GroupObj)];
        assert_eq!(group.perms, Perms::READ | Perms::WRITE);
    }

    #[test]
    fn test_create_default_mode() {
        let policy = SharePolicy::new();
        assert_eq!(create_default_mode(&policy, false, false), 0o400);
        assert_eq!(create_default_mode(&policy, false, true), 0o644);
        assert_eq!(create_default_mode(&policy, true, false), 0o700);

        let masked = SharePolicy::new().with_security_masks(0o600, 0o010);
        assert_eq!(create_default_mode(&masked, false, true), 0o610);
    }

    fn find_role_idx(list: &[CanonicalAce], role: PosixRole) -> usize {
        crate::model::find_role(list, role).unwrap()
    }
}
