//! End-to-end descriptor translation against the in-memory store.
//!
//! Each test drives the engine the way a server would: hand it a
//! security descriptor from a client, then look at the POSIX state it
//! produced, or the other way around. The in-memory store records the
//! order of mutating calls, which is what the chown-sequencing tests
//! key on.

use aclbridge::vfs::memory::{ElevationFlag, MemoryVfs};
use aclbridge::{
    AclEngine, AclKind, CallerContext, FileStat, NoPrivileges, Perms, PosixAclEntry, PosixTag,
    SharePolicy, UnixIdentities,
};
use secdesc::access_mask::{FILE_GENERIC_ALL, FILE_GENERIC_READ, FILE_GENERIC_WRITE};
use secdesc::{AccessMask, AceFlags, SecAce, SecurityDescriptor, SecurityInfo, Sid};

fn file_stat() -> FileStat {
    FileStat {
        uid: 1000,
        gid: 100,
        mode: 0o640,
        is_directory: false,
    }
}

fn dir_stat() -> FileStat {
    FileStat {
        is_directory: true,
        ..file_stat()
    }
}

fn allow(sid: Sid, mask: u32, flags: AceFlags) -> SecAce {
    SecAce::allowed(sid, AccessMask::new(mask), flags)
}

fn deny(sid: Sid, mask: u32, flags: AceFlags) -> SecAce {
    SecAce::denied(sid, AccessMask::new(mask), flags)
}

fn entry(entries: &[PosixAclEntry], tag: PosixTag) -> PosixAclEntry {
    *entries
        .iter()
        .find(|e| e.tag == tag)
        .unwrap_or_else(|| panic!("no {tag:?} entry in {entries:?}"))
}

#[test]
fn deny_all_to_world_leaves_owner_read_only() {
    let mut vfs = MemoryVfs::new(file_stat());
    let ids = UnixIdentities::new();
    let caller = CallerContext::new(1000, 100, vec![]);
    let dacl = vec![
        deny(Sid::world(), FILE_GENERIC_ALL, AceFlags::EMPTY),
        allow(Sid::unix_user(1000), FILE_GENERIC_ALL, AceFlags::EMPTY),
    ];
    let sd = SecurityDescriptor::new(None, None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, SharePolicy::new());
    engine
        .set_security_descriptor(&caller, SecurityInfo::DACL, &sd)
        .unwrap();

    // The deny wipes everything after it, including the owner's own
    // grant; only the forced owner-read survives.
    let stored = vfs.access_acl().unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(entry(stored, PosixTag::OwnerObj).perms, Perms::READ);
    assert_eq!(entry(stored, PosixTag::GroupObj).perms, Perms::NONE);
    assert_eq!(entry(stored, PosixTag::Other).perms, Perms::NONE);

    // Reading it back renders three allow entries, owner first.
    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, SharePolicy::new());
    let sd = engine
        .get_security_descriptor(&caller, SecurityInfo::DACL)
        .unwrap();
    let dacl = sd.dacl.unwrap();
    assert_eq!(dacl.len(), 3);
    assert_eq!(dacl[0].trustee, Sid::unix_user(1000));
    assert_eq!(dacl[0].access_mask, AccessMask::new(FILE_GENERIC_READ));
    assert!(dacl.iter().all(|ace| !ace.is_deny()));
}

#[test]
fn user_deny_converts_to_reduced_named_entry() {
    let mut vfs = MemoryVfs::new(file_stat());
    let ids = UnixIdentities::new().with_membership(7, 100);
    let caller = CallerContext::new(1000, 100, vec![]);
    let dacl = vec![
        deny(Sid::unix_user(7), FILE_GENERIC_WRITE, AceFlags::EMPTY),
        allow(
            Sid::unix_group(100),
            FILE_GENERIC_READ | FILE_GENERIC_WRITE,
            AceFlags::EMPTY,
        ),
        allow(Sid::world(), FILE_GENERIC_READ, AceFlags::EMPTY),
    ];
    let sd = SecurityDescriptor::new(None, None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, SharePolicy::new());
    engine
        .set_security_descriptor(&caller, SecurityInfo::DACL, &sd)
        .unwrap();

    // User 7 ends up with what the group and world grant minus the
    // denied write; the mask covers the union of named and group bits.
    let stored = vfs.access_acl().unwrap();
    assert_eq!(
        entry(stored, PosixTag::NamedUser(7)).perms,
        Perms::READ
    );
    assert_eq!(
        entry(stored, PosixTag::GroupObj).perms,
        Perms::READ | Perms::WRITE
    );
    assert_eq!(entry(stored, PosixTag::Other).perms, Perms::READ);
    assert_eq!(
        entry(stored, PosixTag::Mask).perms,
        Perms::READ | Perms::WRITE
    );
    // The caller owns the file and sits in its group, so the owner
    // entry borrows the group's bits.
    assert_eq!(
        entry(stored, PosixTag::OwnerObj).perms,
        Perms::READ | Perms::WRITE
    );
}

#[test]
fn missing_acl_support_collapses_to_chmod() {
    let mut vfs = MemoryVfs::new(file_stat()).without_acl_support();
    let ids = UnixIdentities::new();
    let caller = CallerContext::new(1000, 100, vec![]);
    let dacl = vec![
        allow(Sid::unix_user(1000), FILE_GENERIC_ALL, AceFlags::EMPTY),
        allow(Sid::unix_group(100), FILE_GENERIC_READ, AceFlags::EMPTY),
        allow(Sid::world(), FILE_GENERIC_READ, AceFlags::EMPTY),
    ];
    let sd = SecurityDescriptor::new(None, None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, SharePolicy::new());
    engine
        .set_security_descriptor(&caller, SecurityInfo::DACL, &sd)
        .unwrap();

    assert_eq!(vfs.current_stat().mode, 0o744);
    assert_eq!(vfs.ops(), &["set_acl", "chmod"]);
}

#[test]
fn taking_ownership_chowns_before_the_acl_write() {
    let mut vfs = MemoryVfs::new(file_stat());
    let ids = UnixIdentities::new();
    let caller = CallerContext::new(2000, 100, vec![]);
    let dacl = vec![allow(
        Sid::unix_user(2000),
        FILE_GENERIC_ALL,
        AceFlags::EMPTY,
    )];
    let sd = SecurityDescriptor::new(Some(Sid::unix_user(2000)), None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, SharePolicy::new());
    engine
        .set_security_descriptor(
            &caller,
            SecurityInfo::OWNER.union(SecurityInfo::DACL),
            &sd,
        )
        .unwrap();

    assert_eq!(vfs.current_stat().uid, 2000);
    assert_eq!(vfs.ops(), &["chown", "set_acl"]);
    // The descriptor entry named the new owner, so it became the owner
    // entry after the early chown.
    let stored = vfs.access_acl().unwrap();
    assert_eq!(entry(stored, PosixTag::OwnerObj).perms, Perms::ALL);
}

#[test]
fn giving_a_file_away_chowns_after_the_acl_write() {
    let mut vfs = MemoryVfs::new(file_stat());
    let ids = UnixIdentities::new();
    let caller = CallerContext::new(1000, 100, vec![]);
    let dacl = vec![allow(
        Sid::unix_user(1000),
        FILE_GENERIC_ALL,
        AceFlags::EMPTY,
    )];
    let sd = SecurityDescriptor::new(Some(Sid::unix_user(3000)), None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, SharePolicy::new());
    engine
        .set_security_descriptor(
            &caller,
            SecurityInfo::OWNER.union(SecurityInfo::DACL),
            &sd,
        )
        .unwrap();

    assert_eq!(vfs.current_stat().uid, 3000);
    assert_eq!(vfs.ops(), &["set_acl", "chown"]);
}

#[test]
fn non_inheritable_dacl_deletes_the_default_acl() {
    let mut vfs = MemoryVfs::new(dir_stat()).with_default_acl(vec![
        PosixAclEntry::new(PosixTag::OwnerObj, Perms::ALL),
        PosixAclEntry::new(PosixTag::GroupObj, Perms::READ),
        PosixAclEntry::new(PosixTag::Other, Perms::READ),
    ]);
    let ids = UnixIdentities::new();
    let caller = CallerContext::new(1000, 100, vec![]);
    let dacl = vec![allow(
        Sid::unix_user(1000),
        FILE_GENERIC_ALL,
        AceFlags::EMPTY,
    )];
    let sd = SecurityDescriptor::new(None, None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, SharePolicy::new());
    engine
        .set_security_descriptor(&caller, SecurityInfo::DACL, &sd)
        .unwrap();

    assert!(vfs.default_acl().is_none());
    assert!(vfs.ops().contains(&"delete_default_acl"));
}

#[test]
fn inherited_entries_survive_a_set_get_cycle() {
    let mut vfs = MemoryVfs::new(dir_stat());
    let ids = UnixIdentities::new();
    let caller = CallerContext::new(1000, 100, vec![]);
    let policy = SharePolicy::new().with_map_acl_inherit(true);
    let inheritable = AceFlags::OBJECT_INHERIT
        .union(AceFlags::CONTAINER_INHERIT)
        .union(AceFlags::INHERITED);
    let dacl = vec![
        allow(Sid::unix_user(1000), FILE_GENERIC_ALL, AceFlags::EMPTY),
        allow(Sid::unix_user(7), FILE_GENERIC_READ, inheritable),
    ];
    let sd = SecurityDescriptor::new(None, None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, policy.clone());
    engine
        .set_security_descriptor(&caller, SecurityInfo::DACL, &sd)
        .unwrap();

    // The inheritable entry landed in both the access and default ACLs,
    // and the metadata attribute recorded its provenance.
    assert_eq!(
        entry(vfs.access_acl().unwrap(), PosixTag::NamedUser(7)).perms,
        Perms::READ
    );
    assert_eq!(
        entry(vfs.default_acl().unwrap(), PosixTag::NamedUser(7)).perms,
        Perms::READ
    );
    assert!(vfs.xattr(aclbridge::pai::INHERITANCE_XATTR).is_some());

    let mut engine = AclEngine::new(&mut vfs, &ids, &NoPrivileges, policy);
    let sd = engine
        .get_security_descriptor(&caller, SecurityInfo::DACL)
        .unwrap();
    assert!(!sd.dacl_protected());
    let dacl = sd.dacl.unwrap();

    // The file and default renderings of user 7 collapse into one entry
    // inheriting to both object kinds, still marked inherited.
    let user7: Vec<_> = dacl
        .iter()
        .filter(|ace| ace.trustee == Sid::unix_user(7))
        .collect();
    assert_eq!(user7.len(), 1);
    assert!(user7[0].flags.contains(AceFlags::OBJECT_INHERIT));
    assert!(user7[0].flags.contains(AceFlags::CONTAINER_INHERIT));
    assert!(user7[0].flags.contains(AceFlags::INHERITED));
    assert!(!user7[0].flags.contains(AceFlags::INHERIT_ONLY));
    assert_eq!(user7[0].access_mask, AccessMask::new(FILE_GENERIC_READ));
}

#[test]
fn group_override_retries_a_denied_write_once() {
    let gate = ElevationFlag::new();
    let mut vfs = MemoryVfs::new(file_stat()).with_write_gate(gate.clone());
    let ids = UnixIdentities::new();
    let caller = CallerContext::new(1000, 100, vec![]);
    let policy = SharePolicy::new().with_group_override(true);
    let dacl = vec![allow(
        Sid::unix_user(1000),
        FILE_GENERIC_ALL,
        AceFlags::EMPTY,
    )];
    let sd = SecurityDescriptor::new(None, None, Some(dacl));

    let mut engine = AclEngine::new(&mut vfs, &ids, &gate, policy);
    engine
        .set_security_descriptor(&caller, SecurityInfo::DACL, &sd)
        .unwrap();

    assert!(vfs.access_acl().is_some());
    // Privileges were dropped again after the retry.
    assert!(!gate.is_raised());
    assert_eq!(vfs.ops(), &["set_acl", "set_acl"]);
}
