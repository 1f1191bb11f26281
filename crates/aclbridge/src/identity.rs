//! crates/aclbridge/src/identity.rs
//!
//! Identity resolution and the caller context.
//!
//! The engine never looks identities up itself; a resolver is supplied
//! by the embedding server. The caller's own identity is threaded
//! through explicitly rather than read from ambient process state.

use std::collections::{BTreeMap, BTreeSet};

use secdesc::Sid;

/// Maps between SIDs and POSIX ids, and answers group membership.
pub trait IdentityResolver {
    fn sid_to_uid(&self, sid: &Sid) -> Option<u32>;
    fn sid_to_gid(&self, sid: &Sid) -> Option<u32>;
    fn uid_to_sid(&self, uid: u32) -> Sid;
    fn gid_to_sid(&self, gid: u32) -> Sid;
    /// Whether `uid` belongs to the group named by `group`.
    fn uid_in_group_sid(&self, uid: u32, group: &Sid) -> bool;
}

/// The identity performing the current call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub uid: u32,
    pub gid: u32,
    pub groups: Vec<u32>,
    /// Holds the take-ownership privilege.
    pub can_take_ownership: bool,
    /// Holds the restore privilege (chown to arbitrary owners).
    pub can_restore: bool,
}

impl CallerContext {
    pub fn new(uid: u32, gid: u32, groups: Vec<u32>) -> Self {
        Self {
            uid,
            gid,
            groups,
            can_take_ownership: false,
            can_restore: false,
        }
    }

    pub fn with_take_ownership(mut self, value: bool) -> Self {
        self.can_take_ownership = value;
        self
    }

    pub fn with_restore(mut self, value: bool) -> Self {
        self.can_restore = value;
        self
    }

    /// Primary or supplementary membership in `gid`.
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.groups.contains(&gid)
    }
}

/// Bijective resolver over the Unix SID namespace (`S-1-22-1-<uid>`,
/// `S-1-22-2-<gid>`), with an explicit membership table.
#[derive(Debug, Clone, Default)]
pub struct UnixIdentities {
    memberships: BTreeMap<u32, BTreeSet<u32>>,
}

impl UnixIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_membership(mut self, uid: u32, gid: u32) -> Self {
        self.memberships.entry(uid).or_default().insert(gid);
        self
    }
}

impl IdentityResolver for UnixIdentities {
    fn sid_to_uid(&self, sid: &Sid) -> Option<u32> {
        match (sid.authority(), sid.sub_authorities()) {
            (22, [1, uid]) => Some(*uid),
            _ => None,
        }
    }

    fn sid_to_gid(&self, sid: &Sid) -> Option<u32> {
        match (sid.authority(), sid.sub_authorities()) {
            (22, [2, gid]) => Some(*gid),
            _ => None,
        }
    }

    fn uid_to_sid(&self, uid: u32) -> Sid {
        Sid::unix_user(uid)
    }

    fn gid_to_sid(&self, gid: u32) -> Sid {
        Sid::unix_group(gid)
    }

    fn uid_in_group_sid(&self, uid: u32, group: &Sid) -> bool {
        let Some(gid) = self.sid_to_gid(group) else {
            return false;
        };
        self.memberships
            .get(&uid)
            .is_some_and(|groups| groups.contains(&gid))
    }
}
