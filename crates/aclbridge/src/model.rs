//! crates/aclbridge/src/model.rs
//!
//! The canonical ACE model.
//!
//! Both translation directions work on flat lists of [`CanonicalAce`].
//! The lists are order dependent until reduction finishes: deny entries
//! must precede allow entries, and later passes move entries with slice
//! rotations instead of pointer surgery.

use secdesc::Sid;

use crate::perms::Perms;

/// What kind of principal an entry names. The discriminant doubles as
/// the on-disk tag byte in the inheritance metadata blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrincipalKind {
    User = 0,
    Group = 1,
    World = 2,
}

impl PrincipalKind {
    pub const fn from_tag_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::User),
            1 => Some(Self::Group),
            2 => Some(Self::World),
            _ => None,
        }
    }
}

/// Allow or deny. Deny entries only exist transiently on the write
/// path; reduction converts or absorbs them all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceAttr {
    Allow,
    Deny,
}

/// Which POSIX ACL entry an ACE maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosixRole {
    OwnerObj,
    NamedUser,
    GroupObj,
    NamedGroup,
    Mask,
    Other,
}

/// One canonical ACL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalAce {
    pub trustee: Sid,
    pub kind: PrincipalKind,
    /// uid or gid; `None` for World.
    pub id: Option<u32>,
    /// Owner-class bits regardless of role.
    pub perms: Perms,
    pub attr: AceAttr,
    pub role: PosixRole,
    pub inherited: bool,
}

impl CanonicalAce {
    pub fn is_allow(&self) -> bool {
        self.attr == AceAttr::Allow
    }

    pub fn is_deny(&self) -> bool {
        self.attr == AceAttr::Deny
    }

    /// The principal as a single value, world mapping to `0xFFFF_FFFF`.
    pub fn principal_value(&self) -> u32 {
        self.id.unwrap_or(u32::MAX)
    }
}

/// An ordered canonical ACE list.
pub type AceList = Vec<CanonicalAce>;

/// Moves the entry at `idx` to the front, shifting the ones before it.
pub fn promote_to_front(list: &mut AceList, idx: usize) {
    list[..=idx].rotate_right(1);
}

/// Moves the entry at `idx` to the end, shifting the ones after it.
pub fn demote_to_end(list: &mut AceList, idx: usize) {
    list[idx..].rotate_left(1);
}

/// Index of the first entry carrying `role`.
pub fn find_role(list: &[CanonicalAce], role: PosixRole) -> Option<usize> {
    list.iter().position(|ace| ace.role == role)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub fn user_ace(uid: u32, perms: Perms, attr: AceAttr) -> CanonicalAce {
        CanonicalAce {
            trustee: Sid::unix_user(uid),
            kind: PrincipalKind::User,
            id: Some(uid),
            perms,
            attr,
            role: PosixRole::NamedUser,
            inherited: false,
        }
    }

    pub fn group_ace(gid: u32, perms: Perms, attr: AceAttr) -> CanonicalAce {
        CanonicalAce {
            trustee: Sid::unix_group(gid),
            kind: PrincipalKind::Group,
            id: Some(gid),
            perms,
            attr,
            role: PosixRole::NamedGroup,
            inherited: false,
        }
    }

    pub fn world_ace(perms: Perms, attr: AceAttr) -> CanonicalAce {
        CanonicalAce {
            trustee: Sid::world(),
            kind: PrincipalKind::World,
            id: None,
            perms,
            attr,
            role: PosixRole::Other,
            inherited: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn test_rotations_preserve_other_entries() {
        let mut list = vec![
            user_ace(1, Perms::READ, AceAttr::Allow),
            user_ace(2, Perms::WRITE, AceAttr::Allow),
            user_ace(3, Perms::EXECUTE, AceAttr::Allow),
        ];
        promote_to_front(&mut list, 2);
        assert_eq!(list[0].id, Some(3));
        assert_eq!(list[1].id, Some(1));
        demote_to_end(&mut list, 0);
        assert_eq!(list[2].id, Some(3));
        assert_eq!(list[0].id, Some(1));
    }

    #[test]
    fn test_principal_value_world_sentinel() {
        assert_eq!(world_ace(Perms::NONE, AceAttr::Allow).principal_value(), u32::MAX);
        assert_eq!(user_ace(7, Perms::NONE, AceAttr::Allow).principal_value(), 7);
    }

    #[test]
    fn test_tag_byte_roundtrip() {
        for kind in [PrincipalKind::User, PrincipalKind::Group, PrincipalKind::World] {
            assert_eq!(PrincipalKind::from_tag_byte(kind as u8), Some(kind));
        }
        assert_eq!(PrincipalKind::from_tag_byte(3), None);
    }
}
