//! crates/aclbridge/src/perms.rs
//!
//! Permission bit mapping.
//!
//! Internally every ACL entry carries a 3-bit read/write/execute set in
//! "owner class" position, regardless of which role (owner/group/other)
//! ultimately stores it. This module converts between that set, NT
//! access masks, and the classed bits of a Unix mode.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

use secdesc::access_mask::{
    FILE_APPEND_DATA, FILE_EXECUTE, FILE_GENERIC_ALL, FILE_GENERIC_EXECUTE, FILE_GENERIC_READ,
    FILE_GENERIC_WRITE, FILE_READ_ATTRIBUTES, FILE_READ_DATA, FILE_READ_EA, FILE_WRITE_ATTRIBUTES,
    FILE_WRITE_DATA, FILE_WRITE_EA, GENERIC_ALL_ACCESS, GENERIC_EXECUTE_ACCESS,
    GENERIC_READ_ACCESS, GENERIC_WRITE_ACCESS, UNIX_ACCESS_NONE,
};
use secdesc::AccessMask;

/// Specific rights that imply read, write, or execute respectively.
const SPECIFIC_READ_BITS: u32 = FILE_READ_DATA | FILE_READ_EA | FILE_READ_ATTRIBUTES;
const SPECIFIC_WRITE_BITS: u32 =
    FILE_WRITE_DATA | FILE_APPEND_DATA | FILE_WRITE_EA | FILE_WRITE_ATTRIBUTES;
const SPECIFIC_EXECUTE_BITS: u32 = FILE_EXECUTE;

/// A 3-bit read/write/execute permission set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Perms(u8);

impl Perms {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(0b100);
    pub const WRITE: Self = Self(0b010);
    pub const EXECUTE: Self = Self(0b001);
    pub const ALL: Self = Self(0b111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_all(self) -> bool {
        self.0 == Self::ALL.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// `self` with `other`'s bits removed.
    pub const fn mask_off(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for Perms {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Perms {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Perms {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for Perms {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl fmt::Debug for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.contains(Self::READ) { 'r' } else { '-' },
            if self.contains(Self::WRITE) { 'w' } else { '-' },
            if self.contains(Self::EXECUTE) { 'x' } else { '-' },
        )
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which 3-bit slice of a Unix mode a role reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeClass {
    Owner,
    Group,
    Other,
}

impl ModeClass {
    const fn shift(self) -> u32 {
        match self {
            Self::Owner => 6,
            Self::Group => 3,
            Self::Other => 0,
        }
    }
}

/// Extracts one role's bits out of a mode value.
pub const fn mode_class_bits(mode: u32, class: ModeClass) -> Perms {
    Perms(((mode >> class.shift()) & 0o7) as u8)
}

/// Packs three permission sets back into a mode value.
pub const fn mode_from_classes(owner: Perms, group: Perms, other: Perms) -> u32 {
    ((owner.bits() as u32) << 6) | ((group.bits() as u32) << 3) | (other.bits() as u32)
}

/// Maps an NT access mask onto a permission set.
///
/// `GENERIC_ALL` is a fast path granting everything; otherwise each of
/// read/write/execute is granted when the matching generic bit or any
/// matching specific bit is present. Directory rights (list, add file,
/// traverse) share the numeric values of the file-specific bits, so the
/// same groups cover both kinds of object.
pub fn nt_mask_to_perms(mask: AccessMask) -> Perms {
    if mask.intersects(GENERIC_ALL_ACCESS) {
        return Perms::ALL;
    }
    let mut perms = Perms::NONE;
    if mask.intersects(GENERIC_READ_ACCESS | SPECIFIC_READ_BITS) {
        perms |= Perms::READ;
    }
    if mask.intersects(GENERIC_WRITE_ACCESS | SPECIFIC_WRITE_BITS) {
        perms |= Perms::WRITE;
    }
    if mask.intersects(GENERIC_EXECUTE_ACCESS | SPECIFIC_EXECUTE_BITS) {
        perms |= Perms::EXECUTE;
    }
    perms
}

/// Maps a permission set back onto an NT access mask. Always describes
/// an allow entry; deny is never produced on the read path.
///
/// With `map_full_control` set, a full rwx set becomes the single
/// full-control mask rather than the three additive composites. An
/// empty set becomes the reserved no-access sentinel when
/// `nt4_compatible` is set (NT 4 refuses to display a zero mask) and a
/// plain zero mask otherwise.
pub fn perms_to_nt_mask(perms: Perms, map_full_control: bool, nt4_compatible: bool) -> AccessMask {
    if map_full_control && perms.is_all() {
        return AccessMask::new(FILE_GENERIC_ALL);
    }
    if perms.is_empty() {
        return if nt4_compatible {
            AccessMask::new(UNIX_ACCESS_NONE)
        } else {
            AccessMask::EMPTY
        };
    }
    let mut mask = 0;
    if perms.contains(Perms::READ) {
        mask |= FILE_GENERIC_READ;
    }
    if perms.contains(Perms::WRITE) {
        mask |= FILE_GENERIC_WRITE;
    }
    if perms.contains(Perms::EXECUTE) {
        mask |= FILE_GENERIC_EXECUTE;
    }
    AccessMask::new(mask)
}
