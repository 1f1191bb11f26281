//! crates/secdesc/src/descriptor.rs
//!
//! The security descriptor and the part-selection mask used by query and
//! set operations.

use std::fmt;

use crate::ace::{AceType, SecAce};
use crate::sid::Sid;

/// Selects which parts of a descriptor a caller reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityInfo(u32);

impl SecurityInfo {
    pub const OWNER: Self = Self(0x0000_0001);
    pub const GROUP: Self = Self(0x0000_0002);
    pub const DACL: Self = Self(0x0000_0004);
    pub const SACL: Self = Self(0x0000_0008);
    pub const PROTECTED_DACL: Self = Self(0x8000_0000);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl fmt::Display for SecurityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Descriptor control flags. Only the DACL-protected bit matters here;
/// a protected DACL refuses entries inherited from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdControl(u16);

impl SdControl {
    pub const EMPTY: Self = Self(0);
    pub const DACL_PROTECTED: Self = Self(0x1000);
    pub const DACL_AUTO_INHERITED: Self = Self(0x0400);

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// An NT security descriptor, self-relative details elided.
///
/// `dacl: None` means "no DACL present" (everyone gets full access in NT
/// semantics), distinct from `Some(vec![])`, an empty DACL denying all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityDescriptor {
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    pub dacl: Option<Vec<SecAce>>,
    pub control: SdControl,
}

impl SecurityDescriptor {
    pub fn new(owner: Option<Sid>, group: Option<Sid>, dacl: Option<Vec<SecAce>>) -> Self {
        Self {
            owner,
            group,
            dacl,
            control: SdControl::EMPTY,
        }
    }

    pub fn dacl_protected(&self) -> bool {
        self.control.contains(SdControl::DACL_PROTECTED)
    }
}

/// Sorts a DACL into canonical order: deny entries before allow entries,
/// original order otherwise preserved.
pub fn sort_dacl_canonical(aces: &mut [SecAce]) {
    aces.sort_by_key(|ace| match ace.ace_type {
        AceType::AccessDenied => 0u8,
        AceType::AccessAllowed => 1u8,
    });
}
