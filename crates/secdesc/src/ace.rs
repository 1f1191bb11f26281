//! crates/secdesc/src/ace.rs
//!
//! Access control entries.

use std::fmt;

use thiserror::Error;

use crate::access_mask::AccessMask;
use crate::sid::Sid;

/// ACE type discriminant. Audit and alarm entries are not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AceType {
    AccessAllowed = 0,
    AccessDenied = 1,
}

/// Error returned for an ACE type byte outside the supported set.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported ACE type: {0}")]
pub struct UnsupportedAceType(pub u8);

impl TryFrom<u8> for AceType {
    type Error = UnsupportedAceType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AccessAllowed),
            1 => Ok(Self::AccessDenied),
            other => Err(UnsupportedAceType(other)),
        }
    }
}

/// ACE inheritance and provenance flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AceFlags(u8);

impl AceFlags {
    pub const EMPTY: Self = Self(0);
    /// Inherit onto child files.
    pub const OBJECT_INHERIT: Self = Self(0x01);
    /// Inherit onto child directories.
    pub const CONTAINER_INHERIT: Self = Self(0x02);
    /// Do not propagate past direct children.
    pub const NO_PROPAGATE_INHERIT: Self = Self(0x04);
    /// Only inherited copies take effect, not this entry itself.
    pub const INHERIT_ONLY: Self = Self(0x08);
    /// This entry was produced by inheritance.
    pub const INHERITED: Self = Self(0x10);

    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
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

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl fmt::Display for AceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A single access control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecAce {
    pub trustee: Sid,
    pub ace_type: AceType,
    pub flags: AceFlags,
    pub access_mask: AccessMask,
}

impl SecAce {
    pub fn allowed(trustee: Sid, access_mask: AccessMask, flags: AceFlags) -> Self {
        Self {
            trustee,
            ace_type: AceType::AccessAllowed,
            flags,
            access_mask,
        }
    }

    pub fn denied(trustee: Sid, access_mask: AccessMask, flags: AceFlags) -> Self {
        Self {
            trustee,
            ace_type: AceType::AccessDenied,
            flags,
            access_mask,
        }
    }

    pub fn is_deny(&self) -> bool {
        self.ace_type == AceType::AccessDenied
    }

    /// True when the entry only exists to be inherited by children.
    pub fn is_inherit_only(&self) -> bool {
        self.flags.contains(AceFlags::INHERIT_ONLY)
    }

    /// True when the entry carries any inheritance propagation flag.
    pub fn is_inheritable(&self) -> bool {
        self.flags.0 & (AceFlags::OBJECT_INHERIT.0 | AceFlags::CONTAINER_INHERIT.0) != 0
    }
}
