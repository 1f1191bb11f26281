//! crates/secdesc/src/access_mask.rs
//!
//! NT access masks.
//!
//! An access mask packs file-specific rights, standard rights, and the
//! four generic bits into one `u32`. Generic bits are shorthand that NT
//! clients may send in place of the expanded composites; the engine
//! expands them before interpreting a mask.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// File-specific rights.
pub const FILE_READ_DATA: u32 = 0x0000_0001;
pub const FILE_WRITE_DATA: u32 = 0x0000_0002;
pub const FILE_APPEND_DATA: u32 = 0x0000_0004;
pub const FILE_READ_EA: u32 = 0x0000_0008;
pub const FILE_WRITE_EA: u32 = 0x0000_0010;
pub const FILE_EXECUTE: u32 = 0x0000_0020;
pub const FILE_DELETE_CHILD: u32 = 0x0000_0040;
pub const FILE_READ_ATTRIBUTES: u32 = 0x0000_0080;
pub const FILE_WRITE_ATTRIBUTES: u32 = 0x0000_0100;
/// All nine file-specific bits.
pub const FILE_ALL_ACCESS: u32 = 0x0000_01FF;

/// Standard rights.
pub const DELETE_ACCESS: u32 = 0x0001_0000;
pub const READ_CONTROL_ACCESS: u32 = 0x0002_0000;
pub const WRITE_DAC_ACCESS: u32 = 0x0004_0000;
pub const WRITE_OWNER_ACCESS: u32 = 0x0008_0000;
pub const SYNCHRONIZE_ACCESS: u32 = 0x0010_0000;
pub const STANDARD_RIGHTS_ALL: u32 = 0x001F_0000;

/// Generic rights.
pub const GENERIC_ALL_ACCESS: u32 = 0x1000_0000;
pub const GENERIC_EXECUTE_ACCESS: u32 = 0x2000_0000;
pub const GENERIC_WRITE_ACCESS: u32 = 0x4000_0000;
pub const GENERIC_READ_ACCESS: u32 = 0x8000_0000;

/// Expanded composites the generic bits stand for.
pub const FILE_GENERIC_READ: u32 =
    READ_CONTROL_ACCESS | SYNCHRONIZE_ACCESS | FILE_READ_DATA | FILE_READ_ATTRIBUTES | FILE_READ_EA;
pub const FILE_GENERIC_WRITE: u32 = READ_CONTROL_ACCESS
    | SYNCHRONIZE_ACCESS
    | FILE_WRITE_DATA
    | FILE_WRITE_ATTRIBUTES
    | FILE_WRITE_EA
    | FILE_APPEND_DATA;
pub const FILE_GENERIC_EXECUTE: u32 =
    READ_CONTROL_ACCESS | SYNCHRONIZE_ACCESS | FILE_EXECUTE;
pub const FILE_GENERIC_ALL: u32 = STANDARD_RIGHTS_ALL | FILE_ALL_ACCESS;

/// The sentinel some NT4 tools use to mean "no access": a lone
/// `WRITE_OWNER` bit on an allow ACE.
pub const UNIX_ACCESS_NONE: u32 = WRITE_OWNER_ACCESS;

/// An NT access mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessMask(u32);

impl AccessMask {
    pub const EMPTY: Self = Self(0);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub const fn intersects(self, bits: u32) -> bool {
        self.0 & bits != 0
    }

    /// Replaces any generic bits with their file composites.
    pub const fn expand_generic(self) -> Self {
        let mut bits = self.0;
        if bits & GENERIC_ALL_ACCESS != 0 {
            bits |= FILE_GENERIC_ALL;
        }
        if bits & GENERIC_READ_ACCESS != 0 {
            bits |= FILE_GENERIC_READ;
        }
        if bits & GENERIC_WRITE_ACCESS != 0 {
            bits |= FILE_GENERIC_WRITE;
        }
        if bits & GENERIC_EXECUTE_ACCESS != 0 {
            bits |= FILE_GENERIC_EXECUTE;
        }
        bits &= !(GENERIC_ALL_ACCESS
            | GENERIC_READ_ACCESS
            | GENERIC_WRITE_ACCESS
            | GENERIC_EXECUTE_ACCESS);
        Self(bits)
    }
}

impl BitOr for AccessMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AccessMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<u32> for AccessMask {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
