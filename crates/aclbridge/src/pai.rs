//! crates/aclbridge/src/pai.rs
//!
//! Inheritance metadata codec.
//!
//! POSIX ACLs only inherit at file-creation time, so to round-trip the
//! NT notions of "this ACE was inherited" and "this ACL is protected"
//! the engine records them in a small extended attribute next to the
//! ACL itself.
//!
//! # Wire format
//!
//! Little-endian, fixed layout:
//!
//! ```text
//! +------+------+-------------+---------------------+-----------+-------------------+
//! | vers | flag | num_entries | num_default_entries | entries.. | default_entries.. |
//! |  1B  |  1B  |     2B      |         2B          |  5B each  |      5B each      |
//! +------+------+-------------+---------------------+-----------+-------------------+
//! ```
//!
//! Each record is one principal-kind byte (0 user, 1 group, 2 world)
//! followed by a 4-byte id, `0xFFFF_FFFF` for world. Flag bit 0 marks
//! the ACL protected.

use crate::model::{CanonicalAce, PrincipalKind};

/// Attribute name the blob is stored under.
pub const INHERITANCE_XATTR: &str = "user.aclbridge.inherit";

const PAI_VERSION: u8 = 1;
const FLAG_PROTECTED: u8 = 0x01;
const HEADER_LEN: usize = 6;
const ENTRY_LEN: usize = 5;

/// One inherited-principal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaiEntry {
    pub kind: PrincipalKind,
    /// uid, gid, or `0xFFFF_FFFF` for world.
    pub id: u32,
}

impl PaiEntry {
    fn matches(&self, ace: &CanonicalAce) -> bool {
        self.kind == ace.kind && self.id == ace.principal_value()
    }
}

/// Decoded inheritance state for one file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InheritanceMetadata {
    /// The ACL does not receive dynamically inherited entries.
    pub protected: bool,
    pub entries: Vec<PaiEntry>,
    pub default_entries: Vec<PaiEntry>,
}

impl InheritanceMetadata {
    /// Decodes a stored blob. Returns `None` (metadata absent) for a
    /// short buffer, a version mismatch, counts that do not exactly
    /// account for the remaining bytes, or an unknown principal tag.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        if buf[0] != PAI_VERSION {
            return None;
        }
        let protected = buf[1] & FLAG_PROTECTED != 0;
        let num_entries = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let num_default = u16::from_le_bytes([buf[4], buf[5]]) as usize;
        if HEADER_LEN + (num_entries + num_default) * ENTRY_LEN != buf.len() {
            return None;
        }

        let mut records = buf[HEADER_LEN..].chunks_exact(ENTRY_LEN);
        let mut read = |count: usize| -> Option<Vec<PaiEntry>> {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                let rec = records.next()?;
                out.push(PaiEntry {
                    kind: PrincipalKind::from_tag_byte(rec[0])?,
                    id: u32::from_le_bytes([rec[1], rec[2], rec[3], rec[4]]),
                });
            }
            Some(out)
        };

        let entries = read(num_entries)?;
        let default_entries = read(num_default)?;
        Some(Self {
            protected,
            entries,
            default_entries,
        })
    }

    /// Captures the inherited entries of the final canonical lists.
    pub fn from_lists(
        file_list: &[CanonicalAce],
        default_list: &[CanonicalAce],
        protected: bool,
    ) -> Self {
        let capture = |list: &[CanonicalAce]| {
            list.iter()
                .filter(|ace| ace.inherited)
                .map(|ace| PaiEntry {
                    kind: ace.kind,
                    id: ace.principal_value(),
                })
                .collect()
        };
        Self {
            protected,
            entries: capture(file_list),
            default_entries: capture(default_list),
        }
    }

    /// Encodes to the wire format. Returns `None` when the metadata
    /// carries no information, meaning the stored attribute should be
    /// deleted rather than replaced with an empty blob.
    pub fn encode(&self) -> Option<Vec<u8>> {
        if !self.protected && self.entries.is_empty() && self.default_entries.is_empty() {
            return None;
        }
        let mut buf =
            Vec::with_capacity(HEADER_LEN + (self.entries.len() + self.default_entries.len()) * ENTRY_LEN);
        buf.push(PAI_VERSION);
        buf.push(if self.protected { FLAG_PROTECTED } else { 0 });
        buf.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.default_entries.len() as u16).to_le_bytes());
        for entry in self.entries.iter().chain(&self.default_entries) {
            buf.push(entry.kind as u8);
            buf.extend_from_slice(&entry.id.to_le_bytes());
        }
        Some(buf)
    }

    /// Whether a canonical entry was recorded as inherited, looking in
    /// the default-list records when `default_list` is set.
    pub fn is_inherited(&self, ace: &CanonicalAce, default_list: bool) -> bool {
        let records = if default_list {
            &self.default_entries
        } else {
            &self.entries
        };
        records.iter().any(|rec| rec.matches(ace))
    }
}
