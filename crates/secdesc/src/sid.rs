//! crates/secdesc/src/sid.rs
//!
//! Windows security identifiers (SIDs).
//!
//! A SID names a trustee: `S-1-<authority>-<sub>-<sub>-...`. The engine
//! only needs structural equality, the handful of well-known SIDs that
//! drive translation decisions, and a readable text form for logging.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Identifier authority for the "World" SID (`S-1-1-0`).
const AUTHORITY_WORLD: u64 = 1;
/// Identifier authority for Creator Owner / Creator Group (`S-1-3-*`).
const AUTHORITY_CREATOR: u64 = 3;
/// Identifier authority for NT (`S-1-5-*`).
const AUTHORITY_NT: u64 = 5;
/// Identifier authority for the Unix user/group namespace (`S-1-22-*`).
const AUTHORITY_UNIX: u64 = 22;

/// First sub-authority of the BUILTIN domain (`S-1-5-32-*`).
const SUBAUTH_BUILTIN: u32 = 32;

/// A Windows security identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sid {
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    /// Builds a SID from an identifier authority and sub-authorities.
    pub fn new(authority: u64, sub_authorities: &[u32]) -> Self {
        Self {
            authority,
            sub_authorities: sub_authorities.to_vec(),
        }
    }

    /// `S-1-1-0`, the Everyone/World SID.
    pub fn world() -> Self {
        Self::new(AUTHORITY_WORLD, &[0])
    }

    /// `S-1-3-0`, the Creator Owner placeholder.
    pub fn creator_owner() -> Self {
        Self::new(AUTHORITY_CREATOR, &[0])
    }

    /// `S-1-3-1`, the Creator Group placeholder.
    pub fn creator_group() -> Self {
        Self::new(AUTHORITY_CREATOR, &[1])
    }

    /// `S-1-22-1-<uid>`, the Unix user SID for a numeric uid.
    pub fn unix_user(uid: u32) -> Self {
        Self::new(AUTHORITY_UNIX, &[1, uid])
    }

    /// `S-1-22-2-<gid>`, the Unix group SID for a numeric gid.
    pub fn unix_group(gid: u32) -> Self {
        Self::new(AUTHORITY_UNIX, &[2, gid])
    }

    pub fn authority(&self) -> u64 {
        self.authority
    }

    pub fn sub_authorities(&self) -> &[u32] {
        &self.sub_authorities
    }

    pub fn is_world(&self) -> bool {
        self.authority == AUTHORITY_WORLD && self.sub_authorities == [0]
    }

    pub fn is_creator_owner(&self) -> bool {
        self.authority == AUTHORITY_CREATOR && self.sub_authorities == [0]
    }

    pub fn is_creator_group(&self) -> bool {
        self.authority == AUTHORITY_CREATOR && self.sub_authorities == [1]
    }

    /// True for trustees that by construction have no POSIX identity:
    /// the NT Authority family (`S-1-5-1` through `S-1-5-20`) and every
    /// member of the BUILTIN domain (`S-1-5-32-*`).
    pub fn is_non_mappable(&self) -> bool {
        if self.authority != AUTHORITY_NT {
            return false;
        }
        match self.sub_authorities.first() {
            Some(&first) if self.sub_authorities.len() == 1 => (1..=20).contains(&first),
            Some(&SUBAUTH_BUILTIN) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-1-{}", self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

/// Error returned when parsing a SID from its string form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid SID string: {0}")]
pub struct ParseSidError(pub String);

impl FromStr for Sid {
    type Err = ParseSidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseSidError(s.to_string());
        let rest = s.strip_prefix("S-1-").ok_or_else(bad)?;
        let mut parts = rest.split('-');
        let authority: u64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let mut sub_authorities = Vec::new();
        for part in parts {
            sub_authorities.push(part.parse().map_err(|_| bad())?);
        }
        Ok(Self {
            authority,
            sub_authorities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let sid: Sid = "S-1-5-21-100-200-300-1001".parse().unwrap();
        assert_eq!(sid.to_string(), "S-1-5-21-100-200-300-1001");
        assert_eq!(sid.authority(), 5);
        assert_eq!(sid.sub_authorities(), &[21, 100, 200, 300, 1001]);
    }

    #[test]
    fn test_well_known() {
        assert!(Sid::world().is_world());
        assert!(Sid::creator_owner().is_creator_owner());
        assert!(Sid::creator_group().is_creator_group());
        assert_eq!(Sid::world().to_string(), "S-1-1-0");
        assert_eq!(Sid::creator_group().to_string(), "S-1-3-1");
    }

    #[test]
    fn test_non_mappable() {
        let builtin_admins: Sid = "S-1-5-32-544".parse().unwrap();
        let nt_authority_system: Sid = "S-1-5-18".parse().unwrap();
        let domain_user: Sid = "S-1-5-21-1-2-3-1001".parse().unwrap();
        assert!(builtin_admins.is_non_mappable());
        assert!(nt_authority_system.is_non_mappable());
        assert!(!domain_user.is_non_mappable());
        assert!(!Sid::world().is_non_mappable());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("S-2-5-18".parse::<Sid>().is_err());
        assert!("hello".parse::<Sid>().is_err());
        assert!("S-1-5-x".parse::<Sid>().is_err());
    }

    #[test]
    fn test_unix_namespace() {
        assert_eq!(Sid::unix_user(1000).to_string(), "S-1-22-1-1000");
        assert_eq!(Sid::unix_group(100).to_string(), "S-1-22-2-100");
        assert_ne!(Sid::unix_user(7), Sid::unix_group(7));
    }
}
