//! crates/secdesc/src/lib.rs
//!
//! Windows NT security descriptor model.
//!
//! This crate holds the boundary types the ACL translation engine speaks
//! at its NT-facing edge: security identifiers, access masks, access
//! control entries, and the security descriptor itself. It knows nothing
//! about POSIX ACLs; that side lives in `aclbridge`.

pub mod access_mask;
pub mod ace;
pub mod descriptor;
pub mod sid;

pub use access_mask::AccessMask;
pub use ace::{AceFlags, AceType, SecAce};
pub use descriptor::{SdControl, SecurityDescriptor, SecurityInfo};
pub use sid::{ParseSidError, Sid};
