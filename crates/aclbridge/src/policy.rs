//! crates/aclbridge/src/policy.rs
//!
//! Per-share policy flags, consumed read-only by the pipeline.

/// Policy knobs controlling how descriptors are translated and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePolicy {
    /// Rewrite masks for NT 4 clients: expand generic bits, honour the
    /// no-access sentinel, and emit the sentinel for empty entries.
    pub nt4_compatible: bool,
    /// Map a full rwx set to the single full-control mask.
    pub map_full_control: bool,
    /// Track inherited entries and the protected flag in metadata.
    pub map_acl_inherit: bool,
    /// Retry a denied write once with privileges when the caller is in
    /// the file's owning group.
    pub group_override: bool,
    /// DOS-attribute emulation; also enables the chown-to-self fallback.
    pub dos_filemode: bool,
    /// Substitute the caller's identity for an unmappable owner/group.
    pub force_unknown_acl_user: bool,
    /// Allow take-ownership/restore privileges to drive chown.
    pub enable_privileges: bool,
    /// Reject all descriptor writes.
    pub read_only: bool,
    /// AND / OR masks applied to every permission class on set.
    pub security_mask: u32,
    pub force_security_mode: u32,
    pub dir_security_mask: u32,
    pub force_dir_security_mode: u32,
}

impl SharePolicy {
    pub const fn new() -> Self {
        Self {
            nt4_compatible: false,
            map_full_control: true,
            map_acl_inherit: false,
            group_override: false,
            dos_filemode: false,
            force_unknown_acl_user: false,
            enable_privileges: true,
            read_only: false,
            security_mask: 0o777,
            force_security_mode: 0,
            dir_security_mask: 0o777,
            force_dir_security_mode: 0,
        }
    }

    pub const fn with_nt4_compatible(mut self, value: bool) -> Self {
        self.nt4_compatible = value;
        self
    }

    pub const fn with_map_full_control(mut self, value: bool) -> Self {
        self.map_full_control = value;
        self
    }

    pub const fn with_map_acl_inherit(mut self, value: bool) -> Self {
        self.map_acl_inherit = value;
        self
    }

    pub const fn with_group_override(mut self, value: bool) -> Self {
        self.group_override = value;
        self
    }

    pub const fn with_dos_filemode(mut self, value: bool) -> Self {
        self.dos_filemode = value;
        self
    }

    pub const fn with_force_unknown_acl_user(mut self, value: bool) -> Self {
        self.force_unknown_acl_user = value;
        self
    }

    pub const fn with_enable_privileges(mut self, value: bool) -> Self {
        self.enable_privileges = value;
        self
    }

    pub const fn with_read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub const fn with_security_masks(mut self, and_bits: u32, or_bits: u32) -> Self {
        self.security_mask = and_bits;
        self.force_security_mode = or_bits;
        self
    }

    pub const fn with_dir_security_masks(mut self, and_bits: u32, or_bits: u32) -> Self {
        self.dir_security_mask = and_bits;
        self.force_dir_security_mode = or_bits;
        self
    }

    /// The AND/OR mask pair for a file or directory target.
    pub const fn security_mask_pair(&self, is_directory: bool) -> (u32, u32) {
        if is_directory {
            (self.dir_security_mask, self.force_dir_security_mode)
        } else {
            (self.security_mask, self.force_security_mode)
        }
    }
}

impl Default for SharePolicy {
    fn default() -> Self {
        Self::new()
    }
}
