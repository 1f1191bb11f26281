//! crates/aclbridge/src/engine.rs
//!
//! The descriptor-level entry points tying the two translation
//! directions to storage. One engine instance serves one file.

use tracing::debug;

use secdesc::{SdControl, SecurityDescriptor, SecurityInfo, Sid};

use crate::apply::{
    convert_canon_to_mode, delete_default_acl, set_canon_ace_list, try_chown, AclSetOutcome,
};
use crate::compose::{acl_group_bits, build_nt_dacl, canonicalise_acl};
use crate::decompose::{unpack_canon_lists, unpack_owners};
use crate::error::{is_no_acl_support, AclError, Result};
use crate::identity::{CallerContext, IdentityResolver};
use crate::pai::{InheritanceMetadata, INHERITANCE_XATTR};
use crate::perms::Perms;
use crate::policy::SharePolicy;
use crate::privilege::PrivilegeBroker;
use crate::vfs::{AclKind, FileStat, PosixAclEntry, Vfs};

/// Translates NT security descriptors to and from one file's POSIX
/// state.
pub struct AclEngine<'a> {
    vfs: &'a mut dyn Vfs,
    ids: &'a dyn IdentityResolver,
    broker: &'a dyn PrivilegeBroker,
    policy: SharePolicy,
}

impl<'a> AclEngine<'a> {
    pub fn new(
        vfs: &'a mut dyn Vfs,
        ids: &'a dyn IdentityResolver,
        broker: &'a dyn PrivilegeBroker,
        policy: SharePolicy,
    ) -> Self {
        Self {
            vfs,
            ids,
            broker,
            policy,
        }
    }

    fn read_acl(&self, kind: AclKind) -> Result<Option<Vec<PosixAclEntry>>> {
        match self.vfs.get_acl(kind) {
            Ok(Some(entries)) if entries.is_empty() => Ok(None),
            Ok(entries) => Ok(entries),
            Err(err) if is_no_acl_support(&err) => Ok(None),
            Err(err) => Err(AclError::from_io("reading posix acl", err)),
        }
    }

    fn load_metadata(&self) -> Result<Option<InheritanceMetadata>> {
        if !self.policy.map_acl_inherit {
            return Ok(None);
        }
        let buf = self
            .vfs
            .get_xattr(INHERITANCE_XATTR)
            .map_err(|err| AclError::from_io("reading inheritance metadata", err))?;
        Ok(buf.as_deref().and_then(InheritanceMetadata::decode))
    }

    fn store_metadata(
        &mut self,
        file_list: &[crate::model::CanonicalAce],
        dir_list: Option<&[crate::model::CanonicalAce]>,
        protected: bool,
    ) {
        if !self.policy.map_acl_inherit {
            return;
        }
        let meta =
            InheritanceMetadata::from_lists(file_list, dir_list.unwrap_or(&[]), protected);
        // Metadata is best effort, a failure here must not undo an ACL
        // that was already applied.
        let result = match meta.encode() {
            Some(buf) => self.vfs.set_xattr(INHERITANCE_XATTR, &buf),
            None => self.vfs.remove_xattr(INHERITANCE_XATTR),
        };
        if let Err(err) = result {
            debug!(error = %err, "failed to store inheritance metadata");
        }
    }

    /// Builds the file's security descriptor.
    ///
    /// Owner and group are included when asked for. The DACL is built
    /// only when asked for without the protected-query flag; it renders
    /// the access ACL (or the plain mode when there is none), plus the
    /// default ACL of a directory with Creator Owner and Creator Group
    /// standing in for the owning identities. The result is marked
    /// protected whenever inheritance tracking is off or the stored
    /// metadata says so, POSIX ACLs never inherit dynamically.
    pub fn get_security_descriptor(
        &mut self,
        caller: &CallerContext,
        security_info: SecurityInfo,
    ) -> Result<SecurityDescriptor> {
        let stat = self
            .vfs
            .stat()
            .map_err(|err| AclError::from_io("stat", err))?;
        let owner_sid = self.ids.uid_to_sid(stat.uid);
        let group_sid = self.ids.gid_to_sid(stat.gid);
        let metadata = self.load_metadata()?;

        let mut dacl = None;
        if security_info.contains(SecurityInfo::DACL)
            && !security_info.contains(SecurityInfo::PROTECTED_DACL)
        {
            let access = self.read_acl(AclKind::Access)?.unwrap_or_default();
            let file_list = canonicalise_acl(
                &access,
                AclKind::Access,
                &stat,
                &owner_sid,
                &group_sid,
                metadata.as_ref(),
                &self.policy,
                caller,
                self.ids,
            );

            // Creator Owner / Creator Group would be the natural owning
            // identities everywhere, but Windows only resolves them in
            // directory browse lists, so they are used for the default
            // ACL only.
            let dir_list = if stat.is_directory {
                self.read_acl(AclKind::Default)?.map(|default| {
                    canonicalise_acl(
                        &default,
                        AclKind::Default,
                        &stat,
                        &Sid::creator_owner(),
                        &Sid::creator_group(),
                        metadata.as_ref(),
                        &self.policy,
                        caller,
                        self.ids,
                    )
                })
            } else {
                None
            };

            let aces = build_nt_dacl(file_list, dir_list, &self.policy);
            if !aces.is_empty() {
                dacl = Some(aces);
            }
        }

        let mut sd = SecurityDescriptor::new(
            security_info
                .contains(SecurityInfo::OWNER)
                .then(|| owner_sid.clone()),
            security_info
                .contains(SecurityInfo::GROUP)
                .then(|| group_sid.clone()),
            dacl,
        );

        if metadata.as_ref().is_some_and(|meta| meta.protected) || !self.policy.map_acl_inherit {
            sd.control = sd.control.union(SdControl::DACL_PROTECTED);
        }
        if let Some(dacl) = sd.dacl.as_deref_mut() {
            secdesc::descriptor::sort_dacl_canonical(dacl);
        }

        debug!(
            aces = sd.dacl.as_ref().map_or(0, Vec::len),
            protected = sd.dacl_protected(),
            "built security descriptor"
        );
        Ok(sd)
    }

    fn restat(&self) -> Result<FileStat> {
        self.vfs
            .stat()
            .map_err(|err| AclError::from_io("stat", err))
    }

    /// Applies a security descriptor to the file.
    ///
    /// Ownership changes the caller keeps to themselves happen before
    /// the ACL is written, so a user taking ownership can set an ACL
    /// on a file they could not touch a moment earlier; giving a file
    /// away happens last, for the mirror-image reason. The DACL is
    /// written as a POSIX ACL when the filesystem supports it and
    /// collapses to a chmod when it does not.
    pub fn set_security_descriptor(
        &mut self,
        caller: &CallerContext,
        security_info: SecurityInfo,
        sd: &SecurityDescriptor,
    ) -> Result<()> {
        if security_info.is_empty() {
            return Err(AclError::MalformedInput("no security information sent"));
        }
        if self.policy.read_only {
            return Err(AclError::PermissionDenied {
                context: "descriptor write on read-only share",
                source: std::io::Error::from_raw_os_error(libc::EROFS),
            });
        }

        let mut stat = self.restat()?;
        let orig_mode = stat.mode;

        let (uid, gid) = unpack_owners(sd, security_info, &self.policy, caller, self.ids)?;
        let uid = uid.filter(|uid| *uid != stat.uid);
        let gid = gid.filter(|gid| *gid != stat.gid);
        let mut need_chown = uid.is_some() || gid.is_some();

        if need_chown && uid.is_none_or(|uid| uid == caller.uid) {
            debug!(?uid, ?gid, "chown before acl");
            try_chown(self.vfs, uid, gid, &self.policy, caller, self.broker)?;
            // The mode may have changed under us (sgid bits, for one).
            stat = self.restat()?;
            need_chown = false;
        }

        let owner_sid = self.ids.uid_to_sid(stat.uid);
        let group_sid = self.ids.gid_to_sid(stat.gid);

        let unpacked = unpack_canon_lists(
            sd,
            security_info,
            &stat,
            &owner_sid,
            &group_sid,
            &self.policy,
            caller,
            self.ids,
        )?;

        if let Some(unpacked) = unpacked {
            let outcome = set_canon_ace_list(
                self.vfs,
                &unpacked.file_list,
                AclKind::Access,
                stat.gid,
                &self.policy,
                caller,
                self.broker,
            )?;
            let acl_supported = outcome == AclSetOutcome::Applied;

            if acl_supported && stat.is_directory {
                match &unpacked.dir_list {
                    Some(dir_list) => {
                        let outcome = set_canon_ace_list(
                            self.vfs,
                            dir_list,
                            AclKind::Default,
                            stat.gid,
                            &self.policy,
                            caller,
                            self.broker,
                        )?;
                        if outcome != AclSetOutcome::Applied {
                            return Err(AclError::StorageUnsupported {
                                context: "writing default acl",
                            });
                        }
                    }
                    None => {
                        delete_default_acl(
                            self.vfs,
                            stat.gid,
                            &self.policy,
                            caller,
                            self.broker,
                        )?;
                    }
                }
            }

            if acl_supported {
                self.store_metadata(
                    &unpacked.file_list,
                    unpacked.dir_list.as_deref(),
                    sd.dacl_protected(),
                );
            } else {
                let mode = convert_canon_to_mode(
                    &unpacked.file_list,
                    stat.is_directory,
                    &self.policy,
                )
                .ok_or(AclError::StorageUnsupported {
                    context: "acl too rich for a filesystem without acl support",
                })?;

                if mode != orig_mode {
                    debug!(mode = format_args!("{mode:o}"), "chmod fallback");
                    if let Err(err) = self.vfs.chmod(mode) {
                        if crate::apply::acl_group_override(&err, &self.policy, caller, stat.gid)
                        {
                            let _guard =
                                crate::privilege::PrivilegeGuard::escalate(self.broker);
                            self.vfs
                                .chmod(mode)
                                .map_err(|err| AclError::from_io("chmod fallback", err))?;
                        } else {
                            return Err(AclError::from_io("chmod fallback", err));
                        }
                    }
                }
            }
        }

        if need_chown {
            debug!(?uid, ?gid, "chown after acl");
            try_chown(self.vfs, uid, gid, &self.policy, caller, self.broker)?;
        }

        Ok(())
    }

    /// The owning-group bits as the ACL stores them. A stat on a file
    /// with a mask entry reports the mask in the group slot, not the
    /// real group grant.
    pub fn acl_group_bits(&self) -> Result<Option<Perms>> {
        Ok(self
            .read_acl(AclKind::Access)?
            .as_deref()
            .and_then(acl_group_bits))
    }

    /// A chmod that preserves named ACL entries. Falls back to a plain
    /// chmod when the ACL carries nothing a chmod would lose.
    pub fn refresh_acl_mode(&mut self, mode: u32) -> Result<()> {
        if crate::apply::refresh_acl_mode(self.vfs, mode)? {
            return Ok(());
        }
        self.vfs
            .chmod(mode)
            .map_err(|err| AclError::from_io("chmod", err))
    }
}
