//! Fallback for platforms without POSIX modes: only the read-only flag
//! survives a copy.

use super::{CapturedMetadata, FilesystemCapability};
use eyre::{Context, Result};
use std::fs::{self, Metadata};
use std::path::Path;

pub struct PortableCapability;

impl PortableCapability {
    pub fn new() -> Self {
        Self
    }
}

impl FilesystemCapability for PortableCapability {
    fn permission_mode(&self, _md: &Metadata) -> Option<u32> {
        None
    }

    fn apply_permissions(&self, dst: &Path, meta: &CapturedMetadata) -> Result<bool> {
        // A POSIX mode carried in from an archive still tells us about writability.
        let readonly = match meta.mode {
            Some(mode) => mode & 0o222 == 0,
            None => meta.readonly,
        };
        let mut perms = fs::metadata(dst)
            .with_context(|| format!("metadata {}", dst.display()))?
            .permissions();
        perms.set_readonly(readonly);
        fs::set_permissions(dst, perms)
            .with_context(|| format!("set permissions on {}", dst.display()))?;
        Ok(true)
    }
}
