//! Unix filesystem capability implementation

use super::{CapturedMetadata, FilesystemCapability};
use eyre::{Context, Result};
use std::fs::{self, Metadata, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Permission bits we carry: rwx for user/group/other plus setuid/setgid/sticky.
const MODE_MASK: u32 = 0o7777;

pub struct UnixCapability;

impl UnixCapability {
    pub fn new() -> Self {
        Self
    }
}

impl FilesystemCapability for UnixCapability {
    fn permission_mode(&self, md: &Metadata) -> Option<u32> {
        Some(md.permissions().mode() & MODE_MASK)
    }

    fn apply_permissions(&self, dst: &Path, meta: &CapturedMetadata) -> Result<bool> {
        let Some(mode) = meta.mode else {
            return Ok(false);
        };
        fs::set_permissions(dst, Permissions::from_mode(mode & MODE_MASK))
            .with_context(|| format!("chmod {:o} {}", mode & MODE_MASK, dst.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_capability::{apply_metadata, capture_metadata};

    #[test]
    fn mode_is_captured_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("script.sh");
        let dst = dir.path().join("copy.sh");
        fs::write(&src, b"#!/bin/sh\n").unwrap();
        fs::write(&dst, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&src, Permissions::from_mode(0o750)).unwrap();

        let captured = capture_metadata(&fs::metadata(&src).unwrap());
        assert_eq!(captured.mode, Some(0o750));

        let preserved = apply_metadata(&dst, &captured).unwrap();
        assert!(preserved.permissions);
        let mode = fs::metadata(&dst).unwrap().permissions().mode() & MODE_MASK;
        assert_eq!(mode, 0o750);
    }
}
