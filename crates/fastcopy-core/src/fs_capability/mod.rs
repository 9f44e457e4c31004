//! Platform-specific filesystem capability abstraction
//!
//! Captures and restores the metadata the engine preserves (three timestamps,
//! permission bits) and exposes the OS-level whole-file copy used by the fast
//! path.

use eyre::{Context, Result};
use filetime::FileTime;
use std::fs::Metadata;
use std::path::Path;

use crate::metadata_codec::FileTimes;

#[cfg(not(unix))]
mod portable;
#[cfg(unix)]
mod unix;

#[cfg(not(unix))]
pub use portable::PortableCapability as PlatformCapability;
#[cfg(unix)]
pub use unix::UnixCapability as PlatformCapability;

/// Platform-specific filesystem operations
pub trait FilesystemCapability {
    /// Permission bits worth carrying over, or `None` when the platform has
    /// no POSIX mode.
    fn permission_mode(&self, md: &Metadata) -> Option<u32>;

    /// Apply previously captured permissions. Returns whether anything was set.
    fn apply_permissions(&self, dst: &Path, meta: &CapturedMetadata) -> Result<bool>;

    /// Whole-file transfer through the OS.
    fn fast_copy(&self, src: &Path, dst: &Path) -> Result<u64> {
        std::fs::copy(src, dst)
            .with_context(|| format!("copy {} -> {}", src.display(), dst.display()))
    }
}

/// Metadata captured from a source so it can be re-applied elsewhere, possibly
/// after a round trip through an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedMetadata {
    pub times: FileTimes,
    pub mode: Option<u32>,
    pub readonly: bool,
}

/// What metadata was actually preserved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataPreserved {
    pub times: bool,
    pub permissions: bool,
}

/// Get platform-specific filesystem capability handler
pub fn get_platform_capability() -> PlatformCapability {
    PlatformCapability::new()
}

pub fn filetime_to_ms(ft: FileTime) -> i64 {
    ft.unix_seconds()
        .saturating_mul(1000)
        .saturating_add(i64::from(ft.nanoseconds() / 1_000_000))
}

pub fn ms_to_filetime(ms: i64) -> FileTime {
    let secs = ms.div_euclid(1000);
    let nanos = (ms.rem_euclid(1000) as u32) * 1_000_000;
    FileTime::from_unix_time(secs, nanos)
}

pub fn times_from_metadata(md: &Metadata) -> FileTimes {
    let modified = FileTime::from_last_modification_time(md);
    let accessed = FileTime::from_last_access_time(md);
    let created = FileTime::from_creation_time(md).unwrap_or(modified);
    FileTimes {
        modified_ms: filetime_to_ms(modified),
        accessed_ms: filetime_to_ms(accessed),
        created_ms: filetime_to_ms(created),
    }
}

pub fn capture_metadata(md: &Metadata) -> CapturedMetadata {
    CapturedMetadata {
        times: times_from_metadata(md),
        mode: get_platform_capability().permission_mode(md),
        readonly: md.permissions().readonly(),
    }
}

/// Restore captured metadata on `dst`. Creation time is carried in
/// `FileTimes` but cannot be set through `filetime`, so only modified and
/// access times are written.
pub fn apply_metadata(dst: &Path, meta: &CapturedMetadata) -> Result<MetadataPreserved> {
    let mut preserved = MetadataPreserved::default();

    let atime = ms_to_filetime(meta.times.accessed_ms);
    let mtime = ms_to_filetime(meta.times.modified_ms);
    match filetime::set_file_times(dst, atime, mtime) {
        Ok(()) => preserved.times = true,
        Err(err) => log::debug!("could not set times on {}: {err}", dst.display()),
    }

    preserved.permissions = get_platform_capability().apply_permissions(dst, meta)?;
    Ok(preserved)
}

/// Copy timestamps and permissions from a source snapshot onto `dst`. Take
/// the snapshot before reading the source: the read can move its access time.
pub fn preserve_metadata(src_md: &Metadata, dst: &Path) -> Result<MetadataPreserved> {
    let preserved = apply_metadata(dst, &capture_metadata(src_md))?;

    if !preserved.times {
        log::debug!("Could not preserve times for {}", dst.display());
    }
    if !preserved.permissions {
        log::debug!("Could not preserve permissions for {}", dst.display());
    }
    Ok(preserved)
}

/// Set only the modified time, leaving access time at "now". Used for
/// directories, whose access time is meaningless after a copy.
pub fn set_modified_ms(path: &Path, modified_ms: i64) -> Result<()> {
    filetime::set_file_mtime(path, ms_to_filetime(modified_ms))
        .with_context(|| format!("set mtime on {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_through_filetime() {
        for ms in [0i64, 1, 999, 1000, 1_700_000_000_123, -1, -1500] {
            assert_eq!(filetime_to_ms(ms_to_filetime(ms)), ms, "ms={ms}");
        }
    }

    #[test]
    fn preserve_copies_times() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, b"a").unwrap();
        std::fs::write(&dst, b"a").unwrap();

        let old = FileTime::from_unix_time(1_500_000_000, 0);
        let older = FileTime::from_unix_time(1_400_000_000, 0);
        filetime::set_file_times(&src, older, old).unwrap();

        let src_md = std::fs::metadata(&src).unwrap();
        std::fs::read(&src).unwrap();
        let preserved = preserve_metadata(&src_md, &dst).unwrap();
        assert!(preserved.times);

        let md = std::fs::metadata(&dst).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&md), old);
        assert_eq!(FileTime::from_last_access_time(&md), older);
    }
}
