use std::fs::Metadata;
use std::io;
use std::path::Path;

use filetime::FileTime;

use crate::config::OverwritePolicy;
use crate::fs_capability::filetime_to_ms;

/// Decide whether `target` should be (re)written from a source described by
/// `src_meta`.
///
/// A missing target is always written. An existing one is replaced when the
/// policy is `Always`, or when it is `IfNewerOrDifferent` and the source is
/// strictly newer or the sizes differ. Anything else is a skip. Times are
/// compared at millisecond granularity, the precision metadata is carried at.
pub fn should_copy(src_meta: &Metadata, target: &Path, policy: OverwritePolicy) -> io::Result<bool> {
    let dst_meta = match std::fs::metadata(target) {
        Ok(md) => md,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err),
    };
    Ok(target_is_stale(src_meta, &dst_meta, policy))
}

pub fn target_is_stale(src_meta: &Metadata, dst_meta: &Metadata, policy: OverwritePolicy) -> bool {
    match policy {
        OverwritePolicy::Always => true,
        OverwritePolicy::Never => false,
        OverwritePolicy::IfNewerOrDifferent => {
            if src_meta.len() != dst_meta.len() {
                return true;
            }
            let src_ms = filetime_to_ms(FileTime::from_last_modification_time(src_meta));
            let dst_ms = filetime_to_ms(FileTime::from_last_modification_time(dst_meta));
            src_ms > dst_ms
        }
    }
}
