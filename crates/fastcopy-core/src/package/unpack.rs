use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use eyre::{Context, Result};
use zip::ZipArchive;

use super::{sanitize_rel_path, zip_datetime_ms};
use crate::checksum;
use crate::context::EngineContext;
use crate::errors::CopyError;
use crate::fs_capability::{apply_metadata, CapturedMetadata};
use crate::metadata_codec::{decode_digest, decode_permissions, decode_times_or};

/// Extract every entry of `archive` below `dest_dir`, counting each one as a
/// copied file. Returns the number of entries written.
///
/// Per-entry failures (unsafe name, digest mismatch, write error) are
/// reported and skipped; only an unreadable archive is an error.
pub fn unpack_archive(ctx: &EngineContext, archive: &Path, dest_dir: &Path) -> Result<usize> {
    fs::create_dir_all(dest_dir).with_context(|| format!("create {}", dest_dir.display()))?;
    let file = File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file).with_context(|| format!("read archive {}", archive.display()))?;

    let mut written = 0usize;
    for index in 0..zip.len() {
        if ctx.is_cancelled() {
            log::debug!("unpack of {} cancelled", archive.display());
            break;
        }
        let started = Instant::now();
        let mut entry = zip
            .by_index(index)
            .with_context(|| format!("entry {index} of {}", archive.display()))?;
        if entry.is_dir() {
            continue;
        }

        let rel = match sanitize_rel_path(Path::new(entry.name())) {
            Ok(rel) => rel,
            Err(err) => {
                log::warn!("skipping entry in {}: {err}", archive.display());
                ctx.stats.increment_failed();
                continue;
            }
        };
        let out_path = dest_dir.join(rel);

        let extra = entry.extra_data().map(<[u8]>::to_vec).unwrap_or_default();
        let fallback_ms = entry
            .last_modified()
            .and_then(zip_datetime_ms)
            .unwrap_or_else(|| chrono::Local::now().timestamp_millis());
        let zip_mode = entry.unix_mode();

        let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        if let Err(err) = entry.read_to_end(&mut data) {
            ctx.report_failure(&CopyError::io("unpack", &out_path, err));
            continue;
        }
        drop(entry);

        let size = data.len() as u64;
        ctx.stats.record_attempt(size);

        if let Some(expected) = decode_digest(&extra) {
            let actual = checksum::to_hex(&checksum::hash_bytes(&data));
            if actual != expected {
                ctx.report_failure(&CopyError::VerificationMismatch {
                    path: out_path,
                    expected,
                    actual,
                });
                continue;
            }
        }

        if let Some(parent) = out_path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                ctx.report_failure(&CopyError::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source: err,
                });
                continue;
            }
        }
        if let Err(err) = fs::write(&out_path, &data) {
            let _ = fs::remove_file(&out_path);
            ctx.report_failure(&CopyError::io("write", &out_path, err));
            continue;
        }

        ctx.stats
            .record_success(size, started.elapsed().as_millis() as u64);
        written += 1;

        if ctx.config.preserve_times_and_permissions {
            let captured = CapturedMetadata {
                times: decode_times_or(&extra, fallback_ms),
                mode: decode_permissions(&extra).or(zip_mode),
                readonly: false,
            };
            if let Err(err) = apply_metadata(&out_path, &captured) {
                log::warn!("metadata not restored on {}: {err:#}", out_path.display());
            }
        }
    }
    Ok(written)
}
