use std::fs::{self, File, Metadata};
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{eyre, Context, Result};
use filetime::FileTime;
use walkdir::WalkDir;
use zip::write::FullFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{entry_name, transport_name, zip_datetime, PackageDescriptor};
use crate::checksum;
use crate::config::RunConfig;
use crate::copy::should_copy;
use crate::fs_capability::{capture_metadata, filetime_to_ms, set_modified_ms};
use crate::metadata_codec::{
    digest_payload, permission_payload, time_payload, DIGEST_BLOCK_ID, PERMISSION_BLOCK_ID,
    TIME_BLOCK_ID,
};
use crate::{is_reserved_name, RESERVED_ARCHIVE_PREFIX};

/// Best DEFLATE compression.
const COMPRESSION_LEVEL: i64 = 9;

/// Removes a half-written archive unless the build completed.
struct ArchiveGuard {
    path: PathBuf,
    keep: bool,
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Bundle the small files of `source_dir` into a ZIP archive written inside
/// `source_dir`.
///
/// Files above `size_threshold`, reserved archives and files the overwrite
/// policy rejects against `target_dir` are left out. When nothing is left the
/// archive is deleted and a descriptor with `file_count == 0` is returned.
pub fn package_directory(
    config: &RunConfig,
    source_dir: &Path,
    target_dir: &Path,
    recursive: bool,
    size_threshold: u64,
) -> Result<PackageDescriptor> {
    let dir_md = fs::metadata(source_dir)
        .with_context(|| format!("stat {}", source_dir.display()))?;
    let source_dir_name = source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    let archive_name = format!("{RESERVED_ARCHIVE_PREFIX}{source_dir_name}.zip");
    let archive_path = source_dir.join(&archive_name);

    let file = File::create(&archive_path)
        .with_context(|| format!("create archive {}", archive_path.display()))?;
    let mut guard = ArchiveGuard {
        path: archive_path.clone(),
        keep: false,
    };
    let mut writer = ZipWriter::new(file);

    let mut walker = WalkDir::new(source_dir).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut file_count = 0u64;
    let mut skipped_count = 0u64;
    for entry in walker
        .into_iter()
        .filter_entry(|e| !is_reserved_name(e.file_name()))
    {
        let entry = entry.with_context(|| format!("walk {}", source_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let md = entry
            .metadata()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        if md.len() > size_threshold {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| eyre!("{} is outside {}", entry.path().display(), source_dir.display()))?;
        let target = target_dir.join(rel);
        if !should_copy(&md, &target, config.overwrite)
            .with_context(|| format!("stat {}", target.display()))?
        {
            log::debug!("skipping existing {}", target.display());
            skipped_count += 1;
            continue;
        }

        let data = fs::read(entry.path())
            .with_context(|| format!("read {}", entry.path().display()))?;
        let options = entry_options(&md, &data, config.verify_after_copy)?;
        writer
            .start_file(entry_name(rel), options)
            .with_context(|| format!("add {} to archive", rel.display()))?;
        writer
            .write_all(&data)
            .with_context(|| format!("write {} to archive", rel.display()))?;
        file_count += 1;
    }

    writer
        .finish()
        .with_context(|| format!("finish archive {}", archive_path.display()))?;

    let archive_size = if file_count == 0 {
        0
    } else {
        guard.keep = true;
        fs::metadata(&archive_path)
            .with_context(|| format!("stat {}", archive_path.display()))?
            .len()
    };
    drop(guard);

    let source_dir_modified_ms = filetime_to_ms(FileTime::from_last_modification_time(&dir_md));
    if file_count == 0 {
        if let Err(err) = set_modified_ms(source_dir, source_dir_modified_ms) {
            log::debug!("{err:#}");
        }
    }

    let transport_name = transport_name(&source_dir_name);
    Ok(PackageDescriptor {
        archive_name,
        source_dir_name,
        source_dir_modified_ms,
        transport_name,
        archive_path,
        target_dir: target_dir.to_path_buf(),
        archive_size,
        file_count,
        skipped_count,
    })
}

fn entry_options(md: &Metadata, data: &[u8], with_digest: bool) -> Result<FullFileOptions<'static>> {
    let captured = capture_metadata(md);
    let mut options = FullFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
        .last_modified_time(zip_datetime(captured.times.modified_ms));

    options.add_extra_data(TIME_BLOCK_ID, time_payload(&captured.times).to_vec().into_boxed_slice(), false)?;
    if let Some(mode) = captured.mode {
        options = options.unix_permissions(mode);
        options.add_extra_data(PERMISSION_BLOCK_ID, permission_payload(mode).to_vec().into_boxed_slice(), false)?;
    }
    if with_digest {
        let hex = checksum::to_hex(&checksum::hash_bytes(data));
        if let Some(payload) = digest_payload(&hex) {
            options.add_extra_data(DIGEST_BLOCK_ID, payload.to_vec().into_boxed_slice(), false)?;
        }
    }
    Ok(options)
}
