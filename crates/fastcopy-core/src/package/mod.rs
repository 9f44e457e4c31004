//! Small-file packaging: bundle a directory's small files into one ZIP
//! archive, ship it through the copy pool, unpack it at the target.

mod builder;
mod unpack;

pub use builder::package_directory;
pub use unpack::unpack_archive;

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Local, TimeZone, Timelike};
use eyre::{bail, Result};

use crate::context::EngineContext;
use crate::copy::{self, CopyTask};
use crate::errors::CopyError;
use crate::worker_pool::WorkerPool;
use crate::{is_reserved_name, RESERVED_ARCHIVE_PREFIX};

static TRANSPORT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Result of packaging one directory. Immutable once built; the follow-up
/// copy task owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// File name of the archive, reserved prefix included.
    pub archive_name: String,
    pub source_dir_name: String,
    pub source_dir_modified_ms: i64,
    /// Where the archive was written, inside the source directory.
    pub archive_path: PathBuf,
    /// Name the archive travels under in `target_dir`. Unique per package,
    /// since several packages can share one target directory.
    pub transport_name: String,
    /// Directory the archive is unpacked into.
    pub target_dir: PathBuf,
    pub archive_size: u64,
    pub file_count: u64,
    /// Small files left out because the overwrite policy said no.
    pub skipped_count: u64,
}

impl PackageDescriptor {
    pub fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

/// Packaging-pool job for one qualified directory.
#[derive(Debug, Clone)]
pub struct PackageTask {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
}

impl PackageTask {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    /// Build the archive and hand it to `copy_pool`. When packaging fails the
    /// small files are submitted one by one instead.
    pub fn run(self, ctx: &Arc<EngineContext>, copy_pool: &WorkerPool) {
        if ctx.is_cancelled() {
            return;
        }
        let threshold = ctx.config.packaging_threshold;
        match package_directory(&ctx.config, &self.source_dir, &self.target_dir, false, threshold) {
            Ok(descriptor) => {
                for _ in 0..descriptor.skipped_count {
                    ctx.stats.increment_skipped();
                }
                if descriptor.is_empty() {
                    log::debug!("nothing to package in {}", self.source_dir.display());
                    return;
                }
                ctx.verbose(&format!(
                    "packaged {} files from {} ({} bytes)",
                    descriptor.file_count,
                    self.source_dir.display(),
                    descriptor.archive_size
                ));

                let archive_path = descriptor.archive_path.clone();
                let task = CopyTask::archive(descriptor);
                let task_ctx = Arc::clone(ctx);
                if !copy_pool.submit(move || {
                    task.run(&task_ctx);
                }) {
                    let _ = fs::remove_file(&archive_path);
                }
            }
            Err(err) => {
                let err = CopyError::packaging(&self.source_dir, format!("{err:#}"));
                ctx.reporter
                    .log(log::Level::Warn, &format!("{err}; copying files individually"));
                self.fall_back(ctx, copy_pool);
            }
        }
    }

    fn fall_back(&self, ctx: &Arc<EngineContext>, copy_pool: &WorkerPool) {
        let entries = match fs::read_dir(&self.source_dir) {
            Ok(entries) => entries,
            Err(err) => {
                ctx.report_failure(&CopyError::io("read_dir", &self.source_dir, err));
                return;
            }
        };
        for entry in entries.flatten() {
            if ctx.is_cancelled() {
                return;
            }
            if is_reserved_name(&entry.file_name()) {
                continue;
            }
            let path = entry.path();
            let Ok(md) = fs::metadata(&path) else {
                continue;
            };
            if md.is_file() && md.len() <= ctx.config.packaging_threshold {
                let target = self.target_dir.join(entry.file_name());
                copy::schedule_copy(ctx, copy_pool, &path, &md, target);
            }
        }
    }
}

/// Turn a stored entry name into a relative path that cannot escape the
/// unpack directory.
fn sanitize_rel_path(rel: &Path) -> Result<PathBuf> {
    if rel.is_absolute() {
        bail!("refusing absolute archive entry path: {}", rel.display());
    }
    let mut clean = PathBuf::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(s) => clean.push(s),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("unsafe component in archive entry path: {}", rel.display());
            }
        }
    }
    if clean.as_os_str().is_empty() {
        bail!("empty archive entry path");
    }
    Ok(clean)
}

/// Target-side archive name for one package: reserved prefix, process id and
/// a process-wide sequence number.
fn transport_name(source_dir_name: &str) -> String {
    let seq = TRANSPORT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{RESERVED_ARCHIVE_PREFIX}{}_{seq}_{source_dir_name}.zip",
        std::process::id()
    )
}

/// Relative path rendered with `/` separators, as ZIP expects.
fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Local wall-clock DOS timestamp for the standard entry header. Instants the
/// format cannot hold (before 1980, after 2107) fall back to its minimum.
fn zip_datetime(ms: i64) -> zip::DateTime {
    let Some(dt) = Local.timestamp_millis_opt(ms).single() else {
        return zip::DateTime::default();
    };
    let Ok(year) = u16::try_from(dt.year()) else {
        return zip::DateTime::default();
    };
    zip::DateTime::from_date_and_time(
        year,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
    )
    .unwrap_or_default()
}

fn zip_datetime_ms(dt: zip::DateTime) -> Option<i64> {
    Local
        .with_ymd_and_hms(
            i32::from(dt.year()),
            u32::from(dt.month()),
            u32::from(dt.day()),
            u32::from(dt.hour()),
            u32::from(dt.minute()),
            u32::from(dt.second()),
        )
        .single()
        .map(|d| d.timestamp_millis())
}
