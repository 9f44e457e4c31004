use eyre::{bail, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::DEFAULT_PACKAGING_THRESHOLD;

/// Default number of packaging workers when packaging is enabled.
pub const DEFAULT_PACKAGING_WORKERS: usize = 5;

/// What to do when the target file already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Leave existing targets alone.
    #[default]
    Never,
    /// Replace when the source is newer or the sizes differ.
    IfNewerOrDifferent,
    /// Always replace.
    Always,
}

impl OverwritePolicy {
    /// Map the two legacy boolean switches onto a policy. `always` wins.
    pub fn from_flags(always: bool, if_newer_or_different: bool) -> Self {
        if always {
            Self::Always
        } else if if_newer_or_different {
            Self::IfNewerOrDifferent
        } else {
            Self::Never
        }
    }
}

/// Thresholds deciding whether a directory's small files get packaged.
///
/// A directory qualifies when it holds at least `min_small_files` small files,
/// or at least `min_small_files_for_size` small files whose combined size is at
/// least `min_small_total_bytes`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackagingPolicy {
    pub min_small_files: u64,
    pub min_small_files_for_size: u64,
    pub min_small_total_bytes: f64,
}

impl Default for PackagingPolicy {
    fn default() -> Self {
        Self {
            min_small_files: 3,
            min_small_files_for_size: 2,
            min_small_total_bytes: 4096.0 / 0.7,
        }
    }
}

impl PackagingPolicy {
    pub fn qualifies(&self, small_file_count: u64, total_small_file_size: u64) -> bool {
        small_file_count >= self.min_small_files
            || (small_file_count >= self.min_small_files_for_size
                && total_small_file_size as f64 >= self.min_small_total_bytes)
    }
}

/// Immutable settings for one copy run.
#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    pub verbose: bool,
    /// Workers in the bulk copy pool.
    pub workers: usize,
    /// Workers in the small-file packaging pool.
    pub packaging_workers: usize,
    pub overwrite: OverwritePolicy,
    pub flat_copy: bool,
    pub create_source_folder_under_target: bool,
    pub package_small_files: bool,
    pub packaging_threshold: u64,
    pub packaging_policy: PackagingPolicy,
    pub verify_after_copy: bool,
    pub preserve_times_and_permissions: bool,
    /// Off by default, so empty source directories are reproduced.
    pub skip_empty_dirs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            destination: PathBuf::new(),
            verbose: false,
            workers: 1,
            packaging_workers: DEFAULT_PACKAGING_WORKERS,
            overwrite: OverwritePolicy::default(),
            flat_copy: false,
            create_source_folder_under_target: false,
            package_small_files: true,
            packaging_threshold: DEFAULT_PACKAGING_THRESHOLD,
            packaging_policy: PackagingPolicy::default(),
            verify_after_copy: false,
            preserve_times_and_permissions: false,
            skip_empty_dirs: false,
        }
    }
}

impl RunConfig {
    pub fn new(sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Split a legacy semicolon-joined source list. Blank segments are dropped.
    pub fn split_sources(joined: &str) -> Vec<PathBuf> {
        joined
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Packaging pool size: the configured count when packaging is on, else 1.
    pub fn effective_packaging_workers(&self) -> usize {
        if self.package_small_files {
            self.packaging_workers.max(1)
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no source paths given");
        }
        if self.destination.as_os_str().is_empty() {
            bail!("no destination path given");
        }
        if self.workers == 0 {
            bail!("worker count must be at least 1");
        }
        if self.package_small_files && self.packaging_workers == 0 {
            bail!("packaging worker count must be at least 1");
        }
        if self.packaging_threshold == 0 {
            bail!("packaging size threshold must be greater than zero");
        }
        Ok(())
    }
}
