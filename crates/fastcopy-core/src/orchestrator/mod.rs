use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Instant;

use eyre::Result;

use crate::cancel::CancellationFlag;
use crate::config::RunConfig;
use crate::context::EngineContext;
use crate::fs_capability::set_modified_ms;
use crate::reporter::Reporter;
use crate::worker_pool::WorkerPool;

mod summary;
mod walker;

pub use summary::RunSummary;
pub use walker::{CopyScheduler, CreatedDir};

/// Drives one copy run: walk, drain both pools, restore directory times.
pub struct FastCopy {
    config: RunConfig,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationFlag,
}

impl FastCopy {
    pub fn new(config: RunConfig, reporter: Arc<dyn Reporter>, cancel: CancellationFlag) -> Self {
        Self {
            config,
            reporter,
            cancel,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Handle to the flag this engine polls.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Run to completion or cancellation. Errors only for an invalid
    /// configuration or when the pools cannot start; everything that goes
    /// wrong per file is counted in the summary instead.
    pub fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        self.cancel.reset();
        let started = Instant::now();

        let ctx = Arc::new(EngineContext::new(
            self.config.clone(),
            self.cancel.clone(),
            Arc::clone(&self.reporter),
        ));
        let copy_pool = Arc::new(WorkerPool::new("copy", self.config.workers)?);
        let package_pool = WorkerPool::new("package", self.config.effective_packaging_workers())?;

        log::info!(
            "copying {} source(s) to {} ({} copy workers, {} packaging workers)",
            self.config.sources.len(),
            self.config.destination.display(),
            self.config.workers,
            self.config.effective_packaging_workers()
        );

        let mut scheduler = CopyScheduler::new(&ctx, &copy_pool, &package_pool);
        scheduler.walk(&self.config.sources, &self.config.destination);
        let created_dirs = scheduler.into_created_dirs();

        // Packaging jobs submit into the copy pool, so drain them first.
        package_pool.shutdown_and_await_completion();
        copy_pool.shutdown_and_await_completion();

        if self.config.preserve_times_and_permissions {
            restore_dir_times(created_dirs);
        }

        let summary = RunSummary::from_stats(
            &ctx.stats,
            self.cancel.is_cancelled(),
            started.elapsed().as_millis() as u64,
        );
        if summary.cancelled {
            self.reporter.log(log::Level::Warn, "copy cancelled");
        }
        log::info!(
            "done: {} files, {} bytes, {} dirs, {} failed, {} skipped in {} ms",
            summary.files_copied,
            summary.total_bytes,
            summary.dirs_created,
            summary.files_failed,
            summary.files_skipped,
            summary.elapsed_ms
        );
        Ok(summary)
    }
}

/// Must run after both pools drain: any write into a directory bumps its
/// mtime. Deepest first.
fn restore_dir_times(mut dirs: Vec<CreatedDir>) {
    dirs.sort_by_key(|d| Reverse(d.path.components().count()));
    for dir in dirs {
        if let Err(err) = set_modified_ms(&dir.path, dir.source_modified_ms) {
            log::debug!("{err:#}");
        }
    }
}
