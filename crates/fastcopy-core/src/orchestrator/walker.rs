//! Single-threaded producer: walks the source trees, creates target
//! directories and feeds the two pools.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;

use crate::context::EngineContext;
use crate::copy::schedule_copy;
use crate::dir_stat::DirectoryStat;
use crate::errors::{categorize_io_error, CopyError, ErrorCategory};
use crate::fs_capability::filetime_to_ms;
use crate::is_reserved_name;
use crate::package::PackageTask;
use crate::worker_pool::WorkerPool;

/// A directory created on the target side, with the source mtime to restore
/// once all writes into it are done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDir {
    pub path: PathBuf,
    pub source_modified_ms: i64,
}

pub struct CopyScheduler<'a> {
    ctx: &'a Arc<EngineContext>,
    copy_pool: &'a Arc<WorkerPool>,
    package_pool: &'a WorkerPool,
    created_dirs: Vec<CreatedDir>,
}

impl<'a> CopyScheduler<'a> {
    pub fn new(
        ctx: &'a Arc<EngineContext>,
        copy_pool: &'a Arc<WorkerPool>,
        package_pool: &'a WorkerPool,
    ) -> Self {
        Self {
            ctx,
            copy_pool,
            package_pool,
            created_dirs: Vec::new(),
        }
    }

    /// Directories this walk created, in creation order.
    pub fn into_created_dirs(self) -> Vec<CreatedDir> {
        self.created_dirs
    }

    /// Schedule everything under `sources` into `dest_root`. Returns early,
    /// without error, once the run is cancelled.
    pub fn walk(&mut self, sources: &[PathBuf], dest_root: &Path) {
        let flat = self.ctx.config.flat_copy;
        for source in sources {
            if self.ctx.is_cancelled() {
                log::info!("cancelled, stopping walk");
                return;
            }
            let md = match fs::metadata(source) {
                Ok(md) => md,
                Err(err) => {
                    self.ctx.report_failure(&CopyError::io("stat", source, err));
                    continue;
                }
            };

            if md.is_file() {
                if !self.ensure_dir(dest_root, None) {
                    continue;
                }
                let Some(name) = source.file_name() else {
                    continue;
                };
                schedule_copy(self.ctx, self.copy_pool, source, &md, dest_root.join(name));
            } else if md.is_dir() {
                let target = match source.file_name() {
                    Some(name) if self.ctx.config.create_source_folder_under_target && !flat => {
                        if !self.ensure_dir(dest_root, None) {
                            continue;
                        }
                        dest_root.join(name)
                    }
                    _ => dest_root.to_path_buf(),
                };
                self.walk_dir(source, &target);
            }
        }
    }

    fn walk_dir(&mut self, dir: &Path, target_dir: &Path) {
        let ctx = self.ctx;
        let config = &ctx.config;
        let children = match list_children(dir) {
            Ok(children) => children,
            Err(err) => {
                ctx.report_failure(&CopyError::io("read_dir", dir, err));
                return;
            }
        };
        if children.is_empty() && config.skip_empty_dirs {
            log::debug!("skipping empty directory {}", dir.display());
            return;
        }

        let dir_mtime = fs::metadata(dir)
            .map(|md| filetime_to_ms(FileTime::from_last_modification_time(&md)))
            .ok();
        if !self.ensure_dir(target_dir, dir_mtime) {
            return;
        }
        ctx.verbose(&format!("copying files under {}", dir.display()));

        let qualified = config.package_small_files
            && DirectoryStat::scan(dir, config.packaging_threshold).qualifies(&config.packaging_policy);
        if qualified {
            let task = PackageTask::new(dir, target_dir);
            let ctx = Arc::clone(ctx);
            let copy_pool = Arc::clone(self.copy_pool);
            self.package_pool.submit(move || task.run(&ctx, &copy_pool));
        }

        let mut subdirs = Vec::new();
        for name in children {
            if ctx.is_cancelled() {
                log::info!("cancelled, stopping walk");
                return;
            }
            if is_reserved_name(&name) {
                continue;
            }
            let path = dir.join(&name);
            let md = match fs::metadata(&path) {
                Ok(md) => md,
                Err(err) => {
                    ctx.report_failure(&CopyError::io("stat", &path, err));
                    continue;
                }
            };
            if md.is_dir() {
                subdirs.push(name);
            } else if md.is_file() {
                if qualified && md.len() <= config.packaging_threshold {
                    continue;
                }
                schedule_copy(ctx, self.copy_pool, &path, &md, target_dir.join(&name));
            }
        }

        for name in subdirs {
            if ctx.is_cancelled() {
                log::info!("cancelled, stopping walk");
                return;
            }
            let child_target = if config.flat_copy {
                target_dir.to_path_buf()
            } else {
                target_dir.join(&name)
            };
            self.walk_dir(&dir.join(&name), &child_target);
        }
    }

    /// Idempotent create. Returns false when the directory cannot be made, in
    /// which case everything below it is abandoned.
    fn ensure_dir(&mut self, path: &Path, source_modified_ms: Option<i64>) -> bool {
        if path.is_dir() {
            return true;
        }
        if let Err(err) = fs::create_dir_all(path) {
            if categorize_io_error(&err) != ErrorCategory::AlreadyExists || !path.is_dir() {
                self.ctx.report_failure(&CopyError::DirectoryCreate {
                    path: path.to_path_buf(),
                    source: err,
                });
                return false;
            }
            return true;
        }
        self.ctx.stats.increment_dir_count();
        let preserve = self.ctx.config.preserve_times_and_permissions;
        if let Some(ms) = source_modified_ms.filter(|_| preserve) {
            self.created_dirs.push(CreatedDir {
                path: path.to_path_buf(),
                source_modified_ms: ms,
            });
        }
        true
    }
}

/// Child names sorted for a stable walk order.
fn list_children(dir: &Path) -> io::Result<Vec<OsString>> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}
