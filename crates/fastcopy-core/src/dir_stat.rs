//! Per-directory small-file census used to decide whether to package.

use std::fs;
use std::path::Path;

use crate::config::PackagingPolicy;
use crate::is_reserved_name;

/// Counts over the immediate children of one directory. Subdirectories are
/// not descended into; each is its own scheduling unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryStat {
    pub file_count: u64,
    pub total_size: u64,
    pub small_file_count: u64,
    pub total_small_file_size: u64,
    pub failed: bool,
    pub failure_message: Option<String>,
}

impl DirectoryStat {
    /// Scan `dir`. Never fails: an unreadable directory yields a stat with
    /// `failed` set, which never qualifies for packaging.
    pub fn scan(dir: &Path, size_threshold: u64) -> Self {
        let mut stat = Self::default();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                stat.fail(format!("read_dir {}: {err}", dir.display()));
                return stat;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    stat.fail(format!("read_dir {}: {err}", dir.display()));
                    continue;
                }
            };
            if is_reserved_name(&entry.file_name()) {
                continue;
            }
            // Follows symlinks, like the walker does.
            let md = match fs::metadata(entry.path()) {
                Ok(md) if md.is_file() => md,
                Ok(_) => continue,
                Err(err) => {
                    log::debug!("stat {}: {err}", entry.path().display());
                    continue;
                }
            };

            let size = md.len();
            stat.file_count += 1;
            stat.total_size += size;
            if size <= size_threshold {
                stat.small_file_count += 1;
                stat.total_small_file_size += size;
            }
        }
        stat
    }

    fn fail(&mut self, message: String) {
        log::warn!("{message}");
        self.failed = true;
        self.failure_message.get_or_insert(message);
    }

    pub fn qualifies(&self, policy: &PackagingPolicy) -> bool {
        !self.failed && policy.qualifies(self.small_file_count, self.total_small_file_size)
    }
}
