use serde::Serialize;

use crate::copy::{BucketSummary, FileCopyStatistics};

/// Summary of one copy run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub files_copied: u64,
    pub dirs_created: u64,
    pub total_bytes: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub buckets: Vec<BucketSummary>,
}

impl RunSummary {
    pub fn from_stats(stats: &FileCopyStatistics, cancelled: bool, elapsed_ms: u64) -> Self {
        Self {
            files_copied: stats.files_copied(),
            dirs_created: stats.dirs_created(),
            total_bytes: stats.total_bytes(),
            files_failed: stats.files_failed(),
            files_skipped: stats.files_skipped(),
            cancelled,
            elapsed_ms,
            buckets: stats.bucket_summaries(),
        }
    }

    /// Overall throughput in bytes per second; zero for an instant run.
    pub fn bytes_per_sec(&self) -> u64 {
        if self.elapsed_ms == 0 {
            0
        } else {
            self.total_bytes.saturating_mul(1000) / self.elapsed_ms
        }
    }
}
