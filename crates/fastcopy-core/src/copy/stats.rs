//! Lock-free run statistics.
//!
//! Every counter is its own atomic; there is no cross-field transaction, so a
//! reader racing the workers may see `files_copied` and `total_bytes` from
//! slightly different moments. Read the summary once the pools have drained.
//!
//! Counting rules:
//! - a bucket's `file_count` counts transfer *attempts* whose bytes were fully
//!   written, whether or not verification later passed;
//! - bucket bytes/time and every global counter count *successes* only.

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Bucket ceilings in ascending order; `None` is the unbounded tail.
pub const BUCKET_CEILINGS: [Option<u64>; 5] = [
    Some(4 * KIB),
    Some(MIB),
    Some(100 * MIB),
    Some(500 * MIB),
    None,
];

const BUCKET_NAMES: [&str; 5] = ["<4K", "4K-1M", "1M-100M", "100M-500M", "500M+"];

/// Index of the bucket a file of `size` bytes belongs to: the first bucket
/// whose ceiling strictly exceeds `size`, else the last one.
pub fn bucket_index_for(size: u64) -> usize {
    BUCKET_CEILINGS
        .iter()
        .position(|ceiling| ceiling.is_some_and(|c| size < c))
        .unwrap_or(BUCKET_CEILINGS.len() - 1)
}

#[derive(Debug)]
pub struct SizeBucket {
    name: &'static str,
    ceiling: Option<u64>,
    total_bytes: AtomicU64,
    total_time_ms: AtomicU64,
    file_count: AtomicU64,
    min_bytes_per_sec: AtomicU64,
    max_bytes_per_sec: AtomicU64,
}

impl SizeBucket {
    fn new(name: &'static str, ceiling: Option<u64>) -> Self {
        Self {
            name,
            ceiling,
            total_bytes: AtomicU64::new(0),
            total_time_ms: AtomicU64::new(0),
            file_count: AtomicU64::new(0),
            min_bytes_per_sec: AtomicU64::new(u64::MAX),
            max_bytes_per_sec: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ceiling(&self) -> Option<u64> {
        self.ceiling
    }

    pub fn increment_file_count(&self) {
        self.file_count.fetch_add(1, Relaxed);
    }

    fn add_sample(&self, bytes: u64, elapsed_ms: u64) {
        self.total_bytes.fetch_add(bytes, Relaxed);
        self.total_time_ms.fetch_add(elapsed_ms, Relaxed);
        if bytes == 0 {
            return;
        }
        let speed = bytes.saturating_mul(1000) / elapsed_ms.max(1);
        self.min_bytes_per_sec.fetch_min(speed, Relaxed);
        self.max_bytes_per_sec.fetch_max(speed, Relaxed);
    }

    pub fn file_count(&self) -> u64 {
        self.file_count.load(Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Relaxed)
    }

    pub fn total_time_ms(&self) -> u64 {
        self.total_time_ms.load(Relaxed)
    }

    pub fn min_bytes_per_sec(&self) -> u64 {
        match self.min_bytes_per_sec.load(Relaxed) {
            u64::MAX => 0,
            v => v,
        }
    }

    pub fn max_bytes_per_sec(&self) -> u64 {
        self.max_bytes_per_sec.load(Relaxed)
    }

    pub fn avg_bytes_per_sec(&self) -> u64 {
        let bytes = self.total_bytes();
        if bytes == 0 {
            return 0;
        }
        bytes.saturating_mul(1000) / self.total_time_ms().max(1)
    }

    fn summary(&self) -> BucketSummary {
        BucketSummary {
            name: self.name.to_string(),
            ceiling: self.ceiling,
            file_count: self.file_count(),
            total_bytes: self.total_bytes(),
            total_time_ms: self.total_time_ms(),
            min_bytes_per_sec: self.min_bytes_per_sec(),
            max_bytes_per_sec: self.max_bytes_per_sec(),
            avg_bytes_per_sec: self.avg_bytes_per_sec(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub ceiling: Option<u64>,
    pub file_count: u64,
    pub total_bytes: u64,
    pub total_time_ms: u64,
    pub min_bytes_per_sec: u64,
    pub max_bytes_per_sec: u64,
    pub avg_bytes_per_sec: u64,
}

/// Process-wide counters for one run.
#[derive(Debug)]
pub struct FileCopyStatistics {
    files_copied: AtomicU64,
    dirs_created: AtomicU64,
    total_bytes: AtomicU64,
    total_time_ms: AtomicU64,
    files_failed: AtomicU64,
    files_skipped: AtomicU64,
    buckets: Vec<SizeBucket>,
}

impl Default for FileCopyStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl FileCopyStatistics {
    pub fn new() -> Self {
        Self {
            files_copied: AtomicU64::new(0),
            dirs_created: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            total_time_ms: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            buckets: BUCKET_NAMES
                .into_iter()
                .zip(BUCKET_CEILINGS)
                .map(|(name, ceiling)| SizeBucket::new(name, ceiling))
                .collect(),
        }
    }

    pub fn buckets(&self) -> &[SizeBucket] {
        &self.buckets
    }

    pub fn bucket_for(&self, size: u64) -> &SizeBucket {
        &self.buckets[bucket_index_for(size)]
    }

    /// Bytes of a file were fully transferred; counts toward its bucket
    /// whatever verification says next.
    pub fn record_attempt(&self, size: u64) {
        self.bucket_for(size).increment_file_count();
    }

    pub fn add_to_total_file_size_and_time(&self, size: u64, elapsed_ms: u64) {
        self.total_bytes.fetch_add(size, Relaxed);
        self.total_time_ms.fetch_add(elapsed_ms, Relaxed);
        self.bucket_for(size).add_sample(size, elapsed_ms);
    }

    pub fn increment_file_count(&self) {
        self.files_copied.fetch_add(1, Relaxed);
    }

    pub fn increment_dir_count(&self) {
        self.dirs_created.fetch_add(1, Relaxed);
    }

    pub fn increment_failed(&self) {
        self.files_failed.fetch_add(1, Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.files_skipped.fetch_add(1, Relaxed);
    }

    /// Convenience for the success path: totals, bucket sample, file count.
    pub fn record_success(&self, size: u64, elapsed_ms: u64) {
        self.add_to_total_file_size_and_time(size, elapsed_ms);
        self.increment_file_count();
    }

    pub fn files_copied(&self) -> u64 {
        self.files_copied.load(Relaxed)
    }

    pub fn dirs_created(&self) -> u64 {
        self.dirs_created.load(Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Relaxed)
    }

    pub fn total_time_ms(&self) -> u64 {
        self.total_time_ms.load(Relaxed)
    }

    pub fn files_failed(&self) -> u64 {
        self.files_failed.load(Relaxed)
    }

    pub fn files_skipped(&self) -> u64 {
        self.files_skipped.load(Relaxed)
    }

    pub fn bucket_summaries(&self) -> Vec<BucketSummary> {
        self.buckets.iter().map(SizeBucket::summary).collect()
    }

    /// End-of-run per-bucket speed table plus totals.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        for bucket in &self.buckets {
            let _ = writeln!(
                out,
                "Files {}: {} file(s), Min Speed: {:.2} KB/s, Max Speed: {:.2} KB/s, Avg Speed: {:.2} KB/s",
                bucket.name,
                bucket.file_count(),
                bucket.min_bytes_per_sec() as f64 / 1024.0,
                bucket.max_bytes_per_sec() as f64 / 1024.0,
                bucket.avg_bytes_per_sec() as f64 / 1024.0,
            );
        }
        let _ = writeln!(
            out,
            "Dirs created: {}, Files copied: {}, Failed: {}, Skipped: {}",
            self.dirs_created(),
            self.files_copied(),
            self.files_failed(),
            self.files_skipped()
        );
        let _ = write!(
            out,
            "Total size: {:.2} MB",
            self.total_bytes() as f64 / MIB as f64
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn bucket_boundaries_are_exclusive_ceilings() {
        assert_eq!(bucket_index_for(0), 0);
        assert_eq!(bucket_index_for(4095), 0);
        assert_eq!(bucket_index_for(4096), 1);
        assert_eq!(bucket_index_for(MIB - 1), 1);
        assert_eq!(bucket_index_for(MIB), 2);
        assert_eq!(bucket_index_for(100 * MIB), 3);
        assert_eq!(bucket_index_for(500 * MIB - 1), 3);
        assert_eq!(bucket_index_for(500 * MIB), 4);
        assert_eq!(bucket_index_for(u64::MAX), 4);
    }

    #[test]
    fn every_size_selects_exactly_one_bucket() {
        let probes = [0, 1, 4095, 4096, 4097, MIB, 3 * MIB, 499 * MIB, 501 * MIB];
        for size in probes {
            let idx = bucket_index_for(size);
            let matching: Vec<usize> = BUCKET_CEILINGS
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_some_and(|c| size < c))
                .map(|(i, _)| i)
                .collect();
            match matching.first() {
                Some(first) => assert_eq!(idx, *first, "size {size}"),
                None => assert_eq!(idx, BUCKET_CEILINGS.len() - 1),
            }
        }
    }

    #[test]
    fn attempts_and_successes_are_tracked_separately() {
        let stats = FileCopyStatistics::new();
        stats.record_attempt(100);
        stats.record_attempt(100);
        stats.record_success(100, 2);

        let bucket = stats.bucket_for(100);
        assert_eq!(bucket.file_count(), 2);
        assert_eq!(bucket.total_bytes(), 100);
        assert_eq!(stats.files_copied(), 1);
        assert_eq!(stats.total_bytes(), 100);
    }

    #[test]
    fn speed_extremes_follow_samples() {
        let stats = FileCopyStatistics::new();
        stats.add_to_total_file_size_and_time(2 * MIB, 1000);
        stats.add_to_total_file_size_and_time(2 * MIB, 500);
        let bucket = stats.bucket_for(2 * MIB);
        assert_eq!(bucket.min_bytes_per_sec(), 2 * MIB);
        assert_eq!(bucket.max_bytes_per_sec(), 4 * MIB);
        assert_eq!(stats.bucket_for(10).min_bytes_per_sec(), 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(FileCopyStatistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_attempt(10);
                        stats.record_success(10, 1);
                        stats.increment_dir_count();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.files_copied(), 8000);
        assert_eq!(stats.total_bytes(), 80_000);
        assert_eq!(stats.dirs_created(), 8000);
        assert_eq!(stats.bucket_for(10).file_count(), 8000);
    }

    #[test]
    fn report_lists_every_bucket() {
        let stats = FileCopyStatistics::new();
        let report = stats.render_report();
        for name in BUCKET_NAMES {
            assert!(report.contains(&format!("Files {name}:")));
        }
        assert!(report.contains("Files copied: 0"));
    }
}
