//! Single-file transfer: fast path for small files, streamed path with
//! cancellation and progress for everything else, optional MD5 verification.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::compare::should_copy;
use crate::checksum::{self, DigestReader, DigestWriter};
use crate::context::EngineContext;
use crate::errors::{CopyError, CopyResult};
use crate::fs_capability::{self, get_platform_capability, FilesystemCapability};
use crate::package::{self, PackageDescriptor};
use crate::worker_pool::WorkerPool;

/// Chunk size of the streamed path.
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// How a single transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied { bytes: u64 },
    Cancelled,
    VerificationFailed,
    Failed,
}

/// One unit of work for the copy pool. When `package` is set, `source` is a
/// packaging archive and the task unpacks it at the target before finishing.
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub source: PathBuf,
    pub target: PathBuf,
    pub package: Option<PackageDescriptor>,
}

impl CopyTask {
    pub fn file(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            package: None,
        }
    }

    pub fn archive(descriptor: PackageDescriptor) -> Self {
        let target = descriptor.target_dir.join(&descriptor.transport_name);
        Self {
            source: descriptor.archive_path.clone(),
            target,
            package: Some(descriptor),
        }
    }

    pub fn run(self, ctx: &EngineContext) -> CopyOutcome {
        SingleFileCopier::new(ctx).copy(&self.source, &self.target, self.package.as_ref())
    }
}

/// Apply the overwrite policy to one file and queue its copy on `pool` when
/// the target should be written. Returns whether a task was queued.
pub fn schedule_copy(
    ctx: &Arc<EngineContext>,
    pool: &WorkerPool,
    source: &Path,
    src_meta: &Metadata,
    target: PathBuf,
) -> bool {
    match should_copy(src_meta, &target, ctx.config.overwrite) {
        Ok(true) => {}
        Ok(false) => {
            ctx.stats.increment_skipped();
            ctx.verbose(&format!("skipping existing {}", target.display()));
            return false;
        }
        Err(err) => {
            ctx.report_failure(&CopyError::io("stat", &target, err));
            return false;
        }
    }
    let task = CopyTask::file(source, target);
    let task_ctx = Arc::clone(ctx);
    pool.submit(move || {
        task.run(&task_ctx);
    })
}

/// Suffix of the sibling file a transfer writes before it is renamed over
/// the target.
const PARTIAL_FILE_SUFFIX: &str = "fastcopy.partial";

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Owns the partial file of one transfer. Deletes it on drop unless
/// `commit()` renamed it onto the target, so an existing target is only
/// replaced by a complete, verified copy.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn for_target(target: &Path) -> Self {
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut path = target.as_os_str().to_owned();
        path.push(format!(".{seq}.{PARTIAL_FILE_SUFFIX}"));
        Self {
            path: PathBuf::from(path),
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self, target: &Path) -> CopyResult<()> {
        #[cfg(windows)]
        {
            let _ = fs::remove_file(target);
        }
        fs::rename(&self.path, target).map_err(|e| CopyError::io("rename", target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

enum Pumped {
    Done,
    Cancelled,
}

pub struct SingleFileCopier<'a> {
    ctx: &'a EngineContext,
    /// Runs on the written bytes right before verification.
    #[cfg(test)]
    before_verify: Option<fn(&Path)>,
}

impl<'a> SingleFileCopier<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self {
            ctx,
            #[cfg(test)]
            before_verify: None,
        }
    }

    /// Copy `source` to `target`. Never returns an error: failures are routed
    /// to the reporter and counted. An attached package descriptor is
    /// unpacked once its archive has landed, and both archive copies are
    /// removed whatever happened.
    pub fn copy(&self, source: &Path, target: &Path, package: Option<&PackageDescriptor>) -> CopyOutcome {
        let outcome = if self.ctx.is_cancelled() {
            CopyOutcome::Cancelled
        } else if let Some(err) = package.and_then(|d| prepare_target_dir(&d.target_dir).err()) {
            self.ctx.report_failure(&err);
            CopyOutcome::Failed
        } else {
            match self.transfer(source, target, package.is_some()) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.ctx.report_failure(&err);
                    match err {
                        CopyError::VerificationMismatch { .. } => CopyOutcome::VerificationFailed,
                        _ => CopyOutcome::Failed,
                    }
                }
            }
        };

        if let Some(descriptor) = package {
            self.finish_package(descriptor, target, outcome);
        }
        outcome
    }

    fn transfer(&self, source: &Path, target: &Path, is_transport: bool) -> CopyResult<CopyOutcome> {
        let src_meta = fs::metadata(source).map_err(|e| CopyError::io("stat", source, e))?;
        let size = src_meta.len();
        let verify = self.ctx.config.verify_after_copy;
        let started = Instant::now();

        let partial = PartialFile::for_target(target);
        let expected = if size < self.ctx.config.packaging_threshold {
            get_platform_capability()
                .fast_copy(source, partial.path())
                .map_err(|e| CopyError::io("copy", source, into_io(e)))?;
            if verify {
                Some(hash(source)?)
            } else {
                None
            }
        } else {
            match self.stream(source, partial.path(), size, verify)? {
                Some(digest) => digest,
                None => {
                    log::debug!("cancelled mid-copy: {}", source.display());
                    return Ok(CopyOutcome::Cancelled);
                }
            }
        };

        if !is_transport {
            self.ctx.stats.record_attempt(size);
        }
        #[cfg(test)]
        if let Some(hook) = self.before_verify {
            hook(partial.path());
        }
        if let Some(expected) = expected {
            verify_target(&expected, partial.path())?;
        }
        partial.commit(target)?;

        if !is_transport {
            // `src_meta` predates the read, which may have bumped the source atime.
            if self.ctx.config.preserve_times_and_permissions {
                if let Err(err) = fs_capability::preserve_metadata(&src_meta, target) {
                    log::warn!("metadata not preserved on {}: {err:#}", target.display());
                }
            }
            let elapsed_ms = started.elapsed().as_millis() as u64;
            self.ctx.stats.record_success(size, elapsed_ms);
            self.ctx
                .verbose(&format!("copied {} -> {}", source.display(), target.display()));
        }
        Ok(CopyOutcome::Copied { bytes: size })
    }

    /// Streamed transfer. `Ok(None)` means the run was cancelled part way;
    /// otherwise the inner option carries the source digest when verifying.
    fn stream(
        &self,
        source: &Path,
        target: &Path,
        size: u64,
        verify: bool,
    ) -> CopyResult<Option<Option<md5::Digest>>> {
        let input = File::open(source).map_err(|e| CopyError::io("open", source, e))?;
        let output = File::create(target).map_err(|e| CopyError::io("create", target, e))?;

        if !verify {
            let (mut input, mut output) = (input, output);
            return match self.pump(&mut input, &mut output, source, target, size)? {
                Pumped::Done => {
                    output.flush().map_err(|e| CopyError::io("write", target, e))?;
                    Ok(Some(None))
                }
                Pumped::Cancelled => Ok(None),
            };
        }

        let mut reader = DigestReader::new(input);
        let mut writer = DigestWriter::new(output);
        match self.pump(&mut reader, &mut writer, source, target, size)? {
            Pumped::Done => {
                let (_, written) = writer
                    .finish()
                    .map_err(|e| CopyError::io("write", target, e))?;
                let read = reader.finish();
                if read != written {
                    return Err(CopyError::VerificationMismatch {
                        path: target.to_path_buf(),
                        expected: checksum::to_hex(&read),
                        actual: checksum::to_hex(&written),
                    });
                }
                Ok(Some(Some(read)))
            }
            Pumped::Cancelled => Ok(None),
        }
    }

    fn pump<R: Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
        source: &Path,
        target: &Path,
        size: u64,
    ) -> CopyResult<Pumped> {
        let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
        let mut copied = 0u64;
        let mut last_percent = None;
        loop {
            if self.ctx.is_cancelled() {
                return Ok(Pumped::Cancelled);
            }
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CopyError::io("read", source, e)),
            };
            writer
                .write_all(&buf[..n])
                .map_err(|e| CopyError::io("write", target, e))?;
            copied += n as u64;

            let percent = if size == 0 {
                100
            } else {
                (copied.min(size) * 100 / size) as u8
            };
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                self.ctx.reporter.report_progress(percent, &self.ctx.stats);
            }
        }
        Ok(Pumped::Done)
    }

    fn finish_package(&self, descriptor: &PackageDescriptor, target_archive: &Path, outcome: CopyOutcome) {
        if let Err(err) = fs::remove_file(&descriptor.archive_path) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    "could not remove source archive {}: {err}",
                    descriptor.archive_path.display()
                );
            }
        }
        // Creating and removing the archive bumped the source directory's mtime.
        if let Some(source_dir) = descriptor.archive_path.parent() {
            if let Err(err) = fs_capability::set_modified_ms(source_dir, descriptor.source_dir_modified_ms) {
                log::debug!("{err:#}");
            }
        }

        if let CopyOutcome::Copied { .. } = outcome {
            match package::unpack_archive(self.ctx, target_archive, &descriptor.target_dir) {
                Ok(entries) => log::debug!(
                    "unpacked {entries} entries from {} into {}",
                    descriptor.archive_name,
                    descriptor.target_dir.display()
                ),
                Err(err) => {
                    self.ctx.stats.increment_failed();
                    self.ctx.reporter.error(
                        "unpack",
                        target_archive,
                        &format!("{err:#}"),
                    );
                }
            }
        }

        let _ = fs::remove_file(target_archive);
    }
}

fn prepare_target_dir(dir: &Path) -> CopyResult<()> {
    fs::create_dir_all(dir).map_err(|source| CopyError::DirectoryCreate {
        path: dir.to_path_buf(),
        source,
    })
}

fn hash(path: &Path) -> CopyResult<md5::Digest> {
    checksum::hash_file(path).map_err(|e| CopyError::io("hash", path, into_io(e)))
}

/// Recompute the digest of what landed on disk and compare.
fn verify_target(expected: &md5::Digest, target: &Path) -> CopyResult<()> {
    let actual = hash(target)?;
    if &actual != expected {
        return Err(CopyError::VerificationMismatch {
            path: target.to_path_buf(),
            expected: checksum::to_hex(expected),
            actual: checksum::to_hex(&actual),
        });
    }
    Ok(())
}

fn into_io(err: eyre::Report) -> io::Error {
    match err.downcast::<io::Error>() {
        Ok(io) => io,
        Err(other) => io::Error::other(format!("{other:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::reporter::Reporter;
    use crate::CancellationFlag;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingReporter {
        errors: Mutex<Vec<String>>,
        progress: Mutex<Vec<u8>>,
    }

    impl Reporter for RecordingReporter {
        fn log(&self, _level: log::Level, _msg: &str) {}

        fn confirm(&self, _question: &str) -> crate::Decision {
            crate::Decision::Yes
        }

        fn report_progress(&self, percent: u8, _stats: &crate::FileCopyStatistics) {
            self.progress.lock().push(percent);
        }

        fn error(&self, op: &str, path: &Path, msg: &str) {
            self.errors.lock().push(format!("{op} {}: {msg}", path.display()));
        }
    }

    fn context(threshold: u64, verify: bool) -> (EngineContext, Arc<RecordingReporter>) {
        let mut config = RunConfig::new(vec![PathBuf::from("/unused")], "/unused");
        config.packaging_threshold = threshold;
        config.verify_after_copy = verify;
        let reporter = Arc::new(RecordingReporter::default());
        let ctx = EngineContext::new(config, CancellationFlag::new(), reporter.clone());
        (ctx, reporter)
    }

    #[test]
    fn fast_path_copies_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"hello").unwrap();

        let (ctx, _) = context(1024, true);
        let outcome = CopyTask::file(&src, &dst).run(&ctx);
        assert_eq!(outcome, CopyOutcome::Copied { bytes: 5 });
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
        assert_eq!(ctx.stats.files_copied(), 1);
        assert_eq!(ctx.stats.total_bytes(), 5);
    }

    #[test]
    fn streamed_path_reports_progress_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.bin");
        let dst = dir.path().join("copy.bin");
        let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
        fs::write(&src, &payload).unwrap();

        let (ctx, reporter) = context(1024, true);
        let outcome = CopyTask::file(&src, &dst).run(&ctx);
        assert_eq!(outcome, CopyOutcome::Copied { bytes: 300_000 });
        assert_eq!(fs::read(&dst).unwrap(), payload);

        let progress = reporter.progress.lock();
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn cancelled_stream_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.bin");
        let dst = dir.path().join("copy.bin");
        fs::write(&src, vec![7u8; 200_000]).unwrap();

        let (ctx, _) = context(1024, false);
        let copier = SingleFileCopier::new(&ctx);
        ctx.cancel.cancel();
        // Bypass the start-of-task check to exercise the in-loop poll.
        let outcome = copier.transfer(&src, &dst, false).unwrap();
        assert_eq!(outcome, CopyOutcome::Cancelled);
        assert!(!dst.exists());
        assert!(leftovers(dir.path()).is_empty());
        assert_eq!(ctx.stats.files_copied(), 0);
    }

    fn drop_last_byte(path: &Path) {
        let len = fs::metadata(path).unwrap().len();
        fs::OpenOptions::new()
            .write(true)
            .open(path)
            .unwrap()
            .set_len(len - 1)
            .unwrap();
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(PARTIAL_FILE_SUFFIX))
            .collect()
    }

    #[test]
    fn truncated_copy_fails_verification_and_is_removed() {
        // Fast path (threshold above the size) and streamed path.
        for threshold in [1_000_000, 1024] {
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("a.bin");
            let dst = dir.path().join("b.bin");
            fs::write(&src, vec![1u8; 4096]).unwrap();

            let (ctx, reporter) = context(threshold, true);
            let mut copier = SingleFileCopier::new(&ctx);
            copier.before_verify = Some(drop_last_byte);
            let outcome = copier.copy(&src, &dst, None);

            assert_eq!(outcome, CopyOutcome::VerificationFailed, "threshold {threshold}");
            assert!(!dst.exists());
            assert!(leftovers(dir.path()).is_empty());
            assert_eq!(ctx.stats.files_copied(), 0);
            assert_eq!(ctx.stats.total_bytes(), 0);
            assert_eq!(ctx.stats.files_failed(), 1);
            let attempts: u64 = ctx.stats.buckets().iter().map(|b| b.file_count()).sum();
            assert_eq!(attempts, 1);
            assert_eq!(ctx.stats.bucket_for(4096).file_count(), 1);
            assert_eq!(reporter.errors.lock().len(), 1);
        }
    }

    #[test]
    fn failed_copy_keeps_existing_target() {
        for threshold in [1_000_000, 1] {
            let dir = tempfile::tempdir().unwrap();
            // Passes the stat, cannot be read as a file.
            let src = dir.path().join("not_a_file");
            fs::create_dir(&src).unwrap();
            let dst = dir.path().join("existing.txt");
            fs::write(&dst, b"previous good copy").unwrap();

            let (ctx, _) = context(threshold, false);
            let outcome = CopyTask::file(&src, &dst).run(&ctx);

            assert_eq!(outcome, CopyOutcome::Failed, "threshold {threshold}");
            assert_eq!(fs::read(&dst).unwrap(), b"previous good copy");
            assert!(leftovers(dir.path()).is_empty());
            assert_eq!(ctx.stats.files_failed(), 1);
        }
    }

    #[test]
    fn successful_copy_replaces_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old contents").unwrap();

        let (ctx, _) = context(1024, true);
        assert_eq!(CopyTask::file(&src, &dst).run(&ctx), CopyOutcome::Copied { bytes: 3 });
        assert_eq!(fs::read(&dst).unwrap(), b"new");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn missing_source_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, reporter) = context(1024, false);
        let outcome = CopyTask::file(dir.path().join("nope"), dir.path().join("out")).run(&ctx);
        assert_eq!(outcome, CopyOutcome::Failed);
        assert_eq!(ctx.stats.files_failed(), 1);
        assert!(reporter.errors.lock()[0].starts_with("stat "));
    }
}
