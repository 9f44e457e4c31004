pub mod cancel;
pub mod checksum;
pub mod config;
pub mod context;
pub mod copy;
pub mod dir_stat;
pub mod errors;
pub mod fs_capability;
pub mod metadata_codec;
pub mod orchestrator;
pub mod package;
pub mod reporter;
pub mod worker_pool;

pub use cancel::CancellationFlag;
pub use config::{OverwritePolicy, PackagingPolicy, RunConfig};
pub use context::EngineContext;
pub use copy::FileCopyStatistics;
pub use orchestrator::{FastCopy, RunSummary};
pub use reporter::{Decision, LogReporter, NoopReporter, Reporter};

/// Files whose name starts with this prefix are transient packaging archives
/// and are never copied, packaged or counted as regular files.
pub const RESERVED_ARCHIVE_PREFIX: &str = "_fastcopy_auto_create_";

/// Default size (bytes) at or below which a file counts as small.
pub const DEFAULT_PACKAGING_THRESHOLD: u64 = 20_000;

/// Returns true when `name` belongs to a packaging archive.
pub fn is_reserved_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with(RESERVED_ARCHIVE_PREFIX)
}
