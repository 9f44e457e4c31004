mod compare;
mod file_copy;
mod stats;

pub use compare::{should_copy, target_is_stale};
pub use file_copy::{schedule_copy, CopyOutcome, CopyTask, SingleFileCopier, STREAM_BUFFER_SIZE};
pub use stats::{bucket_index_for, BucketSummary, FileCopyStatistics, SizeBucket, BUCKET_CEILINGS};
