//! Capability interface between the engine and whatever front end drives it.

use log::Level;
use std::path::Path;

use crate::copy::FileCopyStatistics;

/// Answer to a yes/no style question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
    YesToAll,
    Quit,
}

impl Decision {
    pub fn proceeds(self) -> bool {
        matches!(self, Self::Yes | Self::YesToAll)
    }
}

/// Everything the engine needs from a UI. Implementations must be cheap to
/// call from any worker thread.
pub trait Reporter: Send + Sync {
    fn log(&self, level: Level, msg: &str);

    fn confirm(&self, question: &str) -> Decision;

    /// `percent` is the completion of the file currently being streamed.
    fn report_progress(&self, percent: u8, stats: &FileCopyStatistics);

    fn error(&self, op: &str, path: &Path, msg: &str) {
        self.log(Level::Error, &format!("{op} {}: {msg}", path.display()));
    }
}

/// Forwards everything to the `log` facade and answers every question with yes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn log(&self, level: Level, msg: &str) {
        log::log!(level, "{msg}");
    }

    fn confirm(&self, question: &str) -> Decision {
        log::debug!("auto-confirming: {question}");
        Decision::Yes
    }

    fn report_progress(&self, percent: u8, stats: &FileCopyStatistics) {
        log::trace!(
            "progress {percent}% ({} files, {} bytes so far)",
            stats.files_copied(),
            stats.total_bytes()
        );
    }
}

pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn log(&self, _level: Level, _msg: &str) {}

    fn confirm(&self, _question: &str) -> Decision {
        Decision::Yes
    }

    fn report_progress(&self, _percent: u8, _stats: &FileCopyStatistics) {}
}
