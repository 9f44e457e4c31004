use std::sync::Arc;

use crate::cancel::CancellationFlag;
use crate::config::RunConfig;
use crate::copy::FileCopyStatistics;
use crate::reporter::{LogReporter, Reporter};

/// Everything a task needs while it runs. Shared behind an `Arc` by the
/// walker, both pools and every task; only `stats` and `cancel` are mutated
/// concurrently and both are atomic.
pub struct EngineContext {
    pub config: RunConfig,
    pub stats: Arc<FileCopyStatistics>,
    pub cancel: CancellationFlag,
    pub reporter: Arc<dyn Reporter>,
}

impl EngineContext {
    pub fn new(config: RunConfig, cancel: CancellationFlag, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config,
            stats: Arc::new(FileCopyStatistics::new()),
            cancel,
            reporter,
        }
    }

    /// Context with a fresh flag that logs through the `log` facade.
    pub fn with_config(config: RunConfig) -> Self {
        Self::new(config, CancellationFlag::new(), Arc::new(LogReporter))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Route a failure to the reporter and count it.
    pub(crate) fn report_failure(&self, err: &crate::errors::CopyError) {
        self.stats.increment_failed();
        self.reporter
            .error(err.op(), err.path(), &err.to_string());
    }

    pub(crate) fn verbose(&self, msg: &str) {
        if self.config.verbose {
            self.reporter.log(log::Level::Info, msg);
        } else {
            log::debug!("{msg}");
        }
    }
}
