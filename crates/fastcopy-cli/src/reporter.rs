//! Terminal front end for the engine's `Reporter` capability.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use fastcopy_core::{Decision, FileCopyStatistics, Reporter};
use indicatif::{ProgressBar, ProgressStyle};
use log::Level;

use crate::summary::format_bytes;

pub struct ConsoleReporter {
    spinner: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new(progress: bool) -> Self {
        let spinner = progress.then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                pb.set_style(style.tick_strings(&["-", "\\", "|", "/"]));
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        Self { spinner }
    }

    pub fn set_message(&self, msg: String) {
        if let Some(pb) = &self.spinner {
            pb.set_message(msg);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
    }
}

impl Reporter for ConsoleReporter {
    fn log(&self, level: Level, msg: &str) {
        match &self.spinner {
            Some(pb) => pb.suspend(|| log::log!(level, "{msg}")),
            None => log::log!(level, "{msg}"),
        }
    }

    fn confirm(&self, question: &str) -> Decision {
        let prompt = || -> io::Result<String> {
            print!("{question} [y/N/a/q]: ");
            io::stdout().flush()?;
            let mut input = String::new();
            io::stdin().lock().read_line(&mut input)?;
            Ok(input)
        };
        let answer = match &self.spinner {
            Some(pb) => pb.suspend(prompt),
            None => prompt(),
        };
        match answer {
            Ok(input) => parse_decision(&input),
            Err(err) => {
                log::warn!("could not read answer: {err}");
                Decision::No
            }
        }
    }

    fn report_progress(&self, percent: u8, stats: &FileCopyStatistics) {
        self.set_message(format!(
            "{percent:>3}% | {} file(s), {} copied",
            stats.files_copied(),
            format_bytes(stats.total_bytes())
        ));
    }

    fn error(&self, op: &str, path: &Path, msg: &str) {
        self.log(Level::Error, &format!("{op} failed for {}: {msg}", path.display()));
    }
}

fn parse_decision(input: &str) -> Decision {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::Yes,
        "a" | "all" => Decision::YesToAll,
        "q" | "quit" => Decision::Quit,
        _ => Decision::No,
    }
}
