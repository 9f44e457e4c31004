use clap::Parser;
use fastcopy_core::config::DEFAULT_PACKAGING_WORKERS;
use fastcopy_core::{OverwritePolicy, RunConfig, DEFAULT_PACKAGING_THRESHOLD};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fastcopy",
    version,
    about = "Parallel local copy that ships directories of small files as archives"
)]
pub struct Cli {
    /// Source files or directories. A semicolon-joined list is also accepted.
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,
    /// Destination directory
    pub destination: PathBuf,
    /// Log every copied file and directory
    #[arg(short, long)]
    pub verbose: bool,
    /// Worker threads in the copy pool
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Replace existing targets unconditionally
    #[arg(long)]
    pub overwrite: bool,
    /// Replace existing targets when the source is newer or the size differs
    #[arg(long)]
    pub overwrite_if_newer: bool,
    /// Put every file directly under the destination
    #[arg(long)]
    pub flat: bool,
    /// Recreate each source directory by name under the destination
    #[arg(long)]
    pub create_source_folder: bool,
    /// Copy small files one by one instead of packaging them
    #[arg(long)]
    pub no_package: bool,
    /// Worker threads in the packaging pool
    #[arg(long, default_value_t = DEFAULT_PACKAGING_WORKERS)]
    pub package_threads: usize,
    /// Files at or below this size (bytes) are candidates for packaging
    #[arg(long, default_value_t = DEFAULT_PACKAGING_THRESHOLD)]
    pub package_threshold: u64,
    /// Check every target against an MD5 digest of its source
    #[arg(long)]
    pub verify: bool,
    /// Carry timestamps and permission bits over to the targets
    #[arg(long)]
    pub preserve: bool,
    /// Do not create target directories for empty source directories
    #[arg(long)]
    pub skip_empty_dirs: bool,
    /// Start without asking for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
    /// Show a spinner with live progress
    #[arg(long)]
    pub progress: bool,
    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn into_config(self) -> RunConfig {
        let sources = self
            .sources
            .iter()
            .flat_map(|joined| RunConfig::split_sources(joined))
            .collect();
        RunConfig {
            verbose: self.verbose,
            workers: self.threads,
            packaging_workers: self.package_threads,
            overwrite: OverwritePolicy::from_flags(self.overwrite, self.overwrite_if_newer),
            flat_copy: self.flat,
            create_source_folder_under_target: self.create_source_folder,
            package_small_files: !self.no_package,
            packaging_threshold: self.package_threshold,
            verify_after_copy: self.verify,
            preserve_times_and_permissions: self.preserve,
            skip_empty_dirs: self.skip_empty_dirs,
            ..RunConfig::new(sources, self.destination)
        }
    }
}
