mod cli;
mod reporter;
mod summary;

use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use eyre::{Context, Result};
use fastcopy_core::{CancellationFlag, FastCopy, Reporter};
use reporter::ConsoleReporter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let skip_prompt = cli.yes;
    let progress = cli.progress;
    let json = cli.json;
    let config = cli.into_config();
    config.validate()?;
    let verbose = config.verbose;

    if !skip_prompt {
        let question = format!(
            "Copy {} source(s) to {}?",
            config.sources.len(),
            config.destination.display()
        );
        if !ConsoleReporter::new(false).confirm(&question).proceeds() {
            log::info!("nothing copied");
            return Ok(());
        }
    }

    let reporter = Arc::new(ConsoleReporter::new(progress));
    reporter.set_message(format!("Copying to {}", config.destination.display()));

    let cancel = CancellationFlag::new();
    let engine = FastCopy::new(config, reporter.clone(), cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, finishing in-flight files");
            cancel.cancel();
        }
    });

    let run = tokio::task::spawn_blocking(move || {
        engine.run().with_context(|| {
            format!(
                "failed to copy into {}",
                engine.config().destination.display()
            )
        })
    })
    .await;
    reporter.finish();
    let summary = run??;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary::render_summary(&summary, verbose));
    }
    if summary.files_failed > 0 {
        log::warn!("{} file(s) could not be copied", summary.files_failed);
    }
    Ok(())
}
