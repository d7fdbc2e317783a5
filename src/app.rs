//! Glue between the command line and the pipeline.

use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::config::{Config, RunPaths};
use crate::error::ExitCode;
use crate::index::FileIndex;
use crate::logging::init_logging;
use crate::output::JsonOutput;
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::progress::{Progress, ProgressObserver, SilentObserver};
use crate::signal::{install_handler, ShutdownHandler};

/// Run one invocation and return the exit code to use.
///
/// The index connection is closed before this returns, on success and on
/// failure alike.
///
/// # Errors
///
/// Returns an error for an unusable target directory
/// ([`ConfigError`](crate::config::ConfigError)), an index failure, or an
/// interrupted scan ([`PipelineError`](crate::pipeline::PipelineError)).
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let overrides = cli.config_overrides();
    let config = match &cli.config {
        Some(file) => Config::load_from(file, &overrides)?,
        None => Config::load_with_overrides(&overrides),
    };
    log::debug!("Effective configuration: {:?}", config);

    let paths = RunPaths::derive(&cli.target, cli.name.as_deref(), &config.duplicates_suffix)?;

    if cli.fresh {
        FileIndex::remove_store(&paths.index_path)
            .context("Failed to remove the previous index")?;
        log::info!("Removed previous index {}", paths.index_path.display());
    }

    let shutdown = install_handler().unwrap_or_else(|e| {
        log::warn!("{}; Ctrl+C will terminate immediately", e);
        ShutdownHandler::new()
    });

    let observer: Box<dyn ProgressObserver> = if cli.show_progress() {
        Box::new(Progress::new(false))
    } else {
        Box::new(SilentObserver)
    };

    let mut index = FileIndex::open(&paths.index_path)?;
    let pipeline = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .with_options(config.scan_options())
        .with_dry_run(cli.dry_run)
        .with_shutdown_flag(shutdown.get_flag());

    let result = pipeline.run(&mut index, observer.as_ref());
    if let Err(e) = index.close() {
        log::warn!("Failed to close index cleanly: {}", e);
    }
    let outcome = result?;

    let exit_code = exit_code_for(&outcome);
    if cli.json {
        let output = JsonOutput::new(&outcome.scan, &outcome.report, exit_code);
        output.write_to(&mut io::stdout().lock())?;
    } else if !cli.quiet {
        print_plan(&outcome, &mut io::stdout().lock())?;
    }

    Ok(exit_code)
}

fn exit_code_for(outcome: &PipelineOutcome) -> ExitCode {
    if outcome.report.interrupted {
        ExitCode::Interrupted
    } else if outcome.has_warnings() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    }
}

fn print_plan<W: Write>(outcome: &PipelineOutcome, out: &mut W) -> io::Result<()> {
    for group in &outcome.report.groups {
        if group.relocated.is_empty() {
            continue;
        }
        writeln!(out, "{}", group.kept.display())?;
        for moved in &group.relocated {
            writeln!(out, "  -> {}", moved.to.display())?;
        }
    }
    for failure in &outcome.report.failures {
        writeln!(out, "  !! {}", failure)?;
    }
    writeln!(out, "{}", outcome.report.summary())
}
