//! Core of rfetch: transfer steps, the remote-to-local copy engine and the worker pool
//!
//! A run takes a validated list of [`Step`]s, a [`fs::RemoteFs`] to read from and a
//! [`fs::LocalFs`] to write to, and executes the steps on a fixed number of workers:
//!
//! - [`executor::execute_steps`] feeds the steps through a single-slot queue to the workers
//! - [`executor::execute_step`] stats the remote source and picks the copy routine
//! - [`copy::copy_dir`] walks a remote directory and recreates it locally
//! - [`copy::copy_file`] streams one file, honoring the step's overwrite policy
//!
//! A failing step never stops the run; its outcome is logged and counted. Binaries wrap their
//! work in [`run`], which sets up logging, the tokio runtime and progress reporting.

use std::sync::Arc;

pub mod config;
pub mod copy;
pub mod executor;
pub mod filter;
pub mod fs;
pub mod progress;
pub mod step;
pub mod walk;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, ProgressSettings, RuntimeConfig};
pub use executor::{DEFAULT_JOBS, RunSummary, StepOutcome, execute_step, execute_steps};
pub use progress::Progress;
pub use step::Step;

fn init_logging(output: &OutputConfig) {
    let filter = if output.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_directive()))
    };
    // a subscriber may already be installed, e.g. by a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stdout()))
        .try_init();
}

fn build_runtime(runtime: &RuntimeConfig) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    builder.build()
}

/// Runs `func` on a freshly built tokio runtime.
///
/// Returns `None` if setup or `func` failed; the error has already been printed to stderr
/// (unless `quiet`) and the caller is expected to exit with a non-zero status.
pub fn run<F, Fut, Summary>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: F,
) -> Option<Summary>
where
    F: FnOnce(Arc<Progress>) -> Fut,
    Fut: std::future::Future<Output = Result<Summary, anyhow::Error>>,
    Summary: std::fmt::Display,
{
    init_logging(&output);
    let report = |error: &anyhow::Error| {
        if !output.quiet {
            eprintln!("{error:#}");
        }
    };
    let delay = match progress.as_ref().map(ProgressSettings::delay).transpose() {
        Ok(delay) => delay,
        Err(error) => {
            report(&error);
            return None;
        }
    };
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            report(&anyhow::Error::from(error).context("failed to start the tokio runtime"));
            return None;
        }
    };
    let prog_track = Arc::new(Progress::new());
    let printer = delay.map(|delay| {
        let prog_track = prog_track.clone();
        runtime.spawn(async move {
            let mut printer = progress::ProgressPrinter::new(&prog_track);
            loop {
                tokio::time::sleep(delay).await;
                eprintln!("{}", printer.print());
            }
        })
    });
    let res = runtime.block_on(func(prog_track.clone()));
    if let Some(printer) = printer {
        printer.abort();
    }
    match res {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
                println!("walltime: {:.2?}", prog_track.get_duration());
            }
            Some(summary)
        }
        Err(error) => {
            report(&error);
            None
        }
    }
}
