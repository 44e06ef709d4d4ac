use anyhow::{Result, anyhow};
use clap::Parser;
use common::fs::{LocalFs, OsFs, RemoteFs};
use rfetch::settings::TransferFile;
use std::sync::Arc;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rfetch",
    version,
    about = "Pull files and directory trees from an SFTP host",
    long_about = "`rfetch` copies files and directory trees from a remote host to the local \
filesystem. What to copy is described by a transfer file holding the connection settings and \
a list of transfer steps; steps are executed concurrently by a fixed pool of workers.

EXAMPLE:
    # Run the steps from ./transfer.yaml with 16 workers and print a summary
    rfetch -j 16 --summary

A failing step is logged and does not stop the others."
)]
struct Args {
    /// Transfer file to read (default: transfer.yaml, transfer.yml or transfer.json in the
    /// current directory)
    #[arg(short = 'c', long, value_name = "PATH", help_heading = "Transfer options")]
    config: Option<std::path::PathBuf>,

    /// Number of steps executed concurrently (overrides config.jobs, default 8)
    #[arg(short = 'j', long, value_name = "N", help_heading = "Transfer options")]
    jobs: Option<usize>,

    /// Read sources from the local filesystem instead of connecting to the remote host
    #[arg(long, help_heading = "Transfer options")]
    local: bool,

    /// Accept any host key instead of checking known_hosts
    #[arg(long, help_heading = "Transfer options")]
    insecure: bool,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Sets the delay between progress updates (default 10s)
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level: -v DEBUG / -vv TRACE (default: INFO)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't log or report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

#[instrument(skip(prog_track))]
async fn async_main(args: Args, prog_track: Arc<common::Progress>) -> Result<common::RunSummary> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => TransferFile::discover(std::path::Path::new("."))?,
    };
    let transfer = TransferFile::load(&path)?;
    transfer.validate(args.local)?;
    let jobs = transfer.jobs(args.jobs)?;
    let local: Arc<dyn LocalFs> = Arc::new(OsFs::new());
    if args.local {
        tracing::info!("reading sources from the local filesystem");
        let remote: Arc<dyn RemoteFs> = Arc::new(OsFs::new());
        return common::execute_steps(prog_track, local, remote, transfer.transfer, jobs).await;
    }
    let ssh = transfer.ssh_settings(args.insecure)?;
    let sftp = Arc::new(
        remote::connect(&ssh)
            .await
            .map_err(|error| anyhow!("unable to connect to {ssh}: {error}"))?,
    );
    let summary =
        common::execute_steps(prog_track, local, sftp.clone(), transfer.transfer, jobs).await?;
    if let Err(error) = sftp.close().await {
        tracing::debug!("failed to close the connection: {:#}", &error);
    }
    Ok(summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        |prog_track| async_main(args, prog_track)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let progress = if args.progress || args.progress_delay.is_some() {
        Some(common::ProgressSettings {
            progress_delay: args.progress_delay,
        })
    } else {
        None
    };
    let res = common::run(progress, output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
