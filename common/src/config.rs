//! Configuration types for runtime and output settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress all log output and error reporting
    pub quiet: bool,
    /// Verbosity level: 0=INFO, 1=DEBUG, 2=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Default directive for the log filter, `RUST_LOG` takes precedence over it.
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Periodic progress updates printed to stderr
#[derive(Debug, Clone, Default)]
pub struct ProgressSettings {
    /// Human readable delay between updates, e.g. "500ms" or "10s"
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    pub const DEFAULT_DELAY: std::time::Duration = std::time::Duration::from_secs(10);

    pub fn delay(&self) -> Result<std::time::Duration, anyhow::Error> {
        match &self.progress_delay {
            Some(delay) => humantime::parse_duration(delay)
                .map_err(|err| anyhow::anyhow!("invalid progress delay {delay:?}: {err}")),
            None => Ok(Self::DEFAULT_DELAY),
        }
    }
}
