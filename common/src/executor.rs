//! Step dispatch and the worker pool draining the step queue

use anyhow::{Context, anyhow};
use std::sync::Arc;
use tracing::{Instrument, instrument};

use crate::copy::{self, ErrorKind, Summary};
use crate::fs::{LocalFs, RemoteFs};
use crate::progress;
use crate::step::Step;

/// Number of workers when the configuration does not say otherwise
pub const DEFAULT_JOBS: usize = 8;

/// Result of executing one transfer step
#[derive(Debug)]
pub enum StepOutcome {
    Completed(Summary),
    Failed {
        kind: ErrorKind,
        message: String,
        /// work done before the failure
        summary: Summary,
    },
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }

    pub fn summary(&self) -> Summary {
        match self {
            StepOutcome::Completed(summary) => *summary,
            StepOutcome::Failed { summary, .. } => *summary,
        }
    }
}

impl From<Result<Summary, copy::Error>> for StepOutcome {
    fn from(result: Result<Summary, copy::Error>) -> Self {
        match result {
            Ok(summary) => StepOutcome::Completed(summary),
            Err(error) => StepOutcome::Failed {
                kind: error.kind,
                message: format!("{error}"),
                summary: error.summary,
            },
        }
    }
}

/// Totals of a whole run
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub copy: Summary,
}

impl RunSummary {
    fn record(&mut self, outcome: &StepOutcome) {
        if outcome.is_failed() {
            self.steps_failed += 1;
        } else {
            self.steps_completed += 1;
        }
        self.copy = self.copy + outcome.summary();
    }
}

impl std::ops::Add for RunSummary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            steps_completed: self.steps_completed + other.steps_completed,
            steps_failed: self.steps_failed + other.steps_failed,
            copy: self.copy + other.copy,
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "steps completed: {}\n\
            steps failed: {}\n\
            {}",
            self.steps_completed, self.steps_failed, &self.copy,
        )
    }
}

async fn dispatch(
    prog_track: &progress::Progress,
    local: &dyn LocalFs,
    remote: &dyn RemoteFs,
    step: &Step,
) -> Result<Summary, copy::Error> {
    step.validate()
        .map_err(|err| copy::Error::new(ErrorKind::InvalidStep, err, Default::default()))?;
    let step = step.resolved();
    tracing::debug!("reading source metadata");
    let metadata = remote
        .stat(&step.from)
        .await
        .with_context(|| format!("cannot stat {:?}", &step.from))
        .map_err(|err| copy::Error::new(ErrorKind::SourceUnavailable, err, Default::default()))?;
    if metadata.is_dir {
        copy::copy_dir(prog_track, local, remote, &metadata, &step).await
    } else {
        copy::copy_file(prog_track, local, remote, &metadata, &step).await
    }
}

/// Executes one step: resolves its destination, stats the remote source and copies either the
/// whole directory tree or the single file.
///
/// Never fails; every error is reported through [`StepOutcome::Failed`].
#[instrument(skip(prog_track, local, remote))]
pub async fn execute_step(
    prog_track: &progress::Progress,
    local: &dyn LocalFs,
    remote: &dyn RemoteFs,
    step: &Step,
) -> StepOutcome {
    dispatch(prog_track, local, remote, step).await.into()
}

fn report(prog_track: &progress::Progress, step: &Step, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Completed(summary) => {
            tracing::debug!(
                from = ?step.from,
                to = ?step.destination(),
                files = summary.files_copied,
                "step completed"
            );
        }
        StepOutcome::Failed { kind, message, .. } => {
            prog_track.steps_failed.inc();
            tracing::error!(
                from = ?step.from,
                to = ?step.destination(),
                kind = %kind,
                "copy failed: {}",
                message
            );
        }
    }
}

async fn run_worker(
    queue: async_channel::Receiver<Step>,
    prog_track: Arc<progress::Progress>,
    local: Arc<dyn LocalFs>,
    remote: Arc<dyn RemoteFs>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    while let Ok(step) = queue.recv().await {
        let _guard = prog_track.steps.guard();
        // each step runs in its own task so that a panic costs only that step
        let task = {
            let prog_track = prog_track.clone();
            let local = local.clone();
            let remote = remote.clone();
            let step = step.clone();
            tokio::spawn(
                async move {
                    execute_step(&prog_track, local.as_ref(), remote.as_ref(), &step).await
                }
                .in_current_span(),
            )
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => StepOutcome::Failed {
                kind: ErrorKind::Fault,
                message: if join_error.is_panic() {
                    "step execution panicked".to_string()
                } else {
                    "step execution was cancelled".to_string()
                },
                summary: Default::default(),
            },
        };
        report(&prog_track, &step, &outcome);
        summary.record(&outcome);
    }
    summary
}

/// Runs all `steps` on a pool of `jobs` workers and waits for every one of them.
///
/// Steps are fed in order through a single-slot queue, so the producer waits whenever all
/// workers are busy. A failing step is logged and counted, it never stops the other steps.
pub async fn execute_steps(
    prog_track: Arc<progress::Progress>,
    local: Arc<dyn LocalFs>,
    remote: Arc<dyn RemoteFs>,
    steps: Vec<Step>,
    jobs: usize,
) -> Result<RunSummary, anyhow::Error> {
    if jobs == 0 {
        return Err(anyhow!("number of jobs must be at least 1"));
    }
    tracing::info!(count = steps.len(), "executing transfer steps in parallel");
    let (sender, receiver) = async_channel::bounded::<Step>(1);
    let mut workers = tokio::task::JoinSet::new();
    for id in 0..jobs {
        workers.spawn(
            run_worker(
                receiver.clone(),
                prog_track.clone(),
                local.clone(),
                remote.clone(),
            )
            .instrument(tracing::debug_span!("worker", id)),
        );
    }
    drop(receiver);
    for step in steps {
        if let Err(error) = sender.send(step).await {
            tracing::error!("no worker left to execute {}", &error.0);
            break;
        }
    }
    sender.close();
    let mut summary = RunSummary::default();
    while let Some(res) = workers.join_next().await {
        match res {
            Ok(worker_summary) => summary = summary + worker_summary,
            Err(error) => tracing::error!("worker terminated abnormally: {}", &error),
        }
    }
    tracing::info!("done");
    Ok(summary)
}
