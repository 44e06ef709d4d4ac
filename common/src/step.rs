//! Transfer steps - the unit of work handed to the worker pool

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One declarative copy instruction: a remote source, a local destination and policy flags.
///
/// Steps are never mutated once handed to a worker. Directory copies build new steps for every
/// discovered file with [`Step::derive`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Source path on the remote filesystem
    #[serde(alias = "From")]
    pub from: PathBuf,
    /// Destination path on the local filesystem, empty means "same as `from`"
    #[serde(default, alias = "To")]
    pub to: PathBuf,
    /// Glob patterns excluding entries from a directory copy
    #[serde(default, alias = "Ignore")]
    pub ignore: Vec<String>,
    /// Replace existing destination files instead of failing
    #[serde(default, alias = "Overwrite")]
    pub overwrite: bool,
}

impl Step {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_ignore<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Effective destination: `to`, or `from` when `to` is empty.
    pub fn destination(&self) -> &Path {
        if self.to.as_os_str().is_empty() {
            &self.from
        } else {
            &self.to
        }
    }

    /// Returns a copy of this step with the destination filled in.
    #[must_use]
    pub fn resolved(&self) -> Step {
        Step {
            to: self.destination().to_path_buf(),
            ..self.clone()
        }
    }

    /// Builds the step for a file discovered while walking this step's source directory.
    ///
    /// Policy flags are inherited, paths are replaced.
    #[must_use]
    pub fn derive(&self, entry_path: &Path, destination: PathBuf) -> Step {
        Step {
            from: entry_path.to_path_buf(),
            to: destination,
            ignore: self.ignore.clone(),
            overwrite: self.overwrite,
        }
    }

    /// Checks the invariants a step must hold before it is enqueued.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.from.as_os_str().is_empty() {
            return Err(anyhow!("transfer step is missing a 'from' path"));
        }
        crate::filter::IgnoreSettings::compile(&self.ignore)?;
        Ok(())
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?} -> {:?}", self.from, self.destination())
    }
}

/// Joins a path relative to the walk root onto the destination root.
///
/// The root itself (empty relative path) maps onto `to` unchanged.
pub fn join_relative(to: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        to.to_path_buf()
    } else {
        to.join(relative)
    }
}
