use anyhow::{Context, anyhow};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

use crate::filter::IgnoreSettings;
use crate::fs::{DIR_MODE, LocalFs, Metadata, RemoteFs};
use crate::progress;
use crate::step::{Step, join_relative};
use crate::walk::Walker;

const BUFFER_SIZE: usize = 64 * 1024;

/// Classification of a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// the remote source could not be resolved
    SourceUnavailable,
    /// the destination file exists and the step does not allow overwriting it
    DestinationExists,
    /// opening or reading a remote file failed
    RemoteIo,
    /// creating or writing a local file or directory failed
    LocalIo,
    /// listing a remote directory or computing a relative path failed
    Traversal,
    /// the step itself is malformed
    InvalidStep,
    /// the worker executing the step terminated abnormally
    Fault,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ErrorKind::SourceUnavailable => "source unavailable",
            ErrorKind::DestinationExists => "destination exists",
            ErrorKind::RemoteIo => "remote i/o",
            ErrorKind::LocalIo => "local i/o",
            ErrorKind::Traversal => "traversal",
            ErrorKind::InvalidStep => "invalid step",
            ErrorKind::Fault => "fault",
        };
        write!(f, "{name}")
    }
}

/// Error type for copy operations that preserves the work done before the failure.
///
/// The `Display` implementation prints the full error chain, so all of these log the complete
/// cause:
/// ```rust,ignore
/// tracing::error!("copy failed: {}", &error);
/// tracing::error!("copy failed: {:#}", &error);
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    pub kind: ErrorKind,
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, source: anyhow::Error, summary: Summary) -> Self {
        Error {
            kind,
            source,
            summary,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_copied: u64,
    pub files_copied: usize,
    pub directories_created: usize,
    pub entries_ignored: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            bytes_copied: self.bytes_copied + other.bytes_copied,
            files_copied: self.files_copied + other.files_copied,
            directories_created: self.directories_created + other.directories_created,
            entries_ignored: self.entries_ignored + other.entries_ignored,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            files copied: {}\n\
            directories created: {}\n\
            entries ignored: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.files_copied,
            self.directories_created,
            self.entries_ignored,
        )
    }
}

/// Copies one remote file to the step's destination.
///
/// Missing parent directories are created. Without `overwrite` an existing destination is left
/// untouched and reported as [`ErrorKind::DestinationExists`]; with it the file is truncated and
/// rewritten. The destination ends up with the permission bits from `metadata`.
#[instrument(skip(prog_track, local, remote))]
pub async fn copy_file(
    prog_track: &progress::Progress,
    local: &dyn LocalFs,
    remote: &dyn RemoteFs,
    metadata: &Metadata,
    step: &Step,
) -> Result<Summary, Error> {
    let from = step.from.as_path();
    let to = step.destination();
    tracing::info!(from = ?from, to = ?to, "copy");
    if let Some(parent) = to.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tracing::debug!("creating parent directory {:?}", parent);
        local
            .create_dir_all(parent, DIR_MODE)
            .await
            .with_context(|| format!("cannot create directory {parent:?}"))
            .map_err(|err| Error::new(ErrorKind::LocalIo, err, Default::default()))?;
    }
    tracing::debug!("opening 'from' for reading and 'to' for writing");
    let mut reader = remote
        .open(from)
        .await
        .with_context(|| format!("cannot open {from:?} for reading"))
        .map_err(|err| Error::new(ErrorKind::RemoteIo, err, Default::default()))?;
    let mut writer = match local.create_file(to, metadata.mode, step.overwrite).await {
        Ok(writer) => writer,
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(Error::new(
                ErrorKind::DestinationExists,
                anyhow!(error).context(format!(
                    "destination {to:?} already exists, set 'overwrite: true' to replace it"
                )),
                Default::default(),
            ));
        }
        Err(error) => {
            return Err(Error::new(
                ErrorKind::LocalIo,
                anyhow!(error).context(format!("cannot open {to:?} for writing")),
                Default::default(),
            ));
        }
    };
    tracing::debug!("copying data");
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_copied = 0u64;
    loop {
        let count = reader
            .read(&mut buffer)
            .await
            .with_context(|| format!("failed reading from {from:?}"))
            .map_err(|err| Error::new(ErrorKind::RemoteIo, err, Default::default()))?;
        if count == 0 {
            break;
        }
        writer
            .write_all(&buffer[..count])
            .await
            .with_context(|| format!("failed writing to {to:?}"))
            .map_err(|err| Error::new(ErrorKind::LocalIo, err, Default::default()))?;
        bytes_copied += count as u64;
        prog_track.bytes_copied.add(count as u64);
    }
    writer
        .shutdown()
        .await
        .with_context(|| format!("failed to flush {to:?}"))
        .map_err(|err| Error::new(ErrorKind::LocalIo, err, Default::default()))?;
    prog_track.files_copied.inc();
    Ok(Summary {
        bytes_copied,
        files_copied: 1,
        ..Default::default()
    })
}

/// Whether the directory symlink `link` resolves to the walk root or to one of the directories
/// between the root and `link`; descending into such a link would never end.
async fn links_into_walked_chain(
    remote: &dyn RemoteFs,
    root: &Path,
    link: &Path,
) -> Result<bool, anyhow::Error> {
    let target = remote
        .canonicalize(link)
        .await
        .with_context(|| format!("cannot resolve symlink {link:?}"))?;
    for ancestor in link.ancestors().skip(1) {
        let resolved = remote
            .canonicalize(ancestor)
            .await
            .with_context(|| format!("cannot resolve {ancestor:?}"))?;
        if resolved == target {
            return Ok(true);
        }
        if ancestor == root {
            break;
        }
    }
    Ok(false)
}

/// Mirrors the remote directory `step.from` under the step's destination.
///
/// Entries are visited in pre-order; every directory is recreated with mode 0755 and every file
/// is handed to [`copy_file`] with a step derived from this one. Entries matching the step's
/// ignore patterns are skipped and ignored directories are not descended into. Symlinks are
/// resolved; links to directories are followed unless they lead back into the chain of
/// directories being walked. The first failure
/// aborts the walk, the returned error carries what was copied up to that point.
#[instrument(skip(prog_track, local, remote))]
pub async fn copy_dir(
    prog_track: &progress::Progress,
    local: &dyn LocalFs,
    remote: &dyn RemoteFs,
    metadata: &Metadata,
    step: &Step,
) -> Result<Summary, Error> {
    let ignore = IgnoreSettings::compile(&step.ignore)
        .map_err(|err| Error::new(ErrorKind::InvalidStep, err, Default::default()))?;
    let to = step.destination();
    let mut summary = Summary::default();
    let mut walker = Walker::new(remote, &step.from, *metadata);
    loop {
        let entry = match walker.next().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => return Err(Error::new(ErrorKind::Traversal, err, summary)),
        };
        let metadata = if entry.metadata.is_symlink {
            remote
                .stat(&entry.path)
                .await
                .with_context(|| format!("cannot resolve symlink {:?}", &entry.path))
                .map_err(|err| Error::new(ErrorKind::SourceUnavailable, err, summary))?
        } else {
            entry.metadata
        };
        let matched = if ignore.is_empty() {
            None
        } else {
            ignore.matched(&entry.relative, metadata.is_dir)
        };
        if let Some(pattern) = matched {
            tracing::debug!("ignoring {:?}, matched pattern {:?}", &entry.path, pattern);
            if entry.metadata.is_dir {
                walker.skip_current_dir();
            }
            prog_track.entries_ignored.inc();
            summary.entries_ignored += 1;
            continue;
        }
        if metadata.is_dir && entry.metadata.is_symlink {
            let looped = links_into_walked_chain(remote, &step.from, &entry.path)
                .await
                .map_err(|err| Error::new(ErrorKind::Traversal, err, summary))?;
            if looped {
                tracing::warn!(
                    "skipping {:?}: symlink to a directory that is being copied",
                    &entry.path
                );
                continue;
            }
            walker.descend_into(&entry);
        }
        let destination = join_relative(to, &entry.relative);
        if metadata.is_dir {
            tracing::info!(path = ?destination, "mkdir");
            local
                .create_dir_all(&destination, DIR_MODE)
                .await
                .with_context(|| format!("cannot create directory {destination:?}"))
                .map_err(|err| Error::new(ErrorKind::LocalIo, err, summary))?;
            prog_track.directories_created.inc();
            summary.directories_created += 1;
            continue;
        }
        let file_step = step.derive(&entry.path, destination);
        match copy_file(prog_track, local, remote, &metadata, &file_step).await {
            Ok(file_summary) => summary = summary + file_summary,
            Err(error) => {
                return Err(Error::new(
                    error.kind,
                    error.source,
                    summary + error.summary,
                ));
            }
        }
    }
    Ok(summary)
}
