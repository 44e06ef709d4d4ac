use async_trait::async_trait;
use common::fs::{DirEntry, Metadata, Reader, RemoteFs};
use std::path::{Path, PathBuf};

use crate::HostKeyCheck;

/// Remote filesystem served over an SFTP session.
///
/// The session multiplexes requests, so a single instance is shared by all workers.
pub struct SftpFs {
    session: russh_sftp::client::SftpSession,
    handle: russh::client::Handle<HostKeyCheck>,
}

impl std::fmt::Debug for SftpFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpFs").finish_non_exhaustive()
    }
}

impl SftpFs {
    pub(crate) fn new(
        handle: russh::client::Handle<HostKeyCheck>,
        session: russh_sftp::client::SftpSession,
    ) -> Self {
        Self { session, handle }
    }

    /// Closes the SFTP session and the underlying SSH connection.
    pub async fn close(&self) -> Result<(), crate::Error> {
        self.session.close().await?;
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

fn remote_path(path: &Path) -> std::io::Result<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("remote path {path:?} is not valid UTF-8"),
        )
    })
}

/// SFTP errors only carry a status message, classify it the way the server words it
fn error_kind(message: &str) -> std::io::ErrorKind {
    let message = message.to_lowercase();
    if message.contains("no such file") || message.contains("not found") {
        std::io::ErrorKind::NotFound
    } else if message.contains("permission denied") {
        std::io::ErrorKind::PermissionDenied
    } else {
        std::io::ErrorKind::Other
    }
}

fn to_io_error(error: russh_sftp::client::error::Error, path: &str) -> std::io::Error {
    let message = error.to_string();
    std::io::Error::new(error_kind(&message), format!("{path}: {message}"))
}

fn to_metadata(attrs: &russh_sftp::protocol::FileAttributes) -> Metadata {
    if attrs.is_dir() {
        return Metadata::dir(attrs.permissions.unwrap_or(common::fs::DIR_MODE));
    }
    Metadata {
        is_symlink: attrs.is_symlink(),
        ..Metadata::file(attrs.size.unwrap_or(0), attrs.permissions.unwrap_or(0o644))
    }
}

#[async_trait]
impl RemoteFs for SftpFs {
    async fn stat(&self, path: &Path) -> std::io::Result<Metadata> {
        let path = remote_path(path)?;
        let attrs = self
            .session
            .metadata(path.as_str())
            .await
            .map_err(|err| to_io_error(err, &path))?;
        Ok(to_metadata(&attrs))
    }

    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>> {
        let path = remote_path(path)?;
        let entries = self
            .session
            .read_dir(path.as_str())
            .await
            .map_err(|err| to_io_error(err, &path))?;
        Ok(entries
            .filter_map(|entry| {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    return None;
                }
                Some(DirEntry {
                    name,
                    metadata: to_metadata(&entry.metadata()),
                })
            })
            .collect())
    }

    async fn open(&self, path: &Path) -> std::io::Result<Reader> {
        let path = remote_path(path)?;
        let file = self
            .session
            .open(path.as_str())
            .await
            .map_err(|err| to_io_error(err, &path))?;
        Ok(Box::new(Box::pin(file)))
    }

    async fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        let path = remote_path(path)?;
        let resolved = self
            .session
            .canonicalize(path.as_str())
            .await
            .map_err(|err| to_io_error(err, &path))?;
        Ok(PathBuf::from(resolved))
    }
}
