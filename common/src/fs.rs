//! Filesystem collaborators used by the copy engine
//!
//! The engine never talks to a concrete filesystem: it reads from a [`RemoteFs`] and writes to a
//! [`LocalFs`], both shared by all workers. [`OsFs`] implements both on top of the operating
//! system; the SFTP-backed remote lives in the `remote` crate.

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};

/// Mode used for every directory the engine creates
pub const DIR_MODE: u32 = 0o755;

pub type Reader = Box<dyn AsyncRead + Send + Unpin>;
pub type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// The subset of file metadata the engine needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    /// permission bits (including setuid, setgid and sticky)
    pub mode: u32,
}

impl Metadata {
    pub fn file(size: u64, mode: u32) -> Self {
        Self {
            size,
            mode: mode & 0o7777,
            ..Default::default()
        }
    }

    pub fn dir(mode: u32) -> Self {
        Self {
            is_dir: true,
            mode: mode & 0o7777,
            ..Default::default()
        }
    }
}

impl From<&std::fs::Metadata> for Metadata {
    fn from(md: &std::fs::Metadata) -> Self {
        Self {
            is_dir: md.is_dir(),
            is_symlink: md.file_type().is_symlink(),
            size: md.len(),
            mode: md.permissions().mode() & 0o7777,
        }
    }
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// metadata of the entry itself, symlinks are not followed
    pub metadata: Metadata,
}

/// Read side: the filesystem steps copy from
#[async_trait]
pub trait RemoteFs: Send + Sync + std::fmt::Debug {
    /// Metadata of `path`, following symlinks
    async fn stat(&self, path: &Path) -> std::io::Result<Metadata>;
    /// Entries of the directory `path`, without `.` and `..`, in no particular order
    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>>;
    async fn open(&self, path: &Path) -> std::io::Result<Reader>;
    /// Absolute path of `path` with every symlink resolved
    async fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf>;
}

/// Write side: the filesystem steps copy to
#[async_trait]
pub trait LocalFs: Send + Sync + std::fmt::Debug {
    /// Creates `path` and all missing parents; succeeds if the directory already exists.
    async fn create_dir_all(&self, path: &Path, mode: u32) -> std::io::Result<()>;
    /// Opens `path` for writing with permission bits `mode`.
    ///
    /// Without `overwrite` the file must not exist yet (`ErrorKind::AlreadyExists` otherwise);
    /// with `overwrite` an existing file is truncated.
    async fn create_file(&self, path: &Path, mode: u32, overwrite: bool)
    -> std::io::Result<Writer>;
}

/// The operating system filesystem.
///
/// Relative paths are resolved against `base` when one is set, otherwise against the process
/// working directory.
#[derive(Debug, Clone, Default)]
pub struct OsFs {
    base: Option<PathBuf>,
}

impl OsFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl RemoteFs for OsFs {
    async fn stat(&self, path: &Path) -> std::io::Result<Metadata> {
        let md = tokio::fs::metadata(self.resolve(path)).await?;
        Ok(Metadata::from(&md))
    }

    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<DirEntry>> {
        let mut entries = tokio::fs::read_dir(self.resolve(path)).await?;
        let mut listing = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let md = tokio::fs::symlink_metadata(entry.path()).await?;
            listing.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: Metadata::from(&md),
            });
        }
        Ok(listing)
    }

    async fn open(&self, path: &Path) -> std::io::Result<Reader> {
        let file = tokio::fs::File::open(self.resolve(path)).await?;
        Ok(Box::new(file))
    }

    async fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::canonicalize(self.resolve(path)).await
    }
}

#[async_trait]
impl LocalFs for OsFs {
    async fn create_dir_all(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        tokio::fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(self.resolve(path))
            .await
    }

    async fn create_file(
        &self,
        path: &Path,
        mode: u32,
        overwrite: bool,
    ) -> std::io::Result<Writer> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).mode(mode);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(self.resolve(path)).await?;
        // the mode passed to open is filtered by the umask and ignored for existing files
        file.set_permissions(std::fs::Permissions::from_mode(mode))
            .await?;
        Ok(Box::new(file))
    }
}
