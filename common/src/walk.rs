//! Pre-order traversal of a remote directory tree

use anyhow::{Context, anyhow};
use std::path::{Path, PathBuf};

use crate::fs::{Metadata, RemoteFs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// path on the remote filesystem (walk root joined with the relative path)
    pub path: PathBuf,
    /// path relative to the walk root, empty for the root itself
    pub relative: PathBuf,
    pub metadata: Metadata,
}

/// Lazily walks a remote tree: the root first, every directory before its contents and
/// siblings in lexical order.
///
/// A directory is listed only when the walk moves past it, so [`Walker::skip_current_dir`]
/// called right after a directory was yielded prunes its whole subtree.
#[derive(Debug)]
pub struct Walker<'a> {
    fs: &'a dyn RemoteFs,
    root: PathBuf,
    stack: Vec<(PathBuf, Metadata)>,
    descend: Option<PathBuf>,
}

impl<'a> Walker<'a> {
    pub fn new(fs: &'a dyn RemoteFs, root: &Path, root_metadata: Metadata) -> Self {
        Self {
            fs,
            root: root.to_path_buf(),
            stack: vec![(root.to_path_buf(), root_metadata)],
            descend: None,
        }
    }

    /// Do not descend into the directory yielded last.
    pub fn skip_current_dir(&mut self) {
        self.descend = None;
    }

    /// Descend into `entry` even though its own metadata is not a directory, e.g. a symlink
    /// resolving to one. Must be called before the next call to [`Walker::next`].
    pub fn descend_into(&mut self, entry: &WalkEntry) {
        self.descend = Some(entry.path.clone());
    }

    pub async fn next(&mut self) -> Result<Option<WalkEntry>, anyhow::Error> {
        if let Some(dir) = self.descend.take() {
            let mut entries = self
                .fs
                .read_dir(&dir)
                .await
                .with_context(|| format!("cannot open directory {dir:?} for reading"))?;
            // reverse order so that popping yields names in ascending order
            entries.sort_by(|a, b| b.name.cmp(&a.name));
            self.stack.extend(
                entries
                    .into_iter()
                    .map(|entry| (dir.join(&entry.name), entry.metadata)),
            );
        }
        let Some((path, metadata)) = self.stack.pop() else {
            return Ok(None);
        };
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| anyhow!("{path:?} is not located under {:?}", &self.root))?
            .to_path_buf();
        if metadata.is_dir {
            self.descend = Some(path.clone());
        }
        Ok(Some(WalkEntry {
            path,
            relative,
            metadata,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFs;
    use crate::testutils;

    async fn collect(walker: &mut Walker<'_>) -> Result<Vec<String>, anyhow::Error> {
        let mut visited = vec![];
        while let Some(entry) = walker.next().await? {
            visited.push(entry.relative.to_string_lossy().into_owned());
        }
        Ok(visited)
    }

    #[tokio::test]
    async fn visits_in_pre_order() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_remote_tree().await?;
        let fs = OsFs::new();
        let root = tmp_dir.path().join("foo");
        let root_md = crate::fs::RemoteFs::stat(&fs, &root).await?;
        let mut walker = Walker::new(&fs, &root, root_md);
        let visited = collect(&mut walker).await?;
        assert_eq!(
            visited,
            vec![
                "",
                "0.txt",
                "bar",
                "bar/1.txt",
                "bar/2.txt",
                "bar/3.txt",
                "baz",
                "baz/4.txt",
                "baz/deep",
                "baz/deep/5.txt",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn skip_current_dir_prunes_subtree() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_remote_tree().await?;
        let fs = OsFs::new();
        let root = tmp_dir.path().join("foo");
        let root_md = crate::fs::RemoteFs::stat(&fs, &root).await?;
        let mut walker = Walker::new(&fs, &root, root_md);
        let mut visited = vec![];
        while let Some(entry) = walker.next().await? {
            if entry.relative == Path::new("baz") {
                walker.skip_current_dir();
            }
            visited.push(entry.relative);
        }
        assert!(visited.contains(&PathBuf::from("baz")));
        assert!(!visited.iter().any(|p| p.starts_with("baz/deep")));
        assert!(!visited.contains(&PathBuf::from("baz/4.txt")));
        Ok(())
    }

    #[tokio::test]
    async fn descend_into_follows_linked_directory() -> Result<(), anyhow::Error> {
        let tmp_dir = testutils::setup_remote_tree().await?;
        let fs = OsFs::new();
        let root = tmp_dir.path().join("foo");
        std::os::unix::fs::symlink(root.join("baz").join("deep"), root.join("link"))?;
        let root_md = crate::fs::RemoteFs::stat(&fs, &root).await?;
        let mut walker = Walker::new(&fs, &root, root_md);
        let mut visited = vec![];
        while let Some(entry) = walker.next().await? {
            if entry.metadata.is_symlink {
                walker.descend_into(&entry);
            }
            visited.push(entry.relative);
        }
        assert!(visited.contains(&PathBuf::from("link")));
        assert!(visited.contains(&PathBuf::from("link/5.txt")));
        Ok(())
    }

    #[tokio::test]
    async fn listing_failure_is_reported() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let fs = OsFs::new();
        let missing = tmp_dir.path().join("gone");
        let mut walker = Walker::new(&fs, &missing, Metadata::dir(0o755));
        assert!(walker.next().await?.is_some());
        let error = walker.next().await.unwrap_err();
        assert!(format!("{error:#}").contains("cannot open directory"));
        Ok(())
    }
}
