use std::os::unix::fs::PermissionsExt;

/// Creates a temporary directory holding a small remote tree:
///
/// ```text
/// foo
/// |- 0.txt
/// |- bar
///    |- 1.txt
///    |- 2.txt
///    |- 3.txt
/// |- baz
///    |- 4.txt
///    |- deep
///       |- 5.txt
/// ```
pub async fn setup_remote_tree() -> anyhow::Result<tempfile::TempDir> {
    let tmp_dir = tempfile::tempdir()?;
    let foo_path = tmp_dir.path().join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "2").await?;
    tokio::fs::write(bar_path.join("3.txt"), "3").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("4.txt"), "4").await?;
    let deep_path = baz_path.join("deep");
    tokio::fs::create_dir(&deep_path).await?;
    tokio::fs::write(deep_path.join("5.txt"), "5").await?;
    tokio::fs::set_permissions(
        bar_path.join("3.txt"),
        std::fs::Permissions::from_mode(0o600),
    )
    .await?;
    Ok(tmp_dir)
}

/// Asserts that `dst` mirrors `src`: same entries, same file contents and permission bits.
pub fn check_dirs_identical(src: &std::path::Path, dst: &std::path::Path) -> anyhow::Result<()> {
    use anyhow::Context;
    for src_entry in std::fs::read_dir(src)? {
        let src_entry_path = src_entry?.path();
        let src_entry_name = src_entry_path
            .file_name()
            .context("directory entry without a name")?;
        let dst_entry_path = dst.join(src_entry_name);
        let src_md = std::fs::metadata(&src_entry_path)
            .with_context(|| format!("Source file {:?} is missing!", &src_entry_path))?;
        let dst_md = std::fs::metadata(&dst_entry_path)
            .with_context(|| format!("Destination file {:?} is missing!", &dst_entry_path))?;
        assert_eq!(src_md.is_file(), dst_md.is_file());
        if src_md.is_file() {
            assert_eq!(
                std::fs::read(&src_entry_path)?,
                std::fs::read(&dst_entry_path)?,
                "content differs for {:?}",
                &dst_entry_path
            );
            assert_eq!(
                src_md.permissions().mode() & 0o7777,
                dst_md.permissions().mode() & 0o7777,
                "mode differs for {:?}",
                &dst_entry_path
            );
        } else {
            check_dirs_identical(&src_entry_path, &dst_entry_path)?;
        }
    }
    Ok(())
}

/// Lists every path under `root` (relative, sorted) together with file contents.
pub fn snapshot(root: &std::path::Path) -> anyhow::Result<Vec<(String, Option<Vec<u8>>)>> {
    fn visit(
        root: &std::path::Path,
        dir: &std::path::Path,
        out: &mut Vec<(String, Option<Vec<u8>>)>,
    ) -> anyhow::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let relative = path.strip_prefix(root)?.to_string_lossy().into_owned();
            if path.is_dir() {
                out.push((relative, None));
                visit(root, &path, out)?;
            } else {
                out.push((relative, Some(std::fs::read(&path)?)));
            }
        }
        Ok(())
    }
    let mut out = vec![];
    visit(root, root, &mut out)?;
    out.sort();
    Ok(out)
}
