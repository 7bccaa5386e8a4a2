use std::{io::Write, path::Path};

use crate::error::{DashMetaError, DashMetaResult};

/// Replace `path` with `contents` so that readers only ever see the old or the new file.
///
/// The data is written to a temporary file next to `path` and renamed over it.
pub async fn write_atomic(path: impl AsRef<Path>, contents: Vec<u8>) -> DashMetaResult<()> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents)).await?
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> DashMetaResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".dashmeta-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;

    // temporary files are created as 0600, but the manifest is served to others
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    temp.persist(path).map_err(|e| DashMetaError::PersistError {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Remove every regular file in `dir` except `.gitkeep`.
///
/// Subdirectories are left alone.
pub async fn clean_dir(dir: impl AsRef<Path>) -> DashMetaResult<()> {
    let dir = dir.as_ref();
    if !tokio::fs::metadata(dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or_default()
    {
        return Err(DashMetaError::NotADirectory(dir.to_path_buf()));
    }

    let mut removed = 0usize;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == ".gitkeep" {
            continue;
        }
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }

    tracing::debug!("Removed {removed} file(s) from {}", dir.display());
    Ok(())
}
