use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};

use super::{Entry, Storage, file_name_of};
use crate::error::{Error, Result};

const STAGING_PREFIX: &str = ".ckpt-steward-staging-";

/// Local filesystem backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

impl Storage for FsStorage {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list(&self, dir: &Path) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        for ent in
            fs::read_dir(dir).map_err(|e| Error::msg(format!("failed to read {}: {e}", dir.display())))?
        {
            let ent = ent.map_err(|e| Error::msg(format!("read_dir entry error: {e}")))?;
            let path = ent.path();
            let Some(name) = ent.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %path.display(), "skipping non-utf8 entry");
                continue;
            };
            // Dangling symlinks and the like are skipped, not fatal.
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!(path = %path.display(), "skipping entry that cannot be stat-ed: {e}");
                    continue;
                }
            };
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH));
            out.push(Entry {
                name,
                path,
                is_dir: meta.is_dir(),
                modified,
            });
        }
        Ok(out)
    }

    fn copy_tree(&self, src: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let name = file_name_of(src)?;
        let dest = dest_dir.join(name);
        if fs::symlink_metadata(&dest).is_ok() {
            return Err(Error::msg(format!(
                "refusing to copy {} over existing {}",
                src.display(),
                dest.display()
            )));
        }

        // Stage inside the destination directory so the final rename stays on
        // one filesystem. The staging dir is removed on drop, also on error.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(dest_dir)
            .map_err(|e| {
                Error::msg(format!(
                    "failed to create staging dir in {}: {e}",
                    dest_dir.display()
                ))
            })?;
        let staged = staging.path().join(name);
        copy_path(src, &staged)?;
        fs::rename(&staged, &dest).map_err(|e| {
            Error::msg(format!(
                "failed to rename {} -> {}: {e}",
                staged.display(),
                dest.display()
            ))
        })?;
        Ok(dest)
    }

    fn remove_tree(&self, root: &Path, path: &Path) -> Result<()> {
        let root_can = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let dir_can = path.canonicalize().map_err(|e| {
            Error::msg(format!("failed to resolve {}: {e}", path.display()))
        })?;
        if dir_can.parent() != Some(root_can.as_path()) {
            return Err(Error::msg(format!(
                "refusing to remove '{}' (not a direct child of '{}')",
                dir_can.display(),
                root_can.display()
            )));
        }
        fs::remove_dir_all(&dir_can)
            .map_err(|e| Error::msg(format!("failed to remove dir {}: {e}", dir_can.display())))
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    use std::os::unix::fs::symlink;
    let target = fs::read_link(src)
        .map_err(|e| Error::msg(format!("failed to read symlink {}: {e}", src.display())))?;
    symlink(&target, dst).map_err(|e| {
        Error::msg(format!(
            "failed to create symlink {} -> {}: {e}",
            dst.display(),
            target.display()
        ))
    })
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| Error::msg(format!("failed to copy {} -> {}: {e}", src.display(), dst.display())))
}

fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        let p = entry.path();
        let rel = p
            .strip_prefix(src)
            .map_err(|e| Error::msg(format!("strip_prefix failed: {e}")))?;
        let out = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };
        if entry.file_type().is_dir() {
            fs::create_dir_all(&out)
                .map_err(|e| Error::msg(format!("failed to create {}: {e}", out.display())))?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(p, &out)?;
        } else {
            fs::copy(p, &out).map_err(|e| {
                Error::msg(format!(
                    "failed to copy {} -> {}: {e}",
                    p.display(),
                    out.display()
                ))
            })?;
        }
    }
    Ok(())
}
