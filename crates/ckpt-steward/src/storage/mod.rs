//! Access to the directories that hold checkpoints.
//!
//! Everything the steward reads or mutates on disk goes through [`Storage`],
//! so the planning and orchestration code can run against [`MemoryStorage`]
//! in tests and against [`FsStorage`] for real.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::Result;

mod fs;
mod memory;

pub use self::fs::FsStorage;
pub use self::memory::{MemoryStorage, StorageOp};

/// One immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub modified: DateTime<Utc>,
}

pub trait Storage {
    fn is_dir(&self, path: &Path) -> bool;

    /// Immediate children of `dir`, in whatever order the backend yields them.
    fn list(&self, dir: &Path) -> Result<Vec<Entry>>;

    /// Recursively copy `src` to `dest_dir/<file name of src>` and return the
    /// destination path. The destination must not exist yet.
    fn copy_tree(&self, src: &Path, dest_dir: &Path) -> Result<PathBuf>;

    /// Recursively remove `path`, which must be a direct child of `root`.
    fn remove_tree(&self, root: &Path, path: &Path) -> Result<()>;
}

fn file_name_of(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| crate::Error::msg(format!("path has no usable file name: {}", path.display())))
}
