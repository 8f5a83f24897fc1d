use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};

use super::{Entry, Storage, file_name_of};
use crate::error::{Error, Result};

/// A mutating call observed by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Copy { from: PathBuf, to: PathBuf },
    Remove(PathBuf),
}

#[derive(Debug, Clone)]
struct Node {
    path: PathBuf,
    is_dir: bool,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    // Insertion order is the listing order.
    nodes: Vec<Node>,
    ops: Vec<StorageOp>,
    failing: BTreeSet<PathBuf>,
}

/// In-memory storage with fixed timestamps that records every copy and
/// remove. Listing order is insertion order, not name order.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RefCell<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>, modified_secs: i64) -> &Self {
        self.insert(path.into(), true, modified_secs);
        self
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, modified_secs: i64) -> &Self {
        self.insert(path.into(), false, modified_secs);
        self
    }

    /// Adds `dir/global_step<step>` for each step, stamped `step` seconds
    /// after the epoch so timestamps follow the step order.
    pub fn add_checkpoints(&self, dir: impl AsRef<Path>, steps: &[u64]) -> &Self {
        let dir = dir.as_ref();
        if !self.exists(dir) {
            self.add_dir(dir, 0);
        }
        for step in steps {
            self.add_dir(dir.join(format!("global_step{step}")), *step as i64);
        }
        self
    }

    /// Makes any later copy from, or removal of, `path` fail.
    pub fn fail_on(&self, path: impl Into<PathBuf>) -> &Self {
        self.state.borrow_mut().failing.insert(path.into());
        self
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.state.borrow().nodes.iter().any(|n| n.path == path)
    }

    pub fn ops(&self) -> Vec<StorageOp> {
        self.state.borrow().ops.clone()
    }

    fn insert(&self, path: PathBuf, is_dir: bool, modified_secs: i64) {
        let modified = Utc
            .timestamp_opt(modified_secs, 0)
            .single()
            .unwrap_or_default();
        let mut st = self.state.borrow_mut();
        st.nodes.retain(|n| n.path != path);
        st.nodes.push(Node {
            path,
            is_dir,
            modified,
        });
    }
}

impl Storage for MemoryStorage {
    fn is_dir(&self, path: &Path) -> bool {
        self.state
            .borrow()
            .nodes
            .iter()
            .any(|n| n.path == path && n.is_dir)
    }

    fn list(&self, dir: &Path) -> Result<Vec<Entry>> {
        if !self.is_dir(dir) {
            return Err(Error::msg(format!("failed to read {}: not found", dir.display())));
        }
        let st = self.state.borrow();
        let mut out = Vec::new();
        for n in st.nodes.iter().filter(|n| n.path.parent() == Some(dir)) {
            out.push(Entry {
                name: file_name_of(&n.path)?.to_string(),
                path: n.path.clone(),
                is_dir: n.is_dir,
                modified: n.modified,
            });
        }
        Ok(out)
    }

    fn copy_tree(&self, src: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let dest = dest_dir.join(file_name_of(src)?);
        let mut st = self.state.borrow_mut();
        st.ops.push(StorageOp::Copy {
            from: src.to_path_buf(),
            to: dest.clone(),
        });
        if st.failing.contains(src) {
            return Err(Error::msg(format!("simulated copy failure for {}", src.display())));
        }
        if st.nodes.iter().any(|n| n.path == dest) {
            return Err(Error::msg(format!(
                "refusing to copy {} over existing {}",
                src.display(),
                dest.display()
            )));
        }
        let copies = st
            .nodes
            .iter()
            .filter_map(|n| {
                let rel = n.path.strip_prefix(src).ok()?;
                Some(Node {
                    path: if rel.as_os_str().is_empty() {
                        dest.clone()
                    } else {
                        dest.join(rel)
                    },
                    ..n.clone()
                })
            })
            .collect::<Vec<_>>();
        st.nodes.extend(copies);
        Ok(dest)
    }

    fn remove_tree(&self, root: &Path, path: &Path) -> Result<()> {
        let mut st = self.state.borrow_mut();
        st.ops.push(StorageOp::Remove(path.to_path_buf()));
        if path.parent() != Some(root) {
            return Err(Error::msg(format!(
                "refusing to remove '{}' (not a direct child of '{}')",
                path.display(),
                root.display()
            )));
        }
        if st.failing.contains(path) {
            return Err(Error::msg(format!("simulated remove failure for {}", path.display())));
        }
        st.nodes.retain(|n| !n.path.starts_with(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_brings_descendants_along() {
        let mem = MemoryStorage::new();
        mem.add_checkpoints("/ckpt", &[10]).add_dir("/backup", 0);
        mem.add_file("/ckpt/global_step10/weights.pt", 10);

        let dest = mem
            .copy_tree(Path::new("/ckpt/global_step10"), Path::new("/backup"))
            .expect("copy");
        assert_eq!(dest, PathBuf::from("/backup/global_step10"));
        assert!(mem.exists(Path::new("/backup/global_step10/weights.pt")));
        assert!(mem.exists(Path::new("/ckpt/global_step10/weights.pt")));
    }

    #[test]
    fn remove_drops_the_whole_subtree() {
        let mem = MemoryStorage::new();
        mem.add_checkpoints("/ckpt", &[1, 2]);
        mem.add_file("/ckpt/global_step1/weights.pt", 1);

        mem.remove_tree(Path::new("/ckpt"), Path::new("/ckpt/global_step1"))
            .expect("remove");
        assert!(!mem.exists(Path::new("/ckpt/global_step1")));
        assert!(!mem.exists(Path::new("/ckpt/global_step1/weights.pt")));
        assert!(mem.exists(Path::new("/ckpt/global_step2")));
        assert_eq!(
            mem.ops(),
            vec![StorageOp::Remove(PathBuf::from("/ckpt/global_step1"))]
        );
    }
}
