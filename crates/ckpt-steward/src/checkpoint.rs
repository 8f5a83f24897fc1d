use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::Storage;

pub const STEP_PREFIX: &str = "global_step";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub step: u64,
    pub name: String,
    pub path: PathBuf,
    /// Informational only; ordering is always by step.
    pub modified: DateTime<Utc>,
}

/// Two entries in one directory that parsed to the same step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateStep {
    pub step: u64,
    pub kept: String,
    pub dropped: String,
}

/// Snapshot of the checkpoints in one directory, ascending by step.
#[derive(Debug, Clone, Default)]
pub struct CheckpointSet {
    pub dir: PathBuf,
    items: Vec<Checkpoint>,
    pub duplicates: Vec<DuplicateStep>,
}

impl CheckpointSet {
    /// Builds a set from arbitrary checkpoints. On duplicate steps the entry
    /// whose name sorts last wins, whatever the listing order.
    pub fn from_checkpoints(dir: impl Into<PathBuf>, cps: impl IntoIterator<Item = Checkpoint>) -> Self {
        let dir = dir.into();
        let mut by_step = BTreeMap::<u64, Checkpoint>::new();
        let mut duplicates = Vec::new();
        for cp in cps {
            let step = cp.step;
            let (kept, dropped) = match by_step.entry(step) {
                Entry::Vacant(slot) => {
                    slot.insert(cp);
                    continue;
                }
                Entry::Occupied(mut slot) => {
                    if cp.name > slot.get().name {
                        let prev = slot.insert(cp);
                        (slot.get().name.clone(), prev.name)
                    } else {
                        (slot.get().name.clone(), cp.name)
                    }
                }
            };
            tracing::warn!(
                dir = %dir.display(),
                step,
                kept = %kept,
                dropped = %dropped,
                "two checkpoints share one step"
            );
            duplicates.push(DuplicateStep {
                step,
                kept,
                dropped,
            });
        }
        Self {
            dir,
            items: by_step.into_values().collect(),
            duplicates,
        }
    }

    pub fn as_slice(&self) -> &[Checkpoint] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Checkpoint> {
        self.items.iter()
    }

    pub fn steps(&self) -> Vec<u64> {
        self.items.iter().map(|c| c.step).collect()
    }
}

impl<'a> IntoIterator for &'a CheckpointSet {
    type Item = &'a Checkpoint;
    type IntoIter = std::slice::Iter<'a, Checkpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Returns the step encoded in a `global_step<digits>` name.
pub fn parse_step(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(STEP_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<u64>() {
        Ok(step) => Some(step),
        Err(e) => {
            tracing::warn!(name, "ignoring checkpoint with unparsable step: {e}");
            None
        }
    }
}

/// Lists the checkpoint directories directly under `dir`.
pub fn enumerate<S: Storage + ?Sized>(storage: &S, dir: &Path) -> Result<CheckpointSet> {
    if !storage.is_dir(dir) {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }
    let mut found = Vec::new();
    for ent in storage.list(dir)? {
        let Some(step) = parse_step(&ent.name) else {
            continue;
        };
        if !ent.is_dir {
            tracing::debug!(path = %ent.path.display(), "ignoring non-directory checkpoint name");
            continue;
        }
        found.push(Checkpoint {
            step,
            name: ent.name,
            path: ent.path,
            modified: ent.modified,
        });
    }
    let set = CheckpointSet::from_checkpoints(dir, found);
    tracing::debug!(dir = %dir.display(), count = set.len(), "enumerated checkpoints");
    Ok(set)
}
