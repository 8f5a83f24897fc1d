use serde::Serialize;

use crate::checkpoint::{Checkpoint, CheckpointSet};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionPlan {
    pub keep_count: usize,
    /// Oldest checkpoints, ascending.
    pub to_delete: Vec<Checkpoint>,
    /// Newest `keep_count` checkpoints, ascending.
    pub to_keep: Vec<Checkpoint>,
}

impl RetentionPlan {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty()
    }
}

/// Splits `set` into the oldest checkpoints to delete and the newest
/// `keep_count` to keep.
pub fn select_retention(set: &CheckpointSet, keep_count: usize) -> Result<RetentionPlan> {
    if keep_count == 0 {
        return Err(Error::config("retention keep count must be at least 1"));
    }
    let found = set.len();
    if found < keep_count {
        return Err(Error::InsufficientCheckpoints {
            requested: keep_count,
            found,
        });
    }
    let (old, new) = set.as_slice().split_at(found - keep_count);
    Ok(RetentionPlan {
        keep_count,
        to_delete: old.to_vec(),
        to_keep: new.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn set_of(steps: &[u64]) -> CheckpointSet {
        CheckpointSet::from_checkpoints(
            "/ckpt",
            steps.iter().map(|s| Checkpoint {
                step: *s,
                name: format!("global_step{s}"),
                path: PathBuf::from(format!("/ckpt/global_step{s}")),
                modified: Default::default(),
            }),
        )
    }

    fn steps(cps: &[Checkpoint]) -> Vec<u64> {
        cps.iter().map(|c| c.step).collect()
    }

    #[test]
    fn keeps_newest_and_deletes_the_rest_in_order() {
        let set = set_of(&[144, 288, 432, 576, 720, 864, 1008]);
        let plan = select_retention(&set, 3).expect("plan");
        assert_eq!(steps(&plan.to_delete), vec![144, 288, 432, 576]);
        assert_eq!(steps(&plan.to_keep), vec![720, 864, 1008]);

        let mut joined = plan.to_delete.clone();
        joined.extend(plan.to_keep.clone());
        assert_eq!(joined, set.as_slice());
    }

    #[test]
    fn exact_count_deletes_nothing() {
        let set = set_of(&[1, 2, 3]);
        let plan = select_retention(&set, 3).expect("plan");
        assert!(plan.is_noop());
        assert_eq!(steps(&plan.to_keep), vec![1, 2, 3]);
    }

    #[test]
    fn too_few_checkpoints_is_an_error() {
        let set = set_of(&[1, 2]);
        let err = select_retention(&set, 5).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCheckpoints {
                requested: 5,
                found: 2
            }
        ));
    }

    #[test]
    fn empty_set_with_keep_one_is_an_error() {
        let err = select_retention(&set_of(&[]), 1).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCheckpoints {
                requested: 1,
                found: 0
            }
        ));
    }

    #[test]
    fn zero_keep_count_is_rejected() {
        let err = select_retention(&set_of(&[1]), 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn partition_sizes_hold_for_every_keep_count() {
        let all = [3u64, 9, 27, 81, 243, 729];
        let set = set_of(&all);
        for k in 1..=all.len() {
            let plan = select_retention(&set, k).expect("plan");
            assert_eq!(plan.to_keep.len(), k);
            assert_eq!(plan.to_delete.len(), all.len() - k);
        }
    }
}
