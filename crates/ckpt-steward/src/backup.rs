use serde::Serialize;

use crate::checkpoint::{Checkpoint, CheckpointSet};
use crate::error::{Error, Result};

/// Where the backup scan resumes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupCursor {
    pub step: u64,
    /// Name of the newest checkpoint in the backup store.
    pub name: String,
    /// Index of the matching source checkpoint, `None` when it has since
    /// been removed from the source directory.
    pub source_index: Option<usize>,
    pub lag: Option<BackupLag>,
}

/// How far the newest backup trails the newest source checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupLag {
    pub checkpoints: usize,
    pub head: String,
    pub seconds: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupPlan {
    pub interval: u64,
    pub backup_count: usize,
    pub cursor: Option<BackupCursor>,
    /// Ascending; each entry is at least `interval` steps past the previous
    /// selection (or the cursor).
    pub to_copy: Vec<Checkpoint>,
}

impl BackupPlan {
    pub fn cursor_step(&self) -> u64 {
        self.cursor.as_ref().map(|c| c.step).unwrap_or(0)
    }

    pub fn is_noop(&self) -> bool {
        self.to_copy.is_empty()
    }
}

/// Greedy single pass over `source`: pick the first checkpoint that clears
/// `interval` steps past the last pick, starting from the newest backup.
pub fn select_backups(
    source: &CheckpointSet,
    backups: &CheckpointSet,
    interval: u64,
) -> Result<BackupPlan> {
    if interval == 0 {
        return Err(Error::config("backup interval must be at least 1 step"));
    }
    let cps = source.as_slice();
    let cursor = backups.latest().map(|newest| locate_cursor(cps, newest));
    if let Some(c) = cursor.as_ref() {
        match c.source_index {
            Some(_) => tracing::info!(
                cursor = %c.name,
                behind = c.lag.as_ref().map(|l| l.checkpoints).unwrap_or(0),
                "resuming backups after newest backed-up checkpoint"
            ),
            None => tracing::warn!(
                cursor = %c.name,
                source = %source.dir.display(),
                "newest backup no longer exists in the source directory; resuming by step"
            ),
        }
    }

    let start = cursor.as_ref().and_then(|c| c.source_index).unwrap_or(0);
    let mut last = cursor.as_ref().map(|c| c.step).unwrap_or(0);
    let mut to_copy = Vec::new();
    for cp in &cps[start..] {
        let diff = cp.step.saturating_sub(last);
        if diff >= interval {
            to_copy.push(cp.clone());
            last = cp.step;
        } else {
            tracing::debug!(name = %cp.name, diff, interval, "below backup interval");
        }
    }

    Ok(BackupPlan {
        interval,
        backup_count: backups.len(),
        cursor,
        to_copy,
    })
}

fn locate_cursor(cps: &[Checkpoint], newest: &Checkpoint) -> BackupCursor {
    let source_index = cps.iter().position(|c| c.step == newest.step);
    // Timestamps come from the source entries, not the copy in the backup
    // store, whose mtime is the time of the copy.
    let lag = source_index.and_then(|i| {
        let head = cps.last()?;
        Some(BackupLag {
            checkpoints: cps.len() - 1 - i,
            head: head.name.clone(),
            seconds: (head.modified - cps[i].modified).num_seconds(),
        })
    });
    BackupCursor {
        step: newest.step,
        name: newest.name.clone(),
        source_index,
        lag,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn set_of(dir: &str, steps: &[u64]) -> CheckpointSet {
        CheckpointSet::from_checkpoints(
            dir,
            steps.iter().map(|s| Checkpoint {
                step: *s,
                name: format!("global_step{s}"),
                path: PathBuf::from(format!("{dir}/global_step{s}")),
                modified: Utc.timestamp_opt(*s as i64 * 10, 0).unwrap(),
            }),
        )
    }

    fn picked(plan: &BackupPlan) -> Vec<u64> {
        plan.to_copy.iter().map(|c| c.step).collect()
    }

    const SOURCE: &[u64] = &[100, 500, 2300, 2400, 4700, 5000];

    #[test]
    fn empty_backup_store_starts_from_step_zero() {
        let plan = select_backups(&set_of("/src", SOURCE), &set_of("/bak", &[]), 2300).unwrap();
        assert_eq!(picked(&plan), vec![2300, 4700]);
        assert!(plan.cursor.is_none());
        assert_eq!(plan.cursor_step(), 0);
    }

    #[test]
    fn resumes_after_newest_backup() {
        let plan =
            select_backups(&set_of("/src", SOURCE), &set_of("/bak", &[2300]), 2300).unwrap();
        assert_eq!(picked(&plan), vec![4700]);
        let cursor = plan.cursor.expect("cursor");
        assert_eq!(cursor.step, 2300);
        assert_eq!(cursor.source_index, Some(2));
        assert_eq!(
            cursor.lag,
            Some(BackupLag {
                checkpoints: 3,
                head: "global_step5000".into(),
                seconds: (5000 - 2300) * 10,
            })
        );
    }

    #[test]
    fn interval_is_measured_from_last_selection_not_neighbour() {
        let plan = select_backups(
            &set_of("/src", &[1000, 2000, 3000, 4000, 5000, 6000]),
            &set_of("/bak", &[]),
            2500,
        )
        .unwrap();
        assert_eq!(picked(&plan), vec![3000, 6000]);
    }

    #[test]
    fn cursor_missing_from_source_resumes_by_step() {
        // 2300 was backed up and later pruned from the source.
        let plan = select_backups(
            &set_of("/src", &[2400, 4700, 5000, 7000]),
            &set_of("/bak", &[2300]),
            2300,
        )
        .unwrap();
        assert_eq!(picked(&plan), vec![4700, 7000]);
        let cursor = plan.cursor.expect("cursor");
        assert_eq!(cursor.source_index, None);
        assert_eq!(cursor.lag, None);
    }

    #[test]
    fn backup_ahead_of_source_selects_nothing() {
        let plan =
            select_backups(&set_of("/src", &[100, 200]), &set_of("/bak", &[9000]), 50).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn cursor_is_never_reselected() {
        let plan = select_backups(&set_of("/src", &[5, 10]), &set_of("/bak", &[5]), 1).unwrap();
        assert_eq!(picked(&plan), vec![10]);
    }

    #[test]
    fn unit_interval_copies_everything_past_cursor() {
        let plan =
            select_backups(&set_of("/src", &[1, 2, 3, 4]), &set_of("/bak", &[2]), 1).unwrap();
        assert_eq!(picked(&plan), vec![3, 4]);
        assert_eq!(plan.backup_count, 1);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = select_backups(&set_of("/src", SOURCE), &set_of("/bak", &[]), 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
