use std::path::Path;

use crate::backup::BackupPlan;
use crate::error::{Error, Result};
use crate::planner::Plans;
use crate::retention::RetentionPlan;

pub fn format_elapsed_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn format_signed_hms(secs: i64) -> String {
    if secs < 0 {
        format!("-{}", format_elapsed_hms(secs.unsigned_abs()))
    } else {
        format_elapsed_hms(secs as u64)
    }
}

pub fn format_backup_report(plan: &BackupPlan, backup_dir: &Path) -> String {
    let mut out = String::new();
    match plan.cursor.as_ref() {
        Some(c) => {
            out.push_str(&format!(
                "# Latest checkpoint in {} is {}.\n",
                backup_dir.display(),
                c.name
            ));
            match c.lag.as_ref() {
                Some(lag) => out.push_str(&format!(
                    "It is {} checkpoints and {} behind {}.\n",
                    lag.checkpoints,
                    format_signed_hms(lag.seconds),
                    lag.head
                )),
                None => out.push_str(&format!(
                    "{} is no longer in the checkpoint dir; resuming after step {}.\n",
                    c.name, c.step
                )),
            }
        }
        None => out.push_str(&format!(
            "# Backup dir {} holds no checkpoints yet.\n",
            backup_dir.display()
        )),
    }
    out.push_str(&format!(
        "# Backup dir {} has {} checkpoints (interval {} steps).\n",
        backup_dir.display(),
        plan.backup_count,
        plan.interval
    ));
    if plan.to_copy.is_empty() {
        out.push_str("# With current settings there are no checkpoints to back up.\n");
        return out;
    }
    out.push_str(&format!(
        "# Copying {} checkpoints to {}:\n",
        plan.to_copy.len(),
        backup_dir.display()
    ));
    for cp in &plan.to_copy {
        out.push_str(&format!("{}\n", cp.path.display()));
    }
    out
}

pub fn format_retention_report(plan: &RetentionPlan) -> String {
    if plan.to_delete.is_empty() {
        return format!(
            "# No checkpoints to delete; all {} are kept.\n",
            plan.to_keep.len()
        );
    }
    let mut out = String::new();
    out.push_str(&format!("# Deleting {} checkpoints:\n", plan.to_delete.len()));
    for cp in &plan.to_delete {
        out.push_str(&format!("{}\n", cp.path.display()));
    }
    out.push_str(&format!(
        "# Keeping the latest {} checkpoints:\n",
        plan.keep_count
    ));
    for cp in &plan.to_keep {
        out.push_str(&format!("Keeping {}\n", cp.path.display()));
    }
    out
}

pub fn plans_json(plans: &Plans) -> Result<String> {
    serde_json::to_string_pretty(plans)
        .map_err(|e| Error::msg(format!("failed to encode plans: {e}")))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::backup::select_backups;
    use crate::checkpoint::{Checkpoint, CheckpointSet};
    use crate::retention::select_retention;

    fn set_of(dir: &str, steps: &[u64]) -> CheckpointSet {
        CheckpointSet::from_checkpoints(
            dir,
            steps.iter().map(|s| Checkpoint {
                step: *s,
                name: format!("global_step{s}"),
                path: PathBuf::from(format!("{dir}/global_step{s}")),
                modified: Utc.timestamp_opt(*s as i64 * 60, 0).unwrap(),
            }),
        )
    }

    #[test]
    fn hms_formatting() {
        assert_eq!(format_elapsed_hms(0), "00:00:00");
        assert_eq!(format_elapsed_hms(3725), "01:02:05");
        assert_eq!(format_signed_hms(-61), "-00:01:01");
    }

    #[test]
    fn backup_report_shows_lag_and_targets() {
        let src = set_of("/ckpt", &[2300, 4700, 5000]);
        let plan = select_backups(&src, &set_of("/bak", &[2300]), 2300).unwrap();
        let text = format_backup_report(&plan, Path::new("/bak"));
        assert!(text.contains("Latest checkpoint in /bak is global_step2300"));
        // (5000 - 2300) minutes = 45 hours.
        assert!(
            text.contains("2 checkpoints and 45:00:00 behind global_step5000"),
            "{text}"
        );
        assert!(text.contains("/ckpt/global_step4700\n"));
    }

    #[test]
    fn retention_report_lists_both_sides() {
        let plan = select_retention(&set_of("/ckpt", &[1, 2, 3]), 1).unwrap();
        let text = format_retention_report(&plan);
        assert!(text.starts_with("# Deleting 2 checkpoints:\n/ckpt/global_step1\n"));
        assert!(text.contains("Keeping /ckpt/global_step3"));
    }

    #[test]
    fn json_carries_steps() {
        let src = set_of("/ckpt", &[10, 20]);
        let plans = Plans {
            checkpoint_dir: "/ckpt".into(),
            backup_dir: None,
            backup: None,
            retention: select_retention(&src, 1).unwrap(),
        };
        let v: serde_json::Value = serde_json::from_str(&plans_json(&plans).unwrap()).unwrap();
        assert_eq!(v["retention"]["to_delete"][0]["step"], 10);
        assert!(v["backup"].is_null());
    }
}
