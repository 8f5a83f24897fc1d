use std::path::PathBuf;

use serde::Serialize;

use crate::backup::{BackupPlan, select_backups};
use crate::checkpoint::enumerate;
use crate::config::Settings;
use crate::error::Result;
use crate::retention::{RetentionPlan, select_retention};
use crate::storage::Storage;

/// Everything a run intends to do, computed before anything is touched.
#[derive(Debug, Clone, Serialize)]
pub struct Plans {
    pub checkpoint_dir: PathBuf,
    pub backup_dir: Option<PathBuf>,
    /// `None` when no backup dir is configured.
    pub backup: Option<BackupPlan>,
    pub retention: RetentionPlan,
}

impl Plans {
    pub fn is_noop(&self) -> bool {
        self.retention.is_noop() && self.backup.as_ref().is_none_or(BackupPlan::is_noop)
    }
}

/// Validates `settings`, scans both directories and computes the copy and
/// delete plans. Fails before any prompt if retention cannot be satisfied.
pub fn build_plans<S: Storage + ?Sized>(storage: &S, settings: &Settings) -> Result<Plans> {
    settings.validate(storage)?;

    let source = enumerate(storage, &settings.checkpoint_dir)?;
    tracing::info!(
        dir = %settings.checkpoint_dir.display(),
        count = source.len(),
        latest = source.latest().map(|c| c.name.as_str()).unwrap_or("-"),
        "scanned checkpoint dir"
    );

    let backup = match settings.backup_dir.as_deref() {
        Some(dir) => {
            let backups = enumerate(storage, dir)?;
            tracing::info!(dir = %dir.display(), count = backups.len(), "scanned backup dir");
            Some(select_backups(&source, &backups, settings.backup_interval)?)
        }
        None => None,
    };
    let retention = select_retention(&source, settings.keep)?;

    Ok(Plans {
        checkpoint_dir: settings.checkpoint_dir.clone(),
        backup_dir: settings.backup_dir.clone(),
        backup,
        retention,
    })
}
