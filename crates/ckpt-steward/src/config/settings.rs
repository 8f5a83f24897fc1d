use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigDoc;
use crate::error::{Error, Result};
use crate::storage::Storage;

pub const DEFAULT_KEEP: usize = 5;
/// A save interval of 144 steps puts every 16th checkpoint in the backup.
pub const DEFAULT_BACKUP_INTERVAL: u64 = 2300;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    pub keep: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupConfig {
    pub dir: Option<String>,
    // Name of an env var holding the backup dir; used when `dir` is unset.
    pub dir_env: Option<String>,
    pub interval: Option<u64>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub keep: Option<usize>,
    pub backup_dir: Option<PathBuf>,
    pub backup_interval: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub checkpoint_dir: PathBuf,
    pub keep: usize,
    pub backup_dir: Option<PathBuf>,
    pub backup_interval: u64,
}

impl Settings {
    pub fn resolve(
        checkpoint_dir: PathBuf,
        doc: Option<&ConfigDoc>,
        overrides: Overrides,
    ) -> Result<Self> {
        Self::resolve_with_env(checkpoint_dir, doc, overrides, |k| std::env::var(k).ok())
    }

    pub fn resolve_with_env(
        checkpoint_dir: PathBuf,
        doc: Option<&ConfigDoc>,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let (retention, backup) = match doc {
            Some(doc) => (
                doc.deserialize_path::<RetentionConfig>("retention")?
                    .unwrap_or_default(),
                doc.deserialize_path::<BackupConfig>("backup")?
                    .unwrap_or_default(),
            ),
            None => Default::default(),
        };

        let file_backup_dir = backup
            .dir
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                let key = backup.dir_env.as_deref()?.trim();
                let v = env(key)?;
                let v = v.trim();
                (!v.is_empty()).then(|| PathBuf::from(v))
            });

        Ok(Self {
            checkpoint_dir,
            keep: overrides.keep.or(retention.keep).unwrap_or(DEFAULT_KEEP),
            backup_dir: overrides.backup_dir.or(file_backup_dir),
            backup_interval: overrides
                .backup_interval
                .or(backup.interval)
                .unwrap_or(DEFAULT_BACKUP_INTERVAL),
        })
    }

    /// Checks everything that must hold before any checkpoint is touched.
    pub fn validate<S: Storage + ?Sized>(&self, storage: &S) -> Result<()> {
        if self.keep == 0 {
            return Err(Error::config("cps_to_keep must be at least 1"));
        }
        if self.backup_interval == 0 {
            return Err(Error::config("backup_interval must be at least 1"));
        }
        if !storage.is_dir(&self.checkpoint_dir) {
            return Err(Error::NotADirectory(self.checkpoint_dir.clone()));
        }
        let Some(backup_dir) = self.backup_dir.as_deref() else {
            return Ok(());
        };
        if !storage.is_dir(backup_dir) {
            return Err(Error::NotADirectory(backup_dir.to_path_buf()));
        }
        if same_dir(&self.checkpoint_dir, backup_dir) {
            return Err(Error::config(format!(
                "backup_dir {} is the checkpoint directory itself",
                backup_dir.display()
            )));
        }
        Ok(())
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let a = a.canonicalize().unwrap_or_else(|_| a.to_path_buf());
    let b = b.canonicalize().unwrap_or_else(|_| b.to_path_buf());
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn doc(src: &str) -> ConfigDoc {
        ConfigDoc {
            path: PathBuf::from("/etc/steward/run.toml"),
            value: toml::from_str(src).expect("toml"),
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let s = Settings::resolve_with_env("/ckpt".into(), None, Overrides::default(), no_env)
            .expect("settings");
        assert_eq!(s.keep, DEFAULT_KEEP);
        assert_eq!(s.backup_interval, DEFAULT_BACKUP_INTERVAL);
        assert_eq!(s.backup_dir, None);
    }

    #[test]
    fn flags_override_file_values() {
        let d = doc("[retention]\nkeep = 8\n[backup]\ndir = \"/bak\"\ninterval = 1000\n");
        let s = Settings::resolve_with_env(
            "/ckpt".into(),
            Some(&d),
            Overrides {
                keep: Some(2),
                backup_dir: None,
                backup_interval: Some(50),
            },
            no_env,
        )
        .expect("settings");
        assert_eq!(s.keep, 2);
        assert_eq!(s.backup_interval, 50);
        assert_eq!(s.backup_dir, Some(PathBuf::from("/bak")));
    }

    #[test]
    fn dir_env_is_used_when_dir_missing() {
        let d = doc("[backup]\ndir_env = \"STEWARD_BACKUP_DIR\"\n");
        let s = Settings::resolve_with_env("/ckpt".into(), Some(&d), Overrides::default(), |k| {
            (k == "STEWARD_BACKUP_DIR").then(|| "/scratch/backups".to_string())
        })
        .expect("settings");
        assert_eq!(s.backup_dir, Some(PathBuf::from("/scratch/backups")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let d = doc("[retention]\nkeep_last = 3\n");
        let err = Settings::resolve_with_env("/ckpt".into(), Some(&d), Overrides::default(), no_env)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "unexpected err: {err}");
    }

    #[test]
    fn validate_checks_directories_and_counts() {
        let mem = MemoryStorage::new();
        mem.add_dir("/ckpt", 0).add_dir("/bak", 0);
        let mut s = Settings {
            checkpoint_dir: "/ckpt".into(),
            keep: 1,
            backup_dir: Some("/bak".into()),
            backup_interval: 10,
        };
        s.validate(&mem).expect("valid");

        s.backup_dir = Some("/missing".into());
        assert!(matches!(s.validate(&mem), Err(Error::NotADirectory(_))));

        s.backup_dir = Some("/ckpt".into());
        assert!(matches!(s.validate(&mem), Err(Error::Config(_))));

        s.backup_dir = None;
        s.keep = 0;
        assert!(matches!(s.validate(&mem), Err(Error::Config(_))));

        s.keep = 1;
        s.checkpoint_dir = "/elsewhere".into();
        assert!(matches!(s.validate(&mem), Err(Error::NotADirectory(_))));
    }
}
