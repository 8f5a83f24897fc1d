use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::planner::Plans;
use crate::prompt::Prompt;
use crate::report::{format_backup_report, format_elapsed_hms, format_retention_report};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Copy,
    Delete,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Copy => "copy",
            Phase::Delete => "delete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Report {
        text: String,
    },
    PhaseSkipped {
        phase: Phase,
        reason: String,
    },
    ItemStarted {
        phase: Phase,
        name: String,
        path: PathBuf,
    },
    ItemFinished {
        phase: Phase,
        name: String,
        ok: bool,
        error: Option<String>,
        elapsed_ms: u128,
    },
    RunDone {
        ok: bool,
        error: Option<String>,
    },
}

pub trait RunSink {
    fn emit(&self, ev: RunEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report both plans without prompting or touching anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub copy_confirmed: bool,
    pub delete_confirmed: bool,
    pub copied: Vec<String>,
    pub deleted: Vec<String>,
}

/// Prints reports and progress to stdout and a summary at the end.
#[derive(Default)]
pub struct StdoutSink {
    state: Mutex<StdoutSinkState>,
}

#[derive(Default)]
struct StdoutSinkState {
    started_at: Option<Instant>,
    copied: usize,
    deleted: usize,
    failed: Vec<String>,
}

impl RunSink for StdoutSink {
    fn emit(&self, ev: RunEvent) {
        match ev {
            RunEvent::Report { text } => println!("\n{}", text.trim_end()),
            RunEvent::PhaseSkipped { phase, reason } => println!("SKIP {phase}: {reason}"),
            RunEvent::ItemStarted { phase, name, path } => {
                if let Ok(mut s) = self.state.lock() {
                    s.started_at.get_or_insert_with(Instant::now);
                }
                match phase {
                    Phase::Copy => println!("Copying {name} to {}", path.display()),
                    Phase::Delete => println!("Deleting {name}"),
                }
            }
            RunEvent::ItemFinished {
                phase,
                name,
                ok,
                error,
                elapsed_ms,
            } => {
                if let Ok(mut s) = self.state.lock() {
                    match (ok, phase) {
                        (true, Phase::Copy) => s.copied += 1,
                        (true, Phase::Delete) => s.deleted += 1,
                        (false, _) => s.failed.push(name.clone()),
                    }
                }
                if ok {
                    println!("DONE: {phase} {name} ({elapsed_ms}ms)");
                } else {
                    println!(
                        "FAIL: {phase} {name} ({elapsed_ms}ms) {}",
                        error.unwrap_or_default()
                    );
                }
            }
            RunEvent::RunDone { ok, error } => {
                if let Ok(mut s) = self.state.lock() {
                    let wall = s.started_at.map(|t| t.elapsed()).unwrap_or_default();
                    println!("SUMMARY:");
                    println!("  status: {}", if ok { "ok" } else { "failed" });
                    println!("  copied: {}", s.copied);
                    println!("  deleted: {}", s.deleted);
                    println!("  elapsed: {}", format_elapsed_hms(wall.as_secs()));
                    if !s.failed.is_empty() {
                        println!("  failed: {}", s.failed.join(", "));
                    }
                    if let Some(e) = error {
                        println!("  error: {e}");
                    }
                    *s = StdoutSinkState::default();
                }
            }
        }
    }
}

/// Reports both plans, asks for confirmation of each, then copies and only
/// afterwards deletes. The first failing copy or delete ends the run.
pub fn execute<S, P>(
    storage: &S,
    prompt: &mut P,
    sink: &dyn RunSink,
    plans: &Plans,
    opts: RunOptions,
) -> Result<RunSummary>
where
    S: Storage + ?Sized,
    P: Prompt + ?Sized,
{
    let mut summary = RunSummary::default();

    let mut copy_target = None;
    match (plans.backup.as_ref(), plans.backup_dir.as_deref()) {
        (Some(plan), Some(dir)) => {
            sink.emit(RunEvent::Report {
                text: format_backup_report(plan, dir),
            });
            if plan.to_copy.is_empty() {
                sink.emit(skipped(Phase::Copy, "no checkpoints to back up"));
            } else if opts.dry_run {
                sink.emit(skipped(Phase::Copy, "dry run"));
            } else {
                summary.copy_confirmed = prompt.confirm(&format!(
                    "Copy {} checkpoints to {}?",
                    plan.to_copy.len(),
                    dir.display()
                ))?;
                if summary.copy_confirmed {
                    copy_target = Some((plan, dir));
                } else {
                    sink.emit(skipped(Phase::Copy, "declined"));
                }
            }
        }
        _ => sink.emit(skipped(Phase::Copy, "no backup_dir configured")),
    }

    let retention = &plans.retention;
    sink.emit(RunEvent::Report {
        text: format_retention_report(retention),
    });
    if retention.to_delete.is_empty() {
        sink.emit(skipped(Phase::Delete, "no checkpoints to delete"));
    } else if opts.dry_run {
        sink.emit(skipped(Phase::Delete, "dry run"));
    } else {
        summary.delete_confirmed = prompt.confirm(&format!(
            "Delete {} checkpoints from {}?",
            retention.to_delete.len(),
            plans.checkpoint_dir.display()
        ))?;
        if !summary.delete_confirmed {
            sink.emit(skipped(Phase::Delete, "declined; deleting nothing"));
        }
    }

    // Copies finish before the first delete starts.
    if let Some((plan, dir)) = copy_target {
        tracing::info!(count = plan.to_copy.len(), dest = %dir.display(), "copying checkpoints");
        summary.copied = run_phase(
            sink,
            Phase::Copy,
            &plan.to_copy,
            |cp| storage.copy_tree(&cp.path, dir).map(|_| ()),
            |cp| dir.join(&cp.name),
        )?;
    }

    if summary.delete_confirmed {
        tracing::info!(count = retention.to_delete.len(), "deleting checkpoints");
        let root = plans.checkpoint_dir.as_path();
        summary.deleted = run_phase(
            sink,
            Phase::Delete,
            &retention.to_delete,
            |cp| storage.remove_tree(root, &cp.path),
            |cp| cp.path.clone(),
        )?;
    }

    sink.emit(RunEvent::RunDone {
        ok: true,
        error: None,
    });
    Ok(summary)
}

fn skipped(phase: Phase, reason: &str) -> RunEvent {
    RunEvent::PhaseSkipped {
        phase,
        reason: reason.to_string(),
    }
}

fn run_phase(
    sink: &dyn RunSink,
    phase: Phase,
    items: &[Checkpoint],
    mut act: impl FnMut(&Checkpoint) -> Result<()>,
    target: impl Fn(&Checkpoint) -> PathBuf,
) -> Result<Vec<String>> {
    let mut done = Vec::with_capacity(items.len());
    for cp in items {
        sink.emit(RunEvent::ItemStarted {
            phase,
            name: cp.name.clone(),
            path: target(cp),
        });
        let start = Instant::now();
        let res = act(cp);
        let elapsed_ms = start.elapsed().as_millis();
        match res {
            Ok(()) => {
                sink.emit(RunEvent::ItemFinished {
                    phase,
                    name: cp.name.clone(),
                    ok: true,
                    error: None,
                    elapsed_ms,
                });
                done.push(cp.name.clone());
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(%phase, name = %cp.name, "{reason}");
                sink.emit(RunEvent::ItemFinished {
                    phase,
                    name: cp.name.clone(),
                    ok: false,
                    error: Some(reason.clone()),
                    elapsed_ms,
                });
                let err = Error::Interrupted {
                    phase: phase.as_str(),
                    completed: done,
                    failed: cp.name.clone(),
                    reason,
                };
                sink.emit(RunEvent::RunDone {
                    ok: false,
                    error: Some(err.to_string()),
                });
                return Err(err);
            }
        }
    }
    Ok(done)
}

/// Collects events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<RunEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl RunSink for MemorySink {
    fn emit(&self, ev: RunEvent) {
        if let Ok(mut e) = self.events.lock() {
            e.push(ev);
        }
    }
}
