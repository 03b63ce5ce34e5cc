use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Instant;

use crate::catalog::{ScopeFilter, Snapshot, SnapshotCatalog};
use crate::error::{Error, Result};
use crate::plainid::{ConfigSource, Inventory};
use crate::restore::{RestoreExtractor, RestoreOutcome, RestoreRequest};
use crate::scope::{ConcreteScope, ScopeSelector, resolve_scope};
use crate::snapshot::{Clock, SnapshotCommitter};
use crate::sync::{DirectorySynchronizer, SyncReport};
use crate::util;
use crate::vcs::{CheckoutKind, StagedChange, Vcs};

const SCRATCH_PREFIX: &str = "git-backup-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    ScopeResolved,
    TreeSynchronized,
    Committed,
    Tagged,
    Pushed,
    DryRunStopped,
    CheckedOut,
    Materialized,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Idle => "idle",
            RunStage::ScopeResolved => "scope-resolved",
            RunStage::TreeSynchronized => "tree-synchronized",
            RunStage::Committed => "committed",
            RunStage::Tagged => "tagged",
            RunStage::Pushed => "pushed",
            RunStage::DryRunStopped => "dry-run-stopped",
            RunStage::CheckedOut => "checked-out",
            RunStage::Materialized => "materialized",
            RunStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    StateReached {
        stage: RunStage,
        detail: String,
    },
    StateFailed {
        last: RunStage,
        step: String,
        error: String,
        scratch: Option<PathBuf>,
    },
    RunFinished {
        ok: bool,
        error: Option<String>,
        elapsed_ms: u128,
    },
}

pub trait RunSink: Send + Sync {
    fn emit(&self, ev: RunEvent);
}

#[derive(Default)]
pub struct StdoutSink {
    state: Mutex<StdoutSinkState>,
}

#[derive(Default)]
struct StdoutSinkState {
    stages: Vec<RunStage>,
    failed_step: Option<String>,
    scratch: Option<PathBuf>,
}

impl RunSink for StdoutSink {
    fn emit(&self, ev: RunEvent) {
        match ev {
            RunEvent::StateReached { stage, detail } => {
                if let Ok(mut s) = self.state.lock() {
                    s.stages.push(stage);
                }
                if detail.is_empty() {
                    println!("STATE: {stage}");
                } else {
                    println!("STATE: {stage} ({detail})");
                }
            }
            RunEvent::StateFailed {
                last,
                step,
                error,
                scratch,
            } => {
                println!("FAIL: {step} after {last}: {error}");
                if let Ok(mut s) = self.state.lock() {
                    s.failed_step = Some(step);
                    s.scratch = scratch;
                }
            }
            RunEvent::RunFinished {
                ok,
                error,
                elapsed_ms,
            } => {
                let mut summary = String::from("SUMMARY:\n");
                summary.push_str(&format!("  status: {}\n", if ok { "ok" } else { "failed" }));
                if let Ok(mut s) = self.state.lock() {
                    if !s.stages.is_empty() {
                        let path = s
                            .stages
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(" -> ");
                        summary.push_str(&format!("  stages: {path}\n"));
                    }
                    if let Some(step) = &s.failed_step {
                        summary.push_str(&format!("  failed_step: {step}\n"));
                    }
                    if let Some(p) = &s.scratch {
                        summary.push_str(&format!("  scratch: {}\n", p.display()));
                    }
                    *s = StdoutSinkState::default();
                }
                summary.push_str(&format!(
                    "  elapsed: {}\n",
                    format_elapsed_hms((elapsed_ms / 1000) as u64)
                ));
                if let Some(e) = error {
                    summary.push_str(&format!("  error: {e}\n"));
                }
                print!("{summary}");
            }
        }
    }
}

#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RunEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl RunSink for ChannelSink {
    fn emit(&self, ev: RunEvent) {
        let _ = self.tx.send(ev);
    }
}

pub struct NullSink;

impl RunSink for NullSink {
    fn emit(&self, _ev: RunEvent) {}
}

#[derive(Clone)]
pub struct RunCtx {
    pub dry_run: bool,
    pub sink: Arc<dyn RunSink>,
    pub scratch_parent: Option<PathBuf>,
    pub keep_scratch: bool,
    stage: RunStage,
}

impl RunCtx {
    pub fn new(dry_run: bool, sink: Arc<dyn RunSink>) -> Self {
        Self {
            dry_run,
            sink,
            scratch_parent: None,
            keep_scratch: false,
            stage: RunStage::Idle,
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    fn reach(&mut self, stage: RunStage, detail: impl Into<String>) {
        self.stage = stage;
        let detail = detail.into();
        tracing::info!(stage = %stage, "{detail}");
        self.sink.emit(RunEvent::StateReached { stage, detail });
    }

    fn scratch(&self) -> Result<tempfile::TempDir> {
        let mut b = tempfile::Builder::new();
        b.prefix(SCRATCH_PREFIX);
        let res = match &self.scratch_parent {
            Some(parent) => {
                util::ensure_dir(parent)?;
                b.tempdir_in(parent)
            }
            None => b.tempdir(),
        };
        res.map_err(|e| Error::fs(format!("failed to create scratch directory: {e}")))
    }

    // Run `body` in a fresh scratch directory. The directory is removed on
    // success unless `keep`; it is always kept after a failure.
    fn in_scratch<T>(
        &mut self,
        keep: bool,
        body: impl FnOnce(&mut Self, &Path) -> std::result::Result<T, (String, Error)>,
    ) -> Result<(T, Option<PathBuf>)> {
        let started = Instant::now();
        let dir = self.scratch()?;
        tracing::info!(dir = %dir.path().display(), "scratch directory created");
        let res = body(self, dir.path());
        let elapsed_ms = started.elapsed().as_millis();
        match res {
            Ok(v) => {
                let kept = if keep {
                    Some(dir.keep())
                } else {
                    None
                };
                self.sink.emit(RunEvent::RunFinished {
                    ok: true,
                    error: None,
                    elapsed_ms,
                });
                Ok((v, kept))
            }
            Err((step, e)) => {
                let kept = dir.keep();
                tracing::warn!(dir = %kept.display(), "scratch directory retained after failure");
                let last = self.stage;
                self.stage = RunStage::Failed;
                let err = e.context(&step);
                self.sink.emit(RunEvent::StateFailed {
                    last,
                    step: step.clone(),
                    error: err.to_string(),
                    scratch: Some(kept),
                });
                self.sink.emit(RunEvent::RunFinished {
                    ok: false,
                    error: Some(err.to_string()),
                    elapsed_ms,
                });
                Err(err)
            }
        }
    }
}

fn at<T>(step: &str, r: Result<T>) -> std::result::Result<T, (String, Error)> {
    r.map_err(|e| (step.to_string(), e))
}

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub scope: ConcreteScope,
    pub sync: SyncReport,
    pub tag: String,
    pub commit: String,
    pub message: String,
    pub changes: Vec<StagedChange>,
    pub pushed: bool,
    pub tree_digest: String,
    pub scratch: Option<PathBuf>,
}

impl BackupReport {
    pub fn summary(&self) -> String {
        let count = |c: char| self.changes.iter().filter(|x| x.status == c).count();
        let mut out = format!(
            "Backup {} at commit {} ({} workspace(s)): {} added, {} modified, {} deleted",
            self.tag,
            short_id(&self.commit),
            self.sync.processed.len(),
            count('A'),
            count('M'),
            count('D'),
        );
        if !self.pushed {
            out.push_str(" [dry run: not pushed]");
        }
        out
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

pub struct BackupDeps<'a, S: ?Sized, V: ?Sized, C: ?Sized> {
    pub source: &'a S,
    pub vcs: &'a V,
    pub clock: &'a C,
    pub tag_retries: u32,
}

pub fn run_backup<S, V, C>(
    ctx: &mut RunCtx,
    selector: &ScopeSelector,
    deps: &BackupDeps<'_, S, V, C>,
) -> Result<BackupReport>
where
    S: ConfigSource + ?Sized,
    V: Vcs + ?Sized,
    C: Clock + ?Sized,
{
    ctx.stage = RunStage::Idle;
    let dry_run = ctx.dry_run;
    if dry_run {
        tracing::info!("dry run: configuration is fetched and committed locally but not pushed");
    }
    // A dry run's commit and tag exist only in the scratch checkout.
    let keep = ctx.keep_scratch || dry_run;
    let (mut report, scratch) = ctx.in_scratch(keep, |ctx, dir| {
        let scope = at("resolve scope", resolve_scope(selector, deps.source))?;
        if scope.is_empty() {
            tracing::warn!("resolved scope contains no workspaces");
        }
        ctx.reach(
            RunStage::ScopeResolved,
            format!(
                "{} environment(s), {} workspace(s)",
                scope.environments.len(),
                scope.pairs().len()
            ),
        );

        let checkout = at("open repository", deps.vcs.clone_or_open(dir))?;
        if checkout == CheckoutKind::Initialized {
            tracing::info!("remote branch missing; the first push creates it");
        }
        let sync = at(
            "synchronize tree",
            DirectorySynchronizer::new(deps.source, dir).sync_scope(&scope),
        )?;
        let tree_digest = at("synchronize tree", util::tree_digest(dir))?;
        ctx.reach(
            RunStage::TreeSynchronized,
            format!("{} file(s) written", sync.files_written),
        );

        let mut committer = SnapshotCommitter::new(deps.vcs, deps.clock);
        committer.tag_retries = deps.tag_retries;
        let commit = at("commit", committer.commit(dir, &sync.processed))?;
        ctx.reach(RunStage::Committed, short_id(&commit.commit).to_string());

        let (tag, _) = at("tag", committer.tag(dir, &commit))?;
        ctx.reach(RunStage::Tagged, tag.clone());

        if dry_run {
            ctx.reach(RunStage::DryRunStopped, "push skipped");
        } else {
            at("push", committer.push(dir, &tag, commit.new_history))?;
            ctx.reach(RunStage::Pushed, format!("branch {}", deps.vcs.branch()));
        }

        Ok(BackupReport {
            scope,
            sync,
            tag,
            commit: commit.commit,
            message: commit.message,
            changes: commit.changes,
            pushed: !dry_run,
            tree_digest,
            scratch: None,
        })
    })?;
    report.scratch = scratch;
    Ok(report)
}

pub fn run_list<V: Vcs + ?Sized>(
    ctx: &mut RunCtx,
    vcs: &V,
    filter: Option<&ScopeFilter>,
    limit: usize,
) -> Result<Vec<Snapshot>> {
    ctx.stage = RunStage::Idle;
    let keep = ctx.keep_scratch;
    let (snaps, _) = ctx.in_scratch(keep, |_, dir| {
        at(
            "list snapshots",
            SnapshotCatalog::new(vcs).list(dir, filter, limit),
        )
    })?;
    Ok(snaps)
}

pub fn run_restore<V: Vcs + ?Sized>(
    ctx: &mut RunCtx,
    vcs: &V,
    req: &RestoreRequest,
) -> Result<RestoreOutcome> {
    ctx.stage = RunStage::Idle;
    let dry_run = ctx.dry_run;
    let keep = ctx.keep_scratch;
    let (outcome, _) = ctx.in_scratch(keep, |ctx, dir| {
        let extractor = RestoreExtractor::new(vcs);
        at("checkout snapshot", extractor.checkout(dir, &req.tag))?;
        ctx.reach(RunStage::CheckedOut, req.tag.clone());

        let outcome = at("materialize", extractor.materialize(dir, req))?;
        ctx.reach(
            RunStage::Materialized,
            format!(
                "{} file(s) into {}",
                outcome.files_copied,
                req.target_dir.display()
            ),
        );
        if dry_run {
            tracing::info!("dry run: configuration checked out to target directory, nothing further done");
        } else {
            // Pushing restored files back into PlainID is not implemented.
            tracing::info!("configuration checked out to target directory");
        }
        Ok(outcome)
    })?;
    Ok(outcome)
}

pub fn lookup_workspace_name<I: Inventory + ?Sized>(
    inventory: &I,
    env_id: &str,
    ws_id: &str,
) -> Result<Option<String>> {
    let live = inventory.list_workspaces(env_id)?;
    Ok(live.into_iter().find(|w| w.id == ws_id).map(|w| w.name))
}

fn format_elapsed_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
