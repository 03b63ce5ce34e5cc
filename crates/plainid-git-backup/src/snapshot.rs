use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::vcs::{StagedChange, Vcs};

pub const TAG_FORMAT: &str = "%Y%m%d%H%M%S";
pub const LEGACY_TAG_FORMAT: &str = "%Y%m%d-%H%M%S";
pub const COMMIT_PREFIX: &str = "Backup PlainID configuration for:";
pub const TAG_MESSAGE_PREFIX: &str = "Backup tag for:";
pub const DEFAULT_TAG_RETRIES: u32 = 5;

pub fn format_tag(ts: DateTime<Utc>) -> String {
    ts.format(TAG_FORMAT).to_string()
}

pub fn parse_tag(name: &str) -> Option<DateTime<Utc>> {
    let name = name.trim();
    let fmt = match name.len() {
        14 if name.bytes().all(|b| b.is_ascii_digit()) => TAG_FORMAT,
        15 if name.as_bytes()[8] == b'-' => LEGACY_TAG_FORMAT,
        _ => return None,
    };
    NaiveDateTime::parse_from_str(name, fmt)
        .ok()
        .map(|t| Utc.from_utc_datetime(&t))
}

pub fn commit_message(pairs: &[(String, String)]) -> String {
    let mut msg = COMMIT_PREFIX.to_string();
    for (env, ws) in pairs {
        msg.push_str(&format!(" env:{env} ws:{ws}"));
    }
    msg
}

pub fn tag_message(commit_message: &str) -> String {
    format!("{TAG_MESSAGE_PREFIX} {commit_message}")
}

pub fn parse_scope_tokens(message: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut env: Option<&str> = None;
    for tok in message.split_whitespace() {
        if let Some(e) = tok.strip_prefix("env:") {
            env = Some(e);
        } else if let Some(w) = tok.strip_prefix("ws:")
            && let Some(e) = env.take()
        {
            out.push((e.to_string(), w.to_string()));
        }
    }
    out
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, d: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub commit: String,
    pub message: String,
    pub changes: Vec<StagedChange>,
    pub new_history: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub tag: String,
    pub commit: String,
    pub message: String,
    pub changes: Vec<StagedChange>,
    pub pushed: bool,
}

pub struct SnapshotCommitter<'a, V: Vcs + ?Sized, C: Clock + ?Sized> {
    vcs: &'a V,
    clock: &'a C,
    pub tag_retries: u32,
}

impl<'a, V: Vcs + ?Sized, C: Clock + ?Sized> SnapshotCommitter<'a, V, C> {
    pub fn new(vcs: &'a V, clock: &'a C) -> Self {
        Self {
            vcs,
            clock,
            tag_retries: DEFAULT_TAG_RETRIES,
        }
    }

    pub fn commit(&self, dir: &Path, pairs: &[(String, String)]) -> Result<CommitOutcome> {
        let new_history = !self.vcs.has_head(dir)?;
        self.vcs.stage_all(dir)?;
        let changes = self.vcs.staged_changes(dir)?;
        let message = commit_message(pairs);
        let commit = self
            .vcs
            .commit(dir, &message, self.clock.now().trunc_subsecs(0))?;
        tracing::info!(commit = %commit, changes = changes.len(), "changes committed");
        if new_history {
            self.vcs.create_branch_ref(dir, &commit)?;
            tracing::info!(branch = %self.vcs.branch(), "created branch");
        }
        Ok(CommitOutcome {
            commit,
            message,
            changes,
            new_history,
        })
    }

    // Pick a tag name no one has used yet, waiting for the clock to move on
    // after a collision.
    pub fn next_free_tag(&self, dir: &Path) -> Result<(String, DateTime<Utc>)> {
        let mut attempts = 0u32;
        loop {
            let now = self.clock.now().trunc_subsecs(0);
            let name = format_tag(now);
            if !self.vcs.tag_exists(dir, &name)? {
                return Ok((name, now));
            }
            if attempts >= self.tag_retries {
                return Err(Error::vcs(format!(
                    "tag {name} already exists and no free tag name was found after {} attempts",
                    attempts + 1
                )));
            }
            attempts += 1;
            tracing::warn!(tag = %name, "tag already exists; waiting for the next second");
            let wait = (now + chrono::Duration::seconds(1)) - self.clock.now();
            self.clock
                .sleep(wait.to_std().unwrap_or(Duration::from_millis(50)));
        }
    }

    pub fn tag(&self, dir: &Path, commit: &CommitOutcome) -> Result<(String, DateTime<Utc>)> {
        let (name, when) = self.next_free_tag(dir)?;
        self.vcs.create_annotated_tag(
            dir,
            &name,
            &commit.commit,
            &tag_message(&commit.message),
            when,
        )?;
        tracing::info!(tag = %name, "created tag");
        Ok((name, when))
    }

    // Push branch and tag together; a brand-new history is force pushed.
    pub fn push(&self, dir: &Path, tag: &str, force: bool) -> Result<()> {
        let branch = self.vcs.branch();
        let refspecs = vec![
            format!("refs/heads/{branch}:refs/heads/{branch}"),
            format!("refs/tags/{tag}:refs/tags/{tag}"),
        ];
        self.vcs.push(dir, &refspecs, force)
    }

    pub fn snapshot(
        &self,
        dir: &Path,
        pairs: &[(String, String)],
        dry_run: bool,
    ) -> Result<SnapshotOutcome> {
        let commit = self.commit(dir, pairs)?;
        let (tag, _) = self.tag(dir, &commit)?;
        if dry_run {
            tracing::info!("dry run: skipping push to remote repository");
        } else {
            self.push(dir, &tag, commit.new_history)?;
        }
        Ok(SnapshotOutcome {
            tag,
            commit: commit.commit,
            message: commit.message,
            changes: commit.changes,
            pushed: !dry_run,
        })
    }
}
