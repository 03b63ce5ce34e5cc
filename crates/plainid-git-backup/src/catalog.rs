use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::snapshot::{parse_scope_tokens, parse_tag};
use crate::vcs::{TagRef, Vcs};

pub const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub tag: String,
    pub created: DateTime<Utc>,
    pub commit: String,
    pub message: String,
    pub scope: Vec<(String, String)>,
}

impl Snapshot {
    fn distinct(&self, pick: impl Fn(&(String, String)) -> &str) -> Vec<&str> {
        let mut out = Vec::<&str>::new();
        for p in &self.scope {
            let v = pick(p);
            if !out.contains(&v) {
                out.push(v);
            }
        }
        out
    }

    pub fn env_ids(&self) -> Vec<&str> {
        self.distinct(|p| p.0.as_str())
    }

    pub fn ws_ids(&self) -> Vec<&str> {
        self.distinct(|p| p.1.as_str())
    }
}

// Keeps snapshots whose message carries both `env:<env_id>` and
// `ws:<ws_id>` as whole tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    pub env_id: String,
    pub ws_id: String,
}

impl ScopeFilter {
    pub fn new(env_id: impl Into<String>, ws_id: impl Into<String>) -> Self {
        Self {
            env_id: env_id.into(),
            ws_id: ws_id.into(),
        }
    }

    pub fn from_options(env_id: Option<&str>, ws_id: Option<&str>) -> Result<Option<Self>> {
        fn clean(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }
        match (clean(env_id), clean(ws_id)) {
            (Some(e), Some(w)) => Ok(Some(Self::new(e, w))),
            (None, None) => Ok(None),
            _ => Err(Error::config(
                "--env-id and --ws-id must be provided together",
            )),
        }
    }

    pub fn matches(&self, message: &str) -> bool {
        let env_tok = format!("env:{}", self.env_id);
        let ws_tok = format!("ws:{}", self.ws_id);
        let mut has_env = false;
        let mut has_ws = false;
        for tok in message.split_whitespace() {
            has_env |= tok == env_tok;
            has_ws |= tok == ws_tok;
        }
        has_env && has_ws
    }
}

pub fn snapshots_from_tags(tags: Vec<TagRef>, filter: Option<&ScopeFilter>) -> Vec<Snapshot> {
    let mut out = tags
        .into_iter()
        .filter_map(|t| {
            let created = parse_tag(&t.name)?;
            let message = t.message.unwrap_or_default();
            if let Some(f) = filter
                && !f.matches(&message)
            {
                return None;
            }
            Some(Snapshot {
                scope: parse_scope_tokens(&message),
                tag: t.name,
                created,
                commit: t.commit,
                message,
            })
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.tag.cmp(&a.tag)));
    out
}

pub struct SnapshotCatalog<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: Vcs + ?Sized> SnapshotCatalog<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn list(
        &self,
        scratch: &Path,
        filter: Option<&ScopeFilter>,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        self.vcs.open_remote(scratch)?;
        self.vcs
            .fetch_tags(scratch)
            .map_err(|e| e.context("fetch snapshot tags"))?;
        let tags = self.vcs.list_tags(scratch)?;
        tracing::debug!(tags = tags.len(), "fetched tags");
        let mut snaps = snapshots_from_tags(tags, filter);
        snaps.truncate(limit);
        Ok(snaps)
    }
}

pub fn format_listing(snaps: &[Snapshot], filter: Option<&ScopeFilter>) -> String {
    let mut out = String::new();
    if snaps.is_empty() {
        match filter {
            Some(f) => {
                let _ = writeln!(
                    out,
                    "No backups found for environment {} and workspace {}",
                    f.env_id, f.ws_id
                );
            }
            None => out.push_str("No backups found\n"),
        }
        return out;
    }
    match filter {
        Some(f) => {
            let _ = writeln!(
                out,
                "Recent backups for environment {} and workspace {}:\n",
                f.env_id, f.ws_id
            );
        }
        None => out.push_str("Recent backups:\n"),
    }
    for (i, s) in snaps.iter().enumerate() {
        let created = s.created.format("%Y-%m-%d %H:%M:%S");
        let (envs, wss) = (s.env_ids(), s.ws_ids());
        if envs.is_empty() || wss.is_empty() {
            let _ = writeln!(out, "{}. {} (created: {created})", i + 1, s.tag);
        } else {
            let _ = writeln!(
                out,
                "{}. {} (env: {}, ws: {}, created: {created})",
                i + 1,
                s.tag,
                envs.join(","),
                wss.join(",")
            );
        }
    }
    out
}
