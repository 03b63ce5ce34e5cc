use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::sync::{env_dir_suffix, safe_dir_name};
use crate::util;
use crate::vcs::Vcs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreScope {
    pub env_id: String,
    pub ws_id: String,
    pub ws_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub tag: String,
    pub target_dir: PathBuf,
    pub scope: Option<RestoreScope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub files_copied: usize,
    pub source: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub tag: Option<String>,
    pub target_dir: Option<PathBuf>,
    pub env_id: Option<String>,
    pub ws_id: Option<String>,
    pub ws_name: Option<String>,
}

impl RestoreOptions {
    pub fn into_request(self, dry_run: bool) -> Result<RestoreRequest> {
        let clean = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let tag = clean(self.tag);
        let target_dir = self.target_dir.filter(|p| !p.as_os_str().is_empty());
        let env_id = clean(self.env_id);
        let ws_id = clean(self.ws_id);

        if tag.is_some() && target_dir.is_none() {
            return Err(Error::config(
                "--target-dir is required when --tag is specified (non-interactive mode)",
            ));
        }
        if dry_run && (tag.is_none() || target_dir.is_none()) {
            return Err(Error::config(
                "both --tag and --target-dir are required when using dry-run with restore",
            ));
        }
        let scope = match (env_id, ws_id) {
            (Some(env_id), Some(ws_id)) => Some(RestoreScope {
                env_id,
                ws_id,
                ws_name: clean(self.ws_name),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::config(
                    "both --env-id and --ws-id must be provided together if one is specified",
                ));
            }
        };
        let (Some(tag), Some(target_dir)) = (tag, target_dir) else {
            return Err(Error::msg("interactive restore mode is not yet implemented"));
        };
        Ok(RestoreRequest {
            tag,
            target_dir,
            scope,
        })
    }
}

pub struct RestoreExtractor<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: Vcs + ?Sized> RestoreExtractor<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    pub fn checkout(&self, scratch: &Path, tag: &str) -> Result<()> {
        self.vcs.open_remote(scratch)?;
        self.vcs.fetch_tag(scratch, tag)?;
        self.vcs
            .checkout_tag(scratch, tag)
            .map_err(|e| e.context(format!("checkout of tag {tag}")))?;
        tracing::info!(tag, dir = %scratch.display(), "snapshot checked out");
        Ok(())
    }

    pub fn materialize(&self, scratch: &Path, req: &RestoreRequest) -> Result<RestoreOutcome> {
        util::ensure_dir(&req.target_dir)?;
        match &req.scope {
            None => {
                let files_copied = util::copy_tree(scratch, &req.target_dir)?;
                Ok(RestoreOutcome {
                    files_copied,
                    source: scratch.to_path_buf(),
                })
            }
            Some(scope) => copy_scope(scratch, scope, &req.target_dir)
                .map_err(|e| e.context(format!("restore from tag {}", req.tag))),
        }
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::fs(format!("failed to read dir {}: {e}", dir.display())))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::fs(format!("failed to read dir entry: {e}")))?;
        let ft = entry
            .file_type()
            .map_err(|e| Error::fs(format!("failed to stat {}: {e}", entry.path().display())))?;
        if ft.is_dir() && entry.file_name() != util::VCS_DIR {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn copy_scope(tree: &Path, scope: &RestoreScope, dest: &Path) -> Result<RestoreOutcome> {
    let suffix = env_dir_suffix(&scope.env_id);
    let mut ws_candidates = vec![safe_dir_name(&scope.ws_id)];
    if let Some(name) = scope.ws_name.as_deref().filter(|n| !n.trim().is_empty()) {
        ws_candidates.insert(0, safe_dir_name(name));
    }

    for env_dir in sorted_subdirs(tree)? {
        if !file_name(&env_dir).ends_with(&suffix) {
            continue;
        }
        let ws_dirs = sorted_subdirs(&env_dir)?;
        let hit = ws_candidates
            .iter()
            .find_map(|want| ws_dirs.iter().find(|d| &file_name(d) == want));
        let Some(ws_dir) = hit else {
            continue;
        };
        tracing::info!(source = %ws_dir.display(), target = %dest.display(), "copying workspace directory");
        let mut files_copied = util::copy_tree(ws_dir, dest)?;
        files_copied += util::copy_top_level_files(&env_dir, dest)?;
        return Ok(RestoreOutcome {
            files_copied,
            source: ws_dir.clone(),
        });
    }

    Err(Error::scope(format!(
        "could not find configuration for environment '{}' and workspace '{}'",
        scope.env_id, scope.ws_id
    )))
}
