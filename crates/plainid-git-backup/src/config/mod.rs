use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

use crate::error::{Error, Result};

pub const WILDCARD: &str = "*";
pub const DEFAULT_CONFIG_FILE: &str = ".git-backup.toml";

// Environment variables layered over the config file (file < env < flags).
const ENV_OVERLAY: &[(&str, &str)] = &[
    ("GIT_REPO", "git.repo"),
    ("GIT_TOKEN", "git.token"),
    ("GIT_BRANCH", "git.branch"),
    ("PLAINID_BASE_URL", "plainid.base_url"),
    ("PLAINID_CLIENT_ID", "plainid.client_id"),
    ("PLAINID_CLIENT_SECRET", "plainid.client_secret"),
    ("DRY_RUN", "dry_run"),
];

fn default_branch() -> String {
    "main".into()
}

fn default_author_name() -> String {
    "PlainID Git Backup".into()
}

fn default_author_email() -> String {
    "git-backup@plainid.com".into()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub repo: String,
    pub token: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub keep_scratch: bool,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            token: String::new(),
            branch: default_branch(),
            keep_scratch: false,
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl GitConfig {
    pub fn is_http_remote(&self) -> bool {
        let r = self.repo.trim().to_ascii_lowercase();
        r.starts_with("https://") || r.starts_with("http://")
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WorkspaceSelector {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EnvironmentSelector {
    pub id: String,
    pub workspaces: Vec<WorkspaceSelector>,
    pub identities: Option<Vec<String>>,
}

impl EnvironmentSelector {
    pub fn is_wildcard(&self) -> bool {
        self.id.trim() == WILDCARD
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlainIdConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub identities: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub envs: Vec<EnvironmentSelector>,
}

impl Default for PlainIdConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            identities: Vec::new(),
            timeout_secs: default_timeout_secs(),
            envs: Vec::new(),
        }
    }
}

impl PlainIdConfig {
    pub fn has_wildcard_environment(&self) -> bool {
        self.envs.iter().any(EnvironmentSelector::is_wildcard)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackupConfig {
    pub dry_run: bool,
    pub git: GitConfig,
    pub plainid: PlainIdConfig,
}

impl BackupConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        value
            .try_into()
            .map_err(|e| Error::config(format!("failed to deserialize config: {e}")))
    }

    pub fn validate(&self, needs_plainid: bool) -> Result<()> {
        let mut missing = Vec::<String>::new();
        let empty = |s: &str| s.trim().is_empty();

        if empty(&self.git.repo) {
            missing.push("git.repo".into());
        }
        if self.git.is_http_remote() && empty(&self.git.token) {
            missing.push("git.token".into());
        }
        if empty(&self.git.branch) {
            missing.push("git.branch".into());
        }

        if needs_plainid {
            let p = &self.plainid;
            if empty(&p.base_url) {
                missing.push("plainid.base_url".into());
            }
            if empty(&p.client_id) {
                missing.push("plainid.client_id".into());
            }
            if empty(&p.client_secret) {
                missing.push("plainid.client_secret".into());
            }
            if p.envs.is_empty() {
                missing.push("plainid.envs".into());
            }
            for (i, env) in p.envs.iter().enumerate() {
                if empty(&env.id) {
                    missing.push(format!("plainid.envs[{i}].id"));
                }
                if env.workspaces.is_empty() && !env.is_wildcard() {
                    missing.push(format!("plainid.envs[{i}].workspaces"));
                }
            }
            let any_env_identities = p
                .envs
                .iter()
                .any(|e| e.identities.as_ref().is_some_and(|v| !v.is_empty()));
            if p.identities.is_empty() && !any_env_identities && !p.has_wildcard_environment() {
                missing.push("plainid.identities".into());
            }
        }

        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::config(format!(
            "missing required configuration: {}",
            missing.join(", ")
        )))
    }

    pub fn secrets(&self) -> Vec<String> {
        [&self.git.token, &self.plainid.client_secret]
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

pub fn set_path(root: &mut Value, path: &str, v: Value) {
    let mut cur = root;
    let mut segs = path.split('.').peekable();
    while let Some(seg) = segs.next() {
        if !cur.is_table() {
            *cur = Value::Table(Default::default());
        }
        let Some(tbl) = cur.as_table_mut() else {
            return;
        };
        if segs.peek().is_none() {
            tbl.insert(seg.to_string(), v);
            return;
        }
        cur = tbl
            .entry(seg.to_string())
            .or_insert_with(|| Value::Table(Default::default()));
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

pub fn env_overlay(lookup: impl Fn(&str) -> Option<String>) -> Result<Value> {
    let mut out = Value::Table(Default::default());
    for (var, path) in ENV_OVERLAY {
        let Some(raw) = lookup(var) else {
            continue;
        };
        let v = if *path == "dry_run" {
            let b = parse_bool(&raw).ok_or_else(|| {
                Error::config(format!("invalid boolean in {var}: '{}'", raw.trim()))
            })?;
            Value::Boolean(b)
        } else {
            if raw.trim().is_empty() {
                continue;
            }
            Value::String(raw.trim().to_string())
        };
        set_path(&mut out, path, v);
    }
    Ok(out)
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        let base_path = resolve_ref_path(path, ext);
        out = load_value_inner(&base_path, stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load_file(path: &Path) -> Result<Value> {
    let mut stack = HashSet::<PathBuf>::new();
    load_value_inner(path, &mut stack)
}

pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    locate_in(explicit, Path::new("."), home.as_deref())
}

// Explicit path must exist; otherwise `cwd` beats `home` and no file is fine.
pub fn locate_in(
    explicit: Option<&Path>,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<Option<PathBuf>> {
    if let Some(p) = explicit {
        if !p.is_file() {
            return Err(Error::config(format!(
                "config file not found: {}",
                p.display()
            )));
        }
        return Ok(Some(p.to_path_buf()));
    }
    let mut candidates = vec![cwd.join(DEFAULT_CONFIG_FILE)];
    if let Some(home) = home {
        candidates.push(home.join(DEFAULT_CONFIG_FILE));
    }
    Ok(candidates.into_iter().find(|p| p.is_file()))
}

pub fn load(
    file: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
    overrides: Value,
) -> Result<BackupConfig> {
    let mut value = match file {
        Some(p) => load_file(p)?,
        None => Value::Table(Default::default()),
    };
    merge_values(&mut value, env_overlay(env)?);
    merge_values(&mut value, overrides);
    BackupConfig::from_value(value)
}
