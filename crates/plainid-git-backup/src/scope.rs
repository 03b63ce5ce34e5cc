use std::collections::HashSet;

use crate::config::{PlainIdConfig, WILDCARD};
use crate::error::{Error, Result};
use crate::plainid::Inventory;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSelector {
    pub id: String,
    pub workspaces: Vec<String>,
    pub identities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSelector {
    pub environments: Vec<EnvSelector>,
    pub identities: Vec<String>,
}

impl ScopeSelector {
    pub fn from_config(cfg: &PlainIdConfig) -> Self {
        Self {
            environments: cfg
                .envs
                .iter()
                .map(|e| EnvSelector {
                    id: e.id.trim().to_string(),
                    workspaces: e.workspaces.iter().map(|w| w.id.trim().to_string()).collect(),
                    identities: e.identities.clone(),
                })
                .collect(),
            identities: cfg.identities.clone(),
        }
    }

    pub fn has_wildcard_environment(&self) -> bool {
        self.environments.iter().any(|e| is_wildcard(&e.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub workspaces: Vec<Workspace>,
    pub identities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcreteScope {
    pub environments: Vec<Environment>,
}

impl ConcreteScope {
    pub fn is_empty(&self) -> bool {
        self.environments.iter().all(|e| e.workspaces.is_empty())
    }

    pub fn pairs(&self) -> Vec<(String, String)> {
        self.environments
            .iter()
            .flat_map(|e| e.workspaces.iter().map(|w| (e.id.clone(), w.id.clone())))
            .collect()
    }
}

fn is_wildcard(token: &str) -> bool {
    token.trim() == WILDCARD
}

fn contains_wildcard(tokens: &[String]) -> bool {
    tokens.iter().any(|t| is_wildcard(t))
}

// Resolve `selector` against live inventory. Declared ids without a live
// match are dropped with a warning; inventory failures abort.
pub fn resolve_scope<I: Inventory + ?Sized>(
    selector: &ScopeSelector,
    inventory: &I,
) -> Result<ConcreteScope> {
    let live_envs = inventory
        .list_environments()
        .map_err(|e| Error::resolution(format!("failed to list environments: {e}")))?;

    let mut picked = Vec::<(EnvSelector, String)>::new();
    if selector.has_wildcard_environment() {
        for env in live_envs {
            picked.push((
                EnvSelector {
                    id: env.id,
                    workspaces: vec![WILDCARD.to_string()],
                    identities: Some(vec![WILDCARD.to_string()]),
                },
                env.name,
            ));
        }
    } else {
        let mut seen = HashSet::<&str>::new();
        for declared in &selector.environments {
            if !seen.insert(declared.id.as_str()) {
                tracing::warn!(env = %declared.id, "environment declared twice; keeping the first");
                continue;
            }
            match live_envs.iter().find(|e| e.id == declared.id) {
                Some(live) => picked.push((declared.clone(), live.name.clone())),
                None => tracing::warn!(env = %declared.id, "environment not found in PlainID; skipping"),
            }
        }
    }

    let mut out = ConcreteScope::default();
    for (sel, name) in picked {
        let workspaces = resolve_workspaces(&sel, inventory)?;
        let identity_sel = sel
            .identities
            .clone()
            .unwrap_or_else(|| selector.identities.clone());
        let identities = resolve_identities(&sel.id, &identity_sel, inventory)?;
        tracing::debug!(
            env = %sel.id,
            workspaces = workspaces.len(),
            identities = identities.len(),
            "resolved environment"
        );
        out.environments.push(Environment {
            id: sel.id,
            name,
            workspaces,
            identities,
        });
    }
    Ok(out)
}

fn resolve_workspaces<I: Inventory + ?Sized>(
    sel: &EnvSelector,
    inventory: &I,
) -> Result<Vec<Workspace>> {
    let live = inventory.list_workspaces(&sel.id).map_err(|e| {
        Error::resolution(format!(
            "failed to list workspaces of environment {}: {e}",
            sel.id
        ))
    })?;

    if contains_wildcard(&sel.workspaces) {
        return Ok(live
            .into_iter()
            .map(|w| Workspace {
                id: w.id,
                name: w.name,
            })
            .collect());
    }

    let mut seen = HashSet::<&str>::new();
    let mut out = Vec::new();
    for id in &sel.workspaces {
        if !seen.insert(id.as_str()) {
            continue;
        }
        match live.iter().find(|w| &w.id == id) {
            Some(w) => out.push(Workspace {
                id: w.id.clone(),
                name: w.name.clone(),
            }),
            None => tracing::warn!(env = %sel.id, ws = %id, "workspace not found in PlainID; skipping"),
        }
    }
    Ok(out)
}

fn resolve_identities<I: Inventory + ?Sized>(
    env_id: &str,
    declared: &[String],
    inventory: &I,
) -> Result<Vec<String>> {
    let mut seen = HashSet::<String>::new();
    if !contains_wildcard(declared) {
        return Ok(declared
            .iter()
            .filter(|s| seen.insert(s.to_string()))
            .cloned()
            .collect());
    }
    let live = inventory.list_identities(env_id).map_err(|e| {
        Error::resolution(format!(
            "failed to list identities of environment {env_id}: {e}"
        ))
    })?;
    Ok(live
        .iter()
        .map(|i| i.template_ref().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect())
}
