use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::plainid::ConfigSource;
use crate::plainid::paging::{APPLICATIONS_PAGE_LIMIT, POLICIES_PAGE_LIMIT, collect_pages};
use crate::scope::{ConcreteScope, Environment, Workspace};
use crate::util;

pub const APPLICATION_FILE: &str = "application.json";
pub const API_MAPPER_SET_FILE: &str = "api-mapper-set.json";

pub fn safe_dir_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        s if s.eq_ignore_ascii_case(".git") => format!("_{}", &s[1..]),
        _ => cleaned,
    }
}

pub fn env_dir_name(env_name: &str, env_id: &str) -> String {
    safe_dir_name(&format!("{env_name}_{env_id}"))
}

pub fn env_dir_suffix(env_id: &str) -> String {
    format!("_{}", safe_dir_name(env_id))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub processed: Vec<(String, String)>,
    pub files_written: usize,
    pub files_removed: usize,
}

pub struct DirectorySynchronizer<'a, S: ConfigSource + ?Sized> {
    source: &'a S,
    root: PathBuf,
}

impl<'a, S: ConfigSource + ?Sized> DirectorySynchronizer<'a, S> {
    pub fn new(source: &'a S, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
        }
    }

    // Synchronize every environment of `scope`. Stops at the first failure;
    // files already written stay on disk.
    pub fn sync_scope(&self, scope: &ConcreteScope) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for env in &scope.environments {
            self.sync_environment(env, &mut report)?;
        }
        Ok(report)
    }

    pub fn sync_environment(&self, env: &Environment, report: &mut SyncReport) -> Result<()> {
        check_unique_workspace_dirs(env)?;
        let env_dir = self.root.join(env_dir_name(&env.name, &env.id));
        tracing::info!(env = %env.id, name = %env.name, "processing environment");

        util::ensure_dir(&env_dir)?;
        report.files_removed += util::remove_files_keep_dirs(&env_dir)
            .map_err(|e| e.context(format!("clean environment {}", env.id)))?;

        for identity in &env.identities {
            let body = self
                .source
                .fetch_identity_template(&env.id, identity)
                .map_err(|e| e.context(format!("env:{}", env.id)))?;
            let path = env_dir.join(format!("identity-template-{}.json", safe_dir_name(identity)));
            util::write_bytes(&path, &body)?;
            report.files_written += 1;
        }

        let groups = self
            .source
            .fetch_paa_groups(&env.id)
            .map_err(|e| e.context(format!("env:{}", env.id)))?;
        for group in &groups {
            tracing::debug!(env = %env.id, group = %group.id, "writing PAA group");
            let path = env_dir.join(format!("paa-group_{}.json", safe_dir_name(&group.id)));
            util::write_json_pretty(&path, group)?;
            report.files_written += 1;
        }

        for ws in &env.workspaces {
            self.sync_workspace(env, ws, &env_dir, report)
                .map_err(|e| e.context(format!("env:{} ws:{}", env.id, ws.id)))?;
            report.processed.push((env.id.clone(), ws.id.clone()));
        }
        Ok(())
    }

    fn sync_workspace(
        &self,
        env: &Environment,
        ws: &Workspace,
        env_dir: &Path,
        report: &mut SyncReport,
    ) -> Result<()> {
        tracing::info!(env = %env.id, ws = %ws.id, name = %ws.name, "processing workspace");
        let ws_dir = env_dir.join(safe_dir_name(&ws.name));
        util::reset_dir(&ws_dir)?;

        let template_ids = self.source.fetch_asset_template_ids(&ws.id)?;
        for (i, template_id) in template_ids.iter().enumerate() {
            let body = self.source.fetch_asset_template(&env.id, template_id)?;
            util::write_bytes(&ws_dir.join(format!("asset-template_{i}.json")), &body)?;
            report.files_written += 1;
        }

        let apps = collect_pages(APPLICATIONS_PAGE_LIMIT, |offset, limit| {
            self.source.list_applications_page(&env.id, offset, limit)
        })?;
        let apps = apps
            .into_iter()
            .filter(|a| a.auth_ws_id == ws.id)
            .collect::<Vec<_>>();

        let mut used_names = HashSet::<String>::new();
        for app in &apps {
            let mut dir_name = safe_dir_name(&app.name);
            if !used_names.insert(dir_name.clone()) {
                let alt = safe_dir_name(&format!("{}_{}", app.name, app.id));
                tracing::warn!(
                    ws = %ws.id,
                    app = %app.id,
                    name = %app.name,
                    dir = %alt,
                    "application name already used in this workspace"
                );
                used_names.insert(alt.clone());
                dir_name = alt;
            }
            let app_dir = ws_dir.join(dir_name);
            tracing::debug!(app = %app.id, name = %app.name, "processing application");

            let mut descriptor = self.source.fetch_application(&env.id, &app.id)?;
            if descriptor.application_id.is_empty() {
                descriptor.application_id = app.id.clone();
            }
            util::write_json_pretty(&app_dir.join(APPLICATION_FILE), &descriptor)?;
            report.files_written += 1;

            let policies = collect_pages(POLICIES_PAGE_LIMIT, |offset, limit| {
                self.source
                    .list_policies_page(&env.id, &app.id, offset, limit)
            })?;
            let active = policies.iter().filter(|p| !p.is_inactive());
            for (i, policy) in active.enumerate() {
                let body = self.source.fetch_policy(&env.id, &ws.id, &policy.id)?;
                util::write_bytes(&app_dir.join(format!("policy_{i}.srego")), &body)?;
                report.files_written += 1;
            }

            let mapper = self.source.fetch_api_mapper_set(&env.id, &app.id)?;
            util::write_bytes(&app_dir.join(API_MAPPER_SET_FILE), &mapper)?;
            report.files_written += 1;
        }
        Ok(())
    }
}

// Two workspaces writing into one directory would wipe each other.
fn check_unique_workspace_dirs(env: &Environment) -> Result<()> {
    let mut seen = HashMap::<String, &str>::new();
    for ws in &env.workspaces {
        let dir = safe_dir_name(&ws.name);
        if let Some(other) = seen.insert(dir.clone(), ws.id.as_str()) {
            return Err(Error::resolution(format!(
                "workspaces {other} and {} of environment {} both map to directory '{dir}'",
                ws.id, env.id
            )));
        }
    }
    Ok(())
}
