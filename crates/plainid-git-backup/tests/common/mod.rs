#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use plainid_git_backup::plainid::{
    ApplicationDescriptor, ApplicationSummary, ConfigSource, EnvironmentInfo, IdentityInfo,
    Inventory, PaaGroup, Page, PolicySummary, WorkspaceInfo,
};
use plainid_git_backup::snapshot::Clock;
use plainid_git_backup::vcs::{GitAuthor, GitCli};
use plainid_git_backup::{Error, Result};

pub fn have_bin(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn run_output(cmd: &mut Command) -> Output {
    cmd.output()
        .unwrap_or_else(|e| panic!("failed to run {:?}: {e}", cmd))
}

pub fn run_stdout(cmd: &mut Command) -> String {
    let out = run_output(cmd);
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        panic!("command failed {:?}: {}", cmd, stderr.trim());
    }
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Create an empty bare repository to push backups into.
pub fn bare_remote(root: &Path) -> PathBuf {
    let remote = root.join("remote.git");
    run_stdout(
        Command::new("git")
            .arg("init")
            .arg("--bare")
            .arg("--quiet")
            .arg(&remote),
    );
    remote
}

pub fn remote_tags(remote: &Path) -> Vec<String> {
    let out = run_stdout(
        Command::new("git")
            .arg("--git-dir")
            .arg(remote)
            .arg("for-each-ref")
            .arg("--format=%(refname:strip=2)")
            .arg("refs/tags"),
    );
    out.lines().map(str::to_string).collect()
}

pub fn remote_branch_head(remote: &Path, branch: &str) -> Option<String> {
    let out = run_output(
        Command::new("git")
            .arg("--git-dir")
            .arg(remote)
            .arg("rev-parse")
            .arg("--quiet")
            .arg("--verify")
            .arg(format!("refs/heads/{branch}")),
    );
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
}

pub fn git_for(remote: &Path) -> GitCli {
    GitCli::new(
        remote.to_string_lossy().to_string(),
        "main",
        None,
        GitAuthor {
            name: "Backup Test".into(),
            email: "backup-test@example.com".into(),
        },
    )
}

pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
        .single()
        .expect("valid timestamp")
}

/// Clock that only moves when slept on or advanced by hand.
pub struct StepClock {
    now: Mutex<DateTime<Utc>>,
}

impl StepClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock().expect("clock lock");
        *now += chrono::Duration::seconds(secs);
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }

    fn sleep(&self, d: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += chrono::Duration::from_std(d).expect("duration");
    }
}

/// Clock frozen at one instant; sleeping does nothing.
pub struct FrozenClock(pub DateTime<Utc>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }

    fn sleep(&self, _d: Duration) {}
}

#[derive(Debug, Clone)]
pub struct FakePolicy {
    pub id: String,
    pub state: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FakeApp {
    pub id: String,
    pub name: String,
    pub ws_id: String,
    pub policies: Vec<FakePolicy>,
    pub mapper: String,
}

#[derive(Debug, Clone)]
pub struct FakeWorkspace {
    pub id: String,
    pub name: String,
    /// `(template id, body)` in listing order.
    pub asset_templates: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct FakeEnv {
    pub id: String,
    pub name: String,
    pub workspaces: Vec<FakeWorkspace>,
    pub identities: Vec<IdentityInfo>,
    /// `(template id, body)`.
    pub identity_templates: Vec<(String, String)>,
    pub paa_groups: Vec<PaaGroup>,
    pub apps: Vec<FakeApp>,
}

/// In-memory PlainID tenant.
#[derive(Default)]
pub struct FakePlainId {
    pub envs: Vec<FakeEnv>,
    /// Policy id whose fetch fails.
    pub fail_policy: Option<String>,
    /// Fail the environment listing.
    pub fail_inventory: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakePlainId {
    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn env_mut(&mut self, id: &str) -> &mut FakeEnv {
        self.envs
            .iter_mut()
            .find(|e| e.id == id)
            .expect("fake env")
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn env(&self, id: &str) -> Result<&FakeEnv> {
        self.envs
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::fetch(format!("GET environment {id} failed with status 404 Not Found")))
    }
}

fn page<T: Clone>(all: &[T], offset: usize, limit: usize) -> Page<T> {
    let items = all.iter().skip(offset).take(limit).cloned().collect();
    Page::new(items, Some(all.len()))
}

impl Inventory for FakePlainId {
    fn list_environments(&self) -> Result<Vec<EnvironmentInfo>> {
        self.record("list_environments".into());
        if self.fail_inventory {
            return Err(Error::fetch("GET /env-mgmt/environment failed with status 503"));
        }
        Ok(self
            .envs
            .iter()
            .map(|e| EnvironmentInfo {
                id: e.id.clone(),
                name: e.name.clone(),
            })
            .collect())
    }

    fn list_workspaces(&self, env_id: &str) -> Result<Vec<WorkspaceInfo>> {
        self.record(format!("list_workspaces {env_id}"));
        Ok(self
            .env(env_id)?
            .workspaces
            .iter()
            .map(|w| WorkspaceInfo {
                id: w.id.clone(),
                name: w.name.clone(),
            })
            .collect())
    }

    fn list_identities(&self, env_id: &str) -> Result<Vec<IdentityInfo>> {
        self.record(format!("list_identities {env_id}"));
        Ok(self.env(env_id)?.identities.clone())
    }
}

impl ConfigSource for FakePlainId {
    fn fetch_identity_template(&self, env_id: &str, identity_id: &str) -> Result<Vec<u8>> {
        self.env(env_id)?
            .identity_templates
            .iter()
            .find(|(id, _)| id == identity_id)
            .map(|(_, body)| body.clone().into_bytes())
            .ok_or_else(|| Error::fetch(format!("identity template {identity_id} not found")))
    }

    fn fetch_paa_groups(&self, env_id: &str) -> Result<Vec<PaaGroup>> {
        Ok(self.env(env_id)?.paa_groups.clone())
    }

    fn fetch_asset_template_ids(&self, ws_id: &str) -> Result<Vec<String>> {
        Ok(self
            .envs
            .iter()
            .flat_map(|e| e.workspaces.iter())
            .filter(|w| w.id == ws_id)
            .flat_map(|w| w.asset_templates.iter().map(|(id, _)| id.clone()))
            .collect())
    }

    fn fetch_asset_template(&self, env_id: &str, template_id: &str) -> Result<Vec<u8>> {
        self.env(env_id)?
            .workspaces
            .iter()
            .flat_map(|w| w.asset_templates.iter())
            .find(|(id, _)| id == template_id)
            .map(|(_, body)| body.clone().into_bytes())
            .ok_or_else(|| Error::fetch(format!("asset template {template_id} not found")))
    }

    fn list_applications_page(
        &self,
        env_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ApplicationSummary>> {
        let all = self
            .env(env_id)?
            .apps
            .iter()
            .map(|a| ApplicationSummary {
                id: a.id.clone(),
                name: a.name.clone(),
                auth_ws_id: a.ws_id.clone(),
            })
            .collect::<Vec<_>>();
        Ok(page(&all, offset, limit))
    }

    fn fetch_application(&self, env_id: &str, app_id: &str) -> Result<ApplicationDescriptor> {
        let app = self.app(env_id, app_id)?;
        Ok(ApplicationDescriptor {
            application_id: app.id.clone(),
            display_name: app.name.clone(),
            description: format!("{} application", app.name),
            ..Default::default()
        })
    }

    fn list_policies_page(
        &self,
        env_id: &str,
        app_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PolicySummary>> {
        let all = self
            .app(env_id, app_id)?
            .policies
            .iter()
            .map(|p| PolicySummary {
                id: p.id.clone(),
                name: format!("policy {}", p.id),
                state: p.state.clone(),
                access_type: "Allow".into(),
            })
            .collect::<Vec<_>>();
        Ok(page(&all, offset, limit))
    }

    fn fetch_policy(&self, env_id: &str, _ws_id: &str, policy_id: &str) -> Result<Vec<u8>> {
        if self.fail_policy.as_deref() == Some(policy_id) {
            return Err(Error::fetch(format!(
                "GET /api/2.0/policies/{env_id} failed with status 500 Internal Server Error"
            )));
        }
        self.env(env_id)?
            .apps
            .iter()
            .flat_map(|a| a.policies.iter())
            .find(|p| p.id == policy_id)
            .map(|p| p.body.clone().into_bytes())
            .ok_or_else(|| Error::fetch(format!("policy {policy_id} not found")))
    }

    fn fetch_api_mapper_set(&self, env_id: &str, app_id: &str) -> Result<Vec<u8>> {
        Ok(self.app(env_id, app_id)?.mapper.clone().into_bytes())
    }
}

impl FakePlainId {
    fn app(&self, env_id: &str, app_id: &str) -> Result<&FakeApp> {
        self.env(env_id)?
            .apps
            .iter()
            .find(|a| a.id == app_id)
            .ok_or_else(|| Error::fetch(format!("application {app_id} not found")))
    }
}

fn policy(id: &str, state: &str) -> FakePolicy {
    FakePolicy {
        id: id.into(),
        state: state.into(),
        body: format!("# METADATA\npackage {id}\n\nallow if true\n"),
    }
}

fn identity(id: &str, template: Option<&str>) -> IdentityInfo {
    IdentityInfo {
        id: id.into(),
        name: id.into(),
        template_id: template.map(str::to_string),
    }
}

fn paa_group(id: &str) -> PaaGroup {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "paaGroupType": "LDAP",
        "sources": [{"id": format!("{id}-src")}],
        "views": [{"id": format!("{id}-view")}],
    }))
    .expect("paa group")
}

/// Two environments. `e1` ("Prod") holds workspaces `w1` ("Sales") and
/// `w2` ("Marketing"); `e2` ("Dev") holds `w3` ("Sales").
pub fn sample_tenant() -> FakePlainId {
    let prod = FakeEnv {
        id: "e1".into(),
        name: "Prod".into(),
        workspaces: vec![
            FakeWorkspace {
                id: "w1".into(),
                name: "Sales".into(),
                asset_templates: vec![
                    ("customer".into(), r#"{"id":"customer"}"#.into()),
                    ("account".into(), r#"{"id":"account"}"#.into()),
                ],
            },
            FakeWorkspace {
                id: "w2".into(),
                name: "Marketing".into(),
                asset_templates: vec![("campaign".into(), r#"{"id":"campaign"}"#.into())],
            },
        ],
        identities: vec![identity("i-user", Some("User")), identity("Device", None)],
        identity_templates: vec![
            ("User".into(), r#"{"templateId":"User"}"#.into()),
            ("Device".into(), r#"{"templateId":"Device"}"#.into()),
        ],
        paa_groups: vec![paa_group("g1")],
        apps: vec![
            FakeApp {
                id: "a1".into(),
                name: "Checkout".into(),
                ws_id: "w1".into(),
                policies: vec![
                    policy("p1", "Active"),
                    policy("p2", "Inactive"),
                    policy("p3", "Active"),
                ],
                mapper: r#"{"mappers":["checkout"]}"#.into(),
            },
            FakeApp {
                id: "a2".into(),
                name: "Billing".into(),
                ws_id: "w1".into(),
                policies: vec![policy("p4", "Active")],
                mapper: r#"{"mappers":[]}"#.into(),
            },
            FakeApp {
                id: "a3".into(),
                name: "Campaigns".into(),
                ws_id: "w2".into(),
                policies: vec![policy("p5", "Active")],
                mapper: r#"{"mappers":["campaigns"]}"#.into(),
            },
        ],
    };
    let dev = FakeEnv {
        id: "e2".into(),
        name: "Dev".into(),
        workspaces: vec![FakeWorkspace {
            id: "w3".into(),
            name: "Sales".into(),
            asset_templates: vec![("customer-dev".into(), r#"{"id":"customer-dev"}"#.into())],
        }],
        identities: vec![identity("i-user-dev", Some("User"))],
        identity_templates: vec![("User".into(), r#"{"templateId":"User","env":"dev"}"#.into())],
        paa_groups: vec![],
        apps: vec![FakeApp {
            id: "a9".into(),
            name: "Checkout".into(),
            ws_id: "w3".into(),
            policies: vec![policy("p9", "Active")],
            mapper: "{}".into(),
        }],
    };
    FakePlainId {
        envs: vec![prod, dev],
        ..Default::default()
    }
}
