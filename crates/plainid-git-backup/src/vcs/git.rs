use std::path::Path;
use std::process::{Command, Output};

use base64::Engine;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::log_sanitize::Redactor;

use super::{CheckoutKind, StagedChange, TagRef, Vcs};

const REMOTE: &str = "origin";

#[derive(Debug, Clone)]
pub struct GitAuthor {
    pub name: String,
    pub email: String,
}

pub struct GitCli {
    remote_url: String,
    branch: String,
    token: Option<String>,
    author: GitAuthor,
    redactor: Redactor,
}

impl GitCli {
    pub fn new(
        remote_url: impl Into<String>,
        branch: impl Into<String>,
        token: Option<String>,
        author: GitAuthor,
    ) -> Self {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let redactor = Redactor::new(token.clone());
        Self {
            remote_url: remote_url.into(),
            branch: branch.into(),
            token,
            author,
            redactor,
        }
    }

    fn is_http_remote(&self) -> bool {
        let u = self.remote_url.to_ascii_lowercase();
        u.starts_with("https://") || u.starts_with("http://")
    }

    fn git(&self, dir: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(d) = dir {
            cmd.arg("-C").arg(d);
        }
        cmd.arg("-c").arg("core.quotepath=false");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        // Credentials travel through the environment, never argv or the URL.
        if let Some(token) = self.token.as_deref()
            && self.is_http_remote()
        {
            let basic =
                base64::engine::general_purpose::STANDARD.encode(format!("oauth2:{token}"));
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {basic}"));
        }
        cmd
    }

    fn with_identity(&self, cmd: &mut Command, when: DateTime<Utc>) {
        let date = when.to_rfc3339();
        cmd.env("GIT_AUTHOR_NAME", &self.author.name)
            .env("GIT_AUTHOR_EMAIL", &self.author.email)
            .env("GIT_COMMITTER_NAME", &self.author.name)
            .env("GIT_COMMITTER_EMAIL", &self.author.email)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date);
    }

    fn run(&self, op: &str, mut cmd: Command) -> Result<Output> {
        tracing::debug!(op, "git");
        let out = run_command_output(&mut cmd)?;
        for line in String::from_utf8_lossy(&out.stderr).lines() {
            let line = self.redactor.redact(&crate::log_sanitize::sanitize_log_line(line));
            if !line.trim().is_empty() {
                tracing::trace!(op, "{line}");
            }
        }
        Ok(out)
    }

    fn run_ok(&self, op: &str, cmd: Command) -> Result<Output> {
        let out = self.run(op, cmd)?;
        if out.status.success() {
            return Ok(out);
        }
        Err(Error::vcs(format!(
            "git {op} failed: {}",
            self.redactor.clean_block(&command_summary(&out))
        )))
    }

    fn stdout(&self, op: &str, cmd: Command) -> Result<String> {
        let out = self.run_ok(op, cmd)?;
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }

    fn remote_branch_exists(&self) -> Result<bool> {
        let mut cmd = self.git(None);
        cmd.arg("ls-remote")
            .arg("--heads")
            .arg(&self.remote_url)
            .arg(format!("refs/heads/{}", self.branch));
        Ok(!self.stdout("ls-remote", cmd)?.trim().is_empty())
    }

    fn remote_tag_exists(&self, dir: &Path, name: &str) -> Result<bool> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("ls-remote")
            .arg("--tags")
            .arg(REMOTE)
            .arg(format!("refs/tags/{name}"));
        Ok(!self.stdout("ls-remote", cmd)?.trim().is_empty())
    }

    fn init_with_remote(&self, dir: &Path) -> Result<()> {
        crate::util::ensure_dir(dir)?;
        let mut cmd = self.git(None);
        cmd.arg("init").arg("--quiet").arg(dir);
        self.run_ok("init", cmd)?;

        let mut cmd = self.git(Some(dir));
        cmd.arg("symbolic-ref")
            .arg("HEAD")
            .arg(format!("refs/heads/{}", self.branch));
        self.run_ok("symbolic-ref", cmd)?;

        let mut cmd = self.git(Some(dir));
        cmd.arg("remote").arg("add").arg(REMOTE).arg(&self.remote_url);
        self.run_ok("remote add", cmd)?;
        Ok(())
    }
}

impl Vcs for GitCli {
    fn branch(&self) -> &str {
        &self.branch
    }

    fn clone_or_open(&self, dir: &Path) -> Result<CheckoutKind> {
        if dir.join(".git").exists() {
            return Ok(CheckoutKind::Opened);
        }
        if !self.remote_branch_exists()? {
            tracing::info!(branch = %self.branch, "remote branch does not exist yet; starting a new history");
            self.init_with_remote(dir)?;
            return Ok(CheckoutKind::Initialized);
        }
        let mut cmd = self.git(None);
        cmd.arg("clone")
            .arg("--quiet")
            .arg("--depth")
            .arg("1")
            .arg("--single-branch")
            .arg("--branch")
            .arg(&self.branch)
            .arg(&self.remote_url)
            .arg(dir);
        self.run_ok("clone", cmd)?;
        Ok(CheckoutKind::Cloned)
    }

    fn open_remote(&self, dir: &Path) -> Result<()> {
        if dir.join(".git").exists() {
            return Ok(());
        }
        self.init_with_remote(dir)
    }

    fn stage_all(&self, dir: &Path) -> Result<()> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("add").arg("--all").arg(".");
        self.run_ok("add", cmd)?;
        Ok(())
    }

    fn staged_changes(&self, dir: &Path) -> Result<Vec<StagedChange>> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("diff")
            .arg("--cached")
            .arg("--name-status")
            .arg("--no-renames");
        let out = self.stdout("diff", cmd)?;
        Ok(parse_name_status(&out))
    }

    fn has_head(&self, dir: &Path) -> Result<bool> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("rev-parse").arg("--quiet").arg("--verify").arg("HEAD");
        Ok(self.run("rev-parse", cmd)?.status.success())
    }

    fn commit(&self, dir: &Path, message: &str, when: DateTime<Utc>) -> Result<String> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("-c")
            .arg("commit.gpgsign=false")
            .arg("commit")
            .arg("--quiet")
            .arg("--allow-empty")
            .arg("--no-verify")
            .arg("-m")
            .arg(message);
        self.with_identity(&mut cmd, when);
        self.run_ok("commit", cmd)?;

        let mut cmd = self.git(Some(dir));
        cmd.arg("rev-parse").arg("HEAD");
        Ok(self.stdout("rev-parse", cmd)?.trim().to_string())
    }

    fn create_branch_ref(&self, dir: &Path, commit: &str) -> Result<()> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("update-ref")
            .arg(format!("refs/heads/{}", self.branch))
            .arg(commit);
        self.run_ok("update-ref", cmd)?;
        Ok(())
    }

    fn tag_exists(&self, dir: &Path, name: &str) -> Result<bool> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("rev-parse")
            .arg("--quiet")
            .arg("--verify")
            .arg(format!("refs/tags/{name}"));
        if self.run("rev-parse", cmd)?.status.success() {
            return Ok(true);
        }
        self.remote_tag_exists(dir, name)
    }

    fn create_annotated_tag(
        &self,
        dir: &Path,
        name: &str,
        commit: &str,
        message: &str,
        when: DateTime<Utc>,
    ) -> Result<()> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("-c")
            .arg("tag.gpgsign=false")
            .arg("tag")
            .arg("--annotate")
            .arg("-m")
            .arg(message)
            .arg(name)
            .arg(commit);
        self.with_identity(&mut cmd, when);
        self.run_ok("tag", cmd)?;
        Ok(())
    }

    fn push(&self, dir: &Path, refspecs: &[String], force: bool) -> Result<()> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("push").arg("--quiet");
        if force {
            cmd.arg("--force");
        }
        cmd.arg(REMOTE).args(refspecs);
        self.run_ok("push", cmd)?;
        Ok(())
    }

    fn fetch_tags(&self, dir: &Path) -> Result<()> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("fetch")
            .arg("--quiet")
            .arg("--force")
            .arg(REMOTE)
            .arg("+refs/tags/*:refs/tags/*");
        self.run_ok("fetch", cmd)?;
        Ok(())
    }

    fn fetch_tag(&self, dir: &Path, name: &str) -> Result<()> {
        if !self.remote_tag_exists(dir, name)? {
            return Err(Error::vcs(format!("tag {name} not found on remote")));
        }
        let mut cmd = self.git(Some(dir));
        cmd.arg("fetch")
            .arg("--quiet")
            .arg("--force")
            .arg(REMOTE)
            .arg(format!("+refs/tags/{name}:refs/tags/{name}"));
        let out = self.run("fetch", cmd)?;
        if out.status.success() {
            return Ok(());
        }
        let msg = self.redactor.clean_block(&command_summary(&out));
        if is_not_found_text(&msg) {
            return Err(Error::vcs(format!("tag {name} not found on remote: {msg}")));
        }
        Err(Error::vcs(format!("git fetch of tag {name} failed: {msg}")))
    }

    fn list_tags(&self, dir: &Path) -> Result<Vec<TagRef>> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("for-each-ref").arg(
            "--format=%(refname:strip=2)%00%(objecttype)%00%(objectname)%00%(*objectname)%00%(contents)%1e",
        );
        cmd.arg("refs/tags");
        let out = self.stdout("for-each-ref", cmd)?;
        Ok(parse_tag_records(&out))
    }

    fn checkout_tag(&self, dir: &Path, name: &str) -> Result<()> {
        let mut cmd = self.git(Some(dir));
        cmd.arg("-c")
            .arg("advice.detachedHead=false")
            .arg("checkout")
            .arg("--quiet")
            .arg("--force")
            .arg("--detach")
            .arg(format!("refs/tags/{name}"));
        self.run_ok("checkout", cmd)?;
        Ok(())
    }
}

fn parse_name_status(out: &str) -> Vec<StagedChange> {
    out.lines()
        .filter_map(|line| {
            let (status, path) = line.split_once('\t')?;
            let status = status.chars().next()?;
            Some(StagedChange {
                status,
                path: path.to_string(),
            })
        })
        .collect()
}

fn parse_tag_records(out: &str) -> Vec<TagRef> {
    out.split('\x1e')
        .map(|r| r.trim_start_matches('\n'))
        .filter(|r| !r.is_empty())
        .filter_map(|record| {
            let mut parts = record.splitn(5, '\0');
            let name = parts.next()?.to_string();
            let kind = parts.next()?;
            let object = parts.next()?;
            let peeled = parts.next()?;
            let contents = parts.next().unwrap_or_default();
            if kind == "tag" {
                Some(TagRef {
                    name,
                    commit: peeled.to_string(),
                    message: Some(contents.trim_end().to_string()),
                })
            } else {
                Some(TagRef {
                    name,
                    commit: object.to_string(),
                    message: None,
                })
            }
        })
        .collect()
}

fn run_command_output(cmd: &mut Command) -> Result<Output> {
    cmd.output().map_err(|e| {
        Error::vcs(format!(
            "failed to run {}: {e}",
            cmd.get_program().to_string_lossy()
        ))
    })
}

fn command_summary(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    if !stdout.is_empty() {
        return stdout;
    }
    format!("status {}", out.status)
}

fn is_not_found_text(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    m.contains("not found")
        || m.contains("couldn't find")
        || m.contains("no such")
        || m.contains("does not exist")
}
