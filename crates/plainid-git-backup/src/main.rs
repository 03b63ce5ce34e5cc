use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use plainid_git_backup::catalog::{DEFAULT_LIST_LIMIT, ScopeFilter, format_listing};
use plainid_git_backup::config::{self, BackupConfig};
use plainid_git_backup::executor::{self, BackupDeps, RunCtx, StdoutSink};
use plainid_git_backup::log_sanitize::Redactor;
use plainid_git_backup::plainid::PlainIdClient;
use plainid_git_backup::restore::RestoreOptions;
use plainid_git_backup::scope::ScopeSelector;
use plainid_git_backup::snapshot::{DEFAULT_TAG_RETRIES, SystemClock};
use plainid_git_backup::vcs::{GitAuthor, GitCli};
use plainid_git_backup::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "git-backup", author, version, about = "Back up PlainID configuration to git")]
struct Args {
    /// Config file (default: ./.git-backup.toml, then ~/.git-backup.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backup: commit and tag locally without pushing. Restore: only check out
    #[arg(long, global = true)]
    dry_run: bool,
    #[arg(long, global = true)]
    git_repo: Option<String>,
    #[arg(long, global = true)]
    git_token: Option<String>,
    #[arg(long, global = true)]
    git_branch: Option<String>,
    #[arg(long, global = true)]
    plainid_base_url: Option<String>,
    #[arg(long, global = true)]
    plainid_client_id: Option<String>,
    #[arg(long, global = true)]
    plainid_client_secret: Option<String>,
    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch configuration from PlainID, commit it and push a new tag
    Backup,
    /// List recent backups
    List {
        #[arg(long)]
        env_id: Option<String>,
        #[arg(long)]
        ws_id: Option<String>,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Check out a backup into a directory
    Restore {
        /// Backup tag to restore; without it interactive selection is needed
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        target_dir: Option<PathBuf>,
        #[arg(long)]
        env_id: Option<String>,
        #[arg(long)]
        ws_id: Option<String>,
        /// Workspace directory name, for workspaces no longer in PlainID
        #[arg(long)]
        ws_name: Option<String>,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose, args.log_json);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error ({}): {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn flag_overrides(args: &Args) -> toml::Value {
    let mut v = toml::Value::Table(Default::default());
    let pairs = [
        ("git.repo", &args.git_repo),
        ("git.token", &args.git_token),
        ("git.branch", &args.git_branch),
        ("plainid.base_url", &args.plainid_base_url),
        ("plainid.client_id", &args.plainid_client_id),
        ("plainid.client_secret", &args.plainid_client_secret),
    ];
    for (path, val) in pairs {
        if let Some(s) = val.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            config::set_path(&mut v, path, toml::Value::String(s.to_string()));
        }
    }
    if args.dry_run {
        config::set_path(&mut v, "dry_run", toml::Value::Boolean(true));
    }
    v
}

fn load_config(args: &Args) -> Result<BackupConfig> {
    let file = config::locate(args.config.as_deref())?;
    match &file {
        Some(p) => tracing::info!(path = %p.display(), "loading config"),
        None => tracing::info!("no config file found; using environment and flags only"),
    }
    config::load(file.as_deref(), |k| std::env::var(k).ok(), flag_overrides(args))
}

fn git_backend(cfg: &BackupConfig) -> GitCli {
    GitCli::new(
        cfg.git.repo.trim(),
        cfg.git.branch.trim(),
        Some(cfg.git.token.clone()),
        GitAuthor {
            name: cfg.git.author_name.clone(),
            email: cfg.git.author_email.clone(),
        },
    )
}

fn run(args: Args) -> Result<()> {
    let cfg = load_config(&args)?;
    let redactor = Redactor::new(cfg.secrets());
    dispatch(args.cmd, &cfg).map_err(|e| Error::new(e.kind(), redactor.redact(&e.to_string())))
}

fn dispatch(cmd: Command, cfg: &BackupConfig) -> Result<()> {
    let mut ctx = RunCtx::new(cfg.dry_run, Arc::new(StdoutSink::default()));
    ctx.keep_scratch = cfg.git.keep_scratch;
    let git = git_backend(cfg);

    match cmd {
        Command::Backup => {
            cfg.validate(true)?;
            let client = PlainIdClient::new(&cfg.plainid)?;
            let selector = ScopeSelector::from_config(&cfg.plainid);
            let deps = BackupDeps {
                source: &client,
                vcs: &git,
                clock: &SystemClock,
                tag_retries: DEFAULT_TAG_RETRIES,
            };
            let report = executor::run_backup(&mut ctx, &selector, &deps)?;
            println!("{}", report.summary());
            if let Some(p) = &report.scratch {
                println!("Scratch checkout kept at {}", p.display());
            }
        }
        Command::List {
            env_id,
            ws_id,
            limit,
        } => {
            let filter = ScopeFilter::from_options(env_id.as_deref(), ws_id.as_deref())?;
            cfg.validate(false)?;
            let snaps = executor::run_list(&mut ctx, &git, filter.as_ref(), limit)?;
            print!("{}", format_listing(&snaps, filter.as_ref()));
        }
        Command::Restore {
            tag,
            target_dir,
            env_id,
            ws_id,
            ws_name,
        } => {
            let mut req = RestoreOptions {
                tag,
                target_dir,
                env_id,
                ws_id,
                ws_name,
            }
            .into_request(cfg.dry_run)?;
            cfg.validate(false)?;
            if let Some(scope) = req.scope.as_mut()
                && scope.ws_name.is_none()
            {
                scope.ws_name = workspace_name(cfg, &scope.env_id, &scope.ws_id);
            }
            let out = executor::run_restore(&mut ctx, &git, &req)?;
            println!(
                "Restored {} file(s) from {} into {}",
                out.files_copied,
                req.tag,
                req.target_dir.display()
            );
        }
    }
    Ok(())
}

/// Best-effort lookup of a workspace's live name; restore falls back to
/// matching the directory by id.
fn workspace_name(cfg: &BackupConfig, env_id: &str, ws_id: &str) -> Option<String> {
    let p = &cfg.plainid;
    if [&p.base_url, &p.client_id, &p.client_secret]
        .iter()
        .any(|s| s.trim().is_empty())
    {
        return None;
    }
    let lookup = PlainIdClient::new(p)
        .and_then(|c| executor::lookup_workspace_name(&c, env_id, ws_id));
    match lookup {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(env = %env_id, ws = %ws_id, "workspace name lookup failed: {e}");
            None
        }
    }
}
