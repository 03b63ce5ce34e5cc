mod common;

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use plainid_git_backup::catalog::{ScopeFilter, format_listing};
use plainid_git_backup::executor::{self, NullSink, RunCtx};
use plainid_git_backup::snapshot::{SnapshotCommitter, format_tag};
use plainid_git_backup::vcs::{CheckoutKind, GitCli, Vcs};

use common::{StepClock, bare_remote, git_for, have_bin, run_stdout, ts};

fn pair(e: &str, w: &str) -> (String, String) {
    (e.to_string(), w.to_string())
}

/// Push twelve snapshots one hour apart, cycling through three scopes,
/// plus one unrelated tag. Returns tag names oldest first.
fn seed(work: &Path, git: &GitCli) -> Vec<String> {
    assert_eq!(git.clone_or_open(work).expect("open"), CheckoutKind::Initialized);
    let clock = StepClock::new(ts(2024, 3, 1, 8, 0, 0));
    let committer = SnapshotCommitter::new(git, &clock);
    let mut tags = Vec::new();
    for i in 0..12 {
        fs::write(work.join("state.txt"), format!("revision {i}\n")).expect("write");
        let pairs = match i % 3 {
            0 => vec![pair("e1", "w1")],
            1 => vec![pair("e1", "w2")],
            _ => vec![pair("e1", "w1"), pair("e2", "w3")],
        };
        let out = committer.snapshot(work, &pairs, false).expect("snapshot");
        assert_eq!(out.tag, format_tag(ts(2024, 3, 1, 8 + i, 0, 0)));
        tags.push(out.tag);
        clock.advance(3600);
    }
    run_stdout(Command::new("git").arg("-C").arg(work).arg("tag").arg("v1.0"));
    run_stdout(
        Command::new("git")
            .arg("-C")
            .arg(work)
            .arg("push")
            .arg("--quiet")
            .arg("origin")
            .arg("refs/tags/v1.0"),
    );
    tags
}

fn list(tmp: &Path, git: &GitCli, filter: Option<&ScopeFilter>, limit: usize) -> Vec<String> {
    let mut ctx = RunCtx::new(false, Arc::new(NullSink));
    ctx.scratch_parent = Some(tmp.join("scratch"));
    executor::run_list(&mut ctx, git, filter, limit)
        .expect("list")
        .into_iter()
        .map(|s| s.tag)
        .collect()
}

#[test]
fn listing_is_newest_first_filtered_and_limited() {
    if !have_bin("git") {
        eprintln!("skipping: git not installed");
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let remote = bare_remote(tmp.path());
    let git = git_for(&remote);
    let tags = seed(&tmp.path().join("work"), &git);

    let newest_first = tags.iter().rev().cloned().collect::<Vec<_>>();
    assert_eq!(list(tmp.path(), &git, None, 10), newest_first[..10].to_vec());
    assert_eq!(list(tmp.path(), &git, None, 3), newest_first[..3].to_vec());
    assert_eq!(list(tmp.path(), &git, None, 50).len(), 12);

    let w1 = ScopeFilter::new("e1", "w1");
    let expected = newest_first
        .iter()
        .enumerate()
        .filter(|(i, _)| (11 - i) % 3 != 1)
        .map(|(_, t)| t.clone())
        .collect::<Vec<_>>();
    assert_eq!(expected.len(), 8);
    assert_eq!(list(tmp.path(), &git, Some(&w1), 10), expected);

    let w2 = ScopeFilter::new("e1", "w2");
    assert_eq!(list(tmp.path(), &git, Some(&w2), 10).len(), 4);

    // Ids must match whole tokens, not prefixes.
    let partial = ScopeFilter::new("e1", "w");
    assert!(list(tmp.path(), &git, Some(&partial), 10).is_empty());
    let unknown = ScopeFilter::new("e9", "w1");
    assert!(list(tmp.path(), &git, Some(&unknown), 10).is_empty());
}

#[test]
fn listing_text_shows_scope_and_creation_time() {
    if !have_bin("git") {
        eprintln!("skipping: git not installed");
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let remote = bare_remote(tmp.path());
    let git = git_for(&remote);
    seed(&tmp.path().join("work"), &git);

    let mut ctx = RunCtx::new(false, Arc::new(NullSink));
    ctx.scratch_parent = Some(tmp.path().join("scratch"));
    let snaps = executor::run_list(&mut ctx, &git, None, 2).expect("list");
    assert_eq!(snaps[0].commit.len(), 40);
    let text = format_listing(&snaps, None);
    assert_eq!(
        text,
        "Recent backups:\n\
         1. 20240301190000 (env: e1,e2, ws: w1,w3, created: 2024-03-01 19:00:00)\n\
         2. 20240301180000 (env: e1, ws: w2, created: 2024-03-01 18:00:00)\n"
    );
}

#[test]
fn empty_remote_lists_nothing() {
    if !have_bin("git") {
        eprintln!("skipping: git not installed");
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let remote = bare_remote(tmp.path());
    let git = git_for(&remote);
    assert!(list(tmp.path(), &git, None, 10).is_empty());
}
