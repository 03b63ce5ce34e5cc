use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const VCS_DIR: &str = ".git";

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::fs(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_bytes(p: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = p.parent() {
        ensure_dir(parent)?;
    }
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut f = opts
        .open(p)
        .map_err(|e| Error::fs(format!("failed to open {}: {e}", p.display())))?;
    f.write_all(body)
        .map_err(|e| Error::fs(format!("failed to write {}: {e}", p.display())))
}

pub fn write_json_pretty<T: Serialize>(p: &Path, v: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(v)
        .map_err(|e| Error::fs(format!("json encode error for {}: {e}", p.display())))?;
    write_bytes(p, s.as_bytes())
}

pub fn remove_files_keep_dirs(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0usize;
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|e| Error::fs(format!("walkdir error: {e}")))?;
        if entry.file_type().is_dir() {
            continue;
        }
        fs::remove_file(entry.path()).map_err(|e| {
            Error::fs(format!("failed to remove {}: {e}", entry.path().display()))
        })?;
        removed += 1;
    }
    Ok(removed)
}

pub fn reset_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::fs(format!(
                "failed to remove {}: {e}",
                dir.display()
            )));
        }
    }
    ensure_dir(dir)
}

// Recursively copy `src` into `dst`, skipping version-control metadata.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    ensure_dir(dst)?;
    let mut copied = 0usize;
    let walker = walkdir::WalkDir::new(src)
        .into_iter()
        .filter_entry(|e| e.file_name() != VCS_DIR);
    for entry in walker {
        let entry = entry.map_err(|e| Error::fs(format!("walkdir error: {e}")))?;
        let p = entry.path();
        let rel = p
            .strip_prefix(src)
            .map_err(|e| Error::fs(format!("strip_prefix failed: {e}")))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dst.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            ensure_dir(parent)?;
        }
        fs::copy(p, &out).map_err(|e| {
            Error::fs(format!(
                "failed to copy {} -> {}: {e}",
                p.display(),
                out.display()
            ))
        })?;
        copied += 1;
    }
    Ok(copied)
}

pub fn copy_top_level_files(src: &Path, dst: &Path) -> Result<usize> {
    ensure_dir(dst)?;
    let entries = fs::read_dir(src)
        .map_err(|e| Error::fs(format!("failed to read dir {}: {e}", src.display())))?;
    let mut copied = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| Error::fs(format!("failed to read dir entry: {e}")))?;
        let ft = entry
            .file_type()
            .map_err(|e| Error::fs(format!("failed to stat {}: {e}", entry.path().display())))?;
        if !ft.is_file() {
            continue;
        }
        let out = dst.join(entry.file_name());
        fs::copy(entry.path(), &out).map_err(|e| {
            Error::fs(format!(
                "failed to copy {} -> {}: {e}",
                entry.path().display(),
                out.display()
            ))
        })?;
        copied += 1;
    }
    Ok(copied)
}

pub fn tree_digest(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let walker = walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != VCS_DIR);
    for entry in walker {
        let entry = entry.map_err(|e| Error::fs(format!("walkdir error: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::fs(format!("strip_prefix failed: {e}")))?;
        let body = fs::read(entry.path())
            .map_err(|e| Error::fs(format!("failed to read {}: {e}", entry.path().display())))?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update((body.len() as u64).to_le_bytes());
        hasher.update(&body);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_files_keeps_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("env");
        write_bytes(&root.join("a.json"), b"a").expect("a");
        write_bytes(&root.join("ws/b.json"), b"b").expect("b");
        write_bytes(&root.join("ws/app/c.srego"), b"c").expect("c");

        let n = remove_files_keep_dirs(&root).expect("remove");
        assert_eq!(n, 3);
        assert!(root.join("ws/app").is_dir());
        assert!(!root.join("ws/b.json").exists());
    }

    #[test]
    fn tree_digest_ignores_vcs_dir_and_tracks_content() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        write_bytes(&root.join("x/one.json"), b"1").expect("one");
        let before = tree_digest(root).expect("digest");

        write_bytes(&root.join(".git/HEAD"), b"ref: refs/heads/main").expect("head");
        assert_eq!(tree_digest(root).expect("digest"), before);

        write_bytes(&root.join("x/one.json"), b"2").expect("one");
        assert_ne!(tree_digest(root).expect("digest"), before);
    }

    #[test]
    fn copy_tree_skips_vcs_metadata() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_bytes(&src.join(".git/config"), b"[core]").expect("cfg");
        write_bytes(&src.join("e_1/w/app/application.json"), b"{}").expect("app");

        let n = copy_tree(&src, &dst).expect("copy");
        assert_eq!(n, 1);
        assert!(dst.join("e_1/w/app/application.json").is_file());
        assert!(!dst.join(".git").exists());
    }

    #[cfg(unix)]
    #[test]
    fn written_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().expect("tempdir");
        let p = tmp.path().join("secret.json");
        write_bytes(&p, b"{}").expect("write");
        let mode = fs::metadata(&p).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
