pub mod git;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;

pub use git::{GitAuthor, GitCli};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    Opened,
    Cloned,
    Initialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChange {
    pub status: char,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    pub commit: String,
    pub message: Option<String>,
}

pub trait Vcs {
    fn branch(&self) -> &str;

    fn clone_or_open(&self, dir: &Path) -> Result<CheckoutKind>;
    fn open_remote(&self, dir: &Path) -> Result<()>;

    fn stage_all(&self, dir: &Path) -> Result<()>;
    fn staged_changes(&self, dir: &Path) -> Result<Vec<StagedChange>>;
    fn has_head(&self, dir: &Path) -> Result<bool>;
    fn commit(&self, dir: &Path, message: &str, when: DateTime<Utc>) -> Result<String>;
    fn create_branch_ref(&self, dir: &Path, commit: &str) -> Result<()>;

    fn tag_exists(&self, dir: &Path, name: &str) -> Result<bool>;
    fn create_annotated_tag(
        &self,
        dir: &Path,
        name: &str,
        commit: &str,
        message: &str,
        when: DateTime<Utc>,
    ) -> Result<()>;
    fn push(&self, dir: &Path, refspecs: &[String], force: bool) -> Result<()>;

    fn fetch_tags(&self, dir: &Path) -> Result<()>;
    fn fetch_tag(&self, dir: &Path, name: &str) -> Result<()>;
    fn list_tags(&self, dir: &Path) -> Result<Vec<TagRef>>;
    fn checkout_tag(&self, dir: &Path, name: &str) -> Result<()>;
}
