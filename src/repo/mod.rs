//! Repository adapters.
//!
//! A [`Repository`] lists commits and classifies the file-level changes
//! between two revision markers. Git and Mercurial are supported; pick one
//! with [`open`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::command::VcsCli;
use crate::error::{Error, Result};
use crate::types::ChangeRecord;

pub mod git;
pub mod hg;

pub use git::GitRepo;
pub use hg::HgRepo;

/// Operations every version-control backend provides.
pub trait Repository {
    /// All commit identifiers in the repository, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend command fails.
    fn commit_list(&self) -> Result<Vec<String>>;

    /// Classified changes needed to go from `from` to `to`.
    ///
    /// `from == to` yields nothing. A missing `from` lists every file at `to`
    /// as added. A missing `to` means the backend's current head.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend command fails or its output cannot be
    /// classified.
    fn diff(&self, from: Option<&str>, to: Option<&str>) -> Result<Vec<ChangeRecord>>;

    /// Whether `marker` names a commit in [`Repository::commit_list`].
    ///
    /// # Errors
    ///
    /// Returns an error if the commit list cannot be read.
    fn has_commit(&self, marker: &str) -> Result<bool> {
        Ok(self.commit_list()?.iter().any(|commit| commit == marker))
    }
}

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepoKind {
    #[default]
    Git,
    Mercurial,
}

impl FromStr for RepoKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "hg" | "mercurial" => Ok(Self::Mercurial),
            _ => Err(Error::UnsupportedRepoError(s.to_string())),
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git => f.write_str("git"),
            Self::Mercurial => f.write_str("hg"),
        }
    }
}

/// Minimum similarity percentages for a rename or copy to be reported as
/// such rather than split into simpler changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Similarity {
    pub rename: u8,
    pub copy: u8,
}

impl Similarity {
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if either value is above 100.
    pub fn new(rename: u8, copy: u8) -> Result<Self> {
        for (name, value) in [("rename", rename), ("copy", copy)] {
            if value > 100 {
                return Err(Error::ConfigError(format!(
                    "similarity.{name} must be between 0 and 100, got {value}"
                )));
            }
        }
        Ok(Self { rename, copy })
    }
}

impl Default for Similarity {
    fn default() -> Self {
        Self {
            rename: 100,
            copy: 100,
        }
    }
}

/// Creates the repository adapter for `kind` rooted at `path`.
#[must_use]
pub fn open(kind: RepoKind, path: &Path, similarity: Similarity) -> Box<dyn Repository> {
    match kind {
        RepoKind::Git => Box::new(GitRepo::new(VcsCli::new("git", path), similarity)),
        RepoKind::Mercurial => Box::new(HgRepo::new(VcsCli::new("hg", path))),
    }
}
