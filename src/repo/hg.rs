use std::cell::OnceCell;
use tracing::{debug, instrument};

use super::Repository;
use crate::command::{Vcs, VcsCli};
use crate::error::{Error, Result};
use crate::types::ChangeRecord;

/// Mercurial repository adapter
///
/// `hg status` has no similarity score, so copies and renames are reported
/// whenever Mercurial recorded them.
pub struct HgRepo<V: Vcs = VcsCli> {
    vcs: V,
    commits: OnceCell<Vec<String>>,
}

impl<V: Vcs> HgRepo<V> {
    #[must_use]
    pub const fn new(vcs: V) -> Self {
        Self {
            vcs,
            commits: OnceCell::new(),
        }
    }

    #[instrument(skip(self))]
    fn commits(&self) -> Result<&[String]> {
        if let Some(commits) = self.commits.get() {
            return Ok(commits);
        }
        let commits = self.vcs.run(&["log", "--template", "{node}\\n"])?;
        debug!(commits = commits.len(), "Changeset list loaded");
        Ok(self.commits.get_or_init(|| commits))
    }
}

impl<V: Vcs> Repository for HgRepo<V> {
    fn commit_list(&self) -> Result<Vec<String>> {
        Ok(self.commits()?.to_vec())
    }

    fn has_commit(&self, marker: &str) -> Result<bool> {
        Ok(self.commits()?.iter().any(|commit| commit == marker))
    }

    #[instrument(skip(self))]
    fn diff(&self, from: Option<&str>, to: Option<&str>) -> Result<Vec<ChangeRecord>> {
        if from == to {
            debug!("Nothing to diff");
            return Ok(Vec::new());
        }
        let to = to.unwrap_or("tip");

        let Some(from) = from else {
            debug!(to = %to, "No starting point, listing every tracked file");
            let files = self.vcs.run(&["files", "-r", to])?;
            return Ok(files.into_iter().map(ChangeRecord::added).collect());
        };

        let lines = self
            .vcs
            .run(&["status", "--copies", "--rev", from, "--rev", to])?;
        Ok(parse_status(&lines)?.into_records())
    }
}

/// Changes collected from `hg status --copies`, grouped by kind.
///
/// Copied and renamed entries are `(origin, destination)` pairs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HgChanges {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub modified: Vec<String>,
    pub copied: Vec<(String, String)>,
    pub renamed: Vec<(String, String)>,
    last_added: Option<String>,
}

impl HgChanges {
    /// Folds one status line into the groups.
    ///
    /// Lines are order dependent: an origin line (two leading spaces) names
    /// the source of the most recent `A` line, and a later `R` of that source
    /// turns the copy into a rename.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] for an unknown status character or an
    /// origin line with no `A` line before it.
    pub fn apply(mut self, line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let invalid = || Error::ParseError(line.to_string());

        let mut chars = line.chars();
        let status = chars.next().ok_or_else(invalid)?;
        let path = chars
            .as_str()
            .strip_prefix(' ')
            .filter(|path| !path.is_empty())
            .ok_or_else(invalid)?
            .to_string();

        match status {
            'A' => {
                self.last_added = Some(path.clone());
                self.added.push(path);
            }
            // Copy without a known origin
            'C' => self.added.push(path),
            'M' => self.modified.push(path),
            'R' => {
                let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.copied)
                    .into_iter()
                    .partition(|(origin, _)| *origin == path);
                self.copied = kept;
                if moved.is_empty() {
                    self.deleted.push(path);
                } else {
                    debug!(origin = %path, "Copy origin removed, reclassifying as rename");
                    self.renamed.extend(moved);
                }
            }
            ' ' => {
                let destination = self.last_added.clone().ok_or_else(invalid)?;
                if let Some(index) = self.added.iter().position(|p| *p == destination) {
                    self.added.remove(index);
                }
                self.copied.push((path, destination));
            }
            _ => return Err(invalid()),
        }
        Ok(self)
    }

    /// Flattens the groups into records: added, deleted, modified, renamed,
    /// then copied.
    #[must_use]
    pub fn into_records(self) -> Vec<ChangeRecord> {
        let Self {
            added,
            deleted,
            modified,
            copied,
            renamed,
            ..
        } = self;

        added
            .into_iter()
            .map(ChangeRecord::added)
            .chain(deleted.into_iter().map(ChangeRecord::deleted))
            .chain(modified.into_iter().map(ChangeRecord::modified))
            .chain(renamed.into_iter().map(|(old, new)| ChangeRecord::renamed(old, new)))
            .chain(copied.into_iter().map(|(source, dest)| ChangeRecord::copied(source, dest)))
            .collect()
    }
}

/// Classifies `hg status --copies` output.
///
/// # Errors
///
/// See [`HgChanges::apply`].
pub fn parse_status<S: AsRef<str>>(lines: &[S]) -> Result<HgChanges> {
    lines
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|line| !line.is_empty())
        .try_fold(HgChanges::default(), HgChanges::apply)
}
