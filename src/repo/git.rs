use std::cell::OnceCell;
use tracing::{debug, instrument};

use super::{Repository, Similarity};
use crate::command::{Vcs, VcsCli};
use crate::error::{Error, Result};
use crate::types::ChangeRecord;

/// Keeps git from octal-escaping non-ASCII path names.
const UNQUOTED_PATHS: [&str; 2] = ["-c", "core.quotePath=false"];

/// Git repository adapter
pub struct GitRepo<V: Vcs = VcsCli> {
    vcs: V,
    similarity: Similarity,
    commits: OnceCell<Vec<String>>,
}

impl<V: Vcs> GitRepo<V> {
    #[must_use]
    pub const fn new(vcs: V, similarity: Similarity) -> Self {
        Self {
            vcs,
            similarity,
            commits: OnceCell::new(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<Vec<String>> {
        let full: Vec<&str> = UNQUOTED_PATHS.iter().chain(args).copied().collect();
        self.vcs.run(&full)
    }

    #[instrument(skip(self))]
    fn commits(&self) -> Result<&[String]> {
        if let Some(commits) = self.commits.get() {
            return Ok(commits);
        }
        let commits = self.git(&["rev-list", "--all"])?;
        debug!(commits = commits.len(), "Commit list loaded");
        Ok(self.commits.get_or_init(|| commits))
    }
}

impl<V: Vcs> Repository for GitRepo<V> {
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
        let to = to.unwrap_or("HEAD");

        let Some(from) = from else {
            debug!(to = %to, "No starting point, listing the whole tree");
            let files = self.git(&["ls-tree", "-r", "--name-only", to])?;
            return Ok(files.into_iter().map(ChangeRecord::added).collect());
        };

        let range = format!("{from}..{to}");
        let lines = self.git(&["diff", "--name-status", "-C", &range])?;
        parse_diff(&lines, self.similarity)
    }
}

/// Classifies `git diff --name-status -C` output.
///
/// Records come out in input order. A rename below the rename threshold
/// becomes `Deleted(old)` followed by `Added(new)`; a copy below the copy
/// threshold becomes `Added(destination)` only.
///
/// # Errors
///
/// Returns [`Error::ParseError`] for a status the classifier does not know or
/// a line with the wrong number of paths.
pub fn parse_diff<S: AsRef<str>>(lines: &[S], similarity: Similarity) -> Result<Vec<ChangeRecord>> {
    let mut changes = Vec::with_capacity(lines.len());
    for line in lines {
        parse_line(line.as_ref(), similarity, &mut changes)?;
    }
    Ok(changes)
}

// Tabs inside file names are not distinguished from field separators.
fn parse_line(line: &str, similarity: Similarity, changes: &mut Vec<ChangeRecord>) -> Result<()> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Ok(());
    }
    let invalid = || Error::ParseError(line.to_string());

    let mut fields = line.split('\t').filter(|field| !field.is_empty());
    let status = fields.next().ok_or_else(invalid)?;
    let paths: Vec<&str> = fields.collect();

    match (status, paths.as_slice()) {
        ("A", [path]) => changes.push(ChangeRecord::added(*path)),
        ("M", [path]) => changes.push(ChangeRecord::modified(*path)),
        ("D", [path]) => changes.push(ChangeRecord::deleted(*path)),
        (status, [old, new]) if status.starts_with('R') => {
            let score = score(status, 'R').ok_or_else(invalid)?;
            if score >= u32::from(similarity.rename) {
                changes.push(ChangeRecord::renamed(*old, *new));
            } else {
                debug!(old, new, score, "Rename below threshold, splitting");
                changes.push(ChangeRecord::deleted(*old));
                changes.push(ChangeRecord::added(*new));
            }
        }
        (status, [source, destination]) if status.starts_with('C') => {
            let score = score(status, 'C').ok_or_else(invalid)?;
            if score >= u32::from(similarity.copy) {
                changes.push(ChangeRecord::copied(*source, *destination));
            } else {
                debug!(source, destination, score, "Copy below threshold, treating as addition");
                changes.push(ChangeRecord::added(*destination));
            }
        }
        _ => return Err(invalid()),
    }
    Ok(())
}

/// Similarity score of an `R<NN>` / `C<NN>` status.
fn score(status: &str, prefix: char) -> Option<u32> {
    let digits = status.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
