use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Trait defining the version-control command surface the repository
/// adapters need.
pub trait Vcs {
    /// Run the VCS with the given arguments and return its stdout lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero;
    /// the error carries the command's stderr.
    fn run(&self, args: &[&str]) -> Result<Vec<String>>;
}

/// Implementation of [`Vcs`] that shells out to a locally installed binary.
pub struct VcsCli {
    program: &'static str,
    repo_path: PathBuf,
}

impl VcsCli {
    #[must_use]
    pub fn new(program: &'static str, repo_path: &Path) -> Self {
        Self {
            program,
            repo_path: repo_path.to_path_buf(),
        }
    }
}

impl Vcs for VcsCli {
    #[instrument(skip(self), fields(program = %self.program, repo_path = %self.repo_path.display()))]
    fn run(&self, args: &[&str]) -> Result<Vec<String>> {
        let output = Command::new(self.program)
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::CommandError {
                program: self.program.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            debug!(error = %error, status = %output.status, "Command failed");
            return Err(Error::CommandError {
                program: self.program.to_string(),
                message: error.trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| Error::CommandError {
            program: self.program.to_string(),
            message: e.to_string(),
        })?;
        let lines: Vec<String> = stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        debug!(lines = lines.len(), "Command completed successfully");
        Ok(lines)
    }
}
