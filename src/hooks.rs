//! Shell commands declared under `hooks:` in the config, run as handlers.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, instrument};

use crate::config::HookConfig;
use crate::dispatcher::Dispatcher;
use crate::error::HandlerError;
use crate::types::{ChangeKind, ChangeMask};

/// A configured shell command subscribed to a set of change kinds.
///
/// The command runs through `sh -c` in the project directory. The affected
/// paths are passed as positional arguments (`$1`, `$2`) and the change kind
/// as `SQUEEZE_CHANGE`; `SQUEEZE_PATHS` holds the paths joined by tabs.
#[derive(Debug, Clone)]
pub struct ShellHook {
    mask: ChangeMask,
    command: String,
    workdir: PathBuf,
}

impl ShellHook {
    #[must_use]
    pub fn new(config: &HookConfig, workdir: &Path) -> Self {
        Self {
            mask: config.changes.iter().copied().collect(),
            command: config.run.clone(),
            workdir: workdir.to_path_buf(),
        }
    }

    #[must_use]
    pub const fn mask(&self) -> ChangeMask {
        self.mask
    }

    /// Runs the command for one change.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be started or the command exits
    /// non-zero.
    #[instrument(skip(self), fields(command = %self.command))]
    pub fn call(&self, kind: ChangeKind, paths: &[String]) -> Result<(), HandlerError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .arg("squeeze")
            .args(paths)
            .env("SQUEEZE_CHANGE", kind.as_str())
            .env("SQUEEZE_PATHS", paths.join("\t"))
            .current_dir(&self.workdir)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(status = %output.status, stderr = %stderr, "Hook failed");
            return Err(format!(
                "hook `{}` exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )
            .into());
        }

        debug!(stdout_length = output.stdout.len(), "Hook completed");
        Ok(())
    }

    /// Registers the hook with `dispatcher`. Hooks with no change kinds are
    /// skipped.
    pub fn register(self, dispatcher: &mut Dispatcher) {
        if self.mask.is_empty() {
            debug!(command = %self.command, "Hook has no change kinds, skipping");
            return;
        }
        dispatcher.add_handler(self.mask, move |kind, paths: &[String]| self.call(kind, paths));
    }
}
