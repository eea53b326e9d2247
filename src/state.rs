use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::Result;

/// Single-line file holding the last fully processed revision marker.
#[derive(Debug, Clone)]
pub struct RevisionStore {
    path: PathBuf,
}

impl RevisionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last processed marker, or `None` if nothing was processed yet.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be read.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let marker = contents.trim();
                Ok((!marker.is_empty()).then(|| marker.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No revision marker recorded");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Records `marker` as processed.
    ///
    /// The marker is written to a sibling temporary file first and renamed
    /// into place, so the previous marker survives an interrupted write.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn write(&self, marker: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                debug!(parent_dir = %parent.display(), "Creating parent directory");
                fs::create_dir_all(parent)?;
            }
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, marker)?;
        fs::rename(&staging, &self.path)?;
        debug!("Revision marker saved");
        Ok(())
    }
}
