//! PID lock file keeping two runs from processing the same repository.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

/// Answers whether a process id belongs to a running process.
pub trait ProcessTable {
    fn is_running(&self, pid: u32) -> bool;
}

/// [`ProcessTable`] backed by the operating system's process list.
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn is_running(&self, pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_process(Pid::from_u32(pid))
    }
}

/// Exclusive lock held for the lifetime of a run.
///
/// The file contains the holder's process id. A lock left behind by a process
/// that is no longer running is treated as stale and replaced. The file is
/// removed on [`PidLock::release`] or drop.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    pid: u32,
    held: bool,
}

impl PidLock {
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if a running process holds the lock, or an
    /// I/O error if the lock file cannot be written.
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_with(path, std::process::id(), &SystemProcessTable)
    }

    /// Acquires the lock for `pid`, checking liveness of any existing holder
    /// against `processes`.
    ///
    /// # Errors
    ///
    /// See [`PidLock::acquire`].
    #[instrument(skip(processes))]
    pub fn acquire_with(path: &Path, pid: u32, processes: &impl ProcessTable) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                match contents.trim().parse::<u32>() {
                    Ok(holder) if processes.is_running(holder) => {
                        return Err(Error::Locked {
                            path: path.to_path_buf(),
                            pid: holder,
                        });
                    }
                    Ok(holder) => warn!(pid = holder, "Removing stale lock file"),
                    Err(_) => warn!(contents = %contents.trim(), "Removing unreadable lock file"),
                }
                fs::remove_file(path)?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(path)
                    .ok()
                    .and_then(|c| c.trim().parse().ok())
                    .unwrap_or_default();
                return Err(Error::Locked {
                    path: path.to_path_buf(),
                    pid: holder,
                });
            }
            Err(e) => return Err(e.into()),
        };
        write!(file, "{pid}")?;

        debug!("Lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            pid,
            held: true,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the lock file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be removed.
    pub fn release(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim() == self.pid.to_string() => {
                fs::remove_file(&self.path)?;
                debug!(path = %self.path.display(), "Lock released");
            }
            Ok(_) => warn!(path = %self.path.display(), "Lock file taken over by another process, leaving it"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(error = %e, path = %self.path.display(), "Unable to remove lock file");
        }
    }
}
