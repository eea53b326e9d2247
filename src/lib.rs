pub use dispatcher::{DispatchReport, Dispatcher, Handler};
pub use error::{Error, HandlerError, Result};
pub use processor::{RunOutcome, Squeeze};
pub use repo::{RepoKind, Repository, Similarity};
pub use types::{ChangeKind, ChangeMask, ChangeRecord};

use std::path::Path;

pub mod command;
pub mod config;
pub mod dispatcher;
mod error;
pub mod hooks;
pub mod lock;
pub mod processor;
pub mod repo;
pub mod state;
mod types;

/// Opens the squeeze project containing `start`.
///
/// Walks up from `start` to the first directory holding a `.squeeze` folder,
/// takes its lock file and loads its config.
///
/// # Errors
///
/// Returns an error if no project is found, another live process holds the
/// lock, or the config is invalid.
pub fn discover(start: &Path) -> Result<Squeeze> {
    Squeeze::discover(start)
}

/// Opens the squeeze project rooted at `base_dir`.
///
/// # Errors
///
/// Returns an error if another live process holds the lock or the config is
/// invalid.
pub fn open(base_dir: &Path) -> Result<Squeeze> {
    Squeeze::open(base_dir)
}
