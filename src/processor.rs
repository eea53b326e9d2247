use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, Settings};
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::{Error, HandlerError, Result};
use crate::hooks::ShellHook;
use crate::lock::PidLock;
use crate::repo::{self, Repository};
use crate::state::RevisionStore;
use crate::types::{ChangeKind, ChangeMask};

/// Directory marking a project root; holds config, lock, marker and log.
pub const DATA_DIR: &str = ".squeeze";
pub const CONFIG_FILE: &str = "config.yml";
pub const LATEST_FILE: &str = "latest";
pub const LOCK_FILE: &str = ".lock";
pub const LOG_FILE: &str = "current.log";

/// Walks up from `start` to the first directory containing [`DATA_DIR`].
/// A relative `start` is resolved against the current directory first.
///
/// # Errors
///
/// Returns [`Error::BaseDirNotFound`] if no ancestor has one, or an I/O
/// error if the current directory cannot be read.
pub fn find_base_dir(start: &Path) -> Result<PathBuf> {
    std::path::absolute(start)?
        .ancestors()
        .find(|dir| dir.join(DATA_DIR).is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::BaseDirNotFound(start.to_path_buf()))
}

/// Creates [`DATA_DIR`] with an empty config in `dir`. Existing files are
/// left untouched.
///
/// # Errors
///
/// Returns an I/O error if the directory or config cannot be created.
#[instrument]
pub fn init(dir: &Path) -> Result<PathBuf> {
    let data_dir = dir.join(DATA_DIR);
    fs::create_dir_all(&data_dir)?;
    let config_path = data_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        debug!(path = %config_path.display(), "Creating empty config");
        fs::write(&config_path, "")?;
    }
    Ok(data_dir)
}

/// Result of one [`Squeeze::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The repository has no commits yet.
    NoCommits,
    /// The recorded marker already is the newest commit.
    UpToDate { revision: String },
    Processed {
        from: Option<String>,
        to: String,
        report: DispatchReport,
    },
}

/// Runs registered handlers for every change since the last processed
/// revision of a project.
///
/// Holds the project's lock file from construction until it is dropped or
/// [`Squeeze::release`]d.
pub struct Squeeze {
    base_dir: PathBuf,
    settings: Settings,
    repo: Box<dyn Repository>,
    dispatcher: Dispatcher,
    revisions: RevisionStore,
    lock: PidLock,
}

impl Squeeze {
    /// Opens the project containing `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if no project directory is found or [`Squeeze::open`]
    /// fails.
    pub fn discover(start: &Path) -> Result<Self> {
        Self::open(&find_base_dir(start)?)
    }

    /// Opens the project rooted at `base_dir`, using the repository backend
    /// named in its config.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held by a running process or the
    /// config cannot be loaded.
    #[instrument]
    pub fn open(base_dir: &Path) -> Result<Self> {
        Self::build(base_dir, |settings| {
            repo::open(settings.repo, base_dir, settings.similarity)
        })
    }

    /// Opens the project rooted at `base_dir` with a caller-supplied
    /// repository adapter.
    ///
    /// # Errors
    ///
    /// See [`Squeeze::open`].
    pub fn with_repository(base_dir: &Path, repo: Box<dyn Repository>) -> Result<Self> {
        Self::build(base_dir, |_| repo)
    }

    fn build(
        base_dir: &Path,
        make_repo: impl FnOnce(&Settings) -> Box<dyn Repository>,
    ) -> Result<Self> {
        let data_dir = init(base_dir)?;
        let lock = PidLock::acquire(&data_dir.join(LOCK_FILE))?;
        debug!(lock = %lock.path().display(), "Initializing");

        let settings = Settings::from_config(&Config::load(&data_dir.join(CONFIG_FILE))?)?;
        debug!(repo = %settings.repo, similarity = ?settings.similarity, hooks = settings.hooks.len(), "Settings loaded");

        let mut dispatcher = Dispatcher::new();
        for hook in &settings.hooks {
            ShellHook::new(hook, base_dir).register(&mut dispatcher);
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            repo: make_repo(&settings),
            settings,
            dispatcher,
            revisions: RevisionStore::new(data_dir.join(LATEST_FILE)),
            lock,
        })
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Subscribes `handler` to the change kinds in `mask`.
    pub fn add_handler<F>(&mut self, mask: impl Into<ChangeMask>, handler: F)
    where
        F: FnMut(ChangeKind, &[String]) -> std::result::Result<(), HandlerError> + 'static,
    {
        self.dispatcher.add_handler(mask, handler);
    }

    /// The last fully processed revision, if any.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the marker file cannot be read.
    pub fn last_run(&self) -> Result<Option<String>> {
        self.revisions.read()
    }

    /// Dispatches every change from the last processed revision to the newest
    /// commit, then records the newest commit as processed.
    ///
    /// The marker is left untouched if anything fails, so the next run covers
    /// the same changes again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleRevision`] if the recorded marker is no longer
    /// in the history, and any repository or handler error.
    #[instrument(skip(self), fields(base_dir = %self.base_dir.display()))]
    pub fn run(&mut self) -> Result<RunOutcome> {
        debug!("Starting run");
        let commits = self.repo.commit_list()?;
        let Some(latest) = commits.first().cloned() else {
            warn!("There are currently no commits in repo");
            return Ok(RunOutcome::NoCommits);
        };

        let last = self.revisions.read()?;
        match &last {
            None => warn!("Unable to determine last run. Treating all files as new"),
            Some(last) if *last == latest => {
                info!(revision = %latest, "Already up to date");
                return Ok(RunOutcome::UpToDate { revision: latest });
            }
            Some(last) if !commits.contains(last) => {
                error!(revision = %last, "Recorded revision not in history");
                return Err(Error::StaleRevision(last.clone()));
            }
            Some(_) => {}
        }

        info!(from = ?last, to = %latest, "Querying changes");
        let report = self
            .dispatcher
            .run(self.repo.as_ref(), last.as_deref(), Some(&latest))?;

        self.revisions.write(&latest)?;
        info!(
            records = report.records,
            invocations = report.invocations,
            revision = %latest,
            "Run complete"
        );

        Ok(RunOutcome::Processed {
            from: last,
            to: latest,
            report,
        })
    }

    /// Releases the lock file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the lock file cannot be removed.
    pub fn release(self) -> Result<()> {
        self.lock.release()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::types::ChangeRecord;
    use tree_fs::{Tree, TreeBuilder};

    struct StaticRepo {
        commits: Vec<String>,
        changes: Vec<ChangeRecord>,
    }

    impl Repository for StaticRepo {
        fn commit_list(&self) -> Result<Vec<String>> {
            Ok(self.commits.clone())
        }

        fn diff(&self, from: Option<&str>, to: Option<&str>) -> Result<Vec<ChangeRecord>> {
            if from == to {
                return Ok(Vec::new());
            }
            Ok(self.changes.clone())
        }
    }

    fn project(files: &[(&str, &str)]) -> Tree {
        let tree = TreeBuilder::default().create().unwrap();
        init(&tree.root).unwrap();
        for (path, content) in files {
            let path = tree.root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        tree
    }

    fn repo(commits: &[&str], changes: Vec<ChangeRecord>) -> Box<dyn Repository> {
        Box::new(StaticRepo {
            commits: commits.iter().map(|c| (*c).to_string()).collect(),
            changes,
        })
    }

    #[test]
    fn finds_base_dir_from_nested_directory() {
        let tree = project(&[("src/deep/file.txt", "x")]);
        let found = find_base_dir(&tree.root.join("src/deep")).unwrap();
        assert_eq!(found, tree.root);
    }

    #[test]
    fn missing_base_dir_is_an_error() {
        let tree = TreeBuilder::default().create().unwrap();
        assert!(matches!(
            find_base_dir(&tree.root),
            Err(Error::BaseDirNotFound(_))
        ));
    }

    #[test]
    fn first_run_dispatches_and_records_latest() {
        let tree = project(&[]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut squeeze = Squeeze::with_repository(
            &tree.root,
            repo(&["c2", "c1"], vec![ChangeRecord::added("x"), ChangeRecord::added("y")]),
        )
        .unwrap();

        let sink = Rc::clone(&seen);
        squeeze.add_handler(ChangeKind::Added, move |_, paths: &[String]| {
            sink.borrow_mut().extend_from_slice(paths);
            Ok(())
        });

        let outcome = squeeze.run().unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Processed {
                from: None,
                to: "c2".to_string(),
                report: DispatchReport {
                    records: 2,
                    invocations: 2
                },
            }
        );
        assert_eq!(*seen.borrow(), vec!["x", "y"]);
        assert_eq!(squeeze.last_run().unwrap().as_deref(), Some("c2"));
    }

    #[test]
    fn up_to_date_run_does_nothing() {
        let tree = project(&[(".squeeze/latest", "c2")]);
        let mut squeeze =
            Squeeze::with_repository(&tree.root, repo(&["c2", "c1"], vec![ChangeRecord::added("x")]))
                .unwrap();

        assert_eq!(
            squeeze.run().unwrap(),
            RunOutcome::UpToDate {
                revision: "c2".to_string()
            }
        );
    }

    #[test]
    fn empty_repository_has_nothing_to_do() {
        let tree = project(&[]);
        let mut squeeze = Squeeze::with_repository(&tree.root, repo(&[], Vec::new())).unwrap();
        assert_eq!(squeeze.run().unwrap(), RunOutcome::NoCommits);
    }

    #[test]
    fn stale_marker_is_fatal() {
        let tree = project(&[(".squeeze/latest", "rewritten")]);
        let mut squeeze =
            Squeeze::with_repository(&tree.root, repo(&["c2", "c1"], Vec::new())).unwrap();

        let err = squeeze.run().unwrap_err();
        assert!(matches!(err, Error::StaleRevision(marker) if marker == "rewritten"));
        assert_eq!(squeeze.last_run().unwrap().as_deref(), Some("rewritten"));
    }

    #[test]
    fn handler_failure_keeps_previous_marker() {
        let tree = project(&[(".squeeze/latest", "c1")]);
        let mut squeeze = Squeeze::with_repository(
            &tree.root,
            repo(&["c2", "c1"], vec![ChangeRecord::modified("x")]),
        )
        .unwrap();
        squeeze.add_handler(ChangeMask::ALL, |_, _: &[String]| Err("boom".into()));

        assert!(matches!(squeeze.run(), Err(Error::HandlerError(_))));
        assert_eq!(squeeze.last_run().unwrap().as_deref(), Some("c1"));
    }

    #[test]
    fn second_instance_is_locked_out_until_release() {
        let tree = project(&[]);
        let lock_path = tree.root.join(DATA_DIR).join(LOCK_FILE);

        let first = Squeeze::with_repository(&tree.root, repo(&["c1"], Vec::new())).unwrap();
        assert!(lock_path.exists());
        assert!(matches!(
            Squeeze::with_repository(&tree.root, repo(&["c1"], Vec::new())),
            Err(Error::Locked { .. })
        ));

        first.release().unwrap();
        assert!(!lock_path.exists());
        assert!(Squeeze::with_repository(&tree.root, repo(&["c1"], Vec::new())).is_ok());
    }

    #[test]
    fn configured_hooks_are_registered() {
        let tree = project(&[(
            ".squeeze/config.yml",
            "hooks:\n  - changes: [added]\n    run: echo \"$1\" >> added.txt\n",
        )]);
        let mut squeeze = Squeeze::with_repository(
            &tree.root,
            repo(&["c1"], vec![ChangeRecord::added("a.txt"), ChangeRecord::deleted("b.txt")]),
        )
        .unwrap();

        squeeze.run().unwrap();
        assert_eq!(
            fs::read_to_string(tree.root.join("added.txt")).unwrap(),
            "a.txt\n"
        );
    }
}
