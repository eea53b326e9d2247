use tracing::{debug, instrument};

use crate::error::{Error, HandlerError, Result};
use crate::repo::Repository;
use crate::types::{ChangeKind, ChangeMask, ChangeRecord};

/// Callback invoked with the kind of a change and its affected paths.
pub type Handler = Box<dyn FnMut(ChangeKind, &[String]) -> std::result::Result<(), HandlerError>>;

/// Counts from one [`Dispatcher::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub records: usize,
    pub invocations: usize,
}

/// Routes classified changes to the handlers subscribed to their kind.
///
/// Handlers are grouped by the exact mask they were registered with, in the
/// order each mask was first seen. Within a group, handlers run in
/// registration order.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<(ChangeMask, Vec<Handler>)>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to every change kind in `mask`.
    pub fn add_handler<F>(&mut self, mask: impl Into<ChangeMask>, handler: F)
    where
        F: FnMut(ChangeKind, &[String]) -> std::result::Result<(), HandlerError> + 'static,
    {
        let mask = mask.into();
        let handler: Handler = Box::new(handler);
        match self.handlers.iter_mut().find(|(m, _)| *m == mask) {
            Some((_, group)) => group.push(handler),
            None => self.handlers.push((mask, vec![handler])),
        }
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.iter().map(|(_, group)| group.len()).sum()
    }

    /// Handlers subscribed to `kind`, in dispatch order.
    pub fn handlers_for(&mut self, kind: ChangeKind) -> impl Iterator<Item = &mut Handler> + '_ {
        self.handlers
            .iter_mut()
            .filter(move |(mask, _)| mask.matches(kind))
            .flat_map(|(_, group)| group.iter_mut())
    }

    /// Calls every handler whose mask intersects each change between `from`
    /// and `to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommit`] if either marker is not in the
    /// repository, any error from the diff, or the first handler failure.
    /// Dispatch stops at the first failing handler.
    #[instrument(skip(self, repo))]
    pub fn run(
        &mut self,
        repo: &dyn Repository,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<DispatchReport> {
        for marker in [from, to].into_iter().flatten() {
            if !repo.has_commit(marker)? {
                return Err(Error::UnknownCommit(marker.to_string()));
            }
        }

        let changes = repo.diff(from, to)?;
        debug!(changes = changes.len(), "Dispatching changes");

        let mut report = DispatchReport::default();
        for change in &changes {
            report.invocations += self.dispatch(change)?;
            report.records += 1;
        }

        debug!(
            records = report.records,
            invocations = report.invocations,
            "Dispatch complete"
        );
        Ok(report)
    }

    fn dispatch(&mut self, change: &ChangeRecord) -> Result<usize> {
        let mut invocations = 0;
        for handler in self.handlers_for(change.kind()) {
            handler(change.kind(), change.paths()).map_err(Error::HandlerError)?;
            invocations += 1;
        }
        Ok(invocations)
    }
}
