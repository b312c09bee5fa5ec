// src/workspace/pipeline.rs

//! Single-slot asynchronous operation pipeline of a workspace.
//!
//! ```text
//! NotStarted --begin--> Running --finish--> HasResultPendingFetch
//!      ^                                            |
//!      +------------------- take -------------------+
//! ```

use tracing::debug;

use crate::errors::{OperationKind, PipelineState, Result, WorkspaceError};

use super::ApplyResult;

/// Result of a finished asynchronous operation.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncResult {
    Applied(ApplyResult),
    Destroyed,
}

#[derive(Debug, Default)]
pub(crate) enum Pipeline {
    #[default]
    Idle,
    Running(OperationKind),
    Done(OperationKind, Result<AsyncResult>),
}

impl Pipeline {
    pub(crate) fn state(&self) -> PipelineState {
        match self {
            Pipeline::Idle => PipelineState::NotStarted,
            Pipeline::Running(_) => PipelineState::Running,
            Pipeline::Done(..) => PipelineState::HasResultPendingFetch,
        }
    }

    /// Operation that prevents a new one from starting, if any.
    pub(crate) fn blocking_operation(&self) -> Option<OperationKind> {
        match self {
            Pipeline::Idle => None,
            Pipeline::Running(kind) | Pipeline::Done(kind, _) => Some(*kind),
        }
    }

    /// Fail with `OperationInProgress` unless the slot is free.
    pub(crate) fn ensure_idle(&self) -> Result<()> {
        match self.blocking_operation() {
            Some(kind) => Err(WorkspaceError::OperationInProgress(kind)),
            None => Ok(()),
        }
    }

    pub(crate) fn begin(&mut self, kind: OperationKind) -> Result<()> {
        self.ensure_idle()?;
        debug!(op = %kind, "asynchronous operation started");
        *self = Pipeline::Running(kind);
        Ok(())
    }

    pub(crate) fn finish(&mut self, kind: OperationKind, result: Result<AsyncResult>) {
        debug!(op = %kind, success = result.is_ok(), "asynchronous operation finished");
        *self = Pipeline::Done(kind, result);
    }

    /// Hand out the stored result and reset to `NotStarted`.
    pub(crate) fn take(&mut self) -> Result<AsyncResult> {
        match std::mem::take(self) {
            Pipeline::Done(_, result) => result,
            pending => {
                let state = pending.state();
                *self = pending;
                Err(WorkspaceError::PipelineInProgress(state))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::pipeline_in_progress;

    #[test]
    fn full_cycle_returns_to_not_started() {
        let mut p = Pipeline::default();
        assert_eq!(p.state(), PipelineState::NotStarted);

        p.begin(OperationKind::Apply).unwrap();
        assert_eq!(p.state(), PipelineState::Running);

        p.finish(OperationKind::Apply, Ok(AsyncResult::Destroyed));
        assert_eq!(p.state(), PipelineState::HasResultPendingFetch);

        assert_eq!(p.take().unwrap(), AsyncResult::Destroyed);
        assert_eq!(p.state(), PipelineState::NotStarted);
    }

    #[test]
    fn take_reports_why_no_result() {
        let mut p = Pipeline::default();
        let err = p.take().unwrap_err();
        assert_eq!(pipeline_in_progress(&err), (PipelineState::NotStarted, true));

        p.begin(OperationKind::Destroy).unwrap();
        let err = p.take().unwrap_err();
        assert_eq!(pipeline_in_progress(&err), (PipelineState::Running, true));
    }

    #[test]
    fn begin_is_blocked_until_result_is_fetched() {
        let mut p = Pipeline::default();
        p.begin(OperationKind::Apply).unwrap();
        assert!(matches!(
            p.begin(OperationKind::Destroy),
            Err(WorkspaceError::OperationInProgress(OperationKind::Apply))
        ));

        p.finish(OperationKind::Apply, Err(WorkspaceError::Cancelled));
        assert!(matches!(
            p.begin(OperationKind::Destroy),
            Err(WorkspaceError::OperationInProgress(OperationKind::Apply))
        ));

        assert!(matches!(p.take(), Err(WorkspaceError::Cancelled)));
        p.begin(OperationKind::Destroy).unwrap();
    }
}
