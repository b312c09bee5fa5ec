// src/errors.rs

//! Crate-wide error type and the asynchronous operation taxonomy.
//!
//! Besides ordinary failures, two variants are *signals* rather than failures:
//!
//! - [`WorkspaceError::OperationInProgress`]: an operation of some kind is
//!   running (or finished but not yet fetched) and blocks a new one.
//! - [`WorkspaceError::PipelineInProgress`]: a result was requested but cannot
//!   be returned yet; carries the [`PipelineState`] explaining why.
//!
//! Callers branch on these with the predicates in this module or with
//! [`classify`], never by matching on message text.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Kind of terraform operation run against a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Init,
    Plan,
    Apply,
    Destroy,
    Refresh,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Init => "init",
            OperationKind::Plan => "plan",
            OperationKind::Apply => "apply",
            OperationKind::Destroy => "destroy",
            OperationKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of an asynchronous operation as seen by a polling caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// No asynchronous operation has been started.
    NotStarted,
    /// The terraform CLI is still running.
    Running,
    /// The operation finished; its result waits to be fetched.
    HasResultPendingFetch,
    /// Sentinel returned when classifying an error that is not a pipeline
    /// signal.
    Invalid,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::NotStarted => "Asynchronous Terraform pipeline not started yet",
            PipelineState::Running => "Terraform CLI is still running",
            PipelineState::HasResultPendingFetch => "Result is not available yet",
            PipelineState::Invalid => "invalid",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("{0} operation is in progress")]
    OperationInProgress(OperationKind),

    #[error("pipeline in state: {0}")]
    PipelineInProgress(PipelineState),

    #[error("{context}: {source:#}")]
    Setup {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot init workspace: {output}")]
    Init { output: String },

    #[error("terraform {kind} failed with exit code {code:?}: {output}")]
    Command {
        kind: OperationKind,
        code: Option<i32>,
        output: String,
    },

    #[error("cannot remove workspace folder {dir:?}: {source:#}")]
    Removal {
        dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkspaceError {
    /// Wrap a lower-level failure with the step that produced it.
    pub fn setup(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        WorkspaceError::Setup {
            context: context.into(),
            source: source.into(),
        }
    }

    /// True for the two "try again later" signals.
    pub fn is_retry_later(&self) -> bool {
        matches!(
            self,
            WorkspaceError::OperationInProgress(_) | WorkspaceError::PipelineInProgress(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Find a `WorkspaceError` either directly or inside an `anyhow` chain.
fn find_workspace_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a WorkspaceError> {
    let mut current: Option<&'a (dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(ws) = e.downcast_ref::<WorkspaceError>() {
            return Some(ws);
        }
        current = e.source();
    }
    None
}

/// Returns true if `err` signals an in-progress operation of kind `kind`.
pub fn is_operation_in_progress(
    err: &(dyn std::error::Error + 'static),
    kind: OperationKind,
) -> bool {
    matches!(
        find_workspace_error(err),
        Some(WorkspaceError::OperationInProgress(k)) if *k == kind
    )
}

/// Returns true if `err` signals an apply currently in progress.
pub fn is_applying(err: &(dyn std::error::Error + 'static)) -> bool {
    is_operation_in_progress(err, OperationKind::Apply)
}

/// Returns true if `err` signals a destroy currently in progress.
pub fn is_destroying(err: &(dyn std::error::Error + 'static)) -> bool {
    is_operation_in_progress(err, OperationKind::Destroy)
}

/// Extract the pipeline state if `err` is a pipeline-in-progress signal.
///
/// Any other error yields `(PipelineState::Invalid, false)`.
pub fn pipeline_in_progress(err: &(dyn std::error::Error + 'static)) -> (PipelineState, bool) {
    match find_workspace_error(err) {
        Some(WorkspaceError::PipelineInProgress(state)) => (*state, true),
        _ => (PipelineState::Invalid, false),
    }
}

/// Structured view of an operation result for exhaustive matching.
#[derive(Debug)]
pub enum Signal<'a> {
    NoError,
    OperationInProgress(OperationKind),
    PipelineInProgress(PipelineState),
    Other(&'a WorkspaceError),
}

/// Classify a result into a [`Signal`].
pub fn classify<T>(result: &Result<T>) -> Signal<'_> {
    match result {
        Ok(_) => Signal::NoError,
        Err(WorkspaceError::OperationInProgress(kind)) => Signal::OperationInProgress(*kind),
        Err(WorkspaceError::PipelineInProgress(state)) => Signal::PipelineInProgress(*state),
        Err(other) => Signal::Other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn apply_in_progress_is_applying_only() {
        let err = WorkspaceError::OperationInProgress(OperationKind::Apply);
        assert!(is_applying(&err));
        assert!(!is_destroying(&err));
        assert!(is_operation_in_progress(&err, OperationKind::Apply));
        assert_eq!(err.to_string(), "apply operation is in progress");
    }

    #[test]
    fn operation_signals_differ_by_kind() {
        let apply = WorkspaceError::OperationInProgress(OperationKind::Apply);
        let destroy = WorkspaceError::OperationInProgress(OperationKind::Destroy);
        assert!(!matches!(
            (&apply, &destroy),
            (WorkspaceError::OperationInProgress(a), WorkspaceError::OperationInProgress(b)) if a == b
        ));
        assert!(is_destroying(&destroy));
        assert!(!is_applying(&destroy));
    }

    #[test]
    fn pipeline_states_classify_round_trip() {
        for state in [
            PipelineState::NotStarted,
            PipelineState::Running,
            PipelineState::HasResultPendingFetch,
        ] {
            let err = WorkspaceError::PipelineInProgress(state);
            assert_eq!(pipeline_in_progress(&err), (state, true));
        }
    }

    #[test]
    fn non_pipeline_error_classifies_as_invalid() {
        let err = WorkspaceError::Cancelled;
        assert_eq!(pipeline_in_progress(&err), (PipelineState::Invalid, false));

        let io = WorkspaceError::from(std::io::Error::other("boom"));
        assert_eq!(pipeline_in_progress(&io), (PipelineState::Invalid, false));
    }

    #[test]
    fn signals_are_found_through_anyhow_context() {
        let wrapped: anyhow::Error =
            Err::<(), _>(WorkspaceError::OperationInProgress(OperationKind::Destroy))
                .context("reconciling bucket")
                .unwrap_err();
        let err: &(dyn std::error::Error + 'static) = wrapped.as_ref();
        assert!(is_destroying(err));
    }

    #[test]
    fn classify_covers_every_shape() {
        let ok: Result<()> = Ok(());
        assert!(matches!(classify(&ok), Signal::NoError));

        let running: Result<()> = Err(WorkspaceError::PipelineInProgress(PipelineState::Running));
        assert!(matches!(
            classify(&running),
            Signal::PipelineInProgress(PipelineState::Running)
        ));

        let busy: Result<()> = Err(WorkspaceError::OperationInProgress(OperationKind::Apply));
        assert!(matches!(
            classify(&busy),
            Signal::OperationInProgress(OperationKind::Apply)
        ));

        let failed: Result<()> = Err(WorkspaceError::Init {
            output: "no provider".to_string(),
        });
        assert!(matches!(classify(&failed), Signal::Other(_)));
        assert!(!failed.as_ref().unwrap_err().is_retry_later());
    }
}
