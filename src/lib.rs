// src/lib.rs

//! Per-resource terraform workspaces for a reconciliation controller.
//!
//! This wires together:
//! - [`store::WorkspaceStore`]: one workspace per managed resource
//! - [`producer::FileProducer`]: configuration and state files
//! - [`workspace::Workspace`]: serialized terraform invocations and the
//!   asynchronous apply/destroy pipeline
//! - [`exec`]: process execution and the shared provider process
//! - [`errors`]: the error taxonomy callers use to decide "try later"

pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod producer;
pub mod redact;
pub mod resource;
pub mod store;
pub mod types;
pub mod workspace;

pub use errors::{
    classify, is_applying, is_destroying, is_operation_in_progress, pipeline_in_progress,
    OperationKind, PipelineState, Result, Signal, WorkspaceError,
};
pub use store::WorkspaceStore;
pub use types::{Context, ProviderConfiguration, ProviderRequirement, ResourceUid, Setup};
pub use workspace::{ApplyResult, AsyncResult, PlanResult, RefreshResult, Workspace};
