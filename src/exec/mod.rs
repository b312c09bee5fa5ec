// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] provides the `CommandExecutor` trait and the production
//!   `RealCommandExecutor`, which tests replace with a fake.
//! - [`process`] runs one terraform process with output capture and
//!   cancellation.
//! - [`runner`] owns the long-lived provider process whose attachment handle
//!   every terraform invocation reuses.

pub mod backend;
pub mod process;
pub mod runner;

pub use backend::{CommandExecutor, CommandOutput, CommandSpec, RealCommandExecutor};
pub use runner::{ENV_REATTACH_CONFIG, NoOpProviderRunner, ProviderRunner, SharedProviderRunner};
