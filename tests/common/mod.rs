// tests/common/mod.rs

#![allow(dead_code, unused_imports)]

use std::sync::Arc;

pub use tfworkspace_test_utils::builders;
pub use tfworkspace_test_utils::fake_executor::FakeExecutor;
pub use tfworkspace_test_utils::{init_tracing, with_timeout};

use tfworkspace::config::StoreConfig;
use tfworkspace::fs::mock::MockFileSystem;
use tfworkspace::WorkspaceStore;

/// Store over an in-memory filesystem rooted at `/tmp`, plus handles to
/// both fakes.
pub fn mock_store() -> (WorkspaceStore, MockFileSystem, FakeExecutor) {
    mock_store_with(FakeExecutor::new)
}

/// Like [`mock_store`], with a customised executor.
pub fn mock_store_with(
    make: impl FnOnce(MockFileSystem) -> FakeExecutor,
) -> (WorkspaceStore, MockFileSystem, FakeExecutor) {
    let fs = MockFileSystem::new();
    let exec = make(fs.clone());
    let store = WorkspaceStore::new(StoreConfig::default())
        .with_fs(Arc::new(fs.clone()))
        .with_executor(Arc::new(exec.clone()));
    (store, fs, exec)
}
