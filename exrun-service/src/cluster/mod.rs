// Cluster Module
// Push-based execution of configurations on remote workers

pub mod dispatcher;

pub use dispatcher::ClusterDispatcher;

use crate::document::Document;
use crate::error::ServiceResult;

use std::path::PathBuf;

/// A remote execution endpoint.
///
/// Handles are discarded after their first failure and never reconnected.
#[async_trait::async_trait]
pub trait WorkerHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Extend the worker's document search path
    async fn set_includes(&self, paths: &[PathBuf]) -> ServiceResult<()>;

    /// Run a concrete document in `working_dir` and return its final state
    async fn run(&self, document: Document, working_dir: PathBuf) -> ServiceResult<Document>;
}
