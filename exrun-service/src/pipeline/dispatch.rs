// Run Dispatch
// Where the concrete configurations of an expansion are executed

use crate::document::Document;
use crate::error::ServiceResult;
use crate::pipeline::context::RunContext;
use crate::pipeline::runner::bootstrap;

use std::path::PathBuf;
use std::sync::Mutex;

/// Destination for expanded configurations.
///
/// Implemented by the in-place runner, the local processor pool and the
/// cluster dispatcher.
#[async_trait::async_trait]
pub trait RunDispatch: Send + Sync {
    /// Hand over one concrete document. May wait for capacity, but not for
    /// the run itself to finish.
    async fn dispatch(&self, document: Document, working_dir: PathBuf) -> ServiceResult<()>;

    /// Wait for every dispatched run and take their final documents in
    /// dispatch order
    async fn collect(&self) -> ServiceResult<Vec<Document>>;
}

/// Runs each configuration immediately in the caller's task
pub struct InlineDispatch {
    context: RunContext,
    results: Mutex<Vec<Document>>,
}

impl InlineDispatch {
    pub fn new(context: RunContext) -> Self {
        Self {
            context: context.nested(),
            results: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl RunDispatch for InlineDispatch {
    async fn dispatch(&self, document: Document, working_dir: PathBuf) -> ServiceResult<()> {
        let context = self.context.clone().with_working_dir(working_dir);
        let result = bootstrap(document, &context).await?;
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
        Ok(())
    }

    async fn collect(&self) -> ServiceResult<Vec<Document>> {
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        Ok(std::mem::take(&mut *results))
    }
}
