// Worklist Dispatcher
// Polls the queue and runs each acquired configuration file

use crate::error::ServiceResult;
use crate::pipeline::{bootstrap_file, RunContext};
use crate::worklist::backend::QueueBackend;
use crate::worklist::model::WorkItem;
use crate::worklist::service::WorkQueueService;

use std::path::Path;
use tracing::{error, info, warn};

/// Errors after which a batch poller gives up
pub const MAX_ERRORS: usize = 30;

/// Where a poller is in its acquire/run/mark cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Acquiring,
    Running,
    Succeeding,
    Failing,
    /// No open items were left
    Drained,
    /// Stopped by the error breaker or a strict-mode failure
    Aborted,
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Record failures and keep polling instead of stopping at the first one
    pub batch_mode: bool,
    pub max_errors: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            batch_mode: true,
            max_errors: MAX_ERRORS,
        }
    }
}

impl DispatcherOptions {
    pub fn with_batch_mode(mut self, batch_mode: bool) -> Self {
        self.batch_mode = batch_mode;
        self
    }

    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub completed: usize,
    pub errors: usize,
    pub final_state: PollerState,
}

/// A single poller over one workgroup
pub struct WorklistDispatcher<B: QueueBackend> {
    queue: WorkQueueService<B>,
    workgroup: String,
    context: RunContext,
    options: DispatcherOptions,
    state: PollerState,
}

impl<B: QueueBackend> WorklistDispatcher<B> {
    pub fn new(queue: WorkQueueService<B>, workgroup: impl Into<String>, context: RunContext) -> Self {
        Self {
            queue,
            workgroup: workgroup.into(),
            context,
            options: DispatcherOptions::default(),
            state: PollerState::Idle,
        }
    }

    pub fn with_options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn into_queue(self) -> WorkQueueService<B> {
        self.queue
    }

    /// Poll until the workgroup is drained or the poller aborts.
    ///
    /// In strict mode the first failing item is marked `error` and its error
    /// returned.
    pub async fn run(&mut self) -> ServiceResult<DispatchReport> {
        let mut completed = 0;
        let mut errors = 0;

        loop {
            self.state = PollerState::Acquiring;
            let Some(item) = self.queue.acquire(&self.workgroup).await? else {
                self.state = PollerState::Drained;
                break;
            };

            self.state = PollerState::Running;
            info!(item = item.id, file = %item.config_file, "running work item");

            match self.run_item(&item).await {
                Ok(()) => {
                    self.state = PollerState::Succeeding;
                    self.queue.mark_done(item.id).await?;
                    completed += 1;
                }
                Err(e) => {
                    self.state = PollerState::Failing;
                    self.queue.mark_error(item.id).await?;
                    errors += 1;
                    error!(item = item.id, file = %item.config_file, error = %e, "work item failed");

                    if !self.options.batch_mode {
                        self.state = PollerState::Aborted;
                        return Err(e);
                    }
                    if errors >= self.options.max_errors {
                        warn!(errors, "too many failed work items, stopping");
                        self.state = PollerState::Aborted;
                        break;
                    }
                }
            }
        }

        info!(completed, errors, "worklist poller stopped");
        Ok(DispatchReport {
            completed,
            errors,
            final_state: self.state,
        })
    }

    async fn run_item(&self, item: &WorkItem) -> ServiceResult<()> {
        bootstrap_file(Path::new(&item.config_file), &self.context).await?;
        Ok(())
    }
}

/// Map a line of the reset tool's input to the queued file it stands for:
/// `problem.json` next to the named path, joined onto `prefix` if given
pub fn reset_target(line: &str, prefix: Option<&str>) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let dir = Path::new(line).parent().unwrap_or_else(|| Path::new(""));
    let file = dir.join("problem.json");
    let target = match prefix {
        Some(prefix) => Path::new(prefix).join(file),
        None => file,
    };
    Some(target.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worklist::memory::MemoryQueue;
    use crate::worklist::model::WorkState;
    use std::fs;
    use tempfile::TempDir;

    async fn queue_with(files: &[String]) -> WorkQueueService<MemoryQueue> {
        let mut queue = WorkQueueService::connect(MemoryQueue::new()).await.unwrap();
        for file in files {
            queue.add("g1", file).await.unwrap();
        }
        queue
    }

    fn write(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_drains_and_marks_items() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.json", r#"{"tools": ["WriteConfigToFile('out.json')"]}"#);
        let bad = write(&dir, "bad.json", r#"{"tools": ["NoSuchUnit"]}"#);

        let queue = queue_with(&[good, bad]).await;
        let context = RunContext::default().with_working_dir(dir.path());
        let mut dispatcher = WorklistDispatcher::new(queue, "g1", context);

        let report = dispatcher.run().await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.final_state, PollerState::Drained);

        // the run saw its directory injected
        let out = crate::document::load_document(&dir.path().join("out.json")).unwrap();
        assert_eq!(out["EXRUN_CONF_DIR"], serde_json::json!(dir.path().canonicalize().unwrap().to_string_lossy()));

        let mut queue = dispatcher.into_queue();
        let states: Vec<_> = queue.list("g1").await.unwrap().into_iter().map(|i| i.state).collect();
        assert_eq!(states, vec![WorkState::Done, WorkState::Error]);
    }

    #[tokio::test]
    async fn test_strict_mode_stops_at_first_error() {
        let files = vec!["/nonexistent/a.json".to_string(), "/nonexistent/b.json".to_string()];
        let queue = queue_with(&files).await;
        let mut dispatcher = WorklistDispatcher::new(queue, "g1", RunContext::default())
            .with_options(DispatcherOptions::default().with_batch_mode(false));

        assert!(dispatcher.run().await.is_err());
        assert_eq!(dispatcher.state(), PollerState::Aborted);

        let mut queue = dispatcher.into_queue();
        let states: Vec<_> = queue.list("g1").await.unwrap().into_iter().map(|i| i.state).collect();
        assert_eq!(states, vec![WorkState::Error, WorkState::Open]);
    }

    #[tokio::test]
    async fn test_empty_workgroup() {
        let mut dispatcher = WorklistDispatcher::new(queue_with(&[]).await, "g1", RunContext::default());
        let report = dispatcher.run().await.unwrap();
        assert_eq!(report.completed + report.errors, 0);
        assert_eq!(report.final_state, PollerState::Drained);
    }

    #[test]
    fn test_reset_target() {
        assert_eq!(
            reset_target("/runs/p1/out.log\n", None).as_deref(),
            Some("/runs/p1/problem.json")
        );
        assert_eq!(
            reset_target("p1/result.json", Some("/data")).as_deref(),
            Some("/data/p1/problem.json")
        );
        assert_eq!(reset_target("   ", Some("/data")), None);
    }
}
