// Work Queue Service
// Worklist operations with connection-loss recovery

use crate::error::ServiceResult;
use crate::worklist::backend::QueueBackend;
use crate::worklist::model::{WorkItem, WorkState};

use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// How hard to try when first connecting to the queue
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub connect_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max.max(base);
        self
    }

    /// Random delay between the base delay and an exponentially growing ceiling
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let ceiling = base
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay.as_millis() as u64)
            .max(base);
        Duration::from_millis(rand::thread_rng().gen_range(base..=ceiling))
    }
}

/// Run a backend call; on a transient failure reconnect once and retry once
macro_rules! with_reconnect {
    ($self:ident, $operation:literal, |$backend:ident| $call:expr) => {{
        let first = {
            let $backend = &mut $self.backend;
            $call.await
        };
        match first {
            Err(e) if e.is_transient() => {
                warn!(operation = $operation, error = %e, "queue connection lost, reconnecting");
                $self.backend.disconnect().await;
                $self.backend.connect().await?;
                let $backend = &mut $self.backend;
                $call.await
            }
            other => other,
        }
    }};
}

/// Transactional worklist shared by every poller of a database
pub struct WorkQueueService<B: QueueBackend> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: QueueBackend> WorkQueueService<B> {
    pub async fn connect(backend: B) -> ServiceResult<Self> {
        Self::connect_with(backend, RetryPolicy::default()).await
    }

    /// Open the backend, retrying transient failures with randomized backoff
    pub async fn connect_with(mut backend: B, policy: RetryPolicy) -> ServiceResult<Self> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match backend.connect().await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < policy.connect_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "queue unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self { backend, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn ensure_schema(&mut self) -> ServiceResult<()> {
        with_reconnect!(self, "ensure_schema", |backend| backend.ensure_schema())
    }

    pub async fn add(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<i64> {
        let id = with_reconnect!(self, "add", |backend| backend.add(workgroup, config_file))?;
        info!(item = id, workgroup, file = config_file, "queued work item");
        Ok(id)
    }

    pub async fn acquire(&mut self, workgroup: &str) -> ServiceResult<Option<WorkItem>> {
        with_reconnect!(self, "acquire", |backend| backend.acquire(workgroup))
    }

    pub async fn mark_done(&mut self, id: i64) -> ServiceResult<()> {
        with_reconnect!(self, "mark_done", |backend| backend.set_state(id, WorkState::Done))
    }

    pub async fn mark_error(&mut self, id: i64) -> ServiceResult<()> {
        with_reconnect!(self, "mark_error", |backend| backend.set_state(id, WorkState::Error))
    }

    /// Put every item of the workgroup with this file back into `open`
    pub async fn reset_by_file(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<u64> {
        with_reconnect!(self, "reset_by_file", |backend| backend.reset_by_file(workgroup, config_file))
    }

    pub async fn list(&mut self, workgroup: &str) -> ServiceResult<Vec<WorkItem>> {
        with_reconnect!(self, "list", |backend| backend.list(workgroup))
    }

    pub async fn close(mut self) {
        self.backend.disconnect().await;
    }
}
