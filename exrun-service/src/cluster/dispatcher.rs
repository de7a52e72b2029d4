// Cluster Dispatcher
// Bounded fan-out over a pool of workers with rescheduling on failure

use crate::cluster::WorkerHandle;
use crate::document::Document;
use crate::error::{ServiceError, ServiceResult};
use crate::grpc::GrpcWorker;
use crate::pipeline::RunDispatch;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

struct Job {
    ticket: u64,
    document: Document,
    working_dir: PathBuf,
}

/// Every worker is either in `free` or counted in `in_flight`
#[derive(Default)]
struct PoolState {
    free: VecDeque<Arc<dyn WorkerHandle>>,
    in_flight: usize,
    peak_in_flight: usize,
    /// Jobs waiting for a worker, rescheduled ones first
    pending: VecDeque<Job>,
    results: Vec<(u64, Document)>,
    next_ticket: u64,
}

impl PoolState {
    fn pool_size(&self) -> usize {
        self.free.len() + self.in_flight
    }
}

struct Inner {
    state: Mutex<PoolState>,
    /// Signalled whenever a job finishes, successfully or not
    returned: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sends each submitted document to the next free worker.
///
/// A worker whose run fails is removed from the pool and the job goes back
/// to the front of the queue. Once no worker is left, waiting and future
/// submissions fail with `PoolExhausted`.
#[derive(Clone)]
pub struct ClusterDispatcher {
    inner: Arc<Inner>,
}

impl ClusterDispatcher {
    pub fn new(workers: Vec<Arc<dyn WorkerHandle>>) -> Self {
        let state = PoolState {
            free: workers.into(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                returned: Notify::new(),
            }),
        }
    }

    /// Connect to gRPC workers, skipping endpoints that cannot be reached
    pub async fn connect(endpoints: &[String], includes: &[PathBuf]) -> ServiceResult<Self> {
        let mut workers: Vec<Arc<dyn WorkerHandle>> = Vec::new();
        for endpoint in endpoints {
            let worker = match GrpcWorker::connect(endpoint.clone()).await {
                Ok(worker) => worker,
                Err(e) => {
                    warn!(worker = %endpoint, error = %e, "skipping unreachable worker");
                    continue;
                }
            };
            if let Err(e) = worker.set_includes(includes).await {
                warn!(worker = %endpoint, error = %e, "skipping worker");
                continue;
            }
            workers.push(Arc::new(worker));
        }

        if workers.is_empty() {
            return Err(ServiceError::PoolExhausted { pending: 0 });
        }
        info!(workers = workers.len(), "connected to cluster");
        Ok(Self::new(workers))
    }

    /// Workers not yet discarded
    pub fn pool_size(&self) -> usize {
        self.inner.lock().pool_size()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Highest number of simultaneously running jobs so far
    pub fn peak_in_flight(&self) -> usize {
        self.inner.lock().peak_in_flight
    }

    /// Wait for a free worker and start the run on it without waiting for
    /// its result
    pub async fn submit(&self, document: Document, working_dir: PathBuf) -> ServiceResult<u64> {
        loop {
            let returned = self.inner.returned.notified();
            {
                let mut state = self.inner.lock();
                if state.pool_size() == 0 {
                    return Err(ServiceError::PoolExhausted {
                        pending: state.pending.len() + 1,
                    });
                }
                if !state.free.is_empty() {
                    let ticket = state.next_ticket;
                    state.next_ticket += 1;
                    state.pending.push_back(Job {
                        ticket,
                        document,
                        working_dir,
                    });
                    assign(&self.inner, &mut state);
                    return Ok(ticket);
                }
            }
            returned.await;
        }
    }

    /// Wait until nothing is running.
    ///
    /// Fails if jobs are left that no worker can take.
    pub async fn drain(&self) -> ServiceResult<()> {
        loop {
            let returned = self.inner.returned.notified();
            {
                let state = self.inner.lock();
                if state.in_flight == 0 {
                    return match state.pending.len() {
                        0 => Ok(()),
                        pending => Err(ServiceError::PoolExhausted { pending }),
                    };
                }
            }
            returned.await;
        }
    }

    /// Results gathered so far, in submission order
    pub fn take_results(&self) -> Vec<Document> {
        let mut results = std::mem::take(&mut self.inner.lock().results);
        results.sort_by_key(|(ticket, _)| *ticket);
        results.into_iter().map(|(_, document)| document).collect()
    }
}

/// Pair free workers with pending jobs
fn assign(inner: &Arc<Inner>, state: &mut PoolState) {
    while !state.free.is_empty() && !state.pending.is_empty() {
        let (Some(worker), Some(job)) = (state.free.pop_front(), state.pending.pop_front()) else {
            break;
        };
        state.in_flight += 1;
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        debug!(worker = worker.name(), ticket = job.ticket, "dispatching job");
        tokio::spawn(run_job(inner.clone(), worker, job));
    }
}

async fn run_job(inner: Arc<Inner>, worker: Arc<dyn WorkerHandle>, job: Job) {
    let outcome = worker.run(job.document.clone(), job.working_dir.clone()).await;

    let mut state = inner.lock();
    state.in_flight -= 1;
    match outcome {
        Ok(result) => {
            state.results.push((job.ticket, result));
            state.free.push_back(worker);
        }
        Err(e) => {
            warn!(
                worker = worker.name(),
                ticket = job.ticket,
                remaining = state.pool_size(),
                error = %e,
                "worker failed, rescheduling its job"
            );
            state.pending.push_front(job);
        }
    }
    assign(&inner, &mut state);
    drop(state);
    inner.returned.notify_waiters();
}

#[async_trait::async_trait]
impl RunDispatch for ClusterDispatcher {
    async fn dispatch(&self, document: Document, working_dir: PathBuf) -> ServiceResult<()> {
        self.submit(document, working_dir).await.map(|_| ())
    }

    /// Orphaned jobs are dropped along with the results of a failed batch
    async fn collect(&self) -> ServiceResult<Vec<Document>> {
        let drained = self.drain().await;
        let results = self.take_results();
        if let Err(e) = drained {
            self.inner.lock().pending.clear();
            return Err(e);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tags the document with its name; fails every run once `healthy` runs are used up
    struct StubWorker {
        name: String,
        healthy: AtomicUsize,
    }

    impl StubWorker {
        fn new(name: &str, healthy: usize) -> Arc<dyn WorkerHandle> {
            Arc::new(Self {
                name: name.to_string(),
                healthy: AtomicUsize::new(healthy),
            })
        }
    }

    #[async_trait::async_trait]
    impl WorkerHandle for StubWorker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn set_includes(&self, _paths: &[PathBuf]) -> ServiceResult<()> {
            Ok(())
        }

        async fn run(&self, mut document: Document, _working_dir: PathBuf) -> ServiceResult<Document> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let left = self.healthy.load(Ordering::SeqCst);
            if left == 0 {
                return Err(ServiceError::RemoteExecution {
                    worker: self.name.clone(),
                    message: "connection refused".to_string(),
                });
            }
            self.healthy.store(left - 1, Ordering::SeqCst);
            document["worker"] = json!(self.name);
            Ok(document)
        }
    }

    #[tokio::test]
    async fn test_results_in_submission_order() {
        let cluster = ClusterDispatcher::new(vec![StubWorker::new("a", 10), StubWorker::new("b", 10)]);
        for n in 0..4 {
            cluster.submit(json!({"n": n}), PathBuf::from(".")).await.unwrap();
        }

        let results = cluster.collect().await.unwrap();
        let ns: Vec<_> = results.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(ns, vec![json!(0), json!(1), json!(2), json!(3)]);
        assert!(cluster.peak_in_flight() <= 2);
        assert_eq!(cluster.pool_size(), 2);
    }

    #[tokio::test]
    async fn test_failed_worker_is_dropped_and_job_rescheduled() {
        let cluster = ClusterDispatcher::new(vec![StubWorker::new("dead", 0), StubWorker::new("ok", 10)]);
        for n in 0..3 {
            cluster.submit(json!({"n": n}), PathBuf::from(".")).await.unwrap();
        }

        let results = cluster.collect().await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r["worker"] == json!("ok")));
        assert_eq!(cluster.pool_size(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_pool() {
        let cluster = ClusterDispatcher::new(vec![StubWorker::new("x", 0), StubWorker::new("y", 0)]);
        cluster.submit(json!({}), PathBuf::from(".")).await.unwrap();

        assert!(matches!(
            cluster.drain().await,
            Err(ServiceError::PoolExhausted { pending: 1 })
        ));
        assert!(matches!(
            cluster.submit(json!({}), PathBuf::from(".")).await,
            Err(ServiceError::PoolExhausted { pending: 2 })
        ));
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let cluster = ClusterDispatcher::new(Vec::new());
        assert!(matches!(
            cluster.submit(json!({}), PathBuf::from(".")).await,
            Err(ServiceError::PoolExhausted { pending: 1 })
        ));
        assert!(cluster.drain().await.is_ok());
    }
}
