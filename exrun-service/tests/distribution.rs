// Distribution Tests
// Queue acquisition, the error breaker, cluster fan-out and the local pool

use exrun_service::pipeline::{bootstrap, RunContext, RunDispatch};
use exrun_service::{
    ClusterDispatcher, Document, LocalPool, MemoryQueue, PostgresQueue, ServiceError,
    ServiceResult, WorkQueueService, WorkState, WorkerHandle, WorklistDispatcher,
};

use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_acquire_hands_out_distinct_items() {
    let shared = MemoryQueue::new();
    let mut setup = WorkQueueService::connect(shared.clone()).await.unwrap();
    setup.add("g1", "/runs/a.json").await.unwrap();
    setup.add("g1", "/runs/b.json").await.unwrap();

    let mut first = WorkQueueService::connect(shared.clone()).await.unwrap();
    let mut second = WorkQueueService::connect(shared.clone()).await.unwrap();

    let a = tokio::spawn(async move {
        let item = first.acquire("g1").await.unwrap();
        (item, first)
    });
    let b = tokio::spawn(async move { second.acquire("g1").await.unwrap() });

    let (item_a, mut first) = a.await.unwrap();
    let item_b = b.await.unwrap();

    let (item_a, item_b) = (item_a.unwrap(), item_b.unwrap());
    assert_ne!(item_a.id, item_b.id);
    assert!(first.acquire("g1").await.unwrap().is_none());

    let items = setup.list("g1").await.unwrap();
    assert!(items.iter().all(|item| item.state == WorkState::Processing));
}

/// Races real connections through `FOR UPDATE SKIP LOCKED`. Needs a scratch
/// database: `DATABASE_URL=postgres://... cargo test -- --ignored`
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_postgres_acquirers_never_share_an_item() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        return;
    };
    let options: PgConnectOptions = url.parse().unwrap();
    let prefix = format!("race{}_", std::process::id());
    let queue = || PostgresQueue::with_options(options.clone(), &prefix).unwrap();

    let mut setup = WorkQueueService::connect(queue()).await.unwrap();
    setup.ensure_schema().await.unwrap();
    for n in 0..20 {
        setup.add("g1", &format!("/runs/{}/problem.json", n)).await.unwrap();
    }

    let mut acquirers = Vec::new();
    for _ in 0..4 {
        let mut service = WorkQueueService::connect(queue()).await.unwrap();
        acquirers.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            while let Some(item) = service.acquire("g1").await.unwrap() {
                ids.push(item.id);
            }
            service.close().await;
            ids
        }));
    }

    let mut ids = Vec::new();
    for acquirer in acquirers {
        ids.extend(acquirer.await.unwrap());
    }
    ids.sort_unstable();
    let acquired = ids.len();
    ids.dedup();
    assert_eq!(acquired, 20);
    assert_eq!(ids.len(), 20);

    let items = setup.list("g1").await.unwrap();
    assert!(items.iter().all(|item| item.state == WorkState::Processing));
    setup.close().await;

    let mut connection = PgConnection::connect_with(&options).await.unwrap();
    sqlx::query(&format!("DROP TABLE {}worklist", prefix))
        .execute(&mut connection)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_breaker_stops_after_thirty_errors() {
    let mut queue = WorkQueueService::connect(MemoryQueue::new()).await.unwrap();
    for n in 0..40 {
        queue.add("g1", &format!("/nonexistent/{}/problem.json", n)).await.unwrap();
    }

    let mut dispatcher = WorklistDispatcher::new(queue, "g1", RunContext::default());
    let report = dispatcher.run().await.unwrap();
    assert_eq!(report.errors, 30);
    assert_eq!(report.completed, 0);

    let mut queue = dispatcher.into_queue();
    let items = queue.list("g1").await.unwrap();
    let count = |state: WorkState| items.iter().filter(|item| item.state == state).count();
    assert_eq!(count(WorkState::Error), 30);
    assert_eq!(count(WorkState::Open), 10);
}

/// Runs documents in process while tracking how many run at once
struct CountingWorker {
    name: String,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    runs: AtomicUsize,
    fail_on_run: Option<usize>,
}

impl CountingWorker {
    fn new(
        name: &str,
        active: &Arc<AtomicUsize>,
        peak: &Arc<AtomicUsize>,
        fail_on_run: Option<usize>,
    ) -> Arc<dyn WorkerHandle> {
        Arc::new(Self {
            name: name.to_string(),
            active: active.clone(),
            peak: peak.clone(),
            runs: AtomicUsize::new(0),
            fail_on_run,
        })
    }
}

#[async_trait::async_trait]
impl WorkerHandle for CountingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_includes(&self, _paths: &[PathBuf]) -> ServiceResult<()> {
        Ok(())
    }

    async fn run(&self, document: Document, working_dir: PathBuf) -> ServiceResult<Document> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on_run == Some(run) {
            return Err(ServiceError::RemoteExecution {
                worker: self.name.clone(),
                message: "worker process died".to_string(),
            });
        }
        let context = RunContext::default().with_working_dir(working_dir);
        bootstrap(document, &context).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_bounds_in_flight_runs() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let cluster = ClusterDispatcher::new(vec![
        CountingWorker::new("w1", &active, &peak, None),
        CountingWorker::new("w2", &active, &peak, None),
    ]);

    for n in 0..5 {
        cluster
            .submit(json!({"n": n, "tools": []}), PathBuf::from("."))
            .await
            .unwrap();
        assert!(cluster.in_flight() <= 2);
    }
    cluster.drain().await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(cluster.peak_in_flight() <= 2);
    assert_eq!(active.load(Ordering::SeqCst), 0);

    let results = cluster.take_results();
    assert_eq!(results.len(), 5);
    for (n, result) in results.iter().enumerate() {
        assert_eq!(result["n"], json!(n));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_reschedules_after_worker_death() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let cluster = ClusterDispatcher::new(vec![
        CountingWorker::new("stable", &active, &peak, None),
        CountingWorker::new("dies", &active, &peak, Some(1)),
    ]);

    for n in 0..5 {
        cluster
            .submit(json!({"n": n, "tools": []}), PathBuf::from("."))
            .await
            .unwrap();
    }

    let results = cluster.collect().await.unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(cluster.pool_size(), 1);
}

#[tokio::test]
async fn test_explode_and_run_through_local_pool() {
    let context = RunContext::default();
    let pool: Arc<dyn RunDispatch> = Arc::new(LocalPool::start(&[0, 1], &context).unwrap());
    let context = context.with_dispatcher(Some(pool));

    let doc = json!({
        "configurations": [
            {"size": {"%explode": [1, 2, 3]}, "label": "run-${/size}"}
        ],
        "tools": ["ExplodeAndRun"]
    });

    let result = bootstrap(doc, &context).await.unwrap();
    let labels: Vec<_> = result["runResults"]
        .as_array()
        .unwrap()
        .iter()
        .map(|run| run["label"].clone())
        .collect();
    assert_eq!(labels, vec![json!("run-1"), json!("run-2"), json!("run-3")]);
}
