use exrun_rpc::{serve_listener, JobDispatcherService};
use exrun_service::pipeline::RunContext;
use exrun_service::{ClusterDispatcher, GrpcWorker, ServiceError, WorkerHandle};

use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn start_worker() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = JobDispatcherService::new(RunContext::default());
    tokio::spawn(serve_listener(listener, service));
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_remote_run_round_trip() {
    let endpoint = start_worker().await;
    let worker = GrpcWorker::connect(endpoint.clone()).await.unwrap();
    assert_eq!(worker.name(), endpoint);

    let dir = TempDir::new().unwrap();
    let doc = json!({"solver": "z3", "tools": ["WriteConfigToFile('run.json')"]});
    let result = worker.run(doc, dir.path().to_path_buf()).await.unwrap();

    assert_eq!(result["solver"], json!("z3"));
    assert!(dir.path().join("run.json").exists());
}

#[tokio::test]
async fn test_remote_failure_is_remote_execution_error() {
    let worker = GrpcWorker::connect(start_worker().await).await.unwrap();
    let doc = json!({"tools": ["NoSuchUnit"]});

    let err = worker.run(doc, PathBuf::from(".")).await.unwrap_err();
    assert!(matches!(err, ServiceError::RemoteExecution { .. }));
    assert!(err.to_string().contains("NoSuchUnit"));
}

#[tokio::test]
async fn test_includes_reach_linked_files() {
    let shared = TempDir::new().unwrap();
    fs::write(
        shared.path().join("limits.json"),
        "{\n  // seconds\n  \"timeout\": 5,\n}\n",
    )
    .unwrap();

    let worker = GrpcWorker::connect(start_worker().await).await.unwrap();
    worker.set_includes(&[shared.path().to_path_buf()]).await.unwrap();

    let doc = json!({
        "configurations": [{"%limits": {"%linkFile": "limits.json"}}],
        "tools": ["ExplodeAndRun"]
    });
    let result = worker.run(doc, PathBuf::from(".")).await.unwrap();
    assert_eq!(result["runResults"][0]["%limits"]["timeout"], json!(5));
}

#[tokio::test]
async fn test_cluster_over_grpc() {
    let mut workers: Vec<Arc<dyn WorkerHandle>> = Vec::new();
    for _ in 0..2 {
        workers.push(Arc::new(GrpcWorker::connect(start_worker().await).await.unwrap()));
    }
    let cluster = ClusterDispatcher::new(workers);

    for n in 0..4 {
        cluster
            .submit(json!({"n": n, "tools": []}), PathBuf::from("."))
            .await
            .unwrap();
    }
    cluster.drain().await.unwrap();

    let results = cluster.take_results();
    assert_eq!(results.len(), 4);
    assert_eq!(results[3]["n"], json!(3));
}

#[tokio::test]
async fn test_connect_skips_dead_endpoints() {
    let live = start_worker().await;
    let endpoints = vec!["http://127.0.0.1:1".to_string(), live];

    let cluster = ClusterDispatcher::connect(&endpoints, &[]).await.unwrap();
    assert_eq!(cluster.pool_size(), 1);
}
