use crate::error::{RpcError, RpcResult};

use exrun_service::grpc::proto::job_dispatcher_server::JobDispatcher;
use exrun_service::grpc::proto::{RunRequest, RunResponse, SetIncludesRequest, SetIncludesResponse};
use exrun_service::pipeline::{bootstrap, RunContext};
use exrun_service::Document;

use std::path::PathBuf;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

/// Worker side of the cluster protocol: runs each received document with
/// the pipeline runner
pub struct JobDispatcherService {
    context: RunContext,
    includes: RwLock<Vec<PathBuf>>,
}

impl JobDispatcherService {
    pub fn new(context: RunContext) -> Self {
        Self {
            context,
            includes: RwLock::new(Vec::new()),
        }
    }

    pub async fn includes(&self) -> Vec<PathBuf> {
        self.includes.read().await.clone()
    }

    async fn run_document(&self, request: RunRequest) -> RpcResult<Document> {
        let document: Document = serde_json::from_str(&request.document_json)
            .map_err(|e| RpcError::InvalidRequest(format!("document is not valid JSON: {}", e)))?;

        let mut context = self.context.nested().with_search_paths(self.includes().await);
        if !request.working_directory.is_empty() {
            context = context.with_working_dir(request.working_directory);
        }

        Ok(bootstrap(document, &context).await?)
    }
}

#[tonic::async_trait]
impl JobDispatcher for JobDispatcherService {
    async fn set_includes(
        &self,
        request: Request<SetIncludesRequest>,
    ) -> Result<Response<SetIncludesResponse>, Status> {
        let paths = request.into_inner().paths;
        let mut includes = self.includes.write().await;
        for path in paths.into_iter().map(PathBuf::from) {
            if !includes.contains(&path) {
                includes.push(path);
            }
        }
        info!(includes = includes.len(), "updated search path");
        Ok(Response::new(SetIncludesResponse {}))
    }

    async fn run(&self, request: Request<RunRequest>) -> Result<Response<RunResponse>, Status> {
        let request = request.into_inner();
        info!(working_dir = %request.working_directory, "running configuration");

        let document = self.run_document(request).await.map_err(|e| {
            warn!(error = %e, "configuration failed");
            Status::from(e)
        })?;

        let document_json = serde_json::to_string(&document)
            .map_err(|e| Status::internal(format!("cannot serialize result: {}", e)))?;
        Ok(Response::new(RunResponse { document_json }))
    }
}
