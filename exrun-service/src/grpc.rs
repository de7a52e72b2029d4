// gRPC Worker Client
// Remote worker handle speaking the JobDispatcher protocol

use crate::cluster::WorkerHandle;
use crate::document::Document;
use crate::error::{ServiceError, ServiceResult};

use std::path::PathBuf;
use tonic::transport::Channel;

pub mod proto {
    tonic::include_proto!("exrun.worker");
}

use proto::job_dispatcher_client::JobDispatcherClient;

/// A worker reached over gRPC, named by its endpoint
#[derive(Clone)]
pub struct GrpcWorker {
    name: String,
    client: JobDispatcherClient<Channel>,
}

impl GrpcWorker {
    /// Connect to an endpoint such as `http://node3:50051`
    pub async fn connect(endpoint: impl Into<String>) -> ServiceResult<Self> {
        let name = endpoint.into();
        let client = JobDispatcherClient::connect(name.clone())
            .await
            .map_err(|e| ServiceError::RemoteExecution {
                worker: name.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { name, client })
    }

    fn remote_error(&self, status: tonic::Status) -> ServiceError {
        ServiceError::RemoteExecution {
            worker: self.name.clone(),
            message: status.message().to_string(),
        }
    }
}

#[async_trait::async_trait]
impl WorkerHandle for GrpcWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_includes(&self, paths: &[PathBuf]) -> ServiceResult<()> {
        let request = proto::SetIncludesRequest {
            paths: paths
                .iter()
                .map(|path| path.to_string_lossy().to_string())
                .collect(),
        };
        let mut client = self.client.clone();
        client
            .set_includes(request)
            .await
            .map_err(|status| self.remote_error(status))?;
        Ok(())
    }

    async fn run(&self, document: Document, working_dir: PathBuf) -> ServiceResult<Document> {
        let request = proto::RunRequest {
            document_json: serde_json::to_string(&document)?,
            working_directory: working_dir.to_string_lossy().to_string(),
        };
        let mut client = self.client.clone();
        let response = client
            .run(request)
            .await
            .map_err(|status| self.remote_error(status))?
            .into_inner();
        Ok(serde_json::from_str(&response.document_json)?)
    }
}
