use crate::error::RpcResult;
use crate::service::JobDispatcherService;

use exrun_service::grpc::proto::job_dispatcher_server::JobDispatcherServer;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

/// Serve one worker on `addr` until the process is stopped
pub async fn serve(addr: SocketAddr, service: JobDispatcherService) -> RpcResult<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, service).await
}

/// Serve one worker on an already bound listener
pub async fn serve_listener(listener: TcpListener, service: JobDispatcherService) -> RpcResult<()> {
    info!(addr = %listener.local_addr()?, "worker listening");
    Server::builder()
        .add_service(JobDispatcherServer::new(service))
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await?;
    Ok(())
}
