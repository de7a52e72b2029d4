pub mod error;
pub mod server;
pub mod service;

pub use error::{RpcError, RpcResult};
pub use server::{serve, serve_listener};
pub use service::JobDispatcherService;

// Re-export types needed by clients
pub use exrun_service::grpc::proto;
pub use exrun_service::GrpcWorker;
pub use exrun_service;
