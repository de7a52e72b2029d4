use exrun_service::ServiceError;
use std::fmt;
use tonic::Status;

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug)]
pub enum RpcError {
    Service(ServiceError),
    InvalidRequest(String),
    Transport(String),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Service(err) => write!(f, "Service error: {}", err),
            RpcError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            RpcError::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        RpcError::Service(err)
    }
}

impl From<tonic::transport::Error> for RpcError {
    fn from(err: tonic::transport::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        match &err {
            RpcError::Service(inner) if inner.is_configuration_error() => {
                Status::invalid_argument(err.to_string())
            }
            RpcError::Service(_) => Status::aborted(err.to_string()),
            RpcError::InvalidRequest(_) => Status::invalid_argument(err.to_string()),
            RpcError::Transport(_) => Status::unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_codes() {
        let status: Status = RpcError::from(ServiceError::ConfigShape("bad".into())).into();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(status.message().contains("bad"));

        let status: Status = RpcError::from(ServiceError::unit_run("RunShell", "boom")).into();
        assert_eq!(status.code(), Code::Aborted);

        let status: Status = RpcError::InvalidRequest("not json".into()).into();
        assert_eq!(status.code(), Code::InvalidArgument);
    }
}
