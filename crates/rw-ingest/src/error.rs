use thiserror::Error;

/// Errors an adapter can hit. None of these propagate past the adapter's
/// own reconnect loop — they exist so the loop has something
/// concrete to log before sleeping and retrying.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("i/o error talking to station: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("gRPC transport error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    #[error("gRPC call failed: {0}")]
    GrpcStatus(#[from] tonic::Status),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
