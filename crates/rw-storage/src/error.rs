use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[cfg(feature = "timescale")]
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "grpc-stream")]
    #[error("gRPC transport error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
