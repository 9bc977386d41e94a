use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("storage boot failed: {0}")]
    Storage(#[from] rw_storage::StorageError),
    #[error("station adapter boot failed: {0}")]
    Ingest(#[from] rw_ingest::IngestError),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
