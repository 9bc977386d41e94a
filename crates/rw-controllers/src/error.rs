use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no reading available yet for device {0:?}")]
    NoReadingYet(String),

    #[error("reading for device {0:?} is semantically faulty (temp and barometer both zero)")]
    FaultyReading(String),

    #[error("storage query failed: {0}")]
    Storage(#[from] rw_storage::StorageError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream rejected the update: {0}")]
    UpstreamRejected(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
