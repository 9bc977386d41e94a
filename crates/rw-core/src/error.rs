use thiserror::Error;

/// Violations of the invariants a [`crate::Reading`] must hold.
#[derive(Debug, Error, PartialEq)]
pub enum ReadingError {
    #[error("wind direction {0} is out of range [0, 360)")]
    WindDirOutOfRange(f64),
}
