//! Canonical data types shared across the RemoteWeather ingest-and-distribution
//! pipeline: the normalised [`Reading`], bucketed rollups, subscriber
//! identity, and the meteorological formulae the Davis adapter needs.

mod error;
pub mod meteorology;
pub mod rollup;
mod subscriber;
mod types;

pub use error::ReadingError;
pub use rollup::{BucketReading, CircularMeanAccumulator, FieldAccumulator, FieldStats};
pub use subscriber::SubscriberId;
pub use types::{Reading, StationKind};
