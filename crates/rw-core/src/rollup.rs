//! Bucket aggregation types and the circular-mean math used both by the
//! timescale storage engine's SQL continuous aggregates and by tests that
//! verify the same arithmetic in Rust (rotation symmetry and the
//! 0/360 wrap-around case).
//!
//! Grounded on `weex-core::rollups`'s `Accumulator` / `HashMap<String, _>`
//! shape: a bucketed reading is modelled as a map of field name to
//! avg/min/max rather than one struct field per scalar, since the Reading
//! type carries dozens of optional scalars and a flat struct of ninety
//! avg/min/max columns would be unreadable and brittle to extend.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Per-field statistics within one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FieldStats {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// A reading materialised in a time bucket by the storage engine
/// (the rollup's `BucketReading` record).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketReading {
    pub bucket_start: DateTime<Utc>,
    pub station_name: String,
    pub fields: HashMap<String, FieldStats>,
    /// `sum(rain_incremental)` over the bucket.
    pub period_rain: Option<f64>,
    /// Circular mean of `wind_dir` samples in the bucket, `[0, 360)`.
    pub wind_dir_circular_mean: Option<f64>,
}

/// Accumulates a running avg/min/max for one scalar field across a bucket.
#[derive(Debug, Clone, Default)]
pub struct FieldAccumulator {
    sum: f64,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
}

impl FieldAccumulator {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn finish(&self) -> FieldStats {
        if self.count == 0 {
            return FieldStats::default();
        }
        FieldStats {
            avg: Some(self.sum / self.count as f64),
            min: self.min,
            max: self.max,
        }
    }
}

/// Accumulates the circular mean of a set of angles (degrees) by summing
/// `sin`/`cos` components rather than averaging the raw degrees, avoiding
/// wrap-around artefacts at the 0/360 seam.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircularMeanAccumulator {
    sin_sum: f64,
    cos_sum: f64,
    count: u64,
}

impl CircularMeanAccumulator {
    pub fn add_degrees(&mut self, degrees: f64) {
        let radians = degrees.to_radians();
        self.sin_sum += radians.sin();
        self.cos_sum += radians.cos();
        self.count += 1;
    }

    pub fn finish(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(circular_mean_from_components(
            self.sin_sum / self.count as f64,
            self.cos_sum / self.count as f64,
        ))
    }
}

fn circular_mean_from_components(sin_avg: f64, cos_avg: f64) -> f64 {
    let mean = sin_avg.atan2(cos_avg).to_degrees();
    // atan2 returns (-180, 180]; normalise into [0, 360).
    ((mean % 360.0) + 360.0) % 360.0
}

/// Convenience wrapper over [`CircularMeanAccumulator`] for a fixed slice
/// of samples.
pub fn circular_mean_degrees(samples: &[f64]) -> Option<f64> {
    let mut acc = CircularMeanAccumulator::default();
    for &s in samples {
        acc.add_degrees(s);
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_mean_of_10_and_350_is_0() {
        // Naive arithmetic mean would give 180, the wrap-around trap this
        // function exists to avoid.
        let mean = circular_mean_degrees(&[10.0, 350.0]).unwrap();
        assert!(mean < 1.0 || mean > 359.0, "got {mean}");
    }

    #[test]
    fn circular_mean_empty_is_none() {
        assert_eq!(circular_mean_degrees(&[]), None);
    }

    #[test]
    fn circular_mean_is_rotation_symmetric() {
        // Shifting every sample by k degrees shifts the aggregate by k
        // degrees (mod 360).
        let base = [10.0, 40.0, 355.0, 300.0];
        let shift = 25.0;
        let shifted: Vec<f64> = base.iter().map(|v| (v + shift) % 360.0).collect();

        let base_mean = circular_mean_degrees(&base).unwrap();
        let shifted_mean = circular_mean_degrees(&shifted).unwrap();

        let expected = (base_mean + shift) % 360.0;
        let diff = (shifted_mean - expected).abs();
        let diff = diff.min(360.0 - diff);
        assert!(diff < 1e-6, "base={base_mean} shifted={shifted_mean} expected={expected}");
    }

    #[test]
    fn field_accumulator_tracks_avg_min_max() {
        let mut acc = FieldAccumulator::default();
        for v in [10.0, 5.0, 15.0] {
            acc.add(v);
        }
        let stats = acc.finish();
        assert_eq!(stats.min, Some(5.0));
        assert_eq!(stats.max, Some(15.0));
        assert_eq!(stats.avg, Some(10.0));
    }

    #[test]
    fn field_accumulator_empty_is_default() {
        let acc = FieldAccumulator::default();
        assert_eq!(acc.finish(), FieldStats::default());
    }
}
