//! Standard meteorological derived-value formulae.
//!
//! These are pure functions so they can be shared between the Davis
//! adapter (which must attach wind-chill/heat-index to every LOOP frame)
//! and tests, without pulling in any I/O.

/// NWS wind chill, valid only when `temp_f <= 50.0` and `wind_mph >= 3.0`.
/// Returns `None` outside that validity window rather than extrapolating.
pub fn wind_chill(temp_f: f64, wind_mph: f64) -> Option<f64> {
    if temp_f > 50.0 || wind_mph < 3.0 {
        return None;
    }
    let v016 = wind_mph.powf(0.16);
    Some(35.74 + 0.6215 * temp_f - 35.75 * v016 + 0.4275 * temp_f * v016)
}

/// Heat index: Steadman's simplified formula below 80°F, the full
/// Rothfusz regression (with its humidity adjustments) at or above it.
pub fn heat_index(temp_f: f64, humidity_pct: f64) -> f64 {
    let steadman = 0.5 * (temp_f + 61.0 + ((temp_f - 68.0) * 1.2) + (humidity_pct * 0.094));
    let naive_avg = (steadman + temp_f) / 2.0;
    if naive_avg < 80.0 {
        return steadman;
    }

    let t = temp_f;
    let r = humidity_pct;
    let mut hi = -42.379 + 2.04901523 * t + 10.14333127 * r - 0.22475541 * t * r
        - 0.00683783 * t * t
        - 0.05481717 * r * r
        + 0.00122874 * t * t * r
        + 0.00085282 * t * r * r
        - 0.00000199 * t * t * r * r;

    if r < 13.0 && (80.0..=112.0).contains(&t) {
        hi -= ((13.0 - r) / 4.0) * ((17.0 - (t - 95.0).abs()) / 17.0).sqrt();
    } else if r > 85.0 && (80.0..=87.0).contains(&t) {
        hi += ((r - 85.0) / 10.0) * ((87.0 - t) / 5.0);
    }

    hi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wind_chill_invalid_above_50f() {
        assert_eq!(wind_chill(60.0, 10.0), None);
    }

    #[test]
    fn wind_chill_invalid_below_3mph() {
        assert_eq!(wind_chill(30.0, 1.0), None);
    }

    #[test]
    fn wind_chill_known_value() {
        // 0F at 15mph is widely tabulated around -19F.
        let wc = wind_chill(0.0, 15.0).unwrap();
        assert!((wc - (-19.0)).abs() < 1.0, "got {wc}");
    }

    #[test]
    fn heat_index_mild_uses_steadman() {
        let hi = heat_index(70.0, 50.0);
        // Steadman average stays well under the Rothfusz switch-over.
        assert!(hi < 80.0);
    }

    #[test]
    fn heat_index_hot_humid_uses_rothfusz() {
        // 90F / 80% RH is a well known NWS chart entry: ~113F "danger".
        let hi = heat_index(90.0, 80.0);
        assert!((hi - 113.0).abs() < 3.0, "got {hi}");
    }
}
