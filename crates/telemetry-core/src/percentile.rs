// ── Percentile helpers ────────────────────────────────────────────────────────

/// Compute the `p`-th percentile of a **sorted** slice using standard linear
/// interpolation (the same algorithm used by NumPy's `percentile` function).
///
/// Returns `0.0` for an empty slice. `p` is clamped to `0.0..=100.0`.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let len = sorted_data.len();
    if len == 1 {
        return sorted_data[0];
    }
    let p = p.clamp(0.0, 100.0);
    let rank = (p / 100.0) * (len as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted_data[lo];
    }
    let frac = rank - lo as f64;
    sorted_data[lo] + frac * (sorted_data[hi] - sorted_data[lo])
}

/// Median of an unsorted set of values; `None` when `values` is empty.
///
/// NaN values are ignored.
///
/// # Examples
///
/// ```
/// use telemetry_core::percentile::median;
///
/// assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
/// assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
/// assert_eq!(median(&[]), None);
/// ```
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    Some(percentile(&sorted, 50.0))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── percentile ───────────────────────────────────────────────────────────

    #[test]
    fn test_percentile_empty_returns_zero() {
        assert_eq!(percentile(&[], 90.0), 0.0);
    }

    #[test]
    fn test_percentile_single_element() {
        assert_eq!(percentile(&[42.0], 90.0), 42.0);
        assert_eq!(percentile(&[42.0], 0.0), 42.0);
        assert_eq!(percentile(&[42.0], 100.0), 42.0);
    }

    #[test]
    fn test_percentile_p50_even() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        // rank = 0.5 * 3 = 1.5 → interpolate between data[1]=2 and data[2]=3
        assert!((percentile(&data, 50.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_bounds() {
        let data = vec![10.0, 20.0, 30.0];
        assert!((percentile(&data, 0.0) - 10.0).abs() < 1e-9);
        assert!((percentile(&data, 100.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_out_of_range_is_clamped() {
        let data = vec![1.0, 2.0];
        assert_eq!(percentile(&data, 150.0), 2.0);
        assert_eq!(percentile(&data, -10.0), 1.0);
    }

    // ── median ───────────────────────────────────────────────────────────────

    #[test]
    fn test_median_odd_unsorted() {
        assert_eq!(median(&[812.0, 640.0, 701.0]), Some(701.0));
    }

    #[test]
    fn test_median_even_interpolates() {
        let m = median(&[100.0, 300.0, 200.0, 400.0]).unwrap();
        assert!((m - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_ignores_nan() {
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
        assert_eq!(median(&[f64::NAN]), None);
    }
}
