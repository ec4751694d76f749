//! Signal Model
//!
//! Presentational link quality between two connected devices.
//! Connectivity itself is never decided here.

/// Highest reported signal strength.
pub const SIGNAL_MAX: f64 = 100.0;

/// Effective range of a link: the shorter of the two device ranges.
#[inline]
pub fn effective_range(range_a: f64, range_b: f64) -> f64 {
    range_a.min(range_b)
}

/// Signal strength in `0..=100` for a link of `distance` over `effective_range`.
///
/// `100 * (1 - distance / effective_range)`, clamped. A degenerate range
/// reports 0.
pub fn signal_strength(distance: f64, effective_range: f64) -> f64 {
    if !effective_range.is_finite() || effective_range <= 0.0 {
        return 0.0;
    }
    let raw = SIGNAL_MAX * (1.0 - distance / effective_range);
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, SIGNAL_MAX)
}

/// Signal strength between two devices given both ranges.
#[inline]
pub fn link_signal(distance: f64, range_a: f64, range_b: f64) -> f64 {
    signal_strength(distance, effective_range(range_a, range_b))
}
