//! Percentage math shared by every statistics path. All rounding happens
//! here; no call site rounds on its own.

/// Round to 2 decimal places: `round(100*x) / 100`.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `attended / total * 100`, 2 decimals. Zero total is a valid degenerate
/// input and yields 0.0, never NaN.
pub fn percentage(attended: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(attended as f64 / total as f64 * 100.0)
}

/// Institutional composite: labs count double in both numerator and
/// denominator. 0.0 when no sessions of either type exist.
pub fn weighted_overall(
    total_lectures: u32,
    lectures_attended: u32,
    total_labs: u32,
    labs_attended: u32,
) -> f64 {
    let denom = total_lectures + 2 * total_labs;
    if denom == 0 {
        return 0.0;
    }
    let num = lectures_attended + 2 * labs_attended;
    round2(num as f64 / denom as f64 * 100.0)
}

/// Unweighted arithmetic mean, 2 decimals; 0.0 over an empty slice.
/// Ancestor rollup levels average child percentages with this and
/// nothing else.
pub fn mean2(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}
