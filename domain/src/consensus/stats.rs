//! Descriptive statistics over score collections.
//!
//! All functions are pure; variance is the population variance.

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by `n`). Zero for empty or single-element input.
pub fn population_variance(values: &[f64]) -> f64 {
    let Some(m) = mean(values) else {
        return 0.0;
    };
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    population_variance(values).sqrt()
}

/// Statistical median: the middle value, or the mean of the two middle
/// values for an even count.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Ascending copy of `values` using a total order.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// `max(0, 1 - variance / 10)`.
pub fn confidence_from_variance(variance: f64) -> f64 {
    (1.0 - variance / 10.0).max(0.0)
}

/// Fraction of the initial disagreement removed between two score sets.
///
/// Returns `1.0` when the initial variance is already zero, since no further
/// convergence is possible; otherwise a value clamped to `[0, 1]`.
pub fn calculate_convergence(initial: &[f64], final_scores: &[f64]) -> f64 {
    let initial_variance = population_variance(initial);
    if initial_variance == 0.0 {
        return 1.0;
    }
    let final_variance = population_variance(final_scores);
    ((initial_variance - final_variance) / initial_variance).clamp(0.0, 1.0)
}
