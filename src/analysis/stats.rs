use serde::Serialize;

/// Population summary statistics. Quartiles use the "exclusive" method: the
/// sorted data is split at the median index (odd-length input excludes the
/// median itself) and each half's median is taken. Not the interpolation
/// method; downstream chart output depends on this exact variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Empty input is a legitimate state (empty filter result), not an error.
pub fn compute_stats(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let (mean, std) = mean_and_std(values);
    let median = median_of(&sorted);
    let mid = sorted.len() / 2;
    let lower = &sorted[..mid];
    let upper = if sorted.len() % 2 == 0 {
        &sorted[mid..]
    } else {
        &sorted[mid + 1..]
    };

    Stats {
        mean,
        std,
        min: sorted[0],
        q1: median_of(lower),
        median,
        q3: median_of(upper),
        max: sorted[sorted.len() - 1],
    }
}

fn median_of(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population mean and standard deviation (divide by N, not N-1).
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Deviation score: 50 + 10 * (x - mean) / std. When std is 0 every member
/// standardizes to exactly 50; never divides by zero.
pub fn deviation_value(x: f64, mean: f64, std: f64) -> f64 {
    if std == 0.0 {
        50.0
    } else {
        50.0 + 10.0 * (x - mean) / std
    }
}

pub fn standardize_scores(values: &[f64]) -> Vec<f64> {
    let (mean, std) = mean_and_std(values);
    values.iter().map(|v| deviation_value(*v, mean, std)).collect()
}

/// Ordinal label for a raw 1..5 score. Inclusive upper bounds; values between
/// 4 and 5 exclusive (and NaN) fall through to "".
pub fn score_label(score: f64) -> &'static str {
    if score <= 1.0 {
        "全くそう思わない"
    } else if score <= 2.0 {
        "そう思わない"
    } else if score <= 3.0 {
        "どちらともいえない"
    } else if score <= 4.0 {
        "そう思う"
    } else if score >= 5.0 {
        "とてもそう思う"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_compute_stats_even_length() {
        let stats = compute_stats(&[4.0, 1.0, 3.0, 2.0]);
        assert!((stats.mean - 2.5).abs() < EPS);
        assert!((stats.median - 2.5).abs() < EPS);
        assert!((stats.q1 - 1.5).abs() < EPS);
        assert!((stats.q3 - 3.5).abs() < EPS);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
    }

    #[test]
    fn test_compute_stats_odd_length_excludes_median() {
        // sorted: 3 5 7 8 12 13 14 18 21
        let stats = compute_stats(&[3.0, 7.0, 8.0, 5.0, 12.0, 14.0, 21.0, 13.0, 18.0]);
        assert_eq!(stats.median, 12.0);
        assert!((stats.q1 - 6.0).abs() < EPS);
        assert!((stats.q3 - 16.0).abs() < EPS);
    }

    #[test]
    fn test_compute_stats_single_element() {
        let stats = compute_stats(&[7.0]);
        assert_eq!(stats.median, 7.0);
        assert_eq!(stats.min, 7.0);
        assert_eq!(stats.max, 7.0);
        // both halves are empty under the exclusive split
        assert_eq!(stats.q1, 0.0);
        assert_eq!(stats.q3, 0.0);
        assert_eq!(stats.std, 0.0);
    }

    #[test]
    fn test_compute_stats_empty_is_all_zero() {
        assert_eq!(compute_stats(&[]), Stats::default());
    }

    #[test]
    fn test_population_std() {
        // 1, 3, 5: mean 3, variance 8/3
        let (mean, std) = mean_and_std(&[1.0, 3.0, 5.0]);
        assert!((mean - 3.0).abs() < EPS);
        assert!((std - (8.0f64 / 3.0).sqrt()).abs() < EPS);
    }

    #[test]
    fn test_mean_standardizes_to_fifty() {
        assert!((deviation_value(3.0, 3.0, 1.7) - 50.0).abs() < EPS);
    }

    #[test]
    fn test_zero_std_yields_fifty_for_all() {
        let scores = standardize_scores(&[4.0, 4.0, 4.0]);
        assert_eq!(scores, vec![50.0, 50.0, 50.0]);
        let single = standardize_scores(&[2.0]);
        assert_eq!(single, vec![50.0]);
    }

    #[test]
    fn test_one_three_five_example() {
        let scores = standardize_scores(&[1.0, 3.0, 5.0]);
        assert!((scores[0] - 37.75).abs() < 0.01);
        assert!((scores[1] - 50.0).abs() < EPS);
        assert!((scores[2] - 62.25).abs() < 0.01);
    }

    #[test]
    fn test_score_labels() {
        assert_eq!(score_label(1.0), "全くそう思わない");
        assert_eq!(score_label(0.0), "全くそう思わない");
        assert_eq!(score_label(1.5), "そう思わない");
        assert_eq!(score_label(3.0), "どちらともいえない");
        assert_eq!(score_label(4.0), "そう思う");
        assert_eq!(score_label(5.0), "とてもそう思う");
        assert_eq!(score_label(6.0), "とてもそう思う");
        assert_eq!(score_label(4.5), "");
        assert_eq!(score_label(f64::NAN), "");
    }
}
