//! Trend analysis (C8): mean, std-dev, and slope in basis points over a
//! chronologically sorted metric series, `spec.md §4.8`.

use super::{trend_id, InsightError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Improving,
    Deteriorating,
    Stable,
    Volatile,
}

/// One (timestamp, value) observation for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendPoint {
    pub timestamp_ms: i64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub trend_id: String,
    pub entity_id: String,
    pub metric: String,
    pub mean: i64,
    pub std_dev_bp: i64,
    pub slope_bp: i64,
    pub direction: Direction,
    pub significant: bool,
}

fn require_sorted(points: &[TrendPoint]) -> Result<(), InsightError> {
    if points.windows(2).any(|w| w[1].timestamp_ms < w[0].timestamp_ms) {
        return Err(InsightError::UnsortedPoints);
    }
    Ok(())
}

/// Analyze a chronologically sorted series of >= 3 points on one metric.
/// `timestamp_ms` stamps the analysis itself and is supplied by the caller.
pub fn analyze(entity_id: &str, metric: &str, points: &[TrendPoint], timestamp_ms: i64) -> Result<TrendAnalysis, InsightError> {
    if points.len() < 3 {
        return Err(InsightError::InsufficientData { required: 3, found: points.len() });
    }
    require_sorted(points)?;

    let n = points.len() as i64;
    let sum: i64 = points.iter().map(|p| p.value).sum();
    let mean = sum / n;

    let variance_numerator: i64 = points.iter().map(|p| (p.value - mean) * (p.value - mean)).sum();
    let variance = variance_numerator / n;
    let std_dev = isqrt(variance);
    let magnitude = mean.unsigned_abs() as i64;
    let std_dev_bp = if magnitude == 0 { std_dev * 10_000 } else { std_dev * 10_000 / magnitude };

    let slope = linear_regression_slope(points);
    let first_value = points[0].value;
    let slope_bp = if first_value == 0 {
        slope * 10_000
    } else {
        slope * 10_000 / first_value.unsigned_abs() as i64
    };

    let direction = if std_dev_bp > 1500 {
        Direction::Volatile
    } else if slope_bp > 500 {
        Direction::Improving
    } else if slope_bp < -500 {
        Direction::Deteriorating
    } else {
        Direction::Stable
    };

    let significant = points.len() >= 5 && slope_bp.abs() >= 100 && std_dev_bp <= 3 * slope_bp.abs();

    Ok(TrendAnalysis {
        trend_id: trend_id(entity_id, metric, timestamp_ms),
        entity_id: entity_id.to_string(),
        metric: metric.to_string(),
        mean,
        std_dev_bp,
        slope_bp,
        direction,
        significant,
    })
}

/// Integer linear-regression slope (least squares) over `(index, value)`
/// pairs, using the point index as the x-axis since points are already
/// chronologically ordered.
fn linear_regression_slope(points: &[TrendPoint]) -> i64 {
    let n = points.len() as i64;
    let sum_x: i64 = (0..n).sum();
    let sum_y: i64 = points.iter().map(|p| p.value).sum();
    let sum_xy: i64 = points.iter().enumerate().map(|(i, p)| i as i64 * p.value).sum();
    let sum_xx: i64 = (0..n).map(|i| i * i).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0 {
        return 0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Integer square root via Newton's method; used for the std-dev since the
/// risk layer must stay integer-only end to end.
fn isqrt(value: i64) -> i64 {
    if value <= 0 {
        return 0;
    }
    let mut x = value;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }
    x
}

/// Derives an overall direction across several already-significant metric
/// trends by majority vote, falling back to `VOLATILE` on a tie or when no
/// metric is significant, `spec.md §4.8`.
pub fn aggregate_direction(trends: &[TrendAnalysis]) -> Direction {
    let significant: Vec<&TrendAnalysis> = trends.iter().filter(|t| t.significant).collect();
    if significant.is_empty() {
        return Direction::Volatile;
    }

    let mut improving = 0;
    let mut deteriorating = 0;
    let mut stable = 0;
    let mut volatile = 0;
    for t in &significant {
        match t.direction {
            Direction::Improving => improving += 1,
            Direction::Deteriorating => deteriorating += 1,
            Direction::Stable => stable += 1,
            Direction::Volatile => volatile += 1,
        }
    }

    let max = improving.max(deteriorating).max(stable).max(volatile);
    let leaders = [improving == max, deteriorating == max, stable == max, volatile == max]
        .iter()
        .filter(|&&leading| leading)
        .count();

    if leaders > 1 {
        return Direction::Volatile;
    }
    if improving == max {
        Direction::Improving
    } else if deteriorating == max {
        Direction::Deteriorating
    } else if stable == max {
        Direction::Stable
    } else {
        Direction::Volatile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(values: &[i64]) -> Vec<TrendPoint> {
        values.iter().enumerate().map(|(i, &v)| TrendPoint { timestamp_ms: i as i64 * 1000, value: v }).collect()
    }

    #[test]
    fn three_points_succeeds_but_not_significant() {
        let analysis = analyze("p1", "correlation", &points(&[90, 91, 92]), 0).unwrap();
        assert!(!analysis.significant);
    }

    #[test]
    fn insufficient_data_rejected() {
        let err = analyze("p1", "correlation", &points(&[90, 91]), 0).unwrap_err();
        assert_eq!(err, InsightError::InsufficientData { required: 3, found: 2 });
    }

    #[test]
    fn unsorted_points_rejected() {
        let mut pts = points(&[90, 91, 92]);
        pts[0].timestamp_ms = 10_000;
        let err = analyze("p1", "correlation", &pts, 0).unwrap_err();
        assert_eq!(err, InsightError::UnsortedPoints);
    }

    #[test]
    fn strongly_rising_series_improves_with_significance() {
        let analysis = analyze("p1", "correlation", &points(&[50, 60, 70, 80, 90]), 0).unwrap();
        assert_eq!(analysis.direction, Direction::Improving);
        assert!(analysis.significant);
    }
}
