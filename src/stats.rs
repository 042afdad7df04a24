use std::cmp::Ordering;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{EngagementRecord, EngagementType, Percentile, StatisticsSummary};

pub const DEFAULT_PERCENTILES: [f64; 3] = [25.0, 50.0, 75.0];

/// Half-up rounding to one decimal: `floor(10 * x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn round_off_whole(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Ordinal label for a percentile rank: 25 -> "25th", 1 -> "1st", 2.5 -> "2.5th".
pub fn percentile_label(p: f64) -> String {
    if p.fract() != 0.0 {
        return format!("{p}th");
    }
    let n = p as u64;
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

pub fn compute(samples: &[f64]) -> AnalyticsResult<StatisticsSummary> {
    compute_with(samples, &DEFAULT_PERCENTILES)
}

pub fn compute_with(samples: &[f64], percentiles: &[f64]) -> AnalyticsResult<StatisticsSummary> {
    validate_percentiles(percentiles)?;
    for (index, value) in samples.iter().copied().enumerate() {
        if value.is_nan() {
            return Err(AnalyticsError::invalid_sample(index, value, "not a number"));
        }
        if value.is_infinite() {
            return Err(AnalyticsError::invalid_sample(index, value, "not finite"));
        }
        if value < 0.0 {
            return Err(AnalyticsError::invalid_sample(index, value, "negative value"));
        }
    }

    if samples.is_empty() {
        return Ok(StatisticsSummary {
            count: 0,
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            percentiles: percentiles
                .iter()
                .map(|p| Percentile {
                    label: percentile_label(*p),
                    percentile: *p,
                    value: 0.0,
                })
                .collect(),
        });
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let count = sorted.len();
    let n = count as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

    Ok(StatisticsSummary {
        count,
        mean,
        median: median_sorted(&sorted),
        std_dev: variance.sqrt(),
        min: sorted[0],
        max: sorted[count - 1],
        percentiles: percentiles
            .iter()
            .map(|p| Percentile {
                label: percentile_label(*p),
                percentile: *p,
                value: percentile_sorted(&sorted, *p),
            })
            .collect(),
    })
}

fn validate_percentiles(percentiles: &[f64]) -> AnalyticsResult<()> {
    for p in percentiles.iter().copied() {
        if !p.is_finite() || !(0.0..=100.0).contains(&p) {
            return Err(AnalyticsError::invalid_config(format!(
                "percentile {p} is outside 0..=100"
            )));
        }
    }
    Ok(())
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0
    }
}

/// Linear interpolation at rank `p / 100 * (n - 1)`. `sorted` must be non-empty.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let last = (sorted.len() - 1) as f64;
    let rank = (p / 100.0 * last).clamp(0.0, last);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Converts scored assessment records into 0..=100 ratios.
///
/// Records without a score or with `max_score == 0` carry no ratio and are
/// left out. A negative `max_score` or score is malformed input.
pub fn score_ratios<'a, I>(records: I) -> AnalyticsResult<Vec<f64>>
where
    I: IntoIterator<Item = &'a EngagementRecord>,
{
    let mut ratios = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        if record.engagement_type() != Some(EngagementType::Assessment) {
            continue;
        }
        if record.max_score.is_nan() || record.max_score < 0.0 {
            return Err(AnalyticsError::invalid_sample(
                index,
                record.max_score,
                format!("negative max_score on item {}", record.item_id),
            ));
        }
        let Some(score) = record.score else {
            continue;
        };
        if record.max_score == 0.0 {
            continue;
        }
        if score.is_nan() || score < 0.0 {
            return Err(AnalyticsError::invalid_sample(
                index,
                score,
                format!("invalid score on item {}", record.item_id),
            ));
        }
        ratios.push((100.0 * score / record.max_score).min(100.0));
    }
    Ok(ratios)
}
