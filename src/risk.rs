use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::stats::round_off_whole;

pub const DEFAULT_LOW_MAX: f64 = 33.0;
pub const DEFAULT_MEDIUM_MAX: f64 = 66.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive upper bounds of the low and medium tiers, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct RiskThresholds {
    low_max: f64,
    medium_max: f64,
}

#[derive(Deserialize)]
struct RawThresholds {
    low_max: f64,
    medium_max: f64,
}

impl TryFrom<RawThresholds> for RiskThresholds {
    type Error = AnalyticsError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        RiskThresholds::new(raw.low_max, raw.medium_max)
    }
}

impl RiskThresholds {
    pub fn new(low_max: f64, medium_max: f64) -> AnalyticsResult<Self> {
        if !low_max.is_finite() || !medium_max.is_finite() {
            return Err(AnalyticsError::invalid_thresholds(
                "thresholds must be finite numbers",
            ));
        }
        if !(0.0..=100.0).contains(&low_max) || !(0.0..=100.0).contains(&medium_max) {
            return Err(AnalyticsError::invalid_thresholds(format!(
                "thresholds must lie in 0..=100 (low_max {low_max}, medium_max {medium_max})"
            )));
        }
        if low_max.fract() != 0.0 || medium_max.fract() != 0.0 {
            return Err(AnalyticsError::invalid_thresholds(format!(
                "thresholds must be whole percents (low_max {low_max}, medium_max {medium_max})"
            )));
        }
        if low_max > medium_max {
            return Err(AnalyticsError::invalid_thresholds(format!(
                "low_max {low_max} exceeds medium_max {medium_max}"
            )));
        }
        Ok(Self {
            low_max,
            medium_max,
        })
    }

    pub fn low_max(&self) -> f64 {
        self.low_max
    }

    pub fn medium_max(&self) -> f64 {
        self.medium_max
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low_max: DEFAULT_LOW_MAX,
            medium_max: DEFAULT_MEDIUM_MAX,
        }
    }
}

/// Clamps to 0..=100 and rounds half-up to a whole percent, so 33.3 compares
/// as 33 and 33.5 as 34. NaN is treated as 0.
fn normalize_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        return 0.0;
    }
    round_off_whole(ratio.clamp(0.0, 100.0))
}

pub fn classify(ratio: f64) -> RiskTier {
    classify_with(ratio, &RiskThresholds::default())
}

pub fn classify_with(ratio: f64, thresholds: &RiskThresholds) -> RiskTier {
    let ratio = normalize_ratio(ratio);
    if ratio <= thresholds.low_max {
        RiskTier::Low
    } else if ratio <= thresholds.medium_max {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_default_thresholds() {
        assert_eq!(classify(0.0), RiskTier::Low);
        assert_eq!(classify(20.0), RiskTier::Low);
        assert_eq!(classify(50.0), RiskTier::Medium);
        assert_eq!(classify(80.0), RiskTier::High);
        assert_eq!(classify(100.0), RiskTier::High);
    }

    #[test]
    fn boundaries_belong_to_lower_tier() {
        assert_eq!(classify(33.0), RiskTier::Low);
        assert_eq!(classify(66.0), RiskTier::Medium);
        assert_eq!(classify(67.0), RiskTier::High);
    }

    #[test]
    fn ratio_is_rounded_before_comparison() {
        assert_eq!(classify(100.0 / 3.0), RiskTier::Low);
        assert_eq!(classify(33.3), RiskTier::Low);
        assert_eq!(classify(33.5), RiskTier::Medium);
        assert_eq!(classify(66.4), RiskTier::Medium);
        assert_eq!(classify(66.5), RiskTier::High);
    }

    #[test]
    fn out_of_range_ratios_are_clamped() {
        assert_eq!(classify(-12.0), RiskTier::Low);
        assert_eq!(classify(140.0), RiskTier::High);
        assert_eq!(classify(f64::NAN), RiskTier::Low);
        assert_eq!(classify(f64::INFINITY), RiskTier::High);
    }

    #[test]
    fn override_thresholds_apply() {
        let thresholds = RiskThresholds::new(50.0, 90.0).unwrap();
        assert_eq!(classify_with(45.0, &thresholds), RiskTier::Low);
        assert_eq!(classify_with(85.0, &thresholds), RiskTier::Medium);
        assert_eq!(classify_with(95.0, &thresholds), RiskTier::High);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        assert!(RiskThresholds::new(70.0, 40.0).is_err());
        assert!(RiskThresholds::new(-1.0, 40.0).is_err());
        assert!(RiskThresholds::new(10.0, f64::NAN).is_err());

        let parsed: Result<RiskThresholds, _> =
            serde_json::from_str(r#"{"low_max": 80, "medium_max": 20}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn fractional_thresholds_are_rejected() {
        assert!(matches!(
            RiskThresholds::new(40.5, 70.0),
            Err(AnalyticsError::InvalidThresholds { .. })
        ));
        assert!(matches!(
            RiskThresholds::new(40.0, 70.25),
            Err(AnalyticsError::InvalidThresholds { .. })
        ));

        let parsed: Result<RiskThresholds, _> =
            serde_json::from_str(r#"{"low_max": 40.5, "medium_max": 70.25}"#);
        assert!(parsed.is_err());

        let whole = RiskThresholds::new(40.0, 70.0).unwrap();
        assert_eq!(classify_with(40.4, &whole), RiskTier::Low);
        assert_eq!(classify_with(70.4, &whole), RiskTier::Medium);
        assert_eq!(classify_with(70.5, &whole), RiskTier::High);
    }
}
