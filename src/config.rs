use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::risk::RiskThresholds;
use crate::stats::DEFAULT_PERCENTILES;
use crate::trend::Period;

fn default_percentiles() -> Vec<f64> {
    DEFAULT_PERCENTILES.to_vec()
}

fn default_page_size() -> i64 {
    20
}

fn default_trend_period() -> Period {
    Period::Week
}

/// Engine-wide settings. Every field has a default so a partial JSON file
/// only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub risk: RiskThresholds,
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,
    #[serde(default = "default_page_size")]
    pub leaderboard_page_size: i64,
    #[serde(default = "default_trend_period")]
    pub trend_period: Period,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk: RiskThresholds::default(),
            percentiles: default_percentiles(),
            leaderboard_page_size: default_page_size(),
            trend_period: default_trend_period(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> AnalyticsResult<Self> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| AnalyticsError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> AnalyticsResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalyticsError::invalid_config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.leaderboard_page_size <= 0 {
            return Err(AnalyticsError::InvalidPageSize {
                page_size: self.leaderboard_page_size,
            });
        }
        if let Some(p) = self
            .percentiles
            .iter()
            .find(|p| !p.is_finite() || !(0.0..=100.0).contains(*p))
        {
            return Err(AnalyticsError::invalid_config(format!(
                "percentile {p} is outside 0..=100"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.percentiles, vec![25.0, 50.0, 75.0]);
        assert_eq!(config.trend_period, Period::Week);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = EngineConfig::from_json(
            r#"{"risk": {"low_max": 40, "medium_max": 70}, "trend_period": "month"}"#,
        )
        .unwrap();
        assert_eq!(config.risk.low_max(), 40.0);
        assert_eq!(config.risk.medium_max(), 70.0);
        assert_eq!(config.trend_period, Period::Month);
        assert_eq!(config.leaderboard_page_size, 20);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"leaderboard_page_size": 0}"#),
            Err(AnalyticsError::InvalidPageSize { page_size: 0 })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"percentiles": [10, 120]}"#),
            Err(AnalyticsError::InvalidConfig { .. })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"risk": {"low_max": 90, "medium_max": 10}}"#),
            Err(AnalyticsError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidConfig { .. }));
    }
}
