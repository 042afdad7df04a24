use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AnalyticsError {
    #[error("invalid sample at index {index} ({value}): {reason}")]
    InvalidSample {
        index: usize,
        value: f64,
        reason: String,
    },
    #[error("invalid page size {page_size}: must be greater than zero")]
    InvalidPageSize { page_size: i64 },
    #[error("invalid risk thresholds: {message}")]
    InvalidThresholds { message: String },
    #[error("invalid date range: {message}")]
    InvalidRange { message: String },
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl AnalyticsError {
    pub fn invalid_sample(index: usize, value: f64, reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            index,
            value,
            reason: reason.into(),
        }
    }

    pub fn invalid_thresholds(message: impl Into<String>) -> Self {
        Self::InvalidThresholds {
            message: message.into(),
        }
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::AnalyticsError;

    #[test]
    fn helper_constructors_set_variants() {
        let err = AnalyticsError::invalid_sample(2, f64::NAN, "not a number");
        assert!(matches!(err, AnalyticsError::InvalidSample { index: 2, .. }));
        let err = AnalyticsError::invalid_thresholds("low above medium");
        assert!(matches!(err, AnalyticsError::InvalidThresholds { .. }));
        let err = AnalyticsError::invalid_range("start after end");
        assert!(matches!(err, AnalyticsError::InvalidRange { .. }));
        let err = AnalyticsError::invalid_config("empty percentiles");
        assert!(matches!(err, AnalyticsError::InvalidConfig { .. }));
    }

    #[test]
    fn page_size_message_names_value() {
        let err = AnalyticsError::InvalidPageSize { page_size: -3 };
        assert_eq!(
            err.to_string(),
            "invalid page size -3: must be greater than zero"
        );
    }
}
