//! Engagement and assessment analytics for school dashboards.
//!
//! Turns raw per-student, per-item engagement records into rollups,
//! score distributions, risk tiers, leaderboards and trend series. Every
//! component is pure and synchronous; fetching records is the caller's job.

pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod models;
pub mod risk;
pub mod rollup;
pub mod stats;
pub mod trend;

pub use config::EngineConfig;
pub use engine::{AnalyticsEngine, Dashboard, DashboardRequest};
pub use error::{AnalyticsError, AnalyticsResult};
pub use models::{
    AssessmentManifest, EngagementRecord, EngagementType, LeaderboardCandidate,
    LeaderboardEntry, LeaderboardPage, RecordStatus, RollupSummary, ScopeKey, ScopeLevel,
    StatisticsSummary, TrendPoint,
};
pub use risk::{RiskThresholds, RiskTier};
pub use trend::{DateRange, Period};
