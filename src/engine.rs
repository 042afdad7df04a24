use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::completion::completion_states;
use crate::config::EngineConfig;
use crate::error::AnalyticsResult;
use crate::leaderboard::{candidates_from_rollups, rank_with, EntityLabels};
use crate::models::{
    AssessmentManifest, EngagementRecord, EngagementType, LeaderboardPage, ScopeLevel,
    StatisticsSummary, StudentCompletion,
};
use crate::rollup::{hierarchy, RollupHierarchy};
use crate::stats::{compute_with, score_ratios};
use crate::trend::{bucket, DateRange, Period, TrendSeries};

/// What the caller wants out of one dashboard build.
#[derive(Debug, Clone, Default)]
pub struct DashboardRequest {
    pub school_id: Option<String>,
    pub class_id: Option<String>,
    pub trend_range: Option<DateRange>,
    pub trend_period: Option<Period>,
    pub trend_engagement_type: Option<EngagementType>,
    pub student_page: i64,
    pub class_page: i64,
    pub page_size: Option<i64>,
}

impl DashboardRequest {
    fn includes(&self, record: &EngagementRecord) -> bool {
        self.school_id
            .as_deref()
            .map_or(true, |school| record.school_id == school)
            && self
                .class_id
                .as_deref()
                .map_or(true, |class| record.class_id == class)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStatistics {
    pub class_id: String,
    pub summary: StatisticsSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub rollups: RollupHierarchy,
    pub school_statistics: StatisticsSummary,
    pub class_statistics: Vec<ClassStatistics>,
    pub completion: Vec<StudentCompletion>,
    pub student_leaderboard: LeaderboardPage,
    pub class_leaderboard: LeaderboardPage,
    pub trend: Option<TrendSeries>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsEngine {
    config: EngineConfig,
}

impl AnalyticsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Score distribution of assessment ratios for one set of records.
    pub fn statistics<'a, I>(&self, records: I) -> AnalyticsResult<StatisticsSummary>
    where
        I: IntoIterator<Item = &'a EngagementRecord>,
    {
        let ratios = score_ratios(records)?;
        compute_with(&ratios, &self.config.percentiles)
    }

    /// Per-class distributions, sorted by class id.
    pub fn class_statistics(
        &self,
        records: &[EngagementRecord],
    ) -> AnalyticsResult<Vec<ClassStatistics>> {
        let mut by_class: BTreeMap<&str, Vec<&EngagementRecord>> = BTreeMap::new();
        for record in records {
            by_class
                .entry(record.class_id.as_str())
                .or_default()
                .push(record);
        }
        by_class
            .into_iter()
            .map(|(class_id, class_records)| {
                Ok(ClassStatistics {
                    class_id: class_id.to_string(),
                    summary: self.statistics(class_records)?,
                })
            })
            .collect()
    }

    pub fn dashboard(
        &self,
        records: &[EngagementRecord],
        manifest: &AssessmentManifest,
        request: &DashboardRequest,
    ) -> AnalyticsResult<Dashboard> {
        let scoped: Vec<EngagementRecord> = records
            .iter()
            .filter(|r| request.includes(r))
            .cloned()
            .collect();

        let rollups = hierarchy(&scoped, manifest);
        let labels = EntityLabels::from_records(&scoped);
        let page_size = request
            .page_size
            .unwrap_or(self.config.leaderboard_page_size);

        let student_leaderboard = rank_with(
            &candidates_from_rollups(&rollups.students, ScopeLevel::Student, &labels),
            request.student_page.max(1),
            page_size,
            &self.config.risk,
        )?;
        let class_leaderboard = rank_with(
            &candidates_from_rollups(&rollups.classes, ScopeLevel::Class, &labels),
            request.class_page.max(1),
            page_size,
            &self.config.risk,
        )?;

        let trend = match request.trend_range.or_else(|| observed_range(&scoped)) {
            Some(range) => Some(bucket(
                &scoped,
                request.trend_period.unwrap_or(self.config.trend_period),
                range,
                request.trend_engagement_type,
                manifest,
            )?),
            None => None,
        };

        let dashboard = Dashboard {
            school_statistics: self.statistics(&scoped)?,
            class_statistics: self.class_statistics(&scoped)?,
            completion: completion_states(&scoped, manifest),
            student_leaderboard,
            class_leaderboard,
            trend,
            rollups,
        };

        info!(
            records = scoped.len(),
            students = dashboard.student_leaderboard.total_entries,
            classes = dashboard.class_leaderboard.total_entries,
            skipped = dashboard.rollups.skipped_count,
            "dashboard built"
        );

        Ok(dashboard)
    }
}

/// Earliest to latest record date, or `None` without records.
pub fn observed_range(records: &[EngagementRecord]) -> Option<DateRange> {
    let start = records.iter().map(EngagementRecord::bucket_date).min()?;
    let end = records.iter().map(EngagementRecord::bucket_date).max()?;
    Some(DateRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use crate::models::RecordStatus;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(student: &str, class: &str, school: &str, score: Option<f64>) -> EngagementRecord {
        EngagementRecord {
            student_id: student.to_string(),
            student_name: format!("Student {student}"),
            class_id: class.to_string(),
            class_name: format!("Class {class}"),
            school_id: school.to_string(),
            item_id: "quiz-1".to_string(),
            item_type: "assessment".to_string(),
            status: if score.is_some() {
                RecordStatus::Done
            } else {
                RecordStatus::Missed
            },
            score,
            max_score: 20.0,
            timestamp: Utc.with_ymd_and_hms(2026, 2, 4, 10, 0, 0).unwrap(),
            answered_item_ids: Vec::new(),
            expected_item_ids: Vec::new(),
        }
    }

    fn records() -> Vec<EngagementRecord> {
        vec![
            record("s-1", "c-2", "sch-1", Some(18.0)),
            record("s-2", "c-2", "sch-1", Some(10.0)),
            record("s-3", "c-1", "sch-1", None),
            record("s-4", "c-9", "sch-2", Some(20.0)),
        ]
    }

    #[test]
    fn dashboard_scopes_to_requested_school() {
        let engine = AnalyticsEngine::default();
        let request = DashboardRequest {
            school_id: Some("sch-1".to_string()),
            ..DashboardRequest::default()
        };
        let dashboard = engine
            .dashboard(&records(), &AssessmentManifest::new(), &request)
            .unwrap();

        assert_eq!(dashboard.rollups.schools.len(), 1);
        assert_eq!(dashboard.rollups.schools[0].done, 2);
        assert_eq!(dashboard.rollups.schools[0].total, 3);
        assert_eq!(dashboard.student_leaderboard.total_entries, 3);
        assert_eq!(dashboard.class_leaderboard.total_entries, 2);
        assert_eq!(dashboard.school_statistics.count, 2);
        assert_eq!(dashboard.school_statistics.mean, 70.0);

        let class_ids: Vec<&str> = dashboard
            .class_statistics
            .iter()
            .map(|c| c.class_id.as_str())
            .collect();
        assert_eq!(class_ids, vec!["c-1", "c-2"]);
        assert_eq!(dashboard.class_statistics[0].summary.count, 0);

        let trend = dashboard.trend.unwrap();
        assert_eq!(trend.period, Period::Week);
        assert_eq!(trend.points.len(), 1);
        assert_eq!(trend.points[0].value, 66.7);
    }

    #[test]
    fn leaderboard_names_come_from_records() {
        let dashboard = AnalyticsEngine::default()
            .dashboard(
                &records(),
                &AssessmentManifest::new(),
                &DashboardRequest::default(),
            )
            .unwrap();
        let rows: Vec<(&str, usize)> = dashboard
            .class_leaderboard
            .page_entries
            .iter()
            .map(|e| (e.display_name.as_str(), e.rank))
            .collect();
        assert_eq!(
            rows,
            vec![("Class c-2", 1), ("Class c-9", 1), ("Class c-1", 3)]
        );
    }

    #[test]
    fn empty_input_builds_an_empty_dashboard() {
        let dashboard = AnalyticsEngine::default()
            .dashboard(&[], &AssessmentManifest::new(), &DashboardRequest::default())
            .unwrap();
        assert!(dashboard.rollups.students.is_empty());
        assert_eq!(dashboard.school_statistics.count, 0);
        assert_eq!(dashboard.student_leaderboard.total_pages, 0);
        assert!(dashboard.trend.is_none());
    }

    #[test]
    fn explicit_page_size_is_validated() {
        let request = DashboardRequest {
            page_size: Some(0),
            ..DashboardRequest::default()
        };
        let err = AnalyticsEngine::default()
            .dashboard(&records(), &AssessmentManifest::new(), &request)
            .unwrap_err();
        assert_eq!(err, AnalyticsError::InvalidPageSize { page_size: 0 });
    }

    #[test]
    fn observed_range_spans_record_dates() {
        let mut rs = records();
        rs[0].timestamp = Utc.with_ymd_and_hms(2026, 1, 30, 23, 0, 0).unwrap();
        let range = observed_range(&rs).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 1, 30).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2026, 2, 4).unwrap());
    }
}
