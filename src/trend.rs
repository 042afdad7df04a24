use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{AssessmentManifest, EngagementRecord, EngagementType, TrendPoint};
use crate::rollup::{is_done, Tally};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }

    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> AnalyticsResult<NaiveDate> {
        let back = match self {
            Period::Day => 0,
            Period::Week => date.weekday().num_days_from_monday(),
            Period::Month => date.day0(),
        };
        date.checked_sub_days(Days::new(u64::from(back)))
            .ok_or_else(|| {
                AnalyticsError::invalid_range(format!("no {} bucket before {date}", self.as_str()))
            })
    }

    /// Exclusive end of the bucket starting at `start`.
    pub fn bucket_end(&self, start: NaiveDate) -> AnalyticsResult<NaiveDate> {
        let end = match self {
            Period::Day => start.checked_add_days(Days::new(1)),
            Period::Week => start.checked_add_days(Days::new(7)),
            Period::Month => start.checked_add_months(Months::new(1)),
        };
        end.ok_or_else(|| {
            AnalyticsError::invalid_range(format!("no {} bucket after {start}", self.as_str()))
        })
    }

    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            Period::Day => start.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let week = start.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Period::Month => start.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Period::Day),
            "week" | "weekly" => Ok(Period::Week),
            "month" | "monthly" => Ok(Period::Month),
            other => Err(format!("unknown period '{other}' (expected day, week or month)")),
        }
    }
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AnalyticsResult<Self> {
        if start > end {
            return Err(AnalyticsError::invalid_range(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub period: Period,
    pub points: Vec<TrendPoint>,
    pub skipped_count: usize,
}

/// Buckets records by `period` over `range`, one point per bucket, ascending.
///
/// Every bucket in the range is emitted, empty ones with a value of 0. A
/// record falls in the bucket whose `[start, end)` holds its UTC timestamp,
/// so a record at midnight belongs to the day that begins there. Records
/// outside the range or with unknown engagement types are counted in
/// `skipped_count`. With `engagement_type` set, other types are ignored.
pub fn bucket(
    records: &[EngagementRecord],
    period: Period,
    range: DateRange,
    engagement_type: Option<EngagementType>,
    manifest: &AssessmentManifest,
) -> AnalyticsResult<TrendSeries> {
    let range = DateRange::new(range.start, range.end)?;

    let mut buckets: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
    let mut cursor = period.bucket_start(range.start)?;
    while cursor <= range.end {
        buckets.insert(cursor, Tally::default());
        cursor = period.bucket_end(cursor)?;
    }

    let mut skipped_count = 0usize;
    for record in records {
        let Some(kind) = record.engagement_type() else {
            skipped_count += 1;
            continue;
        };
        if engagement_type.is_some_and(|wanted| wanted != kind) {
            continue;
        }
        let date = record.bucket_date();
        if !range.contains(date) {
            debug!(
                student_id = %record.student_id,
                item_id = %record.item_id,
                timestamp = %record.timestamp,
                "skipping record outside trend range"
            );
            skipped_count += 1;
            continue;
        }
        if let Some(tally) = buckets.get_mut(&period.bucket_start(date)?) {
            tally.add(u64::from(is_done(record, kind, manifest)), 1);
        }
    }

    let points = buckets
        .into_iter()
        .map(|(start, tally)| TrendPoint {
            bucket_label: period.label(start),
            bucket_start: start,
            value: tally.rate(),
            done: tally.done,
            total: tally.total,
        })
        .collect();

    Ok(TrendSeries {
        period,
        points,
        skipped_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, sec).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(timestamp: DateTime<Utc>, item_type: &str, status: RecordStatus) -> EngagementRecord {
        EngagementRecord {
            student_id: "s-1".to_string(),
            student_name: String::new(),
            class_id: "c-1".to_string(),
            class_name: String::new(),
            school_id: "sch-1".to_string(),
            item_id: "web-1".to_string(),
            item_type: item_type.to_string(),
            status,
            score: None,
            max_score: 0.0,
            timestamp,
            answered_item_ids: Vec::new(),
            expected_item_ids: Vec::new(),
        }
    }

    #[test]
    fn midnight_record_goes_to_the_later_day() {
        let midnight = ts(2026, 2, 3, 0, 0, 0);
        let records = vec![at(midnight, "webinar", RecordStatus::Done)];
        let range = DateRange::new(date(2026, 2, 2), date(2026, 2, 3)).unwrap();
        let series =
            bucket(&records, Period::Day, range, None, &AssessmentManifest::new()).unwrap();

        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].bucket_label, "2026-02-02");
        assert_eq!(series.points[0].total, 0);
        assert_eq!(series.points[1].bucket_label, "2026-02-03");
        assert_eq!(series.points[1].total, 1);
        assert_eq!(series.points[1].value, 100.0);
    }

    #[test]
    fn empty_buckets_are_filled_with_zero() {
        let records = vec![
            at(ts(2026, 2, 1, 9, 0, 0), "activity", RecordStatus::Done),
            at(ts(2026, 2, 5, 9, 0, 0), "activity", RecordStatus::Pending),
        ];
        let range = DateRange::new(date(2026, 2, 1), date(2026, 2, 5)).unwrap();
        let series =
            bucket(&records, Period::Day, range, None, &AssessmentManifest::new()).unwrap();
        let values: Vec<f64> = series.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![100.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(series
            .points
            .windows(2)
            .all(|w| w[0].bucket_start < w[1].bucket_start));
    }

    #[test]
    fn weeks_start_on_monday_with_iso_labels() {
        // 2026-02-04 is a Wednesday.
        assert_eq!(Period::Week.bucket_start(date(2026, 2, 4)).unwrap(), date(2026, 2, 2));
        assert_eq!(Period::Week.label(date(2026, 2, 2)), "2026-W06");
        assert_eq!(Period::Week.label(date(2025, 12, 29)), "2026-W01");
    }

    #[test]
    fn month_buckets_cover_the_range() {
        let records = vec![
            at(ts(2026, 1, 31, 23, 59, 59), "activity", RecordStatus::Done),
            at(ts(2026, 2, 1, 0, 0, 0), "activity", RecordStatus::Missed),
            at(ts(2026, 3, 10, 0, 0, 0), "activity", RecordStatus::Done),
        ];
        let range = DateRange::new(date(2026, 1, 15), date(2026, 3, 15)).unwrap();
        let series =
            bucket(&records, Period::Month, range, None, &AssessmentManifest::new()).unwrap();
        let labels: Vec<&str> = series.points.iter().map(|p| p.bucket_label.as_str()).collect();
        assert_eq!(labels, vec!["2026-01", "2026-02", "2026-03"]);
        let totals: Vec<u64> = series.points.iter().map(|p| p.total).collect();
        assert_eq!(totals, vec![1, 1, 1]);
        assert_eq!(series.points[1].value, 0.0);
        assert_eq!(Period::Month.bucket_end(date(2026, 12, 1)).unwrap(), date(2027, 1, 1));
    }

    #[test]
    fn out_of_range_and_unknown_records_are_counted() {
        let records = vec![
            at(ts(2026, 1, 20, 9, 0, 0), "activity", RecordStatus::Done),
            at(ts(2026, 2, 2, 9, 0, 0), "survey", RecordStatus::Done),
            at(ts(2026, 2, 2, 9, 0, 0), "activity", RecordStatus::Done),
        ];
        let range = DateRange::new(date(2026, 2, 1), date(2026, 2, 7)).unwrap();
        let series =
            bucket(&records, Period::Week, range, None, &AssessmentManifest::new()).unwrap();
        assert_eq!(series.skipped_count, 2);
        let total: u64 = series.points.iter().map(|p| p.total).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn engagement_filter_ignores_other_types() {
        let ts = ts(2026, 2, 2, 9, 0, 0);
        let records = vec![
            at(ts, "webinar", RecordStatus::Done),
            at(ts, "activity", RecordStatus::Missed),
        ];
        let range = DateRange::new(date(2026, 2, 2), date(2026, 2, 2)).unwrap();
        let series = bucket(
            &records,
            Period::Day,
            range,
            Some(EngagementType::Webinar),
            &AssessmentManifest::new(),
        )
        .unwrap();
        assert_eq!(series.skipped_count, 0);
        assert_eq!(series.points[0].value, 100.0);

        let all = bucket(&records, Period::Day, range, None, &AssessmentManifest::new()).unwrap();
        assert_eq!(all.points[0].value, 50.0);
    }

    #[test]
    fn bucket_start_at_calendar_floor_is_an_error() {
        // The week holding the earliest date starts before it unless that date is a Monday.
        let floor = NaiveDate::MIN;
        for offset in 0..7u64 {
            let day = floor.checked_add_days(Days::new(offset)).unwrap();
            let back = u64::from(day.weekday().num_days_from_monday());
            match Period::Week.bucket_start(day) {
                Ok(start) => assert!(back <= offset && start.weekday() == chrono::Weekday::Mon),
                Err(err) => {
                    assert!(back > offset);
                    assert!(matches!(err, AnalyticsError::InvalidRange { .. }));
                }
            }
        }
        assert_eq!(Period::Day.bucket_start(floor), Ok(floor));
        assert!(Period::Month.bucket_end(NaiveDate::MAX).is_err());
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(DateRange::new(date(2026, 3, 1), date(2026, 2, 1)).is_err());
        let reversed = DateRange {
            start: date(2026, 3, 1),
            end: date(2026, 2, 1),
        };
        assert!(bucket(&[], Period::Day, reversed, None, &AssessmentManifest::new()).is_err());
    }

    #[test]
    fn period_parses_from_cli_labels() {
        assert_eq!("weekly".parse::<Period>(), Ok(Period::Week));
        assert_eq!("Month".parse::<Period>(), Ok(Period::Month));
        assert!("hour".parse::<Period>().is_err());
    }
}
