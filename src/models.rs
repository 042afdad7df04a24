use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::completion::CompletionState;
use crate::risk::RiskTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementType {
    Assessment,
    Activity,
    Webinar,
}

impl EngagementType {
    pub const ALL: [EngagementType; 3] = [
        EngagementType::Assessment,
        EngagementType::Activity,
        EngagementType::Webinar,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "assessment" | "assessments" => Some(Self::Assessment),
            "activity" | "activities" => Some(Self::Activity),
            "webinar" | "webinars" => Some(Self::Webinar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assessment => "assessment",
            Self::Activity => "activity",
            Self::Webinar => "webinar",
        }
    }
}

impl FromStr for EngagementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("unknown engagement type '{s}' (expected assessment, activity or webinar)")
        })
    }
}

impl fmt::Display for EngagementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[serde(alias = "completed", alias = "submitted", alias = "attended")]
    Done,
    #[serde(alias = "in_progress", alias = "assigned")]
    Pending,
    #[serde(alias = "absent", alias = "overdue")]
    Missed,
}

impl RecordStatus {
    /// Accepts the generic labels plus the per-type labels used by the
    /// assessment, activity and webinar feeds.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "done" | "completed" | "submitted" | "attended" => Some(Self::Done),
            "pending" | "in_progress" | "assigned" => Some(Self::Pending),
            "missed" | "absent" | "overdue" => Some(Self::Missed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Pending => "pending",
            Self::Missed => "missed",
        }
    }
}

/// One student's interaction with one assigned item.
///
/// `item_type` is kept as delivered by the records service; it is resolved
/// through [`EngagementRecord::engagement_type`] and unknown values are
/// skipped by the aggregators instead of failing the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    pub class_id: String,
    #[serde(default)]
    pub class_name: String,
    pub school_id: String,
    pub item_id: String,
    pub item_type: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub answered_item_ids: Vec<String>,
    #[serde(default)]
    pub expected_item_ids: Vec<String>,
}

impl EngagementRecord {
    pub fn engagement_type(&self) -> Option<EngagementType> {
        EngagementType::parse(&self.item_type)
    }

    pub fn scope_id(&self, level: ScopeLevel) -> &str {
        match level {
            ScopeLevel::Student => &self.student_id,
            ScopeLevel::Class => &self.class_id,
            ScopeLevel::School => &self.school_id,
        }
    }

    pub fn bucket_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Expected question ids per assessment template, keyed by item id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentManifest {
    templates: HashMap<String, Vec<String>>,
}

impl AssessmentManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item_id: impl Into<String>, question_ids: Vec<String>) {
        self.templates.insert(item_id.into(), question_ids);
    }

    pub fn expected_for(&self, item_id: &str) -> Option<&[String]> {
        self.templates.get(item_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Record-level expectations win over the manifest; an empty list on
    /// both sides means the expectation is unknown.
    pub fn resolve_expected<'a>(&'a self, record: &'a EngagementRecord) -> Option<&'a [String]> {
        if !record.expected_item_ids.is_empty() {
            return Some(&record.expected_item_ids);
        }
        self.expected_for(&record.item_id)
            .filter(|expected| !expected.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Student,
    Class,
    School,
}

impl ScopeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Class => "class",
            Self::School => "school",
        }
    }
}

impl FromStr for ScopeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" | "students" => Ok(Self::Student),
            "class" | "classes" => Ok(Self::Class),
            "school" | "schools" => Ok(Self::School),
            other => Err(format!(
                "unknown scope level '{other}' (expected student, class or school)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub level: ScopeLevel,
    pub id: String,
}

impl ScopeKey {
    pub fn new(level: ScopeLevel, id: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
        }
    }

    pub fn student(id: impl Into<String>) -> Self {
        Self::new(ScopeLevel::Student, id)
    }

    pub fn class(id: impl Into<String>) -> Self {
        Self::new(ScopeLevel::Class, id)
    }

    pub fn school(id: impl Into<String>) -> Self {
        Self::new(ScopeLevel::School, id)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level.as_str(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupSummary {
    pub scope: ScopeKey,
    pub engagement_type: EngagementType,
    pub done: u64,
    pub total: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Percentile {
    pub label: String,
    pub percentile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<Percentile>,
}

impl StatisticsSummary {
    pub fn percentile(&self, label: &str) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentCompletion {
    pub student_id: String,
    pub class_id: String,
    pub item_id: String,
    pub state: CompletionState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardCandidate {
    pub entity_id: String,
    pub display_name: String,
    pub group_label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub entity_id: String,
    pub display_name: String,
    pub group_label: String,
    pub score: f64,
    pub rank: usize,
    pub risk_tier: RiskTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardPage {
    pub page_entries: Vec<LeaderboardEntry>,
    pub total_entries: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub bucket_label: String,
    pub bucket_start: NaiveDate,
    pub value: f64,
    pub done: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(item_id: &str, expected: Vec<&str>) -> EngagementRecord {
        EngagementRecord {
            student_id: "s-1".to_string(),
            student_name: "Avery Lee".to_string(),
            class_id: "c-1".to_string(),
            class_name: "7A".to_string(),
            school_id: "sch-1".to_string(),
            item_id: item_id.to_string(),
            item_type: "assessment".to_string(),
            status: RecordStatus::Pending,
            score: None,
            max_score: 10.0,
            timestamp: Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap(),
            answered_item_ids: Vec::new(),
            expected_item_ids: expected.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn engagement_type_parses_known_labels_only() {
        assert_eq!(
            EngagementType::parse(" Assessment "),
            Some(EngagementType::Assessment)
        );
        assert_eq!(
            EngagementType::parse("webinars"),
            Some(EngagementType::Webinar)
        );
        assert_eq!(EngagementType::parse("survey"), None);
    }

    #[test]
    fn status_accepts_type_specific_labels() {
        assert_eq!(RecordStatus::parse("attended"), Some(RecordStatus::Done));
        assert_eq!(RecordStatus::parse("submitted"), Some(RecordStatus::Done));
        assert_eq!(RecordStatus::parse("absent"), Some(RecordStatus::Missed));
        assert_eq!(RecordStatus::parse("assigned"), Some(RecordStatus::Pending));
        assert_eq!(RecordStatus::parse("unknown"), None);

        let parsed: RecordStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, RecordStatus::Done);
    }

    #[test]
    fn manifest_is_fallback_for_record_expectations() {
        let mut manifest = AssessmentManifest::new();
        assert!(manifest.is_empty());
        manifest.insert("quiz-1", vec!["q1".to_string(), "q2".to_string()]);
        assert_eq!(manifest.len(), 1);

        let own = record("quiz-1", vec!["q9"]);
        assert_eq!(manifest.resolve_expected(&own), Some(&["q9".to_string()][..]));

        let bare = record("quiz-1", vec![]);
        assert_eq!(manifest.resolve_expected(&bare).map(<[String]>::len), Some(2));

        let unknown = record("quiz-2", vec![]);
        assert_eq!(manifest.resolve_expected(&unknown), None);
    }

    #[test]
    fn scope_id_follows_level() {
        let r = record("quiz-1", vec![]);
        assert_eq!(r.scope_id(ScopeLevel::Student), "s-1");
        assert_eq!(r.scope_id(ScopeLevel::Class), "c-1");
        assert_eq!(r.scope_id(ScopeLevel::School), "sch-1");
        assert_eq!(ScopeKey::class("c-1").to_string(), "class:c-1");
        assert_eq!("Classes".parse::<ScopeLevel>(), Ok(ScopeLevel::Class));
        assert!("district".parse::<ScopeLevel>().is_err());
    }
}
