use std::collections::HashSet;

use serde::Serialize;

use crate::models::{AssessmentManifest, EngagementRecord, EngagementType, StudentCompletion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Incomplete,
    NotStarted,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::NotStarted => "not_started",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionState {
    pub status: CompletionStatus,
    pub answered_count: usize,
    pub expected_count: usize,
    pub missing_question_ids: Vec<String>,
    pub extra_question_ids: Vec<String>,
}

/// Keeps the first occurrence of each id.
fn dedup_ordered<S: AsRef<str>>(ids: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(AsRef::as_ref)
        .filter(|id| seen.insert(*id))
        .collect()
}

pub fn classify<E, A>(expected: &[E], answered: &[A]) -> CompletionState
where
    E: AsRef<str>,
    A: AsRef<str>,
{
    let expected = dedup_ordered(expected);
    let answered = dedup_ordered(answered);
    let expected_set: HashSet<&str> = expected.iter().copied().collect();
    let answered_set: HashSet<&str> = answered.iter().copied().collect();

    let missing_question_ids: Vec<String> = expected
        .iter()
        .filter(|id| !answered_set.contains(*id))
        .map(|id| id.to_string())
        .collect();
    let extra_question_ids: Vec<String> = answered
        .iter()
        .filter(|id| !expected_set.contains(*id))
        .map(|id| id.to_string())
        .collect();

    let status = if answered.is_empty() {
        CompletionStatus::NotStarted
    } else if missing_question_ids.is_empty() {
        CompletionStatus::Completed
    } else {
        CompletionStatus::Incomplete
    };

    CompletionState {
        status,
        answered_count: answered.len(),
        expected_count: expected.len(),
        missing_question_ids,
        extra_question_ids,
    }
}

/// Classifies a single assessment record, or `None` when neither the record
/// nor the manifest knows which questions were expected.
pub fn classify_record(
    record: &EngagementRecord,
    manifest: &AssessmentManifest,
) -> Option<CompletionState> {
    manifest
        .resolve_expected(record)
        .map(|expected| classify(expected, record.answered_item_ids.as_slice()))
}

/// One completion state per assessment record with a known expectation,
/// sorted by class, student, then item.
pub fn completion_states(
    records: &[EngagementRecord],
    manifest: &AssessmentManifest,
) -> Vec<StudentCompletion> {
    let mut states: Vec<StudentCompletion> = records
        .iter()
        .filter(|r| r.engagement_type() == Some(EngagementType::Assessment))
        .filter_map(|r| {
            classify_record(r, manifest).map(|state| StudentCompletion {
                student_id: r.student_id.clone(),
                class_id: r.class_id.clone(),
                item_id: r.item_id.clone(),
                state,
            })
        })
        .collect();

    states.sort_by(|a, b| {
        a.class_id
            .cmp(&b.class_id)
            .then_with(|| a.student_id.cmp(&b.student_id))
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    states
}
