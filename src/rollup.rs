use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::completion::{self, CompletionStatus};
use crate::models::{
    AssessmentManifest, EngagementRecord, EngagementType, RecordStatus, RollupSummary, ScopeKey,
    ScopeLevel,
};
use crate::stats::round_off_1_decimal;

/// `done / total` as a percentage rounded to one decimal, 0 when nothing was assigned.
pub fn rate(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_off_1_decimal(100.0 * done as f64 / total as f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub done: u64,
    pub total: u64,
}

impl Tally {
    fn record(&mut self, done: bool) {
        self.total += 1;
        if done {
            self.done += 1;
        }
    }

    pub fn add(&mut self, done: u64, total: u64) {
        self.done += done;
        self.total += total;
    }

    pub fn rate(&self) -> f64 {
        rate(self.done, self.total)
    }

    fn into_summary(self, scope: ScopeKey, engagement_type: EngagementType) -> RollupSummary {
        RollupSummary {
            scope,
            engagement_type,
            done: self.done,
            total: self.total,
            rate: self.rate(),
        }
    }
}

/// Assessments with a known question set count as done only when the
/// completion classifier says so; everything else trusts the record status.
pub fn is_done(
    record: &EngagementRecord,
    engagement_type: EngagementType,
    manifest: &AssessmentManifest,
) -> bool {
    if engagement_type == EngagementType::Assessment {
        if let Some(state) = completion::classify_record(record, manifest) {
            return state.status == CompletionStatus::Completed;
        }
    }
    record.status == RecordStatus::Done
}

fn tally<'a, I, K, F>(
    records: I,
    manifest: &AssessmentManifest,
    mut key_of: F,
) -> (BTreeMap<K, Tally>, usize)
where
    I: IntoIterator<Item = &'a EngagementRecord>,
    K: Ord,
    F: FnMut(&'a EngagementRecord, EngagementType) -> K,
{
    let mut groups: BTreeMap<K, Tally> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in records {
        let Some(engagement_type) = record.engagement_type() else {
            debug!(
                student_id = %record.student_id,
                item_id = %record.item_id,
                item_type = %record.item_type,
                "skipping record with unknown engagement type"
            );
            skipped += 1;
            continue;
        };
        let done = is_done(record, engagement_type, manifest);
        groups
            .entry(key_of(record, engagement_type))
            .or_default()
            .record(done);
    }

    (groups, skipped)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupReport {
    pub summaries: Vec<RollupSummary>,
    pub skipped_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupHierarchy {
    pub students: Vec<RollupSummary>,
    pub classes: Vec<RollupSummary>,
    pub schools: Vec<RollupSummary>,
    pub skipped_count: usize,
}

/// Done/total for one scope entity and one engagement type.
pub fn aggregate(
    records: &[EngagementRecord],
    scope: &ScopeKey,
    engagement_type: EngagementType,
    manifest: &AssessmentManifest,
) -> RollupSummary {
    let mut totals = Tally::default();
    for record in records {
        if record.scope_id(scope.level) != scope.id
            || record.engagement_type() != Some(engagement_type)
        {
            continue;
        }
        totals.record(is_done(record, engagement_type, manifest));
    }
    totals.into_summary(scope.clone(), engagement_type)
}

/// One summary per `(scope_id, engagement_type)` present at `level`, sorted by that key.
pub fn aggregate_batch(
    records: &[EngagementRecord],
    level: ScopeLevel,
    manifest: &AssessmentManifest,
) -> RollupReport {
    let (groups, skipped_count) = tally(records, manifest, |record, engagement_type| {
        (record.scope_id(level), engagement_type)
    });

    RollupReport {
        summaries: groups
            .into_iter()
            .map(|((id, engagement_type), t)| {
                t.into_summary(ScopeKey::new(level, id), engagement_type)
            })
            .collect(),
        skipped_count,
    }
}

/// Folds child summaries into the parent each one is paired with by summing
/// counts. Parent rates are recomputed from the sums, never averaged.
pub fn roll_up<'a, I>(children: I) -> Vec<RollupSummary>
where
    I: IntoIterator<Item = (ScopeKey, &'a RollupSummary)>,
{
    let mut groups: BTreeMap<(ScopeKey, EngagementType), Tally> = BTreeMap::new();
    for (parent, child) in children {
        groups
            .entry((parent, child.engagement_type))
            .or_default()
            .add(child.done, child.total);
    }
    groups
        .into_iter()
        .map(|((scope, engagement_type), t)| t.into_summary(scope, engagement_type))
        .collect()
}

/// Student, class and school rollups from one set of records.
///
/// Classes are folded from the students enrolled in them and schools from
/// their classes. A student with records in several classes contributes to
/// each class only the records made in that class.
pub fn hierarchy(records: &[EngagementRecord], manifest: &AssessmentManifest) -> RollupHierarchy {
    let (enrollments, skipped_count) = tally(records, manifest, |record, engagement_type| {
        (
            record.class_id.as_str(),
            record.student_id.as_str(),
            engagement_type,
        )
    });

    let class_students: Vec<(&str, RollupSummary)> = enrollments
        .into_iter()
        .map(|((class_id, student_id, engagement_type), t)| {
            (
                class_id,
                t.into_summary(ScopeKey::student(student_id), engagement_type),
            )
        })
        .collect();

    let students = roll_up(
        class_students
            .iter()
            .map(|(_, summary)| (summary.scope.clone(), summary)),
    );
    let classes = roll_up(
        class_students
            .iter()
            .map(|(class_id, summary)| (ScopeKey::class(*class_id), summary)),
    );

    let mut class_school: BTreeMap<&str, &str> = BTreeMap::new();
    for record in records {
        class_school
            .entry(record.class_id.as_str())
            .or_insert(record.school_id.as_str());
    }
    let schools = roll_up(classes.iter().filter_map(|summary| {
        class_school
            .get(summary.scope.id.as_str())
            .map(|school_id| (ScopeKey::school(*school_id), summary))
    }));

    debug!(
        students = students.len(),
        classes = classes.len(),
        schools = schools.len(),
        skipped = skipped_count,
        "built rollup hierarchy"
    );

    RollupHierarchy {
        students,
        classes,
        schools,
        skipped_count,
    }
}
