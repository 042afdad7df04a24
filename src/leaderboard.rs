use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{
    EngagementRecord, LeaderboardCandidate, LeaderboardEntry, LeaderboardPage, RollupSummary,
    ScopeKey, ScopeLevel,
};
use crate::risk::{self, RiskThresholds};
use crate::rollup::Tally;

fn sanitize(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Score descending, then display name, then entity id, so the order is total.
fn leaderboard_order(a: &LeaderboardCandidate, b: &LeaderboardCandidate) -> Ordering {
    sanitize(b.score)
        .partial_cmp(&sanitize(a.score))
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

pub fn rank(
    candidates: &[LeaderboardCandidate],
    page: i64,
    page_size: i64,
) -> AnalyticsResult<LeaderboardPage> {
    rank_with(candidates, page, page_size, &RiskThresholds::default())
}

/// Competition ranking ("1224"): tied scores share a rank and the next
/// distinct score skips ahead by the size of the tie group.
///
/// Pages are 1-based. Pages outside `1..=total_pages` come back empty with
/// the totals still filled in.
pub fn rank_with(
    candidates: &[LeaderboardCandidate],
    page: i64,
    page_size: i64,
    thresholds: &RiskThresholds,
) -> AnalyticsResult<LeaderboardPage> {
    if page_size <= 0 {
        return Err(AnalyticsError::InvalidPageSize { page_size });
    }
    let page_size = page_size as usize;

    let mut ordered: Vec<&LeaderboardCandidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| leaderboard_order(a, b));

    let total_entries = ordered.len();
    let total_pages = total_entries.div_ceil(page_size);

    let mut ranked = Vec::with_capacity(total_entries);
    let mut previous: Option<(f64, usize)> = None;
    for (position, candidate) in ordered.into_iter().enumerate() {
        let score = sanitize(candidate.score);
        let rank = match previous {
            Some((prev_score, prev_rank)) if prev_score == score => prev_rank,
            _ => position + 1,
        };
        previous = Some((score, rank));
        ranked.push(LeaderboardEntry {
            entity_id: candidate.entity_id.clone(),
            display_name: candidate.display_name.clone(),
            group_label: candidate.group_label.clone(),
            score,
            rank,
            risk_tier: risk::classify_with(score, thresholds),
        });
    }

    let page_entries = if page < 1 || page as usize > total_pages {
        Vec::new()
    } else {
        let start = (page as usize - 1) * page_size;
        let end = (start + page_size).min(total_entries);
        ranked.drain(start..end).collect()
    };

    Ok(LeaderboardPage {
        page_entries,
        total_entries,
        total_pages,
    })
}

/// Display names and group labels for students and classes, taken from the
/// first record that mentions each entity.
#[derive(Debug, Clone, Default)]
pub struct EntityLabels {
    labels: HashMap<ScopeKey, (String, String)>,
}

impl EntityLabels {
    pub fn from_records(records: &[EngagementRecord]) -> Self {
        let mut labels = HashMap::new();
        for record in records {
            let class_label = if record.class_name.is_empty() {
                record.class_id.clone()
            } else {
                record.class_name.clone()
            };
            let student_name = if record.student_name.is_empty() {
                record.student_id.clone()
            } else {
                record.student_name.clone()
            };
            labels
                .entry(ScopeKey::student(record.student_id.as_str()))
                .or_insert_with(|| (student_name, class_label.clone()));
            labels
                .entry(ScopeKey::class(record.class_id.as_str()))
                .or_insert_with(|| (class_label, record.school_id.clone()));
            labels
                .entry(ScopeKey::school(record.school_id.as_str()))
                .or_insert_with(|| (record.school_id.clone(), String::new()));
        }
        Self { labels }
    }

    pub fn display_name(&self, scope: &ScopeKey) -> String {
        self.labels
            .get(scope)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| scope.id.clone())
    }

    pub fn group_label(&self, scope: &ScopeKey) -> String {
        self.labels
            .get(scope)
            .map(|(_, group)| group.clone())
            .unwrap_or_default()
    }
}

/// One candidate per entity at `level`, scored by the rate of its summed
/// counts across every engagement type.
pub fn candidates_from_rollups(
    summaries: &[RollupSummary],
    level: ScopeLevel,
    labels: &EntityLabels,
) -> Vec<LeaderboardCandidate> {
    let mut totals: BTreeMap<&ScopeKey, Tally> = BTreeMap::new();
    for summary in summaries.iter().filter(|s| s.scope.level == level) {
        totals
            .entry(&summary.scope)
            .or_default()
            .add(summary.done, summary.total);
    }
    totals
        .into_iter()
        .map(|(scope, tally)| LeaderboardCandidate {
            entity_id: scope.id.clone(),
            display_name: labels.display_name(scope),
            group_label: labels.group_label(scope),
            score: tally.rate(),
        })
        .collect()
}
