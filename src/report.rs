use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use engagement_analytics::completion::CompletionStatus;
use engagement_analytics::{Dashboard, EngagementType, RollupSummary, StatisticsSummary};

fn rollup_line(output: &mut String, label: &str, summaries: &[&RollupSummary]) {
    let mut parts = Vec::new();
    for engagement_type in EngagementType::ALL {
        if let Some(s) = summaries
            .iter()
            .find(|s| s.engagement_type == engagement_type)
        {
            parts.push(format!(
                "{} {}/{} ({:.1}%)",
                engagement_type, s.done, s.total, s.rate
            ));
        }
    }
    let _ = writeln!(output, "- {}: {}", label, parts.join(", "));
}

fn grouped(summaries: &[RollupSummary]) -> BTreeMap<&str, Vec<&RollupSummary>> {
    let mut groups: BTreeMap<&str, Vec<&RollupSummary>> = BTreeMap::new();
    for summary in summaries {
        groups
            .entry(summary.scope.id.as_str())
            .or_default()
            .push(summary);
    }
    groups
}

pub fn statistics_line(stats: &StatisticsSummary) -> String {
    let percentiles = stats
        .percentiles
        .iter()
        .map(|p| format!("{} {:.1}", p.label, p.value))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "n={} mean {:.1}, median {:.1}, sd {:.1}, range {:.1}-{:.1}; {}",
        stats.count, stats.mean, stats.median, stats.std_dev, stats.min, stats.max, percentiles
    )
}

pub fn build_report(
    scope_label: Option<&str>,
    since_days: i64,
    cutoff: NaiveDate,
    dashboard: &Dashboard,
) -> String {
    let mut output = String::new();
    let scope_label = scope_label.unwrap_or("all schools");

    let _ = writeln!(output, "# Engagement & Assessment Report");
    let _ = writeln!(
        output,
        "Generated for {} (last {} days, records since {})",
        scope_label, since_days, cutoff
    );
    if dashboard.rollups.skipped_count > 0 {
        let _ = writeln!(
            output,
            "{} records with an unknown engagement type were skipped.",
            dashboard.rollups.skipped_count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## School Engagement");
    if dashboard.rollups.schools.is_empty() {
        let _ = writeln!(output, "No engagement recorded for this window.");
    } else {
        for (school_id, summaries) in grouped(&dashboard.rollups.schools) {
            rollup_line(&mut output, school_id, &summaries);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Engagement");
    if dashboard.rollups.classes.is_empty() {
        let _ = writeln!(output, "No classes with engagement in this window.");
    } else {
        for (class_id, summaries) in grouped(&dashboard.rollups.classes) {
            rollup_line(&mut output, class_id, &summaries);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Assessment Scores");
    let _ = writeln!(
        output,
        "- overall: {}",
        statistics_line(&dashboard.school_statistics)
    );
    for class in dashboard
        .class_statistics
        .iter()
        .filter(|c| c.summary.count > 0)
    {
        let _ = writeln!(
            output,
            "- {}: {}",
            class.class_id,
            statistics_line(&class.summary)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Assessment Completion");
    if dashboard.completion.is_empty() {
        let _ = writeln!(output, "No assessments with a known question set.");
    } else {
        for status in [
            CompletionStatus::Completed,
            CompletionStatus::Incomplete,
            CompletionStatus::NotStarted,
        ] {
            let count = dashboard
                .completion
                .iter()
                .filter(|c| c.state.status == status)
                .count();
            let _ = writeln!(output, "- {}: {}", status.as_str(), count);
        }
        for entry in dashboard
            .completion
            .iter()
            .filter(|c| c.state.status == CompletionStatus::Incomplete)
            .take(10)
        {
            let _ = writeln!(
                output,
                "  - {} on {} missing {}",
                entry.student_id,
                entry.item_id,
                entry.state.missing_question_ids.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Leaderboard");
    if dashboard.student_leaderboard.page_entries.is_empty() {
        let _ = writeln!(output, "No students with engagement in this window.");
    } else {
        for entry in dashboard.student_leaderboard.page_entries.iter().take(10) {
            let _ = writeln!(
                output,
                "{}. {} ({}) {:.1}% [{} risk]",
                entry.rank, entry.display_name, entry.group_label, entry.score, entry.risk_tier
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement Trend");
    match &dashboard.trend {
        Some(trend) if !trend.points.is_empty() => {
            for point in &trend.points {
                let _ = writeln!(
                    output,
                    "- {}: {:.1}% ({}/{})",
                    point.bucket_label, point.value, point.done, point.total
                );
            }
        }
        _ => {
            let _ = writeln!(output, "No trend data for this window.");
        }
    }

    output
}
