use anyhow::{bail, Context};
use chrono::{DateTime, TimeZone, Utc};
use engagement_analytics::{AssessmentManifest, EngagementRecord, RecordStatus};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(pool: &PgPool, id: &str, full_name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO engagement_analytics.students (id, full_name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(id)
    .bind(full_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Inserts one record; returns false when its source key already exists.
async fn insert_record(
    pool: &PgPool,
    record: &EngagementRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO engagement_analytics.engagement_records
        (id, student_id, class_id, class_name, school_id, item_id, item_type, status,
         score, max_score, occurred_at, answered_item_ids, expected_item_ids, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&record.student_id)
    .bind(&record.class_id)
    .bind(&record.class_name)
    .bind(&record.school_id)
    .bind(&record.item_id)
    .bind(&record.item_type)
    .bind(record.status.as_str())
    .bind(record.score)
    .bind(record.max_score)
    .bind(record.timestamp)
    .bind(&record.answered_item_ids)
    .bind(&record.expected_item_ids)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_manifest(
    pool: &PgPool,
    item_id: &str,
    question_ids: &[String],
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO engagement_analytics.assessment_manifests (item_id, question_ids)
        VALUES ($1, $2)
        ON CONFLICT (item_id) DO UPDATE SET question_ids = EXCLUDED.question_ids
        "#,
    )
    .bind(item_id)
    .bind(question_ids)
    .execute(pool)
    .await?;
    Ok(())
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn seed_instant(day: u32, hour: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2026, 2, day, hour, 0, 0)
        .single()
        .context("invalid seed timestamp")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("stu-avery", "Avery Lee", "cls-7a", "Year 7 A"),
        ("stu-jules", "Jules Moreno", "cls-7a", "Year 7 A"),
        ("stu-kiara", "Kiara Patel", "cls-7a", "Year 7 A"),
        ("stu-noor", "Noor Haddad", "cls-8b", "Year 8 B"),
    ];

    upsert_manifest(pool, "wellbeing-check-1", &ids(&["q1", "q2", "q3"])).await?;

    let answers: Vec<(&str, Vec<&str>)> = vec![
        ("stu-avery", vec!["q1", "q2", "q3"]),
        ("stu-jules", vec!["q1"]),
        ("stu-kiara", vec![]),
        ("stu-noor", vec!["q1", "q2", "q3"]),
    ];

    for (student_id, full_name, class_id, class_name) in &students {
        upsert_student(pool, student_id, full_name).await?;

        let answered = answers
            .iter()
            .find(|(id, _)| id == student_id)
            .map(|(_, answered)| ids(answered))
            .unwrap_or_default();
        let base = EngagementRecord {
            student_id: student_id.to_string(),
            student_name: full_name.to_string(),
            class_id: class_id.to_string(),
            class_name: class_name.to_string(),
            school_id: "sch-northside".to_string(),
            item_id: "wellbeing-check-1".to_string(),
            item_type: "assessment".to_string(),
            status: if answered.is_empty() {
                RecordStatus::Pending
            } else {
                RecordStatus::Done
            },
            score: (!answered.is_empty()).then(|| answered.len() as f64),
            max_score: 3.0,
            timestamp: seed_instant(2, 9)?,
            answered_item_ids: answered,
            expected_item_ids: Vec::new(),
        };

        let activity = EngagementRecord {
            item_id: "mindfulness-journal".to_string(),
            item_type: "activity".to_string(),
            status: if *student_id == "stu-kiara" {
                RecordStatus::Missed
            } else {
                RecordStatus::Done
            },
            score: None,
            max_score: 0.0,
            timestamp: seed_instant(4, 15)?,
            answered_item_ids: Vec::new(),
            ..base.clone()
        };

        let webinar = EngagementRecord {
            item_id: "resilience-webinar".to_string(),
            item_type: "webinar".to_string(),
            status: if *student_id == "stu-jules" {
                RecordStatus::Missed
            } else {
                RecordStatus::Done
            },
            score: None,
            max_score: 0.0,
            timestamp: seed_instant(10, 18)?,
            answered_item_ids: Vec::new(),
            ..base.clone()
        };

        for record in [base, activity, webinar] {
            let source_key = format!("seed-{}-{}", record.student_id, record.item_id);
            insert_record(pool, &record, &source_key).await?;
        }
    }

    Ok(())
}

/// Records since `since`, optionally limited to one school or one class.
///
/// Rows whose status label is not recognized are dropped with a warning so
/// a single bad row never hides the rest of the dashboard.
pub async fn fetch_records(
    pool: &PgPool,
    since: DateTime<Utc>,
    school: Option<&str>,
    class: Option<&str>,
) -> anyhow::Result<Vec<EngagementRecord>> {
    let mut query = String::from(
        "SELECT r.student_id, st.full_name, r.class_id, r.class_name, r.school_id, \
         r.item_id, r.item_type, r.status, r.score, r.max_score, r.occurred_at, \
         r.answered_item_ids, r.expected_item_ids \
         FROM engagement_analytics.engagement_records r \
         JOIN engagement_analytics.students st ON st.id = r.student_id \
         WHERE r.occurred_at >= $1",
    );

    if school.is_some() {
        query.push_str(" AND r.school_id = $2");
    } else if class.is_some() {
        query.push_str(" AND r.class_id = $2");
    }
    query.push_str(" ORDER BY r.occurred_at, r.student_id, r.item_id");

    let mut rows = sqlx::query(&query).bind(since);

    if let Some(value) = school {
        rows = rows.bind(value);
    } else if let Some(value) = class {
        rows = rows.bind(value);
    }

    let fetched = rows
        .fetch_all(pool)
        .await
        .context("failed to fetch engagement records")?;
    let mut records = Vec::with_capacity(fetched.len());
    let mut dropped = 0usize;

    for row in fetched {
        let raw_status: String = row.try_get("status")?;
        let Some(status) = RecordStatus::parse(&raw_status) else {
            warn!(status = %raw_status, "dropping record with unknown status");
            dropped += 1;
            continue;
        };
        records.push(EngagementRecord {
            student_id: row.try_get("student_id")?,
            student_name: row.try_get("full_name")?,
            class_id: row.try_get("class_id")?,
            class_name: row.try_get("class_name")?,
            school_id: row.try_get("school_id")?,
            item_id: row.try_get("item_id")?,
            item_type: row.try_get("item_type")?,
            status,
            score: row.try_get("score")?,
            max_score: row.try_get("max_score")?,
            timestamp: row.try_get("occurred_at")?,
            answered_item_ids: row.try_get("answered_item_ids")?,
            expected_item_ids: row.try_get("expected_item_ids")?,
        });
    }

    info!(records = records.len(), dropped, "fetched engagement records");
    Ok(records)
}

pub async fn fetch_manifest(pool: &PgPool) -> anyhow::Result<AssessmentManifest> {
    let rows = sqlx::query(
        "SELECT item_id, question_ids FROM engagement_analytics.assessment_manifests",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch assessment manifests")?;

    let mut manifest = AssessmentManifest::new();
    for row in rows {
        let item_id: String = row.try_get("item_id")?;
        let question_ids: Vec<String> = row.try_get("question_ids")?;
        manifest.insert(item_id, question_ids);
    }
    if manifest.is_empty() {
        warn!("no assessment manifests stored; completion falls back to record status");
    } else {
        info!(templates = manifest.len(), "fetched assessment manifests");
    }
    Ok(manifest)
}

fn split_ids(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        student_name: String,
        class_id: String,
        class_name: Option<String>,
        school_id: String,
        item_id: String,
        item_type: String,
        status: String,
        score: Option<f64>,
        max_score: Option<f64>,
        occurred_at: DateTime<Utc>,
        answered_item_ids: Option<String>,
        expected_item_ids: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV row {}", line + 2))?;
        let Some(status) = RecordStatus::parse(&row.status) else {
            bail!("row {}: unknown status '{}'", line + 2, row.status);
        };
        let max_score = row.max_score.unwrap_or(0.0);
        if max_score < 0.0 {
            bail!("row {}: max_score must not be negative", line + 2);
        }

        upsert_student(pool, &row.student_id, &row.student_name).await?;

        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let record = EngagementRecord {
            student_id: row.student_id,
            student_name: row.student_name,
            class_id: row.class_id,
            class_name: row.class_name.unwrap_or_default(),
            school_id: row.school_id,
            item_id: row.item_id,
            item_type: row.item_type,
            status,
            score: row.score,
            max_score,
            timestamp: row.occurred_at,
            answered_item_ids: split_ids(row.answered_item_ids.as_deref()),
            expected_item_ids: split_ids(row.expected_item_ids.as_deref()),
        };

        if insert_record(pool, &record, &source_key).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_manifest(pool: &PgPool, json_path: &std::path::Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(json_path)
        .with_context(|| format!("failed to read {}", json_path.display()))?;
    let templates: std::collections::BTreeMap<String, Vec<String>> =
        serde_json::from_str(&raw).context("manifest must map item ids to question id lists")?;

    for (item_id, question_ids) in &templates {
        upsert_manifest(pool, item_id, question_ids).await?;
    }
    Ok(templates.len())
}
