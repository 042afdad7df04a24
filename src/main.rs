use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use engagement_analytics::leaderboard::{candidates_from_rollups, rank_with, EntityLabels};
use engagement_analytics::rollup::{aggregate_batch, hierarchy};
use engagement_analytics::trend::bucket;
use engagement_analytics::{
    AnalyticsEngine, AssessmentManifest, DashboardRequest, DateRange, EngagementRecord,
    EngagementType, EngineConfig, Period, ScopeLevel,
};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod db;
mod report;

#[derive(Parser)]
#[command(name = "engagement-analytics")]
#[command(
    about = "Engagement and assessment analytics for school wellbeing dashboards",
    long_about = None
)]
struct Cli {
    /// JSON file with risk thresholds, percentiles and paging defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = false, multiple = false)]
struct Scope {
    #[arg(long)]
    school: Option<String>,
    #[arg(long)]
    class: Option<String>,
}

impl Scope {
    fn label(&self) -> Option<&str> {
        self.school.as_deref().or(self.class.as_deref())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import engagement records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import assessment question manifests from a JSON file
    ImportManifest {
        #[arg(long)]
        file: PathBuf,
    },
    /// Done/total/rate per engagement type at one scope level
    Rollup {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "class")]
        level: ScopeLevel,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
    },
    /// Rank students or classes by engagement rate
    Leaderboard {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "student")]
        level: ScopeLevel,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, allow_negative_numbers = true)]
        page_size: Option<i64>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
    },
    /// Engagement rate per day, week or month
    Trend {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        period: Option<Period>,
        #[arg(long)]
        engagement: Option<EngagementType>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
    },
    /// Assessment score distribution
    Stats {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn cutoff(since_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(since_days.max(1))
}

fn window(since_days: i64) -> anyhow::Result<DateRange> {
    let range = DateRange::new(cutoff(since_days).date_naive(), Utc::now().date_naive())?;
    Ok(range)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn load(
    pool: &sqlx::PgPool,
    scope: &Scope,
    since_days: i64,
) -> anyhow::Result<(Vec<EngagementRecord>, AssessmentManifest)> {
    let records = db::fetch_records(
        pool,
        cutoff(since_days),
        scope.school.as_deref(),
        scope.class.as_deref(),
    )
    .await?;
    let manifest = db::fetch_manifest(pool).await?;
    Ok((records, manifest))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = AnalyticsEngine::new(config);

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the engagement records Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} records from {}.", csv.display());
        }
        Commands::ImportManifest { file } => {
            let templates = db::import_manifest(&pool, &file).await?;
            println!("Stored {templates} assessment manifests from {}.", file.display());
        }
        Commands::Rollup {
            scope,
            level,
            since_days,
        } => {
            let (records, manifest) = load(&pool, &scope, since_days).await?;
            let report = aggregate_batch(&records, level, &manifest);

            if cli.json {
                return print_json(&report);
            }
            if report.summaries.is_empty() {
                println!("No engagement found for this window.");
                return Ok(());
            }
            println!("Engagement by {}:", level.as_str());
            for summary in &report.summaries {
                println!(
                    "- {} {}: {}/{} ({:.1}%)",
                    summary.scope.id,
                    summary.engagement_type,
                    summary.done,
                    summary.total,
                    summary.rate
                );
            }
            if report.skipped_count > 0 {
                println!(
                    "Skipped {} records with unknown engagement types.",
                    report.skipped_count
                );
            }
        }
        Commands::Leaderboard {
            scope,
            level,
            page,
            page_size,
            since_days,
        } => {
            let (records, manifest) = load(&pool, &scope, since_days).await?;
            let tree = hierarchy(&records, &manifest);
            let summaries = match level {
                ScopeLevel::Student => &tree.students,
                ScopeLevel::Class => &tree.classes,
                ScopeLevel::School => &tree.schools,
            };
            let labels = EntityLabels::from_records(&records);
            let board = rank_with(
                &candidates_from_rollups(summaries, level, &labels),
                page,
                page_size.unwrap_or(engine.config().leaderboard_page_size),
                &engine.config().risk,
            )?;

            if cli.json {
                return print_json(&board);
            }
            if board.page_entries.is_empty() {
                println!(
                    "No entries on page {page} ({} entries across {} pages).",
                    board.total_entries, board.total_pages
                );
                return Ok(());
            }
            println!(
                "Page {page} of {} ({} {}s):",
                board.total_pages,
                board.total_entries,
                level.as_str()
            );
            for entry in &board.page_entries {
                println!(
                    "{}. {} ({}) {:.1}% [{} risk]",
                    entry.rank, entry.display_name, entry.group_label, entry.score, entry.risk_tier
                );
            }
        }
        Commands::Trend {
            scope,
            period,
            engagement,
            since_days,
        } => {
            let (records, manifest) = load(&pool, &scope, since_days).await?;
            let period = period.unwrap_or(engine.config().trend_period);
            let series = bucket(&records, period, window(since_days)?, engagement, &manifest)?;

            if cli.json {
                return print_json(&series);
            }
            println!("Engagement per {}:", period);
            for point in &series.points {
                println!(
                    "- {}: {:.1}% ({}/{})",
                    point.bucket_label, point.value, point.done, point.total
                );
            }
            if series.skipped_count > 0 {
                println!("Skipped {} records.", series.skipped_count);
            }
        }
        Commands::Stats { scope, since_days } => {
            let (records, _) = load(&pool, &scope, since_days).await?;
            let overall = engine.statistics(&records)?;
            let per_class = engine.class_statistics(&records)?;

            if cli.json {
                return print_json(&serde_json::json!({
                    "overall": overall,
                    "classes": per_class,
                }));
            }
            println!("Assessment scores: {}", report::statistics_line(&overall));
            for class in per_class.iter().filter(|c| c.summary.count > 0) {
                println!(
                    "- {}: {}",
                    class.class_id,
                    report::statistics_line(&class.summary)
                );
            }
        }
        Commands::Report {
            scope,
            since_days,
            out,
        } => {
            let (records, manifest) = load(&pool, &scope, since_days).await?;
            let request = DashboardRequest {
                trend_range: Some(window(since_days)?),
                student_page: 1,
                class_page: 1,
                ..DashboardRequest::default()
            };
            let dashboard = engine.dashboard(&records, &manifest, &request)?;
            let report = report::build_report(
                scope.label(),
                since_days,
                cutoff(since_days).date_naive(),
                &dashboard,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
