use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::bucket::{AllTimeEpoch, BucketOptions, Granularity};
use crate::config::Config;
use crate::db::RecordFilter;
use crate::entry::WeeklyEntry;
use crate::latest::{LatestRequest, SlidePacer, Ticket};
use crate::models::{DoctorChanges, DoctorStatsYtd, WeeklyRecord};

mod bucket;
mod calendar;
mod config;
mod db;
mod entry;
mod latest;
mod models;
mod report;
mod stats;
mod theme;

#[derive(Parser)]
#[command(name = "clinic-dashboard")]
#[command(about = "Weekly appointment tracking and dashboards for clinic doctors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo doctors and weekly counts
    Seed,
    /// Import weekly counts from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Manage the doctor roster
    Doctors {
        #[command(subcommand)]
        action: DoctorCommand,
    },
    /// Record (or correct) a doctor's appointment count for one week
    Record {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        count: i64,
        /// Any day in the week; defaults to today
        #[arg(long)]
        week_of: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show every doctor's entry for one week
    Week {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Chart one doctor's appointments at a time granularity
    Chart {
        #[arg(long)]
        doctor: String,
        #[arg(long, value_enum, default_value_t = Granularity::Weekly)]
        granularity: Granularity,
        /// Reference date for the window; defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Fixed start date for the all-time view
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Year-to-date dashboard across all active doctors
    Dashboard {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Re-render on the configured refresh interval
        #[arg(long)]
        watch: bool,
    },
    /// Auto-advancing per-doctor showcase
    Carousel {
        #[arg(long, value_enum, default_value_t = Granularity::Weekly)]
        granularity: Granularity,
        #[arg(long)]
        dwell_secs: Option<u64>,
        /// Stop after this many slides (0 runs forever)
        #[arg(long, default_value_t = 0)]
        slides: usize,
    },
}

#[derive(Subcommand)]
enum DoctorCommand {
    List {
        /// Include inactive doctors
        #[arg(long)]
        all: bool,
    },
    Add {
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
        #[arg(long, default_value = "Dr.")]
        title: String,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        weekly_target: Option<i32>,
    },
    Update {
        doctor: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        first: Option<String>,
        #[arg(long)]
        last: Option<String>,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        weekly_target: Option<i32>,
    },
    /// Year-to-date profile with monthly totals and recent weeks
    Show {
        doctor: String,
        #[arg(long)]
        year: Option<i32>,
        /// Reference date; defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    Activate {
        doctor: String,
    },
    Deactivate {
        doctor: String,
    },
    Remove {
        doctor: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect(&cfg.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool, today).await?;
            println!("Seed data inserted ({inserted} weekly rows).");
        }
        Commands::Import { csv } => {
            let saved = db::import_csv(&pool, &csv).await?;
            println!("Saved {saved} weekly entries from {}.", csv.display());
        }
        Commands::Doctors { action } => run_doctor_command(&pool, &cfg, today, action).await?,
        Commands::Record {
            doctor,
            count,
            week_of,
            notes,
        } => {
            let doctor = db::require_doctor(&pool, &doctor).await?;
            let entry = WeeklyEntry::new(doctor.id, week_of.unwrap_or(today), count, notes)?;
            db::upsert_weekly_entry(&pool, &entry).await?;
            print!(
                "{}",
                report::build_entry_receipt(
                    &doctor.display_name(),
                    &entry,
                    cfg.weekly_target(doctor.weekly_target)
                )
            );
        }
        Commands::Week { date } => {
            let week = calendar::week_of(date.unwrap_or(today));
            let entries = db::fetch_week_entries(&pool, week.year, week.week_number).await?;
            print!("{}", report::build_week_sheet(week.year, week.week_number, &entries));
        }
        Commands::Chart {
            doctor,
            granularity,
            as_of,
            since,
            json,
        } => {
            let doctor = db::require_doctor(&pool, &doctor).await?;
            let reference = as_of.unwrap_or(today);
            let mut options = cfg.bucket_options();
            if let Some(start) = since {
                options.all_time_epoch = AllTimeEpoch::Since(start);
            }

            let filter = RecordFilter::for_granularity(granularity, reference, &options);
            let records = db::fetch_weekly_records(&pool, doctor.id, &filter).await?;
            let points = bucket::bucket_with(&records, granularity, reference, &options);

            if json {
                println!("{}", report::render_points_json(&points)?);
            } else {
                let theme = theme::theme_for(&doctor.first_name, &doctor.last_name);
                print!(
                    "{}",
                    report::build_showcase(1, 1, &doctor.display_name(), theme, granularity, &points)
                );
            }
        }
        Commands::Dashboard { year, out, watch } => {
            let year = year.unwrap_or(today.year());
            if watch {
                let refresh = Duration::from_secs(cfg.dashboard_refresh_secs.max(1));
                let mut ticker = tokio::time::interval(refresh);
                loop {
                    ticker.tick().await;
                    let dashboard = match render_dashboard(&pool, year).await {
                        Ok(dashboard) => dashboard,
                        Err(e) => {
                            tracing::error!(error = %e, "dashboard refresh failed");
                            report::build_dashboard(year, Local::now().date_naive(), &[], &[])
                        }
                    };
                    emit(&dashboard, out.as_ref())?;
                }
            } else {
                let dashboard = render_dashboard(&pool, year).await?;
                emit(&dashboard, out.as_ref())?;
            }
        }
        Commands::Carousel {
            granularity,
            dwell_secs,
            slides,
        } => {
            let dwell = Duration::from_secs(dwell_secs.unwrap_or(cfg.carousel_dwell_secs).max(1));
            run_carousel(pool, cfg.bucket_options(), granularity, dwell, slides, today.year()).await?;
        }
    }

    Ok(())
}

async fn run_doctor_command(
    pool: &PgPool,
    cfg: &Config,
    today: NaiveDate,
    action: DoctorCommand,
) -> anyhow::Result<()> {
    match action {
        DoctorCommand::List { all } => {
            let doctors = db::list_doctors(pool, !all).await?;
            if doctors.is_empty() {
                println!("No doctors on the roster.");
            }
            for doctor in doctors.iter() {
                println!(
                    "- {} [{}] {} target {}/week{} ({})",
                    doctor.display_name(),
                    theme::theme_for(&doctor.first_name, &doctor.last_name).name,
                    doctor.specialty.as_deref().unwrap_or("General Practice"),
                    doctor
                        .weekly_target
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "\u{2014}".to_string()),
                    if doctor.active { "" } else { ", inactive" },
                    doctor.id
                );
            }
        }
        DoctorCommand::Add {
            first,
            last,
            title,
            specialty,
            weekly_target,
        } => {
            let target = weekly_target.unwrap_or(cfg.default_weekly_target);
            let id =
                db::add_doctor(pool, &title, &first, &last, specialty.as_deref(), Some(target)).await?;
            println!("Added {title} {first} {last} ({id}).");
        }
        DoctorCommand::Update {
            doctor,
            title,
            first,
            last,
            specialty,
            weekly_target,
        } => {
            let existing = db::require_doctor(pool, &doctor).await?;
            let changes = DoctorChanges {
                title,
                first_name: first,
                last_name: last,
                specialty,
                weekly_target,
            };
            if db::update_doctor(pool, existing.id, &changes).await? {
                println!("Updated {}.", existing.display_name());
            }
        }
        DoctorCommand::Show {
            doctor,
            year,
            as_of,
        } => {
            let doctor = db::require_doctor(pool, &doctor).await?;
            let reference = as_of.unwrap_or(today);
            let year = year.unwrap_or(reference.year());
            let stats = db::fetch_doctor_stats(pool, doctor.id, year).await?;
            let weeks = db::fetch_doctor_weeks(pool, doctor.id, year).await?;
            print!(
                "{}",
                report::build_doctor_profile(
                    &doctor,
                    year,
                    reference,
                    stats.as_ref(),
                    &weeks,
                    cfg.weekly_target(doctor.weekly_target)
                )
            );
        }
        DoctorCommand::Activate { doctor } => set_active(pool, &doctor, true).await?,
        DoctorCommand::Deactivate { doctor } => set_active(pool, &doctor, false).await?,
        DoctorCommand::Remove { doctor } => {
            let existing = db::require_doctor(pool, &doctor).await?;
            if db::delete_doctor(pool, existing.id).await? {
                println!("Removed {} and their weekly records.", existing.display_name());
            }
        }
    }

    Ok(())
}

async fn set_active(pool: &PgPool, key: &str, active: bool) -> anyhow::Result<()> {
    let doctor = db::require_doctor(pool, key).await?;
    if db::set_doctor_active(pool, doctor.id, active).await? {
        let state = if active { "active" } else { "inactive" };
        println!("{} is now {state}.", doctor.display_name());
    }
    Ok(())
}

async fn render_dashboard(pool: &PgPool, year: i32) -> anyhow::Result<String> {
    let stats = db::fetch_doctor_stats_ytd(pool, year).await?;
    let trends = db::fetch_weekly_trends(pool, year).await?;
    Ok(report::build_dashboard(year, Local::now().date_naive(), &stats, &trends))
}

fn emit(contents: &str, out: Option<&PathBuf>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, contents)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Dashboard written to {}.", path.display());
        }
        None => print!("{contents}"),
    }
    Ok(())
}

/// Dwell ticks a slide may wait on its fetch before the carousel moves on.
const MAX_HELD_TICKS: u32 = 3;

struct Fetched {
    ticket: Ticket,
    position: usize,
    result: anyhow::Result<Vec<WeeklyRecord>>,
}

/// Cycles through doctors busiest-first. Each slide change spawns a fetch;
/// only the fetch for the slide currently on screen is rendered.
async fn run_carousel(
    pool: PgPool,
    options: BucketOptions,
    granularity: Granularity,
    dwell: Duration,
    slides: usize,
    year: i32,
) -> anyhow::Result<()> {
    let doctors: Vec<DoctorStatsYtd> = db::fetch_doctor_stats_ytd(&pool, year).await?;
    if doctors.is_empty() {
        println!("No data available");
        return Ok(());
    }

    let latest = LatestRequest::new();
    let mut pacer = SlidePacer::new(MAX_HELD_TICKS);
    let (tx, mut rx) = mpsc::channel::<Fetched>(8);
    let mut ticker = tokio::time::interval(dwell);
    let mut next = 0usize;
    let mut shown = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if slides > 0 && shown >= slides {
                    break;
                }
                if !pacer.tick() {
                    tracing::warn!(held = pacer.held(), "chart data still loading, holding slide");
                    continue;
                }
                let position = next % doctors.len();
                next += 1;

                let ticket = latest.begin();
                pacer.started(ticket);
                let doctor_id = doctors[position].doctor_id;
                let filter = RecordFilter::for_granularity(granularity, Local::now().date_naive(), &options);
                let pool = pool.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = db::fetch_weekly_records(&pool, doctor_id, &filter).await;
                    let _ = tx.send(Fetched { ticket, position, result }).await;
                });
            }
            Some(fetched) = rx.recv() => {
                pacer.finished(fetched.ticket);
                let doctor = &doctors[fetched.position];
                if !latest.is_current(fetched.ticket) {
                    tracing::warn!(doctor = %doctor.display_name(), "dropping stale chart data");
                    shown += 1;
                    continue;
                }

                let points = match fetched.result {
                    Ok(records) => bucket::bucket_with(&records, granularity, Local::now().date_naive(), &options),
                    Err(e) => {
                        tracing::error!(error = %e, doctor = %doctor.display_name(), "failed to fetch chart data");
                        Vec::new()
                    }
                };

                let theme = theme::theme_for(&doctor.first_name, &doctor.last_name);
                println!(
                    "{}",
                    report::build_showcase(
                        fetched.position + 1,
                        doctors.len(),
                        &doctor.display_name(),
                        theme,
                        granularity,
                        &points,
                    )
                );
                shown += 1;
            }
        }
    }

    Ok(())
}
