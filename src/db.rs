use anyhow::Context;
use chrono::{Datelike, NaiveDate, Weekday};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::bucket::{AllTimeEpoch, BucketOptions, Granularity};
use crate::entry::WeeklyEntry;
use crate::models::{
    Doctor, DoctorChanges, DoctorStatsYtd, DoctorWeek, WeekEntry, WeeklyRecord, WeeklyTrend,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<usize> {
    let doctors = vec![
        (
            Uuid::parse_str("5b1f7c1e-0d6a-4c57-9a53-3f1f0b0c2a11")?,
            "Joseph",
            "Grace",
            "Family Medicine",
            80,
        ),
        (
            Uuid::parse_str("a4c9e2d3-7f41-4e0b-8d2c-91b6f3e5c702")?,
            "Hamid",
            "Hajian",
            "Internal Medicine",
            90,
        ),
        (
            Uuid::parse_str("e1d27a88-3b9f-4a6c-b0e4-5c8d2f7a9b13")?,
            "Emma",
            "Wilson",
            "Pediatrics",
            70,
        ),
        (
            Uuid::parse_str("07f3b6c4-92ad-4e18-a5f7-d6c0e8b1a924")?,
            "Liam",
            "Anderson",
            "Dermatology",
            60,
        ),
    ];

    let current = today.iso_week();
    let mut weeks: Vec<(i32, u32)> = (36..=52).map(|week| (current.year() - 1, week)).collect();
    weeks.extend((1..=current.week()).map(|week| (current.year(), week)));

    let mut inserted = 0usize;
    for (index, (id, first_name, last_name, specialty, target)) in doctors.into_iter().enumerate() {
        let doctor_id: Uuid = sqlx::query(
            r#"
            INSERT INTO clinic_dashboard.doctors (id, title, first_name, last_name, specialty, weekly_target)
            VALUES ($1, 'Dr.', $2, $3, $4, $5)
            ON CONFLICT (first_name, last_name) DO UPDATE
            SET specialty = EXCLUDED.specialty, weekly_target = EXCLUDED.weekly_target, updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(specialty)
        .bind(target)
        .fetch_one(pool)
        .await?
        .try_get("id")?;

        for &(year, week) in &weeks {
            let Some(week_start) = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon) else {
                continue;
            };
            let count = target - 15 + ((week as i32 * 7 + index as i32 * 13) % 23);
            let result = sqlx::query(
                r#"
                INSERT INTO clinic_dashboard.weekly_appointments
                (id, doctor_id, year, week_number, week_start_date, appointment_count)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (doctor_id, year, week_number) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(doctor_id)
            .bind(year)
            .bind(week as i32)
            .bind(week_start)
            .bind(count)
            .execute(pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
    }

    tracing::info!(inserted, "seeded weekly appointments");
    Ok(inserted)
}

fn doctor_from_row(row: &PgRow) -> Result<Doctor, sqlx::Error> {
    Ok(Doctor {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        specialty: row.try_get("specialty")?,
        active: row.try_get("active")?,
        weekly_target: row.try_get("weekly_target")?,
    })
}

const DOCTOR_COLUMNS: &str =
    "id, title, first_name, last_name, specialty, active, weekly_target";

pub async fn list_doctors(pool: &PgPool, active_only: bool) -> anyhow::Result<Vec<Doctor>> {
    let mut query = format!("SELECT {DOCTOR_COLUMNS} FROM clinic_dashboard.doctors");
    if active_only {
        query.push_str(" WHERE active");
    }
    query.push_str(" ORDER BY last_name, first_name");

    let rows = sqlx::query(&query).fetch_all(pool).await?;
    let doctors = rows
        .iter()
        .map(doctor_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(doctors)
}

/// Looks a doctor up by id, or by "First Last" (case-insensitive).
pub async fn find_doctor(pool: &PgPool, key: &str) -> anyhow::Result<Option<Doctor>> {
    let row = if let Ok(id) = Uuid::parse_str(key) {
        let query = format!("SELECT {DOCTOR_COLUMNS} FROM clinic_dashboard.doctors WHERE id = $1");
        sqlx::query(&query).bind(id).fetch_optional(pool).await?
    } else {
        let query = format!(
            "SELECT {DOCTOR_COLUMNS} FROM clinic_dashboard.doctors \
             WHERE LOWER(first_name || ' ' || last_name) = LOWER($1)"
        );
        sqlx::query(&query).bind(key.trim()).fetch_optional(pool).await?
    };

    Ok(row.as_ref().map(doctor_from_row).transpose()?)
}

pub async fn require_doctor(pool: &PgPool, key: &str) -> anyhow::Result<Doctor> {
    find_doctor(pool, key)
        .await?
        .with_context(|| format!("no doctor matches '{key}'"))
}

pub async fn add_doctor(
    pool: &PgPool,
    title: &str,
    first_name: &str,
    last_name: &str,
    specialty: Option<&str>,
    weekly_target: Option<i32>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO clinic_dashboard.doctors (id, title, first_name, last_name, specialty, weekly_target, active)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(first_name)
    .bind(last_name)
    .bind(specialty)
    .bind(weekly_target)
    .execute(pool)
    .await
    .with_context(|| format!("failed to add {first_name} {last_name}"))?;

    tracing::info!(%id, first_name, last_name, "doctor added");
    Ok(id)
}

pub async fn update_doctor(pool: &PgPool, id: Uuid, changes: &DoctorChanges) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE clinic_dashboard.doctors
        SET title = COALESCE($2, title),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            specialty = COALESCE($5, specialty),
            weekly_target = COALESCE($6, weekly_target),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(changes.title.as_deref())
    .bind(changes.first_name.as_deref())
    .bind(changes.last_name.as_deref())
    .bind(changes.specialty.as_deref())
    .bind(changes.weekly_target)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn set_doctor_active(pool: &PgPool, id: Uuid, active: bool) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE clinic_dashboard.doctors SET active = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(active)
    .execute(pool)
    .await?;

    tracing::info!(%id, active, "doctor status changed");
    Ok(result.rows_affected() > 0)
}

pub async fn delete_doctor(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM clinic_dashboard.doctors WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    tracing::info!(%id, "doctor removed");
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub year: Option<i32>,
    /// Lower bound on `year`. Loose on purpose: exact windowing happens in the
    /// bucketer, which derives missing week start dates.
    pub from_year: Option<i32>,
}

impl RecordFilter {
    /// Narrowest query that still returns every record `granularity` can use.
    pub fn for_granularity(
        granularity: Granularity,
        reference: NaiveDate,
        options: &BucketOptions,
    ) -> Self {
        match (granularity, options.all_time_epoch) {
            (Granularity::Weekly | Granularity::Quarterly | Granularity::YearToDate, _) => Self {
                year: Some(reference.year()),
                from_year: None,
            },
            // A week start in `start.year()` can belong to the previous
            // year's final week.
            (Granularity::AllTime, AllTimeEpoch::Since(start)) => Self {
                year: None,
                from_year: Some(start.year() - 1),
            },
            _ => Self::default(),
        }
    }
}

/// All weekly records for one doctor, ordered by year then week ascending.
pub async fn fetch_weekly_records(
    pool: &PgPool,
    doctor_id: Uuid,
    filter: &RecordFilter,
) -> anyhow::Result<Vec<WeeklyRecord>> {
    let mut query = String::from(
        "SELECT year, week_number, appointment_count, week_start_date \
         FROM clinic_dashboard.weekly_appointments \
         WHERE doctor_id = $1",
    );

    let mut placeholder = 2;
    if filter.year.is_some() {
        query.push_str(&format!(" AND year = ${placeholder}"));
        placeholder += 1;
    }
    if filter.from_year.is_some() {
        query.push_str(&format!(" AND year >= ${placeholder}"));
    }
    query.push_str(" ORDER BY year ASC, week_number ASC");

    let mut rows = sqlx::query(&query).bind(doctor_id);
    if let Some(year) = filter.year {
        rows = rows.bind(year);
    }
    if let Some(from_year) = filter.from_year {
        rows = rows.bind(from_year);
    }

    let records = rows.fetch_all(pool).await?;
    let mut weekly = Vec::with_capacity(records.len());

    for row in records {
        weekly.push(WeeklyRecord {
            year: row.try_get("year")?,
            week_number: row.try_get("week_number")?,
            appointment_count: row
                .try_get::<Option<i32>, _>("appointment_count")?
                .map(i64::from),
            week_start_date: row.try_get("week_start_date")?,
        });
    }

    tracing::debug!(%doctor_id, rows = weekly.len(), "fetched weekly records");
    Ok(weekly)
}

pub async fn fetch_week_entries(
    pool: &PgPool,
    year: i32,
    week_number: i32,
) -> anyhow::Result<Vec<WeekEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT d.title, d.first_name, d.last_name, w.appointment_count, w.notes
        FROM clinic_dashboard.weekly_appointments w
        JOIN clinic_dashboard.doctors d ON d.id = w.doctor_id
        WHERE w.year = $1 AND w.week_number = $2
        ORDER BY d.last_name, d.first_name
        "#,
    )
    .bind(year)
    .bind(week_number)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let title: String = row.try_get("title")?;
        let first_name: String = row.try_get("first_name")?;
        let last_name: String = row.try_get("last_name")?;
        entries.push(WeekEntry {
            doctor_name: format!("{title} {first_name} {last_name}"),
            appointment_count: row
                .try_get::<Option<i32>, _>("appointment_count")?
                .map(i64::from)
                .unwrap_or(0),
            notes: row.try_get("notes")?,
        });
    }

    Ok(entries)
}

pub async fn upsert_weekly_entry(pool: &PgPool, entry: &WeeklyEntry) -> anyhow::Result<()> {
    let count = i32::try_from(entry.appointment_count)
        .with_context(|| format!("appointment count {} is too large", entry.appointment_count))?;

    sqlx::query(
        r#"
        INSERT INTO clinic_dashboard.weekly_appointments
        (id, doctor_id, year, week_number, week_start_date, appointment_count, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (doctor_id, year, week_number) DO UPDATE
        SET appointment_count = EXCLUDED.appointment_count,
            notes = EXCLUDED.notes,
            week_start_date = EXCLUDED.week_start_date,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.doctor_id)
    .bind(entry.week.year)
    .bind(entry.week.week_number)
    .bind(entry.week.week_start)
    .bind(count)
    .bind(entry.notes.as_deref())
    .execute(pool)
    .await?;

    tracing::info!(
        doctor_id = %entry.doctor_id,
        year = entry.week.year,
        week = entry.week.week_number,
        count,
        "weekly entry saved"
    );
    Ok(())
}

/// Year-to-date stats per active doctor, busiest first.
pub async fn fetch_doctor_stats_ytd(pool: &PgPool, year: i32) -> anyhow::Result<Vec<DoctorStatsYtd>> {
    let query = format!(
        "SELECT {STATS_COLUMNS} FROM clinic_dashboard.doctor_stats_ytd \
         WHERE year = $1 ORDER BY total_appointments DESC"
    );
    let rows = sqlx::query(&query).bind(year).fetch_all(pool).await?;

    let stats = rows
        .iter()
        .map(stats_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stats)
}

/// Year-to-date stats for one doctor. `None` when they have no weeks in
/// `year` or are inactive.
pub async fn fetch_doctor_stats(
    pool: &PgPool,
    doctor_id: Uuid,
    year: i32,
) -> anyhow::Result<Option<DoctorStatsYtd>> {
    let query = format!(
        "SELECT {STATS_COLUMNS} FROM clinic_dashboard.doctor_stats_ytd \
         WHERE doctor_id = $1 AND year = $2"
    );
    let row = sqlx::query(&query)
        .bind(doctor_id)
        .bind(year)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(stats_from_row).transpose()?)
}

const STATS_COLUMNS: &str = "doctor_id, title, first_name, last_name, specialty, weeks_worked, \
     total_appointments, avg_appointments_per_week, max_weekly_appointments, \
     min_weekly_appointments, target_completion_percentage";

fn stats_from_row(row: &PgRow) -> Result<DoctorStatsYtd, sqlx::Error> {
    Ok(DoctorStatsYtd {
        doctor_id: row.try_get("doctor_id")?,
        title: row.try_get("title")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        specialty: row.try_get("specialty")?,
        weeks_worked: zero_if_null(row, "weeks_worked")?,
        total_appointments: zero_if_null(row, "total_appointments")?,
        avg_appointments_per_week: row
            .try_get::<Option<f64>, _>("avg_appointments_per_week")?
            .unwrap_or(0.0),
        max_weekly_appointments: zero_if_null(row, "max_weekly_appointments")?,
        min_weekly_appointments: zero_if_null(row, "min_weekly_appointments")?,
        target_completion_percentage: row.try_get("target_completion_percentage")?,
    })
}

/// One doctor's weeks in `year` with their notes, week ascending.
pub async fn fetch_doctor_weeks(
    pool: &PgPool,
    doctor_id: Uuid,
    year: i32,
) -> anyhow::Result<Vec<DoctorWeek>> {
    let rows = sqlx::query(
        r#"
        SELECT year, week_number, appointment_count, notes
        FROM clinic_dashboard.weekly_appointments
        WHERE doctor_id = $1 AND year = $2
        ORDER BY week_number ASC
        "#,
    )
    .bind(doctor_id)
    .bind(year)
    .fetch_all(pool)
    .await?;

    let mut weeks = Vec::with_capacity(rows.len());
    for row in rows {
        weeks.push(DoctorWeek {
            year: row.try_get("year")?,
            week_number: row.try_get("week_number")?,
            appointment_count: row
                .try_get::<Option<i32>, _>("appointment_count")?
                .map(i64::from)
                .unwrap_or(0),
            notes: row.try_get("notes")?,
        });
    }

    Ok(weeks)
}

pub async fn fetch_weekly_trends(pool: &PgPool, year: i32) -> anyhow::Result<Vec<WeeklyTrend>> {
    let rows = sqlx::query(
        r#"
        SELECT week_number, total_appointments, active_doctors
        FROM clinic_dashboard.weekly_trends
        WHERE year = $1
        ORDER BY week_number ASC
        "#,
    )
    .bind(year)
    .fetch_all(pool)
    .await?;

    let mut trends = Vec::with_capacity(rows.len());
    for row in rows {
        trends.push(WeeklyTrend {
            week_number: row.try_get("week_number")?,
            total_appointments: zero_if_null(&row, "total_appointments")?,
            active_doctors: zero_if_null(&row, "active_doctors")?,
        });
    }

    Ok(trends)
}

fn zero_if_null(row: &PgRow, column: &str) -> Result<i64, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(column)?.unwrap_or(0))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        first_name: String,
        last_name: String,
        date: NaiveDate,
        appointment_count: i64,
        notes: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut saved = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV row {}", line + 1))?;
        let doctor_id: Uuid = sqlx::query(
            r#"
            INSERT INTO clinic_dashboard.doctors (id, first_name, last_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (first_name, last_name) DO UPDATE
            SET updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.first_name)
        .bind(&row.last_name)
        .fetch_one(pool)
        .await?
        .try_get("id")?;

        let entry = WeeklyEntry::new(doctor_id, row.date, row.appointment_count, row.notes)
            .with_context(|| format!("invalid CSV row {}", line + 1))?;
        upsert_weekly_entry(pool, &entry).await?;
        saved += 1;
    }

    Ok(saved)
}
