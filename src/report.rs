use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{Datelike, NaiveDate};

use crate::bucket::{self, Granularity};
use crate::calendar::{self, approx_month, month_abbrev};
use crate::entry::WeeklyEntry;
use crate::models::{
    ChartPoint, Doctor, DoctorStatsYtd, DoctorWeek, WeekEntry, WeeklyRecord, WeeklyTrend,
};
use crate::stats::{self, format_point, format_trend, Summary};
use crate::theme::{self, Theme};

const BAR_WIDTH: i64 = 30;
const RECENT_WEEK_ROWS: usize = 10;
const NO_VALUE: &str = "\u{2014}";

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTrend {
    pub month: &'static str,
    pub total_appointments: i64,
    pub avg_per_week: i64,
    pub peak_active_doctors: i64,
}

/// Fold clinic-wide weekly trends into nominal months, January first.
pub fn monthly_trends(trends: &[WeeklyTrend]) -> Vec<MonthlyTrend> {
    let mut months: BTreeMap<u32, (i64, i64, i64)> = BTreeMap::new();

    for trend in trends {
        let Some(month) = approx_month(trend.week_number) else {
            continue;
        };
        let entry = months.entry(month).or_insert((0, 0, 0));
        entry.0 += trend.total_appointments;
        entry.1 += 1;
        entry.2 = entry.2.max(trend.active_doctors);
    }

    months
        .into_iter()
        .map(|(month, (total, weeks, doctors))| MonthlyTrend {
            month: month_abbrev(month),
            total_appointments: total,
            avg_per_week: stats::rounded_ratio(total, weeks),
            peak_active_doctors: doctors,
        })
        .collect()
}

pub fn build_dashboard(
    year: i32,
    generated_on: NaiveDate,
    doctors: &[DoctorStatsYtd],
    trends: &[WeeklyTrend],
) -> String {
    let fleet = stats::fleet_summary(doctors);
    let mut output = String::new();

    let _ = writeln!(output, "# Clinic Appointments Dashboard");
    let _ = writeln!(output, "Year-to-date performance {} (as of {})", year, generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total appointments: {}", fleet.total_appointments);
    let _ = writeln!(output, "- Active doctors: {}", fleet.doctor_count);
    let _ = writeln!(output, "- Average per doctor: {}", fleet.average_per_doctor);
    let _ = writeln!(
        output,
        "- Top performer: {}",
        fleet.top_performer.as_deref().unwrap_or(NO_VALUE)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Doctors");

    if doctors.is_empty() {
        let _ = writeln!(output, "No data available for {}.", year);
    } else {
        let _ = writeln!(
            output,
            "| Rank | Doctor | Specialty | Theme | Weeks | Total | Avg/Week | Best | Lowest | Target |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|");
        for (rank, doctor) in doctors.iter().enumerate() {
            let target = doctor
                .target_completion_percentage
                .map(|pct| format!("{pct:.0}%"))
                .unwrap_or_else(|| NO_VALUE.to_string());
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {:.1} | {} | {} | {} |",
                rank + 1,
                doctor.display_name(),
                doctor.specialty.as_deref().unwrap_or("General Practice"),
                theme::theme_for(&doctor.first_name, &doctor.last_name).name,
                doctor.weeks_worked,
                doctor.total_appointments,
                doctor.avg_appointments_per_week,
                doctor.max_weekly_appointments,
                doctor.min_weekly_appointments,
                target
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Trend");

    let months = monthly_trends(trends);
    if months.is_empty() {
        let _ = writeln!(output, "No weekly data recorded yet.");
    } else {
        let _ = writeln!(output, "| Month | Appointments | Avg/Week | Doctors |");
        let _ = writeln!(output, "|---|---|---|---|");
        for month in months.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                month.month, month.total_appointments, month.avg_per_week, month.peak_active_doctors
            );
        }
    }

    output
}

/// One carousel slide for a doctor.
pub fn build_showcase(
    position: usize,
    of: usize,
    doctor_name: &str,
    theme: &Theme,
    granularity: Granularity,
    points: &[ChartPoint],
) -> String {
    let summary = stats::summarize(points);
    let mut output = String::new();

    let _ = writeln!(
        output,
        "#{} of {}  {}  [{} {}]",
        position, of, doctor_name, theme.name, theme.primary
    );
    let _ = writeln!(output, "{}", granularity.title());
    let _ = writeln!(output);

    if points.is_empty() {
        let _ = writeln!(output, "No data available");
        return output;
    }

    output.push_str(&render_chart(points));
    let _ = writeln!(output);
    output.push_str(&render_summary(&summary));
    output
}

pub fn render_summary(summary: &Summary) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Best:    {}", format_point(summary.best.as_ref()));
    let _ = writeln!(output, "Latest:  {}", format_point(summary.latest.as_ref()));
    let _ = writeln!(output, "Average: {}", summary.average);
    let _ = writeln!(output, "Trend:   {}", format_trend(summary.trend));
    output
}

/// Horizontal bar chart scaled to the largest value.
pub fn render_chart(points: &[ChartPoint]) -> String {
    let label_width = points.iter().map(|p| p.label.chars().count()).max().unwrap_or(0);
    let max = points.iter().map(|p| p.value).max().unwrap_or(0).max(1);
    let mut output = String::new();

    for point in points {
        let filled = (point.value.max(0) * BAR_WIDTH + max / 2) / max;
        let _ = writeln!(
            output,
            "{:<width$} | {} {}",
            point.label,
            "#".repeat(filled as usize),
            point.value,
            width = label_width
        );
    }

    output
}

/// Profile page for one doctor: year-to-date cards, appointments per month and
/// the last ten recorded weeks, newest first. `weeks` is in ascending order.
pub fn build_doctor_profile(
    doctor: &Doctor,
    year: i32,
    reference: NaiveDate,
    ytd: Option<&DoctorStatsYtd>,
    weeks: &[DoctorWeek],
    weekly_target: i64,
) -> String {
    let theme = theme::theme_for(&doctor.first_name, &doctor.last_name);
    let today = calendar::week_of(reference);
    let current_week = (today.year == year).then_some(today.week_number);
    let mut output = String::new();

    let _ = writeln!(output, "# {}", doctor.display_name());
    let _ = writeln!(
        output,
        "{}  [{} {}]",
        doctor.specialty.as_deref().unwrap_or("General Practice"),
        theme.name,
        theme.primary
    );
    match current_week {
        Some(week) => {
            let _ = writeln!(output, "Performance year {}, week {}", year, week);
        }
        None => {
            let _ = writeln!(output, "Performance year {}", year);
        }
    }

    let weeks_worked = ytd.map_or(0, |s| s.weeks_worked);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Year to Date");
    let _ = writeln!(
        output,
        "- Total appointments: {}",
        ytd.map_or(0, |s| s.total_appointments)
    );
    let _ = writeln!(
        output,
        "- Avg per week: {:.1}",
        ytd.map_or(0.0, |s| s.avg_appointments_per_week)
    );
    match current_week {
        Some(week) => {
            let _ = writeln!(output, "- Weeks worked: {} of {}", weeks_worked, week);
        }
        None => {
            let _ = writeln!(output, "- Weeks worked: {}", weeks_worked);
        }
    }
    let _ = writeln!(
        output,
        "- Target progress: {}",
        ytd
            .and_then(|s| s.target_completion_percentage)
            .map(|pct| format!("{pct:.0}%"))
            .unwrap_or_else(|| NO_VALUE.to_string())
    );
    let _ = writeln!(output, "- Weekly target: {}", weekly_target);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Summary");
    let month_reference = if reference.year() == year {
        reference
    } else {
        NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(reference)
    };
    let records: Vec<WeeklyRecord> = weeks.iter().map(DoctorWeek::record).collect();
    let months = bucket::bucket(&records, Granularity::YearToDate, month_reference);
    if months.is_empty() {
        let _ = writeln!(output, "No data available");
    } else {
        output.push_str(&render_chart(&months));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Weeks");
    if weeks.is_empty() {
        let _ = writeln!(output, "No weeks recorded for {}.", year);
        return output;
    }

    let _ = writeln!(output, "| Week | Appointments | Status | Target | Notes |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for week in weeks.iter().rev().take(RECENT_WEEK_ROWS) {
        let marker = if Some(week.week_number) == current_week {
            " (current)"
        } else {
            ""
        };
        let _ = writeln!(
            output,
            "| Week {}{} | {} | {} | {}% | {} |",
            week.week_number,
            marker,
            week.appointment_count,
            stats::target_status(week.appointment_count, weekly_target).label(),
            stats::target_progress(week.appointment_count, weekly_target),
            week.notes.as_deref().unwrap_or("-")
        );
    }

    output
}

/// Confirmation for a saved weekly entry, with progress against the target.
pub fn build_entry_receipt(doctor_name: &str, entry: &WeeklyEntry, weekly_target: i64) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Saved {} appointments for {} in week {} of {} (starting {}).",
        entry.appointment_count,
        doctor_name,
        entry.week.week_number,
        entry.week.year,
        entry.week.week_start
    );
    let _ = writeln!(
        output,
        "{}% of the weekly target of {}: {}.",
        stats::target_progress(entry.appointment_count, weekly_target),
        weekly_target,
        stats::target_status(entry.appointment_count, weekly_target).label()
    );

    // Chart labels count weeks from the first Monday of the year, not ISO.
    if let Some(charted) = calendar::monday_of_week(entry.week.year, entry.week.week_number)
        .filter(|monday| *monday != entry.week.week_start)
    {
        let _ = writeln!(
            output,
            "Charts label this week {}.",
            calendar::short_date_label(charted)
        );
    }

    output
}

pub fn render_points_json(points: &[ChartPoint]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(points)?)
}

pub fn build_week_sheet(year: i32, week_number: i32, entries: &[WeekEntry]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Week {} of {}", week_number, year);

    if entries.is_empty() {
        let _ = writeln!(output, "No entries recorded for this week.");
        return output;
    }

    for entry in entries {
        match &entry.notes {
            Some(notes) => {
                let _ = writeln!(
                    output,
                    "- {}: {} ({})",
                    entry.doctor_name, entry.appointment_count, notes
                );
            }
            None => {
                let _ = writeln!(output, "- {}: {}", entry.doctor_name, entry.appointment_count);
            }
        }
    }

    let total: i64 = entries.iter().map(|e| e.appointment_count).sum();
    let _ = writeln!(output, "Total: {}", total);
    output
}
