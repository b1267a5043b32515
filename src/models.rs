use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Doctor {
    pub id: Uuid,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub specialty: Option<String>,
    pub active: bool,
    pub weekly_target: Option<i32>,
}

impl Doctor {
    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.title, self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DoctorChanges {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialty: Option<String>,
    pub weekly_target: Option<i32>,
}

/// One doctor-week of appointments as stored in `weekly_appointments`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyRecord {
    pub year: i32,
    pub week_number: i32,
    pub appointment_count: Option<i64>,
    pub week_start_date: Option<NaiveDate>,
}

impl WeeklyRecord {
    /// Missing or negative counts aggregate as zero.
    pub fn count(&self) -> i64 {
        self.appointment_count.unwrap_or(0).max(0)
    }
}

/// One of a doctor's own weeks, with the notes recorded against it.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorWeek {
    pub year: i32,
    pub week_number: i32,
    pub appointment_count: i64,
    pub notes: Option<String>,
}

impl DoctorWeek {
    pub fn record(&self) -> WeeklyRecord {
        WeeklyRecord {
            year: self.year,
            week_number: self.week_number,
            appointment_count: Some(self.appointment_count),
            week_start_date: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeekEntry {
    pub doctor_name: String,
    pub appointment_count: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: i64,
}

impl ChartPoint {
    pub fn new(label: impl Into<String>, value: i64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DoctorStatsYtd {
    pub doctor_id: Uuid,
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub specialty: Option<String>,
    pub weeks_worked: i64,
    pub total_appointments: i64,
    pub avg_appointments_per_week: f64,
    pub max_weekly_appointments: i64,
    pub min_weekly_appointments: i64,
    pub target_completion_percentage: Option<f64>,
}

impl DoctorStatsYtd {
    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.title, self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone)]
pub struct WeeklyTrend {
    pub week_number: i32,
    pub total_appointments: i64,
    pub active_doctors: i64,
}
