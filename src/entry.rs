use chrono::NaiveDate;
use uuid::Uuid;

use crate::calendar::{week_of, WeekKey};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("week number {0} is outside 1-53")]
    InvalidWeek(i32),
    #[error("year {0} is outside 2000-2100")]
    InvalidYear(i32),
    #[error("appointment count cannot be negative (got {0})")]
    NegativeCount(i64),
}

/// A validated row for the weekly data-entry form.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyEntry {
    pub doctor_id: Uuid,
    pub week: WeekKey,
    pub appointment_count: i64,
    pub notes: Option<String>,
}

impl WeeklyEntry {
    pub fn new(
        doctor_id: Uuid,
        date: NaiveDate,
        appointment_count: i64,
        notes: Option<String>,
    ) -> Result<Self, EntryError> {
        let week = week_of(date);
        validate(week.year, week.week_number, appointment_count)?;
        Ok(Self {
            doctor_id,
            week,
            appointment_count,
            notes: notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

pub fn validate(year: i32, week_number: i32, appointment_count: i64) -> Result<(), EntryError> {
    if !(2000..=2100).contains(&year) {
        return Err(EntryError::InvalidYear(year));
    }
    if !(1..=53).contains(&week_number) {
        return Err(EntryError::InvalidWeek(week_number));
    }
    if appointment_count < 0 {
        return Err(EntryError::NegativeCount(appointment_count));
    }
    Ok(())
}
