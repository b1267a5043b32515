use chrono::{Datelike, Duration, NaiveDate};

/// Weeks per month used for every week-to-month mapping. Not calendar exact;
/// historical dashboards depend on this exact value.
pub const WEEKS_PER_MONTH: f64 = 4.33;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekKey {
    pub year: i32,
    pub week_number: i32,
    pub week_start: NaiveDate,
}

/// First Monday on or after Jan 1 of `year`, advanced by `week_number - 1` weeks.
pub fn monday_of_week(year: i32, week_number: i32) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let until_monday = (7 - jan1.weekday().num_days_from_monday()) % 7;
    let offset = i64::from(until_monday) + i64::from(week_number - 1) * 7;
    jan1.checked_add_signed(Duration::days(offset))
}

/// Nominal month (1-12) for a week number: `ceil(week / 4.33)`, with the
/// overflow from weeks 52-53 folded into December.
pub fn approx_month(week_number: i32) -> Option<u32> {
    if !(1..=53).contains(&week_number) {
        return None;
    }
    let month = (f64::from(week_number) / WEEKS_PER_MONTH).ceil() as u32;
    Some(month.clamp(1, 12))
}

pub fn month_abbrev(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_ABBREVIATIONS[(month - 1) as usize],
        _ => "???",
    }
}

/// `"Mon'YY"` label for multi-year views.
pub fn month_year_label(year: i32, month: u32) -> String {
    format!("{}'{:02}", month_abbrev(month), year.rem_euclid(100))
}

pub fn short_date_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// Week key used by data entry: ISO week-year and week number, Monday start.
pub fn week_of(date: NaiveDate) -> WeekKey {
    let iso = date.iso_week();
    let back = i64::from(date.weekday().num_days_from_monday());
    WeekKey {
        year: iso.year(),
        week_number: iso.week() as i32,
        week_start: date - Duration::days(back),
    }
}
