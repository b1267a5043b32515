use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;

use crate::calendar::{
    approx_month, month_abbrev, month_year_label, monday_of_week, short_date_label,
};
use crate::models::{ChartPoint, WeeklyRecord};

const WEEKLY_WINDOW: usize = 12;
const RECENT_WEEKS: usize = 4;
const DAILY_WINDOW: usize = 8;
const SEMIANNUAL_MONTHS: i64 = 6;
const WORKING_DAYS_PER_WEEK: f64 = 5.0;
const ALL_TIME_FIRST_MONTH: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Granularity {
    Daily,
    Weekly,
    /// The last four recorded weeks, one point each.
    Monthly,
    /// Weeks summed per calendar month of their start date.
    CalendarMonthly,
    #[value(name = "3-monthly", alias = "quarterly")]
    Quarterly,
    #[value(name = "6-monthly", alias = "semiannual")]
    Semiannual,
    #[value(name = "ytd", alias = "year-to-date")]
    YearToDate,
    AllTime,
}

impl Granularity {
    pub fn title(self) -> &'static str {
        match self {
            Granularity::Daily => "Daily Estimate",
            Granularity::Weekly => "Weekly",
            Granularity::Monthly => "Last 4 Weeks",
            Granularity::CalendarMonthly => "Monthly",
            Granularity::Quarterly => "Last 3 Months",
            Granularity::Semiannual => "Last 6 Months",
            Granularity::YearToDate => "Year to Date",
            Granularity::AllTime => "All Time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllTimeEpoch {
    /// September of the year before the reference date.
    #[default]
    PriorSeptember,
    /// Every week starting on or after a fixed date.
    Since(NaiveDate),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BucketOptions {
    pub all_time_epoch: AllTimeEpoch,
}

pub fn bucket(
    records: &[WeeklyRecord],
    granularity: Granularity,
    reference: NaiveDate,
) -> Vec<ChartPoint> {
    bucket_with(records, granularity, reference, &BucketOptions::default())
}

/// Reshape one doctor's weekly records into chart points for `granularity`,
/// windowed relative to `reference`. Never fails: records outside the window
/// or with impossible week numbers are skipped.
pub fn bucket_with(
    records: &[WeeklyRecord],
    granularity: Granularity,
    reference: NaiveDate,
    options: &BucketOptions,
) -> Vec<ChartPoint> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|record| (record.year, record.week_number));

    match granularity {
        Granularity::Daily => daily(&sorted),
        Granularity::Weekly => weekly(&sorted, reference),
        Granularity::Monthly => recent_weeks(&sorted),
        Granularity::CalendarMonthly => calendar_monthly(&sorted),
        Granularity::Quarterly => quarterly(&sorted, reference),
        Granularity::Semiannual => semiannual(&sorted, reference),
        Granularity::YearToDate => year_to_date(&sorted, reference),
        Granularity::AllTime => all_time(&sorted, reference, options.all_time_epoch),
    }
}

fn daily(records: &[WeeklyRecord]) -> Vec<ChartPoint> {
    last_n(records, DAILY_WINDOW)
        .iter()
        .map(|record| {
            let estimate = (record.count() as f64 / WORKING_DAYS_PER_WEEK).round() as i64;
            ChartPoint::new(format!("Week {}", record.week_number), estimate)
        })
        .collect()
}

fn weekly(records: &[WeeklyRecord], reference: NaiveDate) -> Vec<ChartPoint> {
    let points: Vec<ChartPoint> = records
        .iter()
        .filter(|record| record.year == reference.year())
        .map(|record| ChartPoint::new(week_label(record), record.count()))
        .collect();
    last_n(&points, WEEKLY_WINDOW).to_vec()
}

fn recent_weeks(records: &[WeeklyRecord]) -> Vec<ChartPoint> {
    last_n(records, RECENT_WEEKS)
        .iter()
        .map(|record| ChartPoint::new(week_label(record), record.count()))
        .collect()
}

fn calendar_monthly(records: &[WeeklyRecord]) -> Vec<ChartPoint> {
    let mut months: BTreeMap<(i32, u32), i64> = BTreeMap::new();
    for record in records {
        let Some(start) = week_start(record) else {
            continue;
        };
        *months.entry((start.year(), start.month())).or_insert(0) += record.count();
    }

    months
        .into_iter()
        .map(|((_, month), value)| ChartPoint::new(month_abbrev(month), value))
        .collect()
}

fn quarterly(records: &[WeeklyRecord], reference: NaiveDate) -> Vec<ChartPoint> {
    let last = reference.month();
    let first = last.saturating_sub(2).max(1);
    let mut months: BTreeMap<u32, i64> = BTreeMap::new();

    for record in records.iter().filter(|r| r.year == reference.year()) {
        match approx_month(record.week_number) {
            Some(month) if (first..=last).contains(&month) => {
                *months.entry(month).or_insert(0) += record.count();
            }
            _ => {}
        }
    }

    month_points(months)
}

fn semiannual(records: &[WeeklyRecord], reference: NaiveDate) -> Vec<ChartPoint> {
    let last = month_ordinal(reference.year(), reference.month());
    let first = last - (SEMIANNUAL_MONTHS - 1);
    let mut months: BTreeMap<i64, i64> = BTreeMap::new();

    for record in records {
        let Some(month) = approx_month(record.week_number) else {
            continue;
        };
        let ordinal = month_ordinal(record.year, month);
        if (first..=last).contains(&ordinal) {
            *months.entry(ordinal).or_insert(0) += record.count();
        }
    }

    let points: Vec<ChartPoint> = months
        .into_iter()
        .map(|(ordinal, value)| {
            let month = ordinal.rem_euclid(12) as u32 + 1;
            ChartPoint::new(month_abbrev(month), value)
        })
        .collect();
    last_n(&points, SEMIANNUAL_MONTHS as usize).to_vec()
}

fn year_to_date(records: &[WeeklyRecord], reference: NaiveDate) -> Vec<ChartPoint> {
    let mut months: BTreeMap<u32, i64> = BTreeMap::new();

    for record in records.iter().filter(|r| r.year == reference.year()) {
        match approx_month(record.week_number) {
            Some(month) if month <= reference.month() => {
                *months.entry(month).or_insert(0) += record.count();
            }
            _ => {}
        }
    }

    month_points(months)
}

fn all_time(records: &[WeeklyRecord], reference: NaiveDate, epoch: AllTimeEpoch) -> Vec<ChartPoint> {
    let current = (reference.year(), reference.month());
    let mut months: BTreeMap<(i32, u32), i64> = BTreeMap::new();

    for record in records {
        let Some(month) = approx_month(record.week_number) else {
            continue;
        };
        let key = (record.year, month);
        let included = match epoch {
            AllTimeEpoch::PriorSeptember => {
                (record.year == current.0 - 1 && month >= ALL_TIME_FIRST_MONTH)
                    || (record.year == current.0 && month <= current.1)
            }
            AllTimeEpoch::Since(start) => {
                key <= current && week_start(record).is_some_and(|date| date >= start)
            }
        };
        if included {
            *months.entry(key).or_insert(0) += record.count();
        }
    }

    months
        .into_iter()
        .map(|((year, month), value)| ChartPoint::new(month_year_label(year, month), value))
        .collect()
}

fn month_points(months: BTreeMap<u32, i64>) -> Vec<ChartPoint> {
    months
        .into_iter()
        .map(|(month, value)| ChartPoint::new(month_abbrev(month), value))
        .collect()
}

fn month_ordinal(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

fn week_start(record: &WeeklyRecord) -> Option<NaiveDate> {
    record
        .week_start_date
        .or_else(|| monday_of_week(record.year, record.week_number))
}

fn week_label(record: &WeeklyRecord) -> String {
    monday_of_week(record.year, record.week_number)
        .map(short_date_label)
        .unwrap_or_else(|| format!("Week {}", record.week_number))
}

fn last_n<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(year: i32, week_number: i32, count: i64) -> WeeklyRecord {
        WeeklyRecord {
            year,
            week_number,
            appointment_count: Some(count),
            week_start_date: None,
        }
    }

    fn weeks(year: i32, counts: &[(i32, i64)]) -> Vec<WeeklyRecord> {
        counts
            .iter()
            .map(|&(week, count)| record(year, week, count))
            .collect()
    }

    fn values(points: &[ChartPoint]) -> Vec<i64> {
        points.iter().map(|p| p.value).collect()
    }

    fn labels(points: &[ChartPoint]) -> Vec<&str> {
        points.iter().map(|p| p.label.as_str()).collect()
    }

    #[test]
    fn weekly_labels_each_week_with_its_monday() {
        let records = weeks(2025, &[(1, 10), (2, 20), (3, 5)]);
        let points = bucket(&records, Granularity::Weekly, date(2025, 3, 1));
        assert_eq!(labels(&points), vec!["Jan 6", "Jan 13", "Jan 20"]);
        assert_eq!(values(&points), vec![10, 20, 5]);
    }

    #[test]
    fn weekly_keeps_only_reference_year_and_last_twelve() {
        let mut records = weeks(2024, &[(50, 99), (51, 99)]);
        records.extend(weeks(2025, &(1..=20).map(|w| (w, i64::from(w))).collect::<Vec<_>>()));
        let points = bucket(&records, Granularity::Weekly, date(2025, 6, 1));
        assert_eq!(points.len(), 12);
        assert_eq!(points.first().map(|p| p.value), Some(9));
        assert_eq!(points.last().map(|p| p.value), Some(20));
    }

    #[test]
    fn monthly_is_last_four_weeks_across_years() {
        let mut records = weeks(2025, &[(1, 7), (2, 8)]);
        records.extend(weeks(2024, &[(50, 4), (51, 5), (52, 6)]));
        let points = bucket(&records, Granularity::Monthly, date(2025, 1, 20));
        assert_eq!(values(&points), vec![5, 6, 7, 8]);
        assert_eq!(points[0].label, "Dec 16");
    }

    #[test]
    fn calendar_monthly_groups_by_week_start_month() {
        let mut records = weeks(2025, &[(4, 10), (5, 20), (6, 30)]);
        records[0].week_start_date = Some(date(2025, 1, 27));
        records[1].week_start_date = Some(date(2025, 2, 3));
        // Week 6 derives its start: Feb 10.
        let points = bucket(&records, Granularity::CalendarMonthly, date(2025, 3, 1));
        assert_eq!(labels(&points), vec!["Jan", "Feb"]);
        assert_eq!(values(&points), vec![10, 50]);
    }

    #[test]
    fn quarterly_sums_three_months_ending_at_reference() {
        // Weeks 1-4 -> Jan, 5-8 -> Feb, 9-12 -> Mar, 13 -> Apr.
        let records = weeks(2025, &[(2, 1), (6, 2), (7, 3), (10, 4), (13, 100)]);
        let points = bucket(&records, Granularity::Quarterly, date(2025, 3, 15));
        assert_eq!(labels(&points), vec!["Jan", "Feb", "Mar"]);
        assert_eq!(values(&points), vec![1, 5, 4]);

        let points = bucket(&records, Granularity::Quarterly, date(2025, 4, 15));
        assert_eq!(labels(&points), vec!["Feb", "Mar", "Apr"]);
    }

    #[test]
    fn quarterly_does_not_reach_into_prior_year() {
        let mut records = weeks(2024, &[(48, 50)]);
        records.extend(weeks(2025, &[(1, 3)]));
        let points = bucket(&records, Granularity::Quarterly, date(2025, 1, 10));
        assert_eq!(values(&points), vec![3]);
    }

    #[test]
    fn semiannual_wraps_into_prior_year() {
        let mut records = weeks(2024, &[(30, 1), (36, 2), (45, 3), (52, 4)]);
        records.extend(weeks(2025, &[(2, 5), (6, 6), (10, 7)]));
        let points = bucket(&records, Granularity::Semiannual, date(2025, 2, 14));
        // Window is Sep 2024 through Feb 2025; Jul and Mar fall outside.
        assert_eq!(labels(&points), vec!["Sep", "Nov", "Dec", "Jan", "Feb"]);
        assert_eq!(values(&points), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn year_to_date_stops_at_reference_month() {
        let mut records = weeks(2025, &[(1, 1), (3, 2), (5, 4), (14, 8), (30, 16)]);
        records.extend(weeks(2024, &[(1, 100)]));
        let points = bucket(&records, Granularity::YearToDate, date(2025, 4, 2));
        assert_eq!(labels(&points), vec!["Jan", "Feb", "Apr"]);
        assert_eq!(values(&points), vec![3, 4, 8]);
    }

    #[test]
    fn all_time_starts_at_prior_september() {
        let mut records = weeks(2024, &[(20, 9), (36, 1), (40, 2), (53, 3)]);
        records.extend(weeks(2025, &[(1, 4), (20, 50)]));
        let points = bucket(&records, Granularity::AllTime, date(2025, 2, 1));
        assert_eq!(labels(&points), vec!["Sep'24", "Oct'24", "Dec'24", "Jan'25"]);
        assert_eq!(values(&points), vec![1, 2, 3, 4]);
    }

    #[test]
    fn all_time_with_fixed_start_date() {
        let records = weeks(2024, &[(35, 1), (37, 2), (41, 3)]);
        let options = BucketOptions {
            all_time_epoch: AllTimeEpoch::Since(date(2024, 9, 9)),
        };
        let points = bucket_with(&records, Granularity::AllTime, date(2024, 12, 1), &options);
        // Week 35 starts Aug 26, before the cutoff.
        assert_eq!(labels(&points), vec!["Sep'24", "Oct'24"]);
        assert_eq!(values(&points), vec![2, 3]);
    }

    #[test]
    fn daily_divides_the_last_eight_weeks_by_five() {
        let records = weeks(2025, &(1..=10).map(|w| (w, 12)).collect::<Vec<_>>());
        let points = bucket(&records, Granularity::Daily, date(2025, 4, 1));
        assert_eq!(points.len(), 8);
        assert_eq!(points[0].label, "Week 3");
        assert!(points.iter().all(|p| p.value == 2));
    }

    #[test]
    fn unsorted_input_is_ordered_first() {
        let records = weeks(2025, &[(3, 5), (1, 10), (2, 20)]);
        let points = bucket(&records, Granularity::Weekly, date(2025, 2, 1));
        assert_eq!(values(&points), vec![10, 20, 5]);
    }

    #[test]
    fn missing_counts_aggregate_as_zero() {
        let mut records = weeks(2025, &[(1, 4), (2, 0)]);
        records[1].appointment_count = None;
        let points = bucket(&records, Granularity::YearToDate, date(2025, 1, 31));
        assert_eq!(values(&points), vec![4]);
    }

    #[test]
    fn impossible_week_numbers_are_skipped() {
        let records = weeks(2025, &[(0, 5), (60, 5), (2, 1)]);
        let points = bucket(&records, Granularity::YearToDate, date(2025, 12, 31));
        assert_eq!(values(&points), vec![1]);
    }

    #[test]
    fn empty_input_yields_empty_output_for_every_granularity() {
        for granularity in Granularity::value_variants() {
            assert!(bucket(&[], *granularity, date(2025, 5, 5)).is_empty());
        }
    }

    fn year_of_weeks() -> impl Strategy<Value = Vec<WeeklyRecord>> {
        proptest::collection::btree_map(1i32..=53, 0i64..500, 0..53).prop_map(|map| {
            map.into_iter()
                .map(|(week, count)| record(2025, week, count))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn weekly_never_exceeds_twelve_points(records in year_of_weeks()) {
            let points = bucket(&records, Granularity::Weekly, date(2025, 12, 31));
            prop_assert!(points.len() <= 12);
        }

        #[test]
        fn year_to_date_conserves_counts_in_window(records in year_of_weeks(), month in 1u32..=12) {
            let reference = date(2025, month, 1);
            let points = bucket(&records, Granularity::YearToDate, reference);
            let expected: i64 = records
                .iter()
                .filter(|r| approx_month(r.week_number).is_some_and(|m| m <= month))
                .map(|r| r.count())
                .sum();
            prop_assert_eq!(points.iter().map(|p| p.value).sum::<i64>(), expected);
        }

        #[test]
        fn month_labels_are_deterministic(records in year_of_weeks()) {
            let reference = date(2025, 12, 31);
            let first = bucket(&records, Granularity::YearToDate, reference);
            let second = bucket(&records, Granularity::YearToDate, reference);
            prop_assert_eq!(first, second);
        }
    }

    /// Up to three years of weeks, 2023 through 2025, in arbitrary order.
    fn several_years_of_weeks() -> impl Strategy<Value = Vec<WeeklyRecord>> {
        proptest::collection::btree_map((2023i32..=2025, 1i32..=53), 0i64..500, 0..120)
            .prop_map(|map| {
                map.into_iter()
                    .map(|((year, week), count)| record(year, week, count))
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    }

    fn reference_date() -> impl Strategy<Value = NaiveDate> {
        (2024i32..=2025, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| date(y, m, d))
    }

    fn nominal_month(week_number: i32) -> u32 {
        ((f64::from(week_number) / 4.33).ceil() as u32).min(12)
    }

    fn total(points: &[ChartPoint]) -> i64 {
        points.iter().map(|p| p.value).sum()
    }

    fn sum_where(records: &[WeeklyRecord], keep: impl Fn(&WeeklyRecord) -> bool) -> i64 {
        records
            .iter()
            .filter(|&r| keep(r))
            .map(|r| r.appointment_count.unwrap_or(0))
            .sum()
    }

    fn chronological(records: &[WeeklyRecord]) -> Vec<WeeklyRecord> {
        let mut sorted = records.to_vec();
        sorted.sort_by_key(|r| (r.year, r.week_number));
        sorted
    }

    proptest! {
        #[test]
        fn quarterly_conserves_counts_in_window(records in several_years_of_weeks(), reference in reference_date()) {
            let last = reference.month();
            let first = if last > 2 { last - 2 } else { 1 };
            let expected = sum_where(&records, |r| {
                r.year == reference.year() && (first..=last).contains(&nominal_month(r.week_number))
            });
            let points = bucket(&records, Granularity::Quarterly, reference);
            prop_assert!(points.len() <= 3);
            prop_assert_eq!(total(&points), expected);
        }

        #[test]
        fn semiannual_conserves_counts_across_years(records in several_years_of_weeks(), reference in reference_date()) {
            // Months since year 0, so the window can straddle New Year.
            let months_since_zero = |year: i32, month: u32| year * 12 + month as i32;
            let last = months_since_zero(reference.year(), reference.month());
            let expected = sum_where(&records, |r| {
                let month = months_since_zero(r.year, nominal_month(r.week_number));
                month > last - 6 && month <= last
            });
            let points = bucket(&records, Granularity::Semiannual, reference);
            prop_assert!(points.len() <= 6);
            prop_assert_eq!(total(&points), expected);
        }

        #[test]
        fn year_to_date_ignores_other_years(records in several_years_of_weeks(), reference in reference_date()) {
            let expected = sum_where(&records, |r| {
                r.year == reference.year() && nominal_month(r.week_number) <= reference.month()
            });
            let points = bucket(&records, Granularity::YearToDate, reference);
            prop_assert!(points.len() <= 12);
            prop_assert_eq!(total(&points), expected);
        }

        #[test]
        fn all_time_from_prior_september_conserves_counts(records in several_years_of_weeks(), reference in reference_date()) {
            let (year, month) = (reference.year(), reference.month());
            let expected = sum_where(&records, |r| {
                let m = nominal_month(r.week_number);
                (r.year == year - 1 && m >= 9) || (r.year == year && m <= month)
            });
            let points = bucket(&records, Granularity::AllTime, reference);
            prop_assert_eq!(total(&points), expected);
        }

        #[test]
        fn all_time_from_fixed_start_conserves_counts(
            records in several_years_of_weeks(),
            reference in reference_date(),
            start in (2023i32..=2025, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| date(y, m, d)),
        ) {
            let options = BucketOptions { all_time_epoch: AllTimeEpoch::Since(start) };
            let current = (reference.year(), reference.month());
            let expected = sum_where(&records, |r| {
                (r.year, nominal_month(r.week_number)) <= current
                    && monday_of_week(r.year, r.week_number).is_some_and(|monday| monday >= start)
            });
            let points = bucket_with(&records, Granularity::AllTime, reference, &options);
            prop_assert_eq!(total(&points), expected);
        }

        #[test]
        fn calendar_monthly_keeps_every_week(records in several_years_of_weeks(), reference in reference_date()) {
            let points = bucket(&records, Granularity::CalendarMonthly, reference);
            prop_assert_eq!(total(&points), sum_where(&records, |_| true));
            prop_assert!(points.len() <= 3 * 12 + 1);
        }

        #[test]
        fn recent_weeks_are_the_last_four_recorded(records in several_years_of_weeks(), reference in reference_date()) {
            let sorted = chronological(&records);
            let tail = &sorted[sorted.len().saturating_sub(4)..];
            let points = bucket(&records, Granularity::Monthly, reference);
            prop_assert_eq!(points.len(), tail.len());
            prop_assert_eq!(total(&points), sum_where(tail, |_| true));
        }

        #[test]
        fn weekly_is_the_reference_year_tail(records in several_years_of_weeks(), reference in reference_date()) {
            let in_year: Vec<WeeklyRecord> = chronological(&records)
                .into_iter()
                .filter(|r| r.year == reference.year())
                .collect();
            let tail = &in_year[in_year.len().saturating_sub(12)..];
            let points = bucket(&records, Granularity::Weekly, reference);
            prop_assert_eq!(points.len(), tail.len());
            prop_assert_eq!(total(&points), sum_where(tail, |_| true));
        }

        #[test]
        fn daily_shows_at_most_eight_weeks(records in several_years_of_weeks(), reference in reference_date()) {
            let points = bucket(&records, Granularity::Daily, reference);
            prop_assert!(points.len() <= 8);
        }

        #[test]
        fn every_granularity_ignores_input_order(records in several_years_of_weeks(), reference in reference_date()) {
            let reversed: Vec<WeeklyRecord> = records.iter().rev().cloned().collect();
            for granularity in Granularity::value_variants() {
                let first = bucket(&records, *granularity, reference);
                prop_assert_eq!(&first, &bucket(&records, *granularity, reference));
                prop_assert_eq!(&first, &bucket(&reversed, *granularity, reference));
            }
        }
    }
}
