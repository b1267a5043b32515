use crate::models::{ChartPoint, DoctorStatsYtd};

const NO_VALUE: &str = "\u{2014}";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary {
    pub best: Option<ChartPoint>,
    pub latest: Option<ChartPoint>,
    pub average: i64,
    pub trend: Option<i64>,
}

pub fn summarize(points: &[ChartPoint]) -> Summary {
    let best = points
        .iter()
        .fold(None::<&ChartPoint>, |best, point| match best {
            Some(current) if point.value <= current.value => Some(current),
            _ => Some(point),
        })
        .cloned();

    let trend = match points {
        [.., previous, last] => Some(last.value - previous.value),
        _ => None,
    };

    Summary {
        best,
        latest: points.last().cloned(),
        average: rounded_mean(points.iter().map(|p| p.value)),
        trend,
    }
}

/// Mean rounded half away from zero; zero for an empty series.
pub fn rounded_mean(values: impl IntoIterator<Item = i64>) -> i64 {
    let (sum, count) = values
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), value| (sum + value, count + 1));
    rounded_ratio(sum, count)
}

pub fn rounded_ratio(sum: i64, count: i64) -> i64 {
    if count == 0 {
        0
    } else {
        (sum as f64 / count as f64).round() as i64
    }
}

pub fn format_trend(trend: Option<i64>) -> String {
    match trend {
        Some(delta) if delta > 0 => format!("+{delta}"),
        Some(delta) => delta.to_string(),
        None => NO_VALUE.to_string(),
    }
}

pub fn format_point(point: Option<&ChartPoint>) -> String {
    point
        .map(|p| format!("{} ({})", p.value, p.label))
        .unwrap_or_else(|| NO_VALUE.to_string())
}

/// How one week's count compares with a doctor's weekly target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    OnTarget,
    /// At least two thirds of the target.
    BelowTarget,
    Low,
}

impl TargetStatus {
    pub fn label(self) -> &'static str {
        match self {
            TargetStatus::OnTarget => "On Target",
            TargetStatus::BelowTarget => "Below Target",
            TargetStatus::Low => "Low",
        }
    }
}

pub fn target_status(count: i64, target: i64) -> TargetStatus {
    if count >= target {
        TargetStatus::OnTarget
    } else if count * 3 >= target * 2 {
        TargetStatus::BelowTarget
    } else {
        TargetStatus::Low
    }
}

/// `count` as a whole percentage of `target`; zero without a positive target.
pub fn target_progress(count: i64, target: i64) -> i64 {
    if target <= 0 {
        0
    } else {
        rounded_ratio(count * 100, target)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FleetSummary {
    pub total_appointments: i64,
    pub doctor_count: usize,
    pub average_per_doctor: i64,
    pub top_performer: Option<String>,
}

pub fn fleet_summary(stats: &[DoctorStatsYtd]) -> FleetSummary {
    let top = stats.iter().fold(None::<&DoctorStatsYtd>, |top, doctor| match top {
        Some(current) if doctor.total_appointments <= current.total_appointments => Some(current),
        _ => Some(doctor),
    });

    FleetSummary {
        total_appointments: stats.iter().map(|s| s.total_appointments).sum(),
        doctor_count: stats.len(),
        average_per_doctor: rounded_mean(stats.iter().map(|s| s.total_appointments)),
        top_performer: top.map(DoctorStatsYtd::display_name),
    }
}
