use std::env;

use anyhow::Context;
use chrono::NaiveDate;

use crate::bucket::{AllTimeEpoch, BucketOptions};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub carousel_dwell_secs: u64,
    pub dashboard_refresh_secs: u64,
    pub default_weekly_target: i32,
    pub all_time_start: Option<NaiveDate>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to the clinic Postgres instance")?;
        let all_time_start = match env::var("ALL_TIME_START") {
            Ok(value) => Some(
                NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .with_context(|| format!("ALL_TIME_START is not a YYYY-MM-DD date: {value}"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 5),
            carousel_dwell_secs: parsed_or("CAROUSEL_DWELL_SECS", 5),
            dashboard_refresh_secs: parsed_or("DASHBOARD_REFRESH_SECS", 30),
            default_weekly_target: parsed_or("DEFAULT_WEEKLY_TARGET", 80),
            all_time_start,
        })
    }

    /// A doctor's own weekly target, or the configured default.
    pub fn weekly_target(&self, own: Option<i32>) -> i64 {
        i64::from(own.unwrap_or(self.default_weekly_target))
    }

    pub fn bucket_options(&self) -> BucketOptions {
        BucketOptions {
            all_time_epoch: self
                .all_time_start
                .map(AllTimeEpoch::Since)
                .unwrap_or_default(),
        }
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
