use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use eventline_common::RawTimestamp;

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsQuery {
    pub event: String,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub from: Option<RawTimestamp>,
    #[serde(default)]
    pub to: Option<RawTimestamp>,
}

/// Time-bucket granularity. Unrecognized interval names fall back to daily
/// rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Daily,
    Hourly,
    Weekly,
}

impl Interval {
    pub fn parse(s: &str) -> Self {
        match s {
            "hourly" => Interval::Hourly,
            "weekly" => Interval::Weekly,
            _ => Interval::Daily,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Hourly => "hourly",
            Interval::Weekly => "weekly",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub event: String,
    pub interval: &'static str,
    pub data: Vec<BucketCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub bucket: String,
    pub count: u64,
}

/// Bucket label for one occurrence.
///
/// Weekly labels use the ISO week-year with a zero-padded week number
/// (`2020-W01` for 2019-12-30), so the week spanning the calendar-year
/// boundary is labeled consistently and labels sort lexicographically.
pub fn bucket_label(interval: Interval, ts: DateTime<Utc>) -> String {
    match interval {
        Interval::Daily => ts.format("%Y-%m-%d").to_string(),
        Interval::Hourly => ts.format("%Y-%m-%dT%H:00:00").to_string(),
        Interval::Weekly => {
            let week = ts.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
    }
}

/// Count occurrences per bucket, ascending by label.
pub fn fold_metrics(timestamps: &[DateTime<Utc>], interval: Interval) -> Vec<BucketCount> {
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
    for ts in timestamps {
        *buckets.entry(bucket_label(interval, *ts)).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(bucket, count)| BucketCount { bucket, count })
        .collect()
}
