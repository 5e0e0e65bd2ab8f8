use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use eventline_store::{CohortEntry, UserEventRow};

/// Bounds on the retention observation window, in days.
pub const MIN_DAYS: i64 = 1;
pub const MAX_DAYS: i64 = 90;

const DAY_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionQuery {
    pub cohort_event: String,
    pub days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub total_cohort: usize,
    pub days: i64,
    pub retention: Vec<RetentionDay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionDay {
    pub day: i64,
    pub users: u64,
    pub percent: f64,
}

/// Count retained users per day offset.
///
/// Day d is measured as whole elapsed days since each user's own cohort entry
/// (their earliest cohort event), floor division. A user counts at most once
/// per day no matter how many events they produced that day; events before a
/// user's own entry (possible when the fetch window starts at the cohort's
/// earliest entry) land on a negative offset and are ignored.
pub fn fold_retention(
    cohort: &[CohortEntry],
    events: &[UserEventRow],
    days: i64,
) -> Vec<RetentionDay> {
    let entries: HashMap<&str, _> = cohort
        .iter()
        .map(|c| (c.user_id.as_str(), c.entered_at))
        .collect();

    let mut counts = vec![0u64; days as usize];
    let mut seen_per_user: HashMap<&str, HashSet<i64>> = HashMap::new();

    for ev in events {
        let Some(entered_at) = entries.get(ev.user_id.as_str()) else {
            continue;
        };
        let offset = (ev.ts - *entered_at).num_seconds().div_euclid(DAY_SECS);
        if (0..days).contains(&offset)
            && seen_per_user
                .entry(ev.user_id.as_str())
                .or_default()
                .insert(offset)
        {
            counts[offset as usize] += 1;
        }
    }

    let cohort_size = cohort.len();
    counts
        .into_iter()
        .enumerate()
        .map(|(day, users)| RetentionDay {
            day: day as i64,
            users,
            percent: if cohort_size > 0 {
                users as f64 / cohort_size as f64
            } else {
                0.0
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(user: &str, ts_secs: i64) -> CohortEntry {
        CohortEntry {
            user_id: user.to_string(),
            entered_at: Utc.timestamp_opt(ts_secs, 0).unwrap(),
        }
    }

    fn ev(user: &str, ts_secs: i64) -> UserEventRow {
        UserEventRow {
            user_id: user.to_string(),
            ts: Utc.timestamp_opt(ts_secs, 0).unwrap(),
        }
    }

    #[test]
    fn two_user_cohort_scenario() {
        // Both sign up at t=0; u1 returns on day 0 and day 2, u2 never does.
        let cohort = vec![entry("u1", 0), entry("u2", 0)];
        let events = vec![ev("u1", 3600), ev("u1", 2 * DAY_SECS + 60)];

        let retention = fold_retention(&cohort, &events, 3);

        assert_eq!(retention[0].users, 1);
        assert_eq!(retention[0].percent, 0.5);
        assert_eq!(retention[1].users, 0);
        assert_eq!(retention[1].percent, 0.0);
        assert_eq!(retention[2].users, 1);
        assert_eq!(retention[2].percent, 0.5);
    }

    #[test]
    fn same_day_events_count_once() {
        let cohort = vec![entry("u1", 0)];
        let events = vec![ev("u1", 100), ev("u1", 200), ev("u1", 300)];

        let retention = fold_retention(&cohort, &events, 2);
        assert_eq!(retention[0].users, 1);
    }

    #[test]
    fn offsets_are_relative_to_each_users_own_entry() {
        // u2 enters one day after u1; an event 1.5 days after the cohort
        // started is day 1 for u1 but day 0 for u2.
        let cohort = vec![entry("u1", 0), entry("u2", DAY_SECS)];
        let events = vec![
            ev("u1", DAY_SECS + DAY_SECS / 2),
            ev("u2", DAY_SECS + DAY_SECS / 2),
        ];

        let retention = fold_retention(&cohort, &events, 2);
        assert_eq!(retention[0].users, 1, "u2 on their own day 0");
        assert_eq!(retention[1].users, 1, "u1 on their day 1");
    }

    #[test]
    fn events_before_a_users_entry_are_ignored() {
        // Event 12h before entry truncates toward zero with naive division;
        // floor semantics must put it on day -1, not day 0.
        let cohort = vec![entry("u1", DAY_SECS)];
        let events = vec![ev("u1", DAY_SECS / 2)];

        let retention = fold_retention(&cohort, &events, 2);
        assert_eq!(retention[0].users, 0);
    }

    #[test]
    fn events_past_the_window_are_ignored() {
        let cohort = vec![entry("u1", 0)];
        let events = vec![ev("u1", 5 * DAY_SECS)];

        let retention = fold_retention(&cohort, &events, 3);
        assert!(retention.iter().all(|d| d.users == 0));
    }

    #[test]
    fn empty_cohort_yields_zero_percentages() {
        let retention = fold_retention(&[], &[], 4);
        assert_eq!(retention.len(), 4);
        assert!(retention.iter().all(|d| d.users == 0 && d.percent == 0.0));
    }
}
