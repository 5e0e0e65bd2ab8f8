use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventline_common::RawTimestamp;
use eventline_store::FirstSeenRow;

/// Per-user conversion detail is capped at this many entries in the report.
pub const SAMPLE_LIMIT: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct FunnelQuery {
    pub steps: Vec<String>,
    #[serde(default)]
    pub from: Option<RawTimestamp>,
    #[serde(default)]
    pub to: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelReport {
    pub total_users: usize,
    pub steps: Vec<StepCount>,
    pub sample: Vec<UserFunnel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepCount {
    pub step: String,
    pub users: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFunnel {
    pub user_id: String,
    pub reached: usize,
    pub dropped_at: Option<usize>,
}

/// Walk the funnel for every user.
///
/// A user reaches step i only if their earliest occurrence of steps[i] is at
/// or after the timestamp at which they reached step i-1. The first step that
/// fails is the drop-off point; later steps are never credited even when
/// present. Users appear in `total_users` only if they produced at least one
/// qualifying row.
pub fn fold_funnel(steps: &[String], rows: &[FirstSeenRow]) -> FunnelReport {
    // user -> (event name -> earliest occurrence). BTreeMap keeps the sample
    // deterministic.
    let mut per_user: BTreeMap<&str, HashMap<&str, DateTime<Utc>>> = BTreeMap::new();
    for row in rows {
        per_user
            .entry(row.user_id.as_str())
            .or_default()
            .insert(row.event_name.as_str(), row.first_ts);
    }

    let mut step_counts: Vec<StepCount> = steps
        .iter()
        .map(|s| StepCount { step: s.clone(), users: 0 })
        .collect();
    let mut sample = Vec::new();

    for (user_id, first_seen) in &per_user {
        let mut last_ts: Option<DateTime<Utc>> = None;
        let mut reached = 0usize;
        let mut dropped_at = None;

        for (i, step) in steps.iter().enumerate() {
            match first_seen.get(step.as_str()) {
                Some(ts) if last_ts.is_none_or(|last| *ts >= last) => {
                    reached += 1;
                    last_ts = Some(*ts);
                }
                _ => {
                    dropped_at = Some(i);
                    break;
                }
            }
        }

        for count in step_counts.iter_mut().take(reached) {
            count.users += 1;
        }
        sample.push(UserFunnel {
            user_id: (*user_id).to_string(),
            reached,
            dropped_at,
        });
    }

    sample.truncate(SAMPLE_LIMIT);
    FunnelReport {
        total_users: per_user.len(),
        steps: step_counts,
        sample,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(user: &str, name: &str, ts_secs: i64) -> FirstSeenRow {
        FirstSeenRow {
            user_id: user.to_string(),
            event_name: name.to_string(),
            first_ts: Utc.timestamp_opt(ts_secs, 0).unwrap(),
        }
    }

    fn steps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn out_of_order_step_is_a_drop_off() {
        // A=10, B=5, C=20: B happened before A, so only A counts.
        let rows = vec![row("u1", "a", 10), row("u1", "b", 5), row("u1", "c", 20)];
        let report = fold_funnel(&steps(&["a", "b", "c"]), &rows);

        assert_eq!(report.steps[0].users, 1);
        assert_eq!(report.steps[1].users, 0);
        assert_eq!(report.steps[2].users, 0);
        assert_eq!(report.sample[0].reached, 1);
        assert_eq!(report.sample[0].dropped_at, Some(1));
    }

    #[test]
    fn two_user_signup_purchase_scenario() {
        let rows = vec![
            row("u1", "signup", 100),
            row("u1", "purchase", 101),
            row("u2", "signup", 100),
        ];
        let report = fold_funnel(&steps(&["signup", "purchase"]), &rows);

        assert_eq!(report.total_users, 2);
        assert_eq!(report.steps[0].step, "signup");
        assert_eq!(report.steps[0].users, 2);
        assert_eq!(report.steps[1].step, "purchase");
        assert_eq!(report.steps[1].users, 1);
    }

    #[test]
    fn equal_timestamps_count_as_progress() {
        // The monotonic rule is >=, not >.
        let rows = vec![row("u1", "a", 50), row("u1", "b", 50)];
        let report = fold_funnel(&steps(&["a", "b"]), &rows);
        assert_eq!(report.steps[1].users, 1);
        assert_eq!(report.sample[0].dropped_at, None);
    }

    #[test]
    fn later_steps_not_credited_after_drop_off() {
        // u1 skips b entirely but has c after a; c must not count.
        let rows = vec![row("u1", "a", 10), row("u1", "c", 20)];
        let report = fold_funnel(&steps(&["a", "b", "c"]), &rows);
        assert_eq!(report.steps[0].users, 1);
        assert_eq!(report.steps[2].users, 0);
        assert_eq!(report.sample[0].dropped_at, Some(1));
    }

    #[test]
    fn users_with_no_qualifying_events_are_absent() {
        let report = fold_funnel(&steps(&["a", "b"]), &[]);
        assert_eq!(report.total_users, 0);
        assert!(report.sample.is_empty());
        assert_eq!(report.steps[0].users, 0);
    }

    #[test]
    fn sample_is_capped_at_twenty() {
        let rows: Vec<_> = (0..30).map(|i| row(&format!("u{i:02}"), "a", 10)).collect();
        let report = fold_funnel(&steps(&["a"]), &rows);
        assert_eq!(report.total_users, 30);
        assert_eq!(report.sample.len(), SAMPLE_LIMIT);
        assert_eq!(report.steps[0].users, 30);
    }
}
