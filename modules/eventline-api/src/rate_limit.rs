use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::AppState;

const WINDOW: Duration = Duration::from_secs(60);
/// Prune threshold for the limiter map itself.
const PRUNE_AT: usize = 10_000;

/// Check the sliding one-minute window for a key. Returns true if the request
/// is allowed. Prunes expired entries and records the new request if allowed.
pub fn check_rate_limit(entries: &mut Vec<Instant>, now: Instant, max_per_minute: usize) -> bool {
    let cutoff = now - WINDOW;
    entries.retain(|t| *t > cutoff);
    if entries.len() >= max_per_minute {
        return false;
    }
    entries.push(now);
    true
}

pub async fn allow(state: &AppState, key: &str, max_per_minute: usize) -> bool {
    let mut limiter = state.rate_limiter.lock().await;
    if limiter.len() > PRUNE_AT {
        prune_empty_entries(&mut limiter);
    }
    let entries = limiter.entry(key.to_string()).or_default();
    check_rate_limit(entries, Instant::now(), max_per_minute)
}

fn prune_empty_entries(limiter: &mut HashMap<String, Vec<Instant>>) {
    let cutoff = Instant::now() - WINDOW;
    limiter.retain(|_, entries| {
        entries.retain(|t| *t > cutoff);
        !entries.is_empty()
    });
}
