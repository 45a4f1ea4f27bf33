//! Aggregate statistics over a set of log entries

use super::entry::{HttpMethod, LogEntry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Number of URLs reported in [`LogStats::top_urls`]
pub const TOP_URL_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total_requests: u64,
    pub method_counts: BTreeMap<HttpMethod, u64>,
    pub status_code_counts: BTreeMap<u16, u64>,
    /// Mean of recorded response times in ms, rounded; 0 when none recorded
    pub average_response_time: u64,
    pub top_urls: Vec<UrlCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlCount {
    pub url: String,
    pub count: u64,
}

/// Aggregate `entries` in a single pass
///
/// `top_urls` is ordered by descending count; URLs with equal counts keep
/// the order in which they were first seen.
pub fn compute_stats(entries: &[LogEntry]) -> LogStats {
    let mut method_counts = BTreeMap::new();
    let mut status_code_counts = BTreeMap::new();
    let mut response_time_sum: u128 = 0;
    let mut response_time_count: u64 = 0;

    let mut url_counts: Vec<UrlCount> = Vec::new();
    let mut url_index: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        *method_counts.entry(entry.method).or_insert(0) += 1;

        if let Some(status) = entry.status_code {
            *status_code_counts.entry(status).or_insert(0) += 1;
        }

        if let Some(ms) = entry.response_time {
            response_time_sum += u128::from(ms);
            response_time_count += 1;
        }

        match url_index.get(entry.url.as_str()) {
            Some(&i) => url_counts[i].count += 1,
            None => {
                url_index.insert(entry.url.as_str(), url_counts.len());
                url_counts.push(UrlCount {
                    url: entry.url.clone(),
                    count: 1,
                });
            }
        }
    }

    // stable: ties stay in first-seen order
    url_counts.sort_by(|a, b| b.count.cmp(&a.count));
    url_counts.truncate(TOP_URL_LIMIT);

    LogStats {
        total_requests: entries.len() as u64,
        method_counts,
        status_code_counts,
        average_response_time: rounded_mean(response_time_sum, response_time_count),
        top_urls: url_counts,
    }
}

fn rounded_mean(sum: u128, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let count = u128::from(count);
    // round half up
    ((sum * 2 + count) / (count * 2)) as u64
}
