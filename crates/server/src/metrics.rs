//! l2met-style counter lines, emitted through tracing so any subscriber
//! (or a log drain) can pick them up.

use tracing::info;

pub(crate) fn count(metric: &str) {
    count_many(metric, 1);
}

pub(crate) fn count_many(metric: &str, count: i64) {
    info!(target: "metrics", "count#{metric}={count}");
}
