//! Rolling post-delivery counters backing `/stats`: uptime, total posts,
//! posts in the last hour, and a snapshot of the store's row counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const MINUTE_BUCKETS: usize = 60;

/// Per-table row counts, as reported by [`crate::store::Store::table_counts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub publishers: i64,
    pub subscribers: i64,
    pub links: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub total_posts: u64,
    pub posts_last_hour: u64,
    pub table_counts: TableCounts,
}

/// Delivered-post counter: a running total plus a ring of 60 per-minute
/// buckets so "posts in the last hour" is a windowed sum rather than a
/// separately maintained counter that could drift from the total.
pub struct Stats {
    started_at: Instant,
    total: AtomicU64,
    buckets: [AtomicU64; MINUTE_BUCKETS],
    current_minute: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            current_minute: AtomicU64::new(0),
        }
    }

    /// Records `n` deliveries against the current minute's bucket, clearing
    /// any buckets skipped since the last call (so a minute with zero
    /// activity reads back as zero, not stale data from an hour ago).
    pub fn record(&self, n: u64) {
        if n == 0 {
            return;
        }
        let minute = self.started_at.elapsed().as_secs() / 60;
        let prev = self.current_minute.swap(minute, Ordering::AcqRel);
        let advanced = minute.saturating_sub(prev).min(MINUTE_BUCKETS as u64);
        for step in 1..=advanced {
            let idx = ((prev + step) % MINUTE_BUCKETS as u64) as usize;
            self.buckets[idx].store(0, Ordering::Relaxed);
        }
        let idx = (minute % MINUTE_BUCKETS as u64) as usize;
        self.buckets[idx].fetch_add(n, Ordering::Relaxed);
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, table_counts: TableCounts) -> StatsSnapshot {
        let posts_last_hour = self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).sum();
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            total_posts: self.total.load(Ordering::Relaxed),
            posts_last_hour,
            table_counts,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
