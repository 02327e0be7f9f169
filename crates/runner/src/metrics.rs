use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use index::BatchStats;
use relations::PassReport;
use serde::Serialize;

/// Counters and stage timings for one runner invocation.
pub struct Metrics {
    documents_processed: AtomicUsize,
    documents_quarantined: AtomicUsize,
    mentions: AtomicUsize,
    entities_created: AtomicUsize,
    relations: AtomicUsize,
    claims: AtomicUsize,

    // Timing (in microseconds)
    extract_time_us: AtomicU64,
    graph_time_us: AtomicU64,
    recalibrate_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            documents_processed: AtomicUsize::new(0),
            documents_quarantined: AtomicUsize::new(0),
            mentions: AtomicUsize::new(0),
            entities_created: AtomicUsize::new(0),
            relations: AtomicUsize::new(0),
            claims: AtomicUsize::new(0),
            extract_time_us: AtomicU64::new(0),
            graph_time_us: AtomicU64::new(0),
            recalibrate_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_extract(&self, duration: Duration, stats: &BatchStats) {
        self.extract_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.documents_processed.fetch_add(stats.documents, Ordering::Relaxed);
        self.documents_quarantined.fetch_add(stats.quarantined, Ordering::Relaxed);
        self.mentions.fetch_add(stats.mentions, Ordering::Relaxed);
        self.entities_created.fetch_add(stats.entities_created, Ordering::Relaxed);
    }

    pub fn record_graph(&self, duration: Duration, report: &PassReport) {
        self.graph_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.relations.fetch_add(report.relations.relations, Ordering::Relaxed);
        if let Some(claims) = &report.claims {
            self.claims.fetch_add(claims.inserted, Ordering::Relaxed);
        }
    }

    pub fn record_recalibrate(&self, duration: Duration) {
        self.recalibrate_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_quarantined: self.documents_quarantined.load(Ordering::Relaxed),
            mentions: self.mentions.load(Ordering::Relaxed),
            entities_created: self.entities_created.load(Ordering::Relaxed),
            relations: self.relations.load(Ordering::Relaxed),
            claims: self.claims.load(Ordering::Relaxed),
            extract_time_ms: as_ms(&self.extract_time_us),
            graph_time_ms: as_ms(&self.graph_time_us),
            recalibrate_time_ms: as_ms(&self.recalibrate_time_us),
        }
    }
}

fn as_ms(total_us: &AtomicU64) -> f64 {
    total_us.load(Ordering::Relaxed) as f64 / 1000.0
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub documents_processed: usize,
    pub documents_quarantined: usize,
    pub mentions: usize,
    pub entities_created: usize,
    pub relations: usize,
    pub claims: usize,
    pub extract_time_ms: f64,
    pub graph_time_ms: f64,
    pub recalibrate_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accumulates_batches() {
        let metrics = Metrics::new();
        let stats = BatchStats {
            documents: 3,
            quarantined: 1,
            mentions: 7,
            entities_created: 4,
            ..Default::default()
        };

        metrics.record_extract(Duration::from_millis(2), &stats);
        metrics.record_extract(Duration::from_millis(3), &stats);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 6);
        assert_eq!(snapshot.documents_quarantined, 2);
        assert_eq!(snapshot.mentions, 14);
        assert_eq!(snapshot.extract_time_ms, 5.0);
        assert_eq!(snapshot.claims, 0);
    }
}
