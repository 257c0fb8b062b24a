use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters of one ingestion loop
#[derive(Debug, Default)]
pub struct IngestMetrics {
    frames_ingested: AtomicU64,
    frames_persisted: AtomicU64,
    batches_flushed: AtomicU64,
    storage_errors: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

/// Point-in-time copy of [`IngestMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_ingested: u64,
    pub frames_persisted: u64,
    pub batches_flushed: u64,
    pub storage_errors: u64,
    pub avg_latency_us: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.frames_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_processing(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_ingested(&self) -> u64 {
        self.frames_ingested.load(Ordering::Relaxed)
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_ingested: self.frames_ingested(),
            frames_persisted: self.frames_persisted.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed(),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            avg_latency_us: self.avg_latency_us(),
        }
    }
}
