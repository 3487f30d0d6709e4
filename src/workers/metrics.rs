//! Worker loop metrics tracking, reported periodically to the logs.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

pub struct WorkerMetrics {
    processed: RwLock<HashMap<String, AtomicUsize>>,
    errors: RwLock<HashMap<String, AtomicUsize>>,
    durations: RwLock<HashMap<String, Vec<Duration>>>,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self {
            processed: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
            durations: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_processed_items(&self, worker: &str, count: usize) {
        let mut map = self.processed.write();
        map.entry(worker.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self, worker: &str) {
        let mut map = self.errors.write();
        map.entry(worker.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration(&self, worker: &str, duration: Duration) {
        let mut map = self.durations.write();
        map.entry(worker.to_string()).or_insert_with(Vec::new).push(duration);
    }

    pub fn report(&self) {
        let processed = self.processed.read();
        let errors = self.errors.read();
        let mut has_activity = false;

        for (worker, count) in processed.iter() {
            let processed_count = count.load(Ordering::Relaxed);
            let error_count = errors.get(worker).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0);
            if processed_count > 0 || error_count > 0 {
                info!("worker '{}': processed={}, errors={}", worker, processed_count, error_count);
                has_activity = true;
            }
        }

        if !has_activity {
            info!("outbox/consumer workers idle since last report");
        }

        self.reset_counters();
    }

    fn reset_counters(&self) {
        for (_, count) in self.processed.read().iter() {
            count.store(0, Ordering::Relaxed);
        }
        for (_, count) in self.errors.read().iter() {
            count.store(0, Ordering::Relaxed);
        }
        self.durations.write().clear();
    }
}
