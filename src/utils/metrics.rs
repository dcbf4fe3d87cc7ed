use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency samples kept for the percentiles; older samples are dropped
const LATENCY_WINDOW: usize = 1000;

/// Global metrics collector for the application.
///
/// Tracks task lifecycle, per-file outcomes, backend reliability and
/// extraction latency. Thread-safe and can be shared across the application.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Task Metrics
    tasks_submitted: AtomicUsize,
    tasks_rejected: AtomicUsize,
    tasks_completed: AtomicUsize,
    tasks_failed: AtomicUsize,
    tasks_expired: AtomicUsize,

    // File Metrics
    files_processed: AtomicUsize,
    files_failed: AtomicUsize,
    extraction_latency_ms: RwLock<VecDeque<u64>>,

    // Per-backend call counters
    backend_counters: DashMap<String, BackendCounters>,

    // Per-endpoint request counters
    endpoint_counters: DashMap<String, AtomicUsize>,

    // Start time for uptime calculation
    start_time: Instant,
}

#[derive(Default)]
struct BackendCounters {
    success: AtomicUsize,
    failure: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                tasks_submitted: AtomicUsize::new(0),
                tasks_rejected: AtomicUsize::new(0),
                tasks_completed: AtomicUsize::new(0),
                tasks_failed: AtomicUsize::new(0),
                tasks_expired: AtomicUsize::new(0),
                files_processed: AtomicUsize::new(0),
                files_failed: AtomicUsize::new(0),
                extraction_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                backend_counters: DashMap::new(),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Task Metrics
    pub fn record_task_submitted(&self) {
        self.inner.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_rejected(&self) {
        self.inner.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_completed(&self) {
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.inner.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tasks_expired(&self, count: usize) {
        self.inner.tasks_expired.fetch_add(count, Ordering::Relaxed);
    }

    // File Metrics
    pub fn record_file(&self, success: bool, duration: Duration) {
        if success {
            self.inner.files_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.files_failed.fetch_add(1, Ordering::Relaxed);
        }
        let mut latency = self.inner.extraction_latency_ms.write();
        if latency.len() == LATENCY_WINDOW {
            latency.pop_front();
        }
        latency.push_back(duration.as_millis() as u64);
    }

    // Backend Metrics
    pub fn record_backend_call(&self, backend: &str, success: bool) {
        let counters = self
            .inner
            .backend_counters
            .entry(backend.to_string())
            .or_default();
        if success {
            counters.success.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Endpoint Metrics
    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.extraction_latency_ms.read();
        let latency_avg = avg(&latency);
        let latency_p50 = percentile(&latency, 0.5);
        let latency_p95 = percentile(&latency, 0.95);
        drop(latency);

        let backends = self
            .inner
            .backend_counters
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    BackendSnapshot {
                        success: entry.value().success.load(Ordering::Relaxed),
                        failure: entry.value().failure.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();

        let endpoints = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            tasks_submitted: self.inner.tasks_submitted.load(Ordering::Relaxed),
            tasks_rejected: self.inner.tasks_rejected.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.inner.tasks_failed.load(Ordering::Relaxed),
            tasks_expired: self.inner.tasks_expired.load(Ordering::Relaxed),
            files_processed: self.inner.files_processed.load(Ordering::Relaxed),
            files_failed: self.inner.files_failed.load(Ordering::Relaxed),
            extraction_latency_avg_ms: latency_avg,
            extraction_latency_p50_ms: latency_p50,
            extraction_latency_p95_ms: latency_p95,
            backends,
            endpoints,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP ocr_tasks_submitted_total Tasks accepted for processing
# TYPE ocr_tasks_submitted_total counter
ocr_tasks_submitted_total {}

# HELP ocr_tasks_rejected_total Submissions rejected because the server was busy
# TYPE ocr_tasks_rejected_total counter
ocr_tasks_rejected_total {}

# HELP ocr_tasks_completed_total Tasks that reached the completed state
# TYPE ocr_tasks_completed_total counter
ocr_tasks_completed_total {}

# HELP ocr_tasks_failed_total Tasks aborted with an error
# TYPE ocr_tasks_failed_total counter
ocr_tasks_failed_total {}

# HELP ocr_tasks_expired_total Task records removed by the retention sweep
# TYPE ocr_tasks_expired_total counter
ocr_tasks_expired_total {}

# HELP ocr_files_processed_total Files that produced extracted text
# TYPE ocr_files_processed_total counter
ocr_files_processed_total {}

# HELP ocr_files_failed_total Files that ended with an error placeholder
# TYPE ocr_files_failed_total counter
ocr_files_failed_total {}

# HELP ocr_extraction_latency_avg_ms Average per-file processing time in milliseconds
# TYPE ocr_extraction_latency_avg_ms gauge
ocr_extraction_latency_avg_ms {}

# HELP ocr_uptime_seconds Application uptime in seconds
# TYPE ocr_uptime_seconds counter
ocr_uptime_seconds {}

# HELP ocr_backend_calls_total Recognition backend invocations by outcome
# TYPE ocr_backend_calls_total counter
"#,
            snapshot.tasks_submitted,
            snapshot.tasks_rejected,
            snapshot.tasks_completed,
            snapshot.tasks_failed,
            snapshot.tasks_expired,
            snapshot.files_processed,
            snapshot.files_failed,
            snapshot.extraction_latency_avg_ms,
            snapshot.uptime_seconds,
        );

        for (backend, counts) in &snapshot.backends {
            let _ = writeln!(
                out,
                "ocr_backend_calls_total{{backend=\"{}\",outcome=\"success\"}} {}",
                backend, counts.success
            );
            let _ = writeln!(
                out,
                "ocr_backend_calls_total{{backend=\"{}\",outcome=\"failure\"}} {}",
                backend, counts.failure
            );
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSnapshot {
    pub success: usize,
    pub failure: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tasks_submitted: usize,
    pub tasks_rejected: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_expired: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub extraction_latency_avg_ms: u64,
    pub extraction_latency_p50_ms: u64,
    pub extraction_latency_p95_ms: u64,
    pub backends: BTreeMap<String, BackendSnapshot>,
    pub endpoints: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &VecDeque<u64>, p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = values.iter().copied().collect();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &VecDeque<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
