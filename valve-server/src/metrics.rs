//! Simple metrics collection for observability
//!
//! Lightweight atomic counters, exported in Prometheus text format on
//! `GET /metrics`.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use valve::ValveError;

/// How a batch ended, for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every request succeeded and the batch was committed
    Committed,
    /// Rolled back on `QuotaExceeded`
    Denied,
    /// Rolled back on `Unauthorized` or `AdmissionRequired`
    Unauthorized,
    /// Rolled back because a target failed
    TargetFailed,
    /// Rolled back on a bad request (missing or duplicate records, invalid policy)
    Rejected,
    /// Internal failure
    Error,
}

impl From<&ValveError> for BatchStatus {
    fn from(error: &ValveError) -> Self {
        match error {
            ValveError::QuotaExceeded { .. } => BatchStatus::Denied,
            ValveError::Unauthorized(_) | ValveError::AdmissionRequired => {
                BatchStatus::Unauthorized
            }
            ValveError::TargetCallFailed(_) => BatchStatus::TargetFailed,
            ValveError::AlreadyExists(_)
            | ValveError::NotFound(_)
            | ValveError::InvalidPolicy(_) => BatchStatus::Rejected,
            ValveError::Internal(_) => BatchStatus::Error,
        }
    }
}

/// Core metrics collected by the server
pub struct Metrics {
    start_time: Instant,

    pub batches_total: AtomicU64,
    pub batches_committed: AtomicU64,
    pub batches_denied: AtomicU64,
    pub batches_unauthorized: AtomicU64,
    pub batches_target_failed: AtomicU64,
    pub batches_rejected: AtomicU64,
    pub batches_errors: AtomicU64,

    /// Admission checks kept by committed batches
    pub admissions_total: AtomicU64,

    /// Batch latency buckets (in microseconds)
    pub latency_under_1ms: AtomicU64,
    pub latency_under_10ms: AtomicU64,
    pub latency_under_100ms: AtomicU64,
    pub latency_under_1s: AtomicU64,
    pub latency_over_1s: AtomicU64,

    pub latency_sum_micros: AtomicU64,
    pub latency_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            batches_total: AtomicU64::new(0),
            batches_committed: AtomicU64::new(0),
            batches_denied: AtomicU64::new(0),
            batches_unauthorized: AtomicU64::new(0),
            batches_target_failed: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            batches_errors: AtomicU64::new(0),
            admissions_total: AtomicU64::new(0),
            latency_under_1ms: AtomicU64::new(0),
            latency_under_10ms: AtomicU64::new(0),
            latency_under_100ms: AtomicU64::new(0),
            latency_under_1s: AtomicU64::new(0),
            latency_over_1s: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }

    /// Record a finished batch
    ///
    /// `admissions` only counts for committed batches; a rolled back batch
    /// spent nothing.
    pub fn record_batch(&self, status: BatchStatus, latency_us: u64, admissions: u64) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);

        let counter = match status {
            BatchStatus::Committed => {
                self.admissions_total
                    .fetch_add(admissions, Ordering::Relaxed);
                &self.batches_committed
            }
            BatchStatus::Denied => &self.batches_denied,
            BatchStatus::Unauthorized => &self.batches_unauthorized,
            BatchStatus::TargetFailed => &self.batches_target_failed,
            BatchStatus::Rejected => &self.batches_rejected,
            BatchStatus::Error => &self.batches_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        match latency_us {
            0..=999 => self.latency_under_1ms.fetch_add(1, Ordering::Relaxed),
            1000..=9999 => self.latency_under_10ms.fetch_add(1, Ordering::Relaxed),
            10000..=99999 => self.latency_under_100ms.fetch_add(1, Ordering::Relaxed),
            100000..=999999 => self.latency_under_1s.fetch_add(1, Ordering::Relaxed),
            _ => self.latency_over_1s.fetch_add(1, Ordering::Relaxed),
        };

        self.latency_sum_micros
            .fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let _ = writeln!(output, "# HELP valve_uptime_seconds Time since server start in seconds");
        let _ = writeln!(output, "# TYPE valve_uptime_seconds gauge");
        let _ = writeln!(output, "valve_uptime_seconds {}\n", self.uptime_seconds());

        let _ = writeln!(output, "# HELP valve_batches_total Total number of batches processed");
        let _ = writeln!(output, "# TYPE valve_batches_total counter");
        let _ = writeln!(output, "valve_batches_total {}\n", load(&self.batches_total));

        let _ = writeln!(output, "# HELP valve_batches_by_status Batches by final status");
        let _ = writeln!(output, "# TYPE valve_batches_by_status counter");
        for (status, counter) in [
            ("committed", &self.batches_committed),
            ("denied", &self.batches_denied),
            ("unauthorized", &self.batches_unauthorized),
            ("target_failed", &self.batches_target_failed),
            ("rejected", &self.batches_rejected),
            ("error", &self.batches_errors),
        ] {
            let _ = writeln!(
                output,
                "valve_batches_by_status{{status=\"{status}\"}} {}",
                load(counter)
            );
        }
        output.push('\n');

        let _ = writeln!(output, "# HELP valve_admissions_total Admission checks kept by committed batches");
        let _ = writeln!(output, "# TYPE valve_admissions_total counter");
        let _ = writeln!(output, "valve_admissions_total {}\n", load(&self.admissions_total));

        let _ = writeln!(output, "# HELP valve_batch_duration_bucket Batch latency distribution");
        let _ = writeln!(output, "# TYPE valve_batch_duration_bucket histogram");
        let mut cumulative = 0;
        for (le, counter) in [
            ("0.001", &self.latency_under_1ms),
            ("0.01", &self.latency_under_10ms),
            ("0.1", &self.latency_under_100ms),
            ("1", &self.latency_under_1s),
        ] {
            cumulative += load(counter);
            let _ = writeln!(output, "valve_batch_duration_bucket{{le=\"{le}\"}} {cumulative}");
        }
        let _ = writeln!(
            output,
            "valve_batch_duration_bucket{{le=\"+Inf\"}} {}",
            load(&self.latency_count)
        );

        let latency_sum_seconds = load(&self.latency_sum_micros) as f64 / 1_000_000.0;
        let _ = writeln!(output, "valve_batch_duration_sum {latency_sum_seconds:.6}");
        let _ = writeln!(output, "valve_batch_duration_count {}", load(&self.latency_count));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
