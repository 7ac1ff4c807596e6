use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

impl CheckCounts {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// One finished request as seen by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSample {
    pub duration_ms: f64,
    /// Status code as text, or `REQUEST_ERROR` / `TIMEOUT`.
    pub status_key: String,
    pub failed: bool,
    pub bytes: u64,
}

/// Static facts about the run needed to turn raw counts into rates.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub scenario: String,
    pub target_url: String,
    pub vus: u64,
    pub elapsed: Duration,
}

/// Live accumulator shared by all virtual users.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    response_times: Vec<f64>,
    total_requests: u64,
    failed_requests: u64,
    bytes_received: u64,
    status_counts: BTreeMap<String, u64>,
    checks: BTreeMap<String, CheckCounts>,
    iterations: u64,
    interrupted_iterations: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&mut self, sample: RequestSample) {
        self.total_requests += 1;
        if sample.failed {
            self.failed_requests += 1;
        }
        self.bytes_received += sample.bytes;
        self.response_times.push(sample.duration_ms);
        *self.status_counts.entry(sample.status_key).or_insert(0) += 1;
    }

    pub fn record_check(&mut self, name: &str, passed: bool) {
        let counts = self.checks.entry(name.to_string()).or_default();
        if passed {
            counts.passes += 1;
        } else {
            counts.fails += 1;
        }
    }

    pub fn record_iteration(&mut self) {
        self.iterations += 1;
    }

    pub fn record_interrupted(&mut self, count: u64) {
        self.interrupted_iterations += count;
    }

    pub fn snapshot(&self, info: &RunInfo) -> Metrics {
        let mut sorted = self.response_times.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let elapsed_secs = info.elapsed.as_secs_f64();
        let per_second = |count: u64| {
            if elapsed_secs > 0.0 {
                count as f64 / elapsed_secs
            } else {
                0.0
            }
        };

        let (check_passes, check_total) = self
            .checks
            .values()
            .fold((0, 0), |(p, t), c| (p + c.passes, t + c.total()));

        Metrics {
            scenario: info.scenario.clone(),
            target_url: info.target_url.clone(),
            vus: info.vus,
            duration_secs: elapsed_secs,

            total_requests: self.total_requests,
            successful_requests: self.total_requests - self.failed_requests,
            failed_requests: self.failed_requests,
            failure_rate: ratio(self.failed_requests, self.total_requests),

            fastest_response: sorted.first().copied().unwrap_or(0.0),
            slowest_response: sorted.last().copied().unwrap_or(0.0),
            avg_response_time: mean(&sorted),
            median_response_time: calculate_median(&sorted),
            p90_response_time: percentile(&sorted, 90.0),
            p95_response_time: percentile(&sorted, 95.0),

            throughput: per_second(self.total_requests),
            bytes_received: self.bytes_received,

            iterations: self.iterations,
            interrupted_iterations: self.interrupted_iterations,
            iteration_rate: per_second(self.iterations),

            checks: self.checks.clone(),
            checks_rate: ratio(check_passes, check_total),

            status_counts: self.status_counts.clone(),
            timestamp: chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),

            response_times: sorted,
        }
    }
}

/// End-of-run view of everything the recorder saw. Durations are in
/// milliseconds.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Metrics {
    pub scenario: String,
    pub target_url: String,
    pub vus: u64,
    pub duration_secs: f64,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub failure_rate: f64,

    pub fastest_response: f64,
    pub slowest_response: f64,
    pub avg_response_time: f64,
    pub median_response_time: f64,
    pub p90_response_time: f64,
    pub p95_response_time: f64,

    pub throughput: f64,
    pub bytes_received: u64,

    pub iterations: u64,
    pub interrupted_iterations: u64,
    pub iteration_rate: f64,

    pub checks: BTreeMap<String, CheckCounts>,
    pub checks_rate: f64,

    pub status_counts: BTreeMap<String, u64>,
    pub timestamp: String,

    #[serde(skip)]
    response_times: Vec<f64>,
}

impl Metrics {
    pub fn duration_percentile(&self, p: f64) -> f64 {
        percentile(&self.response_times, p)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Linear interpolation between the closest ranks. `sorted` must be ascending.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
        }
    }
}

pub fn calculate_median(sorted: &[f64]) -> f64 {
    percentile(sorted, 50.0)
}
