use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::client::{build_client, send_request, HttpsClient};
use crate::config::validate_base_url;
use crate::error::{LoadError, Result};
use crate::models::dsl_model::{RequestStep, ScenarioConfig};
use crate::models::metrics::{Metrics, MetricsRecorder, RequestSample, RunInfo};
use crate::thresholds::{evaluate_all, ThresholdResult};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub metrics: Metrics,
    pub thresholds: Vec<ThresholdResult>,
    /// False when any threshold was crossed.
    pub passed: bool,
}

/// Runs `config` against `base_url` until its duration elapses or `running`
/// is cleared.
///
/// Request failures never abort the run; they are recorded and only the
/// thresholds decide [`RunSummary::passed`].
pub async fn run_load_test(
    config: ScenarioConfig,
    base_url: String,
    running: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let thresholds = config.validate()?;
    validate_base_url(&base_url)?;

    let client = Arc::new(build_client());
    let config = Arc::new(config);
    let base_url: Arc<str> = Arc::from(base_url);
    let metrics = Arc::new(Mutex::new(MetricsRecorder::new()));

    info!(
        scenario = %config.name,
        target = %base_url,
        vus = config.vus,
        duration = ?config.duration,
        "starting load test"
    );

    if !config.setup.is_empty() {
        debug!(steps = config.setup.len(), "running setup");
        for step in &config.setup {
            execute_step(&client, &base_url, step, config.timeout, &metrics).await;
        }
    }

    let start = Instant::now();
    let end_time = start
        .checked_add(config.duration)
        .ok_or_else(|| LoadError::InvalidConfig("duration is out of range".into()))?;
    let hard_stop = end_time
        .checked_add(config.graceful_stop)
        .ok_or_else(|| LoadError::InvalidConfig("graceful_stop is out of range".into()))?;
    let mut handles = Vec::with_capacity(config.vus as usize);

    for vu in 0..config.vus {
        let client = Arc::clone(&client);
        let config = Arc::clone(&config);
        let base_url = Arc::clone(&base_url);
        let metrics = Arc::clone(&metrics);
        let running = Arc::clone(&running);

        let handle = task::spawn(async move {
            while running.load(Ordering::Relaxed) && Instant::now() < end_time {
                for step in &config.steps {
                    execute_step(&client, &base_url, step, config.timeout, &metrics).await;
                }
                metrics.lock().record_iteration();

                if !config.pause.is_zero() {
                    let resume = Instant::now()
                        .checked_add(config.pause)
                        .map_or(end_time, |t| t.min(end_time));
                    sleep_until(resume).await;
                }
            }
            debug!(vu, "virtual user finished");
        });

        handles.push(handle);
    }

    let mut interrupted = 0;
    for mut handle in handles {
        if timeout_at(hard_stop, &mut handle).await.is_err() {
            handle.abort();
            interrupted += 1;
        }
    }
    if interrupted > 0 {
        warn!(interrupted, "iterations still running after graceful stop were aborted");
    }

    let elapsed = start.elapsed();
    let final_metrics = {
        let mut recorder = metrics.lock();
        recorder.record_interrupted(interrupted);
        recorder.snapshot(&RunInfo {
            scenario: config.name.clone(),
            target_url: base_url.to_string(),
            vus: config.vus,
            elapsed,
        })
    };

    let results = evaluate_all(&thresholds, &final_metrics);
    let passed = results.iter().all(|r| r.passed);
    for result in results.iter().filter(|r| !r.passed) {
        warn!(
            metric = %result.metric,
            expression = %result.expression,
            observed = result.observed,
            "threshold crossed"
        );
    }

    info!(
        requests = final_metrics.total_requests,
        iterations = final_metrics.iterations,
        passed,
        "load test finished"
    );

    Ok(RunSummary {
        metrics: final_metrics,
        thresholds: results,
        passed,
    })
}

/// Issues one request, records its sample and, if the step names one, its check.
async fn execute_step(
    client: &HttpsClient,
    base_url: &str,
    step: &RequestStep,
    max_request_duration: Duration,
    metrics: &Mutex<MetricsRecorder>,
) {
    let request_start = Instant::now();
    let result = timeout(max_request_duration, send_request(client, base_url, step)).await;
    let elapsed = request_start.elapsed().as_secs_f64() * 1000.0;

    let (status_key, bytes, passed) = match result {
        Ok(Ok(response)) => {
            let status = response.status.as_u16();
            debug!(path = %step.path, status, duration_ms = elapsed, "response");
            (status.to_string(), response.bytes, status == step.expected_status)
        }
        Ok(Err(e)) => {
            debug!(path = %step.path, error = %e, duration_ms = elapsed, "request failed");
            (e.status_key().to_string(), 0, false)
        }
        Err(_) => {
            debug!(path = %step.path, duration_ms = elapsed, "request timed out");
            ("TIMEOUT".to_string(), 0, false)
        }
    };

    let mut m = metrics.lock();
    m.record_request(RequestSample {
        duration_ms: elapsed,
        status_key,
        failed: !passed,
        bytes,
    });
    if let Some(check) = &step.check {
        m.record_check(check, passed);
    }
}
