//! Pass/fail rules evaluated against the end-of-run metrics.
//!
//! Expressions follow the familiar `<aggregation> <op> <value>` form, e.g.
//! `p(95)<300` on `http_req_duration` or `rate<0.001` on `http_req_failed`.
//! Durations are compared in milliseconds.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{LoadError, Result};
use crate::models::metrics::Metrics;

pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQS: &str = "http_reqs";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Trend,
    Rate,
    Counter,
}

fn metric_kind(metric: &str) -> Option<MetricKind> {
    match metric {
        HTTP_REQ_DURATION => Some(MetricKind::Trend),
        HTTP_REQ_FAILED | CHECKS => Some(MetricKind::Rate),
        HTTP_REQS | ITERATIONS => Some(MetricKind::Counter),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
    Rate,
    Count,
}

impl Aggregation {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "med" => Some(Self::Med),
            "rate" => Some(Self::Rate),
            "count" => Some(Self::Count),
            _ => {
                let inner = text.strip_prefix("p(")?.strip_suffix(')')?;
                let p: f64 = inner.trim().parse().ok()?;
                (0.0..=100.0).contains(&p).then_some(Self::Percentile(p))
            }
        }
    }

    fn applies_to(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Self::Avg | Self::Min | Self::Max | Self::Med | Self::Percentile(_)
            ),
            MetricKind::Rate => self == Self::Rate,
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    /// Splits the operator off the front of `text`.
    fn split(text: &str) -> Option<(Self, &str)> {
        const OPS: [(&str, Comparison); 6] = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ];
        OPS.iter()
            .find_map(|(token, op)| text.strip_prefix(token).map(|rest| (*op, rest)))
    }

    pub fn holds(self, observed: f64, limit: f64) -> bool {
        match self {
            Self::Lt => observed < limit,
            Self::Le => observed <= limit,
            Self::Gt => observed > limit,
            Self::Ge => observed >= limit,
            Self::Eq => observed == limit,
            Self::Ne => observed != limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self> {
        let invalid = |reason: &str| LoadError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let kind = metric_kind(metric).ok_or_else(|| invalid("unknown metric"))?;

        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        let op_at = compact
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let (agg_text, rest) = compact.split_at(op_at);

        let aggregation =
            Aggregation::parse(agg_text).ok_or_else(|| invalid("unknown aggregation"))?;
        if !aggregation.applies_to(kind) {
            return Err(invalid("aggregation not supported for this metric"));
        }

        let (comparison, value_text) =
            Comparison::split(rest).ok_or_else(|| invalid("unknown comparison operator"))?;
        let limit: f64 = value_text
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| invalid("limit is not a number"))?;

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.to_string(),
            aggregation,
            comparison,
            limit,
        })
    }

    /// Parses every expression. Metrics come out sorted by name; expressions
    /// keep their declared order within a metric.
    pub fn parse_all(thresholds: &BTreeMap<String, Vec<String>>) -> Result<Vec<Self>> {
        thresholds
            .iter()
            .flat_map(|(metric, exprs)| exprs.iter().map(move |e| Self::parse(metric, e)))
            .collect()
    }

    pub fn observe(&self, metrics: &Metrics) -> f64 {
        match (self.metric.as_str(), self.aggregation) {
            (HTTP_REQ_DURATION, Aggregation::Avg) => metrics.avg_response_time,
            (HTTP_REQ_DURATION, Aggregation::Min) => metrics.fastest_response,
            (HTTP_REQ_DURATION, Aggregation::Max) => metrics.slowest_response,
            (HTTP_REQ_DURATION, Aggregation::Med) => metrics.median_response_time,
            (HTTP_REQ_DURATION, Aggregation::Percentile(p)) => metrics.duration_percentile(p),
            (HTTP_REQ_FAILED, _) => metrics.failure_rate,
            (CHECKS, _) => metrics.checks_rate,
            (HTTP_REQS, Aggregation::Count) => metrics.total_requests as f64,
            (HTTP_REQS, _) => metrics.throughput,
            (ITERATIONS, Aggregation::Count) => metrics.iterations as f64,
            (ITERATIONS, _) => metrics.iteration_rate,
            _ => 0.0,
        }
    }

    pub fn evaluate(&self, metrics: &Metrics) -> ThresholdResult {
        let observed = self.observe(metrics);
        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            observed,
            passed: self.comparison.holds(observed, self.limit),
        }
    }
}

pub fn evaluate_all(thresholds: &[Threshold], metrics: &Metrics) -> Vec<ThresholdResult> {
    thresholds.iter().map(|t| t.evaluate(metrics)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metrics::{MetricsRecorder, RequestSample, RunInfo};
    use std::time::Duration;

    fn metrics_with(durations: &[f64], failed: usize) -> Metrics {
        let mut recorder = MetricsRecorder::new();
        for (i, d) in durations.iter().enumerate() {
            recorder.record_request(RequestSample {
                duration_ms: *d,
                status_key: "200".into(),
                failed: i < failed,
                bytes: 0,
            });
        }
        recorder.record_iteration();
        recorder.snapshot(&RunInfo {
            scenario: "t".into(),
            target_url: "http://localhost".into(),
            vus: 1,
            elapsed: Duration::from_secs(1),
        })
    }

    #[test]
    fn parses_declared_expressions() {
        let t = Threshold::parse("http_req_duration", "p(95)<300").unwrap();
        assert_eq!(t.aggregation, Aggregation::Percentile(95.0));
        assert_eq!(t.comparison, Comparison::Lt);
        assert_eq!(t.limit, 300.0);

        let t = Threshold::parse("http_req_failed", "rate < 0.001").unwrap();
        assert_eq!(t.aggregation, Aggregation::Rate);
        assert_eq!(t.limit, 0.001);

        let t = Threshold::parse("http_reqs", "count>=10").unwrap();
        assert_eq!(t.comparison, Comparison::Ge);
        let t = Threshold::parse("checks", "rate!=0").unwrap();
        assert_eq!(t.comparison, Comparison::Ne);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for (metric, expr) in [
            ("http_req_duration", "p95<300"),
            ("http_req_duration", "p(101)<300"),
            ("http_req_duration", "p(95)"),
            ("http_req_duration", "p(95)=<300"),
            ("http_req_duration", "p(95)<fast"),
            ("http_req_duration", "rate<0.1"),
            ("http_req_failed", "p(95)<300"),
            ("http_req_waiting", "avg<10"),
        ] {
            assert!(
                matches!(
                    Threshold::parse(metric, expr),
                    Err(LoadError::InvalidThreshold { .. })
                ),
                "accepted {metric}: {expr}"
            );
        }
    }

    #[test]
    fn p95_threshold_fails_on_slow_tail() {
        let t = Threshold::parse("http_req_duration", "p(95)<300").unwrap();

        let fast: Vec<f64> = vec![50.0; 100];
        assert!(t.evaluate(&metrics_with(&fast, 0)).passed);

        let slow: Vec<f64> = (0..100).map(|i| if i < 90 { 50.0 } else { 450.0 }).collect();
        let result = t.evaluate(&metrics_with(&slow, 0));
        assert!(!result.passed);
        assert_eq!(result.observed, 450.0);
    }

    #[test]
    fn failure_rate_threshold() {
        let t = Threshold::parse("http_req_failed", "rate<0.001").unwrap();
        let durations = vec![10.0; 1000];

        assert!(t.evaluate(&metrics_with(&durations, 0)).passed);

        let result = t.evaluate(&metrics_with(&durations, 1));
        assert_eq!(result.observed, 0.001);
        assert!(!result.passed);
    }

    #[test]
    fn counters_and_rates() {
        let m = metrics_with(&[10.0, 20.0, 30.0], 0);
        let count = Threshold::parse("http_reqs", "count==3").unwrap();
        assert!(count.evaluate(&m).passed);
        let rate = Threshold::parse("http_reqs", "rate>2.5").unwrap();
        assert!(rate.evaluate(&m).passed);
        let iters = Threshold::parse("iterations", "count>0").unwrap();
        assert!(iters.evaluate(&m).passed);
        let max = Threshold::parse("http_req_duration", "max<=30").unwrap();
        assert!(max.evaluate(&m).passed);
    }

    #[test]
    fn parse_all_keeps_declared_order() {
        let mut map = BTreeMap::new();
        map.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<300".to_string(), "avg<100".to_string()],
        );
        let parsed = Threshold::parse_all(&map).unwrap();
        assert_eq!(parsed[0].expression, "p(95)<300");
        assert_eq!(parsed[1].expression, "avg<100");
    }

    #[test]
    fn results_are_grouped_by_metric_name() {
        let mut map = BTreeMap::new();
        map.insert("http_req_failed".to_string(), vec!["rate<0.001".to_string()]);
        map.insert("checks".to_string(), vec!["rate>0.99".to_string()]);
        map.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<300".to_string(), "max<1000".to_string()],
        );
        let parsed = Threshold::parse_all(&map).unwrap();

        let results = evaluate_all(&parsed, &metrics_with(&[10.0, 20.0], 0));
        let order: Vec<(&str, &str)> = results
            .iter()
            .map(|r| (r.metric.as_str(), r.expression.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                ("checks", "rate>0.99"),
                ("http_req_duration", "p(95)<300"),
                ("http_req_duration", "max<1000"),
                ("http_req_failed", "rate<0.001"),
            ]
        );
    }
}
