use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{LoadError, Result};
use crate::thresholds::Threshold;

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

/// Upper bound for every configured duration.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

fn default_expected_status() -> u16 {
    200
}

/// A complete load-test definition: how much load, for how long, what each
/// virtual user does, and what counts as a passing run.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,

    /// Used when neither `--base-url` nor `BASE_URL` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub vus: u64,

    #[serde(with = "duration_str")]
    pub duration: Duration,

    /// Upper bound for a single request, body included.
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,

    /// Sleep at the end of every iteration.
    #[serde(default, with = "duration_str")]
    pub pause: Duration,

    /// How long in-flight iterations may run past `duration`.
    #[serde(default = "default_graceful_stop", with = "duration_str")]
    pub graceful_stop: Duration,

    /// Metric name to threshold expressions, e.g. `"http_req_duration": ["p(95)<300"]`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,

    /// Requests issued once, before any virtual user starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<RequestStep>,

    /// The iteration body.
    pub steps: Vec<RequestStep>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RequestStep {
    #[serde(default)]
    pub method: HttpMethod,

    /// Appended verbatim to the base URL; may carry its own query string.
    pub path: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,

    /// Name of the status check recorded for this request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", content = "content")]
pub enum Body {
    Json(serde_json::Value),
    Xml(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", content = "credentials")]
pub enum Auth {
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    ApiKey {
        key_name: String,
        key_value: String,
        #[serde(default)]
        add_to: ApiKeyLocation,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

impl RequestStep {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::GET,
            path: path.into(),
            query_params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            auth: None,
            check: None,
            expected_status: default_expected_status(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    pub fn with_check(mut self, name: impl Into<String>, status: u16) -> Self {
        self.check = Some(name.into());
        self.expected_status = status;
        self
    }
}

impl ScenarioConfig {
    /// The review-service smoke load: health probe plus a reviewer lookup,
    /// 20 VUs for 30 s, p95 under 300 ms and under 0.1% failed requests.
    pub fn review_service() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert("http_req_duration".to_string(), vec!["p(95)<300".to_string()]);
        thresholds.insert("http_req_failed".to_string(), vec!["rate<0.001".to_string()]);

        Self {
            name: "review-service".to_string(),
            base_url: None,
            vus: 20,
            duration: Duration::from_secs(30),
            timeout: default_timeout(),
            pause: Duration::from_millis(100),
            graceful_stop: default_graceful_stop(),
            thresholds,
            setup: Vec::new(),
            steps: vec![
                RequestStep::get("/health").with_check("health is 200", 200),
                RequestStep::get("/users/getReview")
                    .with_query("user_id", "u2")
                    .with_check("getReview is 200", 200),
            ],
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: ScenarioConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks everything that can be checked without touching the network
    /// and returns the parsed thresholds.
    pub fn validate(&self) -> Result<Vec<Threshold>> {
        if self.vus == 0 {
            return Err(LoadError::InvalidConfig("vus must be at least 1".into()));
        }
        if self.duration.is_zero() {
            return Err(LoadError::InvalidConfig("duration must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(LoadError::InvalidConfig("timeout must be positive".into()));
        }
        for (field, value) in [
            ("duration", self.duration),
            ("timeout", self.timeout),
            ("pause", self.pause),
            ("graceful_stop", self.graceful_stop),
        ] {
            if value > MAX_DURATION {
                return Err(LoadError::InvalidConfig(format!(
                    "{field} must not exceed {}",
                    format_duration(MAX_DURATION)
                )));
            }
        }
        if self.steps.is_empty() {
            return Err(LoadError::InvalidConfig(
                "scenario needs at least one step".into(),
            ));
        }
        if let Some(step) = self
            .setup
            .iter()
            .chain(self.steps.iter())
            .find(|s| !s.path.is_empty() && !s.path.starts_with('/') && !s.path.starts_with('?'))
        {
            return Err(LoadError::InvalidConfig(format!(
                "step path '{}' must start with '/'",
                step.path
            )));
        }

        Threshold::parse_all(&self.thresholds)
    }
}

/// Parses `"100ms"`, `"30s"`, `"1m30s"`, `"2h"` (also `ns` and `us`); a bare
/// number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || LoadError::InvalidDuration(input.to_string());
    let text = input.trim();
    if text.is_empty() {
        return Err(invalid());
    }

    if let Ok(secs) = text.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return Err(invalid());
        }
        return Duration::try_from_secs_f64(secs).map_err(|_| invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if num_len == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(num_len);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };

        let nanos = (value * nanos_per_unit).round();
        if nanos >= u64::MAX as f64 {
            return Err(invalid());
        }
        total = total
            .checked_add(Duration::from_nanos(nanos as u64))
            .ok_or_else(invalid)?;
        rest = tail;
    }

    Ok(total)
}

pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos % 1_000_000 != 0 {
        return if nanos % 1000 == 0 {
            format!("{}us", nanos / 1000)
        } else {
            format!("{}ns", nanos)
        };
    }
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

mod duration_str {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(f64),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => super::parse_duration(&text).map_err(D::Error::custom),
            Raw::Seconds(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|_| D::Error::custom(format!("invalid duration {secs}"))),
        }
    }
}
