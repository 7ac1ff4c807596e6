//! Target resolution from the process environment.

use std::collections::HashMap;
use url::Url;

use crate::error::{LoadError, Result};

pub const BASE_URL_ENV: &str = "BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://app:8080";

/// Resolves the target base URL, falling back to [`DEFAULT_BASE_URL`].
///
/// Takes the environment as a plain map so callers (and tests) decide where
/// it comes from. An empty `BASE_URL` counts as unset.
pub fn resolve_base_url(env: &HashMap<String, String>) -> String {
    resolve_base_url_or(env, DEFAULT_BASE_URL)
}

/// Same as [`resolve_base_url`] with a caller-provided fallback.
pub fn resolve_base_url_or(env: &HashMap<String, String>, fallback: &str) -> String {
    let base = env
        .get(BASE_URL_ENV)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback);
    normalize_base_url(base)
}

/// Drops a single trailing slash so `{base}{path}` never doubles it.
pub fn normalize_base_url(base: &str) -> String {
    base.strip_suffix('/').unwrap_or(base).to_string()
}

/// Rejects targets no request could be built against.
pub fn validate_base_url(base: &str) -> Result<Url> {
    let invalid = |reason: &str| LoadError::InvalidUrl {
        url: base.to_string(),
        reason: reason.to_string(),
    };
    if base.trim().is_empty() {
        return Err(invalid("base URL is empty"));
    }
    let url = Url::parse(base).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

pub fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}
