//! Externally supplied configuration.
//!
//! The session layer treats these values as opaque constants; only the HTTP
//! collaborators and the route guard read them.

use std::time::Duration;

use anyhow::Context;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_LOADING_TIMEOUT: Duration = Duration::from_millis(5_000);

pub const ENV_API_URL: &str = "PORTAL_API_URL";
pub const ENV_REALTIME_URL: &str = "PORTAL_REALTIME_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "PORTAL_REQUEST_TIMEOUT_MS";
pub const ENV_LOADING_TIMEOUT_MS: &str = "PORTAL_LOADING_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub api_base_url: String,
    /// Realtime (websocket) endpoint.
    pub realtime_url: String,
    /// Transport-level timeout for HTTP collaborators. Unset by default: a
    /// hung call stalls until the guard's recovery affordance takes over.
    pub request_timeout: Option<Duration>,
    /// How long a guard shows a bare placeholder before offering recovery.
    pub loading_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            realtime_url: realtime_url_for(DEFAULT_API_URL)
                .unwrap_or_else(|_| "ws://localhost:8000/api/v1/ws".to_string()),
            request_timeout: None,
            loading_timeout: DEFAULT_LOADING_TIMEOUT,
        }
    }
}

impl PortalConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup(ENV_API_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_base_url = api_base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&api_base_url)
            .with_context(|| format!("{ENV_API_URL} is not a valid URL: {api_base_url}"))?;

        let realtime_url = match lookup(ENV_REALTIME_URL).filter(|v| !v.trim().is_empty()) {
            Some(explicit) => {
                let explicit = explicit.trim().to_string();
                Url::parse(&explicit)
                    .with_context(|| format!("{ENV_REALTIME_URL} is not a valid URL: {explicit}"))?;
                explicit
            }
            None => realtime_url_for(&api_base_url)?,
        };

        let request_timeout = millis(&lookup, ENV_REQUEST_TIMEOUT_MS)?;
        let loading_timeout = millis(&lookup, ENV_LOADING_TIMEOUT_MS)?.unwrap_or(DEFAULT_LOADING_TIMEOUT);

        tracing::debug!(%api_base_url, %realtime_url, "portal configuration loaded");

        Ok(Self {
            api_base_url,
            realtime_url,
            request_timeout,
            loading_timeout,
        })
    }

    /// Join `path` onto the API base URL.
    pub fn api_url(&self, path: &str) -> String {
        let clean = path.strip_prefix('/').unwrap_or(path);
        format!("{}/{}", self.api_base_url, clean)
    }
}

fn millis<F>(lookup: &F, key: &str) -> anyhow::Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => {
            let ms = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} must be a number of milliseconds, got '{raw}'"))?;
            Ok(Some(Duration::from_millis(ms)))
        }
    }
}

/// Derive the realtime endpoint from the API base: `http→ws`, `https→wss`, `+/ws`.
fn realtime_url_for(api_base_url: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(api_base_url).context("invalid API base URL")?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot derive realtime scheme from {api_base_url}"))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = PortalConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.realtime_url, "ws://localhost:8000/api/v1/ws");
        assert_eq!(config.loading_timeout, Duration::from_millis(5000));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config, PortalConfig::default());
    }

    #[test]
    fn derives_secure_realtime_url() {
        let config =
            PortalConfig::from_lookup(lookup(&[(ENV_API_URL, "https://api.example.com/api/v1/")]))
                .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com/api/v1");
        assert_eq!(config.realtime_url, "wss://api.example.com/api/v1/ws");
    }

    #[test]
    fn explicit_values_win() {
        let config = PortalConfig::from_lookup(lookup(&[
            (ENV_REALTIME_URL, "wss://rt.example.com/socket"),
            (ENV_LOADING_TIMEOUT_MS, "250"),
            (ENV_REQUEST_TIMEOUT_MS, "3000"),
        ]))
        .unwrap();
        assert_eq!(config.realtime_url, "wss://rt.example.com/socket");
        assert_eq!(config.loading_timeout, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(3000)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(PortalConfig::from_lookup(lookup(&[(ENV_API_URL, "not a url")])).is_err());
        assert!(PortalConfig::from_lookup(lookup(&[(ENV_REQUEST_TIMEOUT_MS, "soon")])).is_err());
    }

    #[test]
    fn api_url_joins_paths() {
        let config = PortalConfig::default();
        assert_eq!(config.api_url("/users/me"), "http://localhost:8000/api/v1/users/me");
        assert_eq!(config.api_url("users/me"), "http://localhost:8000/api/v1/users/me");
    }
}
