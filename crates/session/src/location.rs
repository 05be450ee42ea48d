//! Snapshot of the browser location the session layer reasons about.

use std::net::IpAddr;

use url::Url;

use portal_core::{PortalError, PortalResult};

/// Parsed current location: host, path and query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    host: String,
    path: String,
    query: Vec<(String, String)>,
}

impl Location {
    /// Parse an absolute URL such as `https://acme.portal.example/acme/dashboard?tenant=x`.
    pub fn parse(url: &str) -> PortalResult<Self> {
        let parsed = Url::parse(url).map_err(|e| PortalError::invalid_id(format!("location '{url}': {e}")))?;
        Ok(Self::from_url(&parsed))
    }

    /// Build a location from a host and a path that may carry a query string.
    pub fn from_parts(host: &str, path_and_query: &str) -> PortalResult<Self> {
        let path_and_query = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };
        Self::parse(&format!("http://{host}{path_and_query}"))
    }

    fn from_url(url: &Url) -> Self {
        Self {
            host: url.host_str().unwrap_or_default().to_string(),
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First non-empty value of query parameter `key`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// First non-empty path segment.
    pub fn first_segment(&self) -> Option<&str> {
        self.path.split('/').find(|s| !s.is_empty())
    }

    /// Subdomain label usable as a tenant slug.
    ///
    /// Only hosts that are not `localhost`, not a bare IP and have more than
    /// two dot-separated labels qualify; the first label is returned.
    pub fn subdomain(&self) -> Option<&str> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() || host.eq_ignore_ascii_case("localhost") || host.parse::<IpAddr>().is_ok() {
            return None;
        }
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() > 2 {
            labels.first().copied().filter(|l| !l.is_empty())
        } else {
            None
        }
    }
}
