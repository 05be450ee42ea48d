//! Tenant slug value object.

use serde::{Deserialize, Serialize};

use crate::error::PortalError;
use crate::value_object::ValueObject;

/// Slug used when no other source names a tenant.
pub const DEFAULT_SLUG: &str = "default";

/// URL-safe name of a tenant, as it appears in `/{slug}/...` routes,
/// `?tenant=` overrides and subdomains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantSlug(String);

impl ValueObject for TenantSlug {}

impl TenantSlug {
    /// Validate a raw slug candidate.
    ///
    /// Surrounding whitespace is ignored. Empty candidates and anything that
    /// would break a route segment are rejected.
    pub fn parse(raw: &str) -> Result<Self, PortalError> {
        let candidate = raw.trim();
        if candidate.is_empty() {
            return Err(PortalError::invalid_id("tenant slug is empty"));
        }
        if candidate
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '&' | '='))
        {
            return Err(PortalError::invalid_id(format!(
                "tenant slug '{candidate}' contains reserved characters"
            )));
        }
        Ok(Self(candidate.to_string()))
    }

    pub fn default_slug() -> Self {
        Self(DEFAULT_SLUG.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_SLUG
    }
}

impl Default for TenantSlug {
    fn default() -> Self {
        Self::default_slug()
    }
}

impl core::fmt::Display for TenantSlug {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for TenantSlug {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TenantSlug {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantSlug> for String {
    fn from(value: TenantSlug) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace() {
        let slug = TenantSlug::parse("  acme ").unwrap();
        assert_eq!(slug.as_str(), "acme");
    }

    #[test]
    fn rejects_empty_and_reserved() {
        assert!(TenantSlug::parse("").is_err());
        assert!(TenantSlug::parse("   ").is_err());
        assert!(TenantSlug::parse("a/b").is_err());
        assert!(TenantSlug::parse("a b").is_err());
    }

    #[test]
    fn default_slug_is_literal_default() {
        assert_eq!(TenantSlug::default().as_str(), "default");
        assert!(TenantSlug::default().is_default());
    }

    #[test]
    fn deserialization_validates() {
        let ok: TenantSlug = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(ok.as_str(), "acme");
        assert!(serde_json::from_str::<TenantSlug>("\"\"").is_err());
    }
}
