//! Tenant resolution.
//!
//! The active tenant is derived from ambient context with a fixed precedence
//! (explicit > path > query > subdomain > `"default"`), fetched once per slug
//! and cached by slug. Branding is pushed through [`ThemePort`] as soon as a
//! tenant becomes current.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use portal_auth::is_reserved_segment;
use portal_core::{PortalError, PortalResult, TenantId, TenantSlug};

use crate::location::Location;
use crate::ports::{ActiveTenant, Navigator, TenantBackend, ThemePort};

pub const PRIMARY_BRAND_VAR: &str = "--primary-brand";
pub const ACCENT_BRAND_VAR: &str = "--accent-brand";

/// Query parameter that overrides the tenant.
pub const TENANT_QUERY_PARAM: &str = "tenant";

/// Organisation served by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub slug: TenantSlug,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Tenant {
    /// Theme variables this tenant brands, in application order.
    pub fn branding(&self) -> Vec<(&'static str, &str)> {
        let mut vars = Vec::with_capacity(2);
        if let Some(color) = self.primary_color.as_deref().filter(|c| !c.trim().is_empty()) {
            vars.push((PRIMARY_BRAND_VAR, color));
        }
        if let Some(color) = self.accent_color.as_deref().filter(|c| !c.trim().is_empty()) {
            vars.push((ACCENT_BRAND_VAR, color));
        }
        vars
    }
}

/// Where the effective slug came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugSource {
    Explicit,
    Path,
    Query,
    Subdomain,
    Default,
}

/// Pick the effective tenant slug.
///
/// Candidates that are not valid slugs are skipped, falling through to the
/// next source.
pub fn resolve_slug(explicit: Option<&str>, location: &Location) -> (TenantSlug, SlugSource) {
    let path = location.first_segment().filter(|s| !is_reserved_segment(s));
    let candidates = [
        (explicit, SlugSource::Explicit),
        (path, SlugSource::Path),
        (location.query(TENANT_QUERY_PARAM), SlugSource::Query),
        (location.subdomain(), SlugSource::Subdomain),
    ];

    candidates
        .into_iter()
        .find_map(|(raw, source)| raw.and_then(|r| TenantSlug::parse(r).ok()).map(|slug| (slug, source)))
        .unwrap_or_else(|| (TenantSlug::default_slug(), SlugSource::Default))
}

/// Observable resolver state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantState {
    /// Slug of the most recent resolution request.
    pub slug: Option<TenantSlug>,
    pub tenant: Option<Tenant>,
    pub loading: bool,
    /// Set when the active slug could not be resolved.
    pub error: Option<PortalError>,
}

#[derive(Default)]
struct ResolverSlot {
    state: TenantState,
    cache: HashMap<TenantSlug, Tenant>,
    /// Ticket of the latest fetch; older tickets are stale.
    ticket: u64,
}

struct ResolverInner {
    backend: Arc<dyn TenantBackend>,
    theme: Arc<dyn ThemePort>,
    navigator: Arc<dyn Navigator>,
    slot: Mutex<ResolverSlot>,
}

/// Shared handle to the tenant resolver.
#[derive(Clone)]
pub struct TenantResolver {
    inner: Arc<ResolverInner>,
}

impl core::fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantResolver")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TenantResolver {
    pub fn new(
        backend: Arc<dyn TenantBackend>,
        theme: Arc<dyn ThemePort>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                backend,
                theme,
                navigator,
                slot: Mutex::new(ResolverSlot::default()),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, ResolverSlot> {
        self.inner.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> TenantState {
        self.slot().state.clone()
    }

    pub fn tenant(&self) -> Option<Tenant> {
        self.slot().state.tenant.clone()
    }

    pub fn error(&self) -> Option<PortalError> {
        self.slot().state.error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.slot().state.loading
    }

    /// Whether the last resolution failed because the slug is unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self.slot().state.error, Some(PortalError::NotFound))
    }

    /// Resolve the tenant for the current location.
    ///
    /// Never navigates. A failure is recorded in [`TenantState::error`] and
    /// returned; consumers decide how to render it.
    pub async fn resolve(&self, explicit: Option<&str>) -> PortalResult<Tenant> {
        let location = self.inner.navigator.location();
        let (slug, source) = resolve_slug(explicit, &location);

        let ticket = {
            let mut slot = self.slot();
            slot.state.slug = Some(slug.clone());

            if let Some(cached) = slot.cache.get(&slug).cloned() {
                // Any fetch still in flight is for an older slug now.
                slot.ticket += 1;
                let switched = slot.state.tenant.as_ref() != Some(&cached);
                slot.state.tenant = Some(cached.clone());
                slot.state.loading = false;
                slot.state.error = None;
                drop(slot);

                tracing::debug!(slug = %slug, ?source, "tenant served from cache");
                if switched {
                    self.apply_theme(&cached);
                }
                return Ok(cached);
            }

            slot.ticket += 1;
            slot.state.loading = true;
            slot.state.error = None;
            slot.ticket
        };

        tracing::info!(slug = %slug, ?source, "resolving tenant");
        let result = self.inner.backend.get_by_slug(&slug).await;

        let mut slot = self.slot();
        if let Ok(tenant) = &result {
            slot.cache.insert(slug.clone(), tenant.clone());
        }

        if slot.ticket != ticket {
            tracing::warn!(slug = %slug, "discarding stale tenant resolution");
            return result;
        }

        slot.state.loading = false;
        match result {
            Ok(tenant) => {
                slot.state.tenant = Some(tenant.clone());
                slot.state.error = None;
                drop(slot);
                self.apply_theme(&tenant);
                Ok(tenant)
            }
            Err(err) => {
                // Previously applied branding is left as-is.
                slot.state.tenant = None;
                slot.state.error = Some(err.clone());
                drop(slot);
                match &err {
                    PortalError::NotFound => tracing::warn!(slug = %slug, "tenant not found"),
                    other => tracing::error!(slug = %slug, error = %other, "tenant resolution failed"),
                }
                Err(err)
            }
        }
    }

    fn apply_theme(&self, tenant: &Tenant) {
        for (name, value) in tenant.branding() {
            self.inner.theme.set_variable(name, value);
        }
    }
}

impl ActiveTenant for TenantResolver {
    /// `None` while a different slug is being fetched, so redirects never
    /// target the tenant being left.
    fn resolved_slug(&self) -> Option<TenantSlug> {
        let slot = self.slot();
        slot.state
            .tenant
            .as_ref()
            .filter(|t| slot.state.slug.as_ref() == Some(&t.slug))
            .map(|t| t.slug.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::testing::{RecordingNavigator, RecordingTheme, StubTenantBackend, tenant};

    fn loc(host: &str, path: &str) -> Location {
        Location::from_parts(host, path).unwrap()
    }

    fn resolver(
        backend: &Arc<StubTenantBackend>,
        nav: &Arc<RecordingNavigator>,
        theme: &Arc<RecordingTheme>,
    ) -> TenantResolver {
        TenantResolver::new(backend.clone(), theme.clone(), nav.clone())
    }

    #[test]
    fn precedence_explicit_path_query_subdomain_default() {
        let full = loc("sub.portal.example", "/pathslug/dashboard?tenant=queryslug");
        assert_eq!(resolve_slug(Some("explicit"), &full), (TenantSlug::parse("explicit").unwrap(), SlugSource::Explicit));
        assert_eq!(resolve_slug(None, &full).1, SlugSource::Path);

        let no_path = loc("sub.portal.example", "/?tenant=queryslug");
        assert_eq!(resolve_slug(None, &no_path).0.as_str(), "queryslug");

        let only_host = loc("sub.portal.example", "/");
        assert_eq!(resolve_slug(None, &only_host), (TenantSlug::parse("sub").unwrap(), SlugSource::Subdomain));

        let nothing = loc("localhost:3000", "/");
        assert_eq!(resolve_slug(None, &nothing), (TenantSlug::default_slug(), SlugSource::Default));
    }

    #[test]
    fn reserved_segments_are_not_slugs() {
        let platform = loc("portal.example", "/platform/tenants?tenant=acme");
        assert_eq!(resolve_slug(None, &platform).0.as_str(), "acme");

        let login = loc("portal.example", "/login");
        assert_eq!(resolve_slug(None, &login).1, SlugSource::Default);
    }

    #[test]
    fn invalid_explicit_slug_falls_through() {
        let l = loc("portal.example", "/acme/dashboard");
        assert_eq!(resolve_slug(Some("  "), &l).0.as_str(), "acme");
    }

    proptest! {
        /// Property: with every source present, the highest-precedence one wins.
        #[test]
        fn highest_available_source_wins(
            path in "[a-z]{3,8}",
            query in "[a-z]{3,8}",
            sub in "[a-z]{3,8}",
            has_path in any::<bool>(),
            has_query in any::<bool>(),
            has_sub in any::<bool>(),
        ) {
            prop_assume!(path != "platform" && path != "login");
            let host = if has_sub { format!("{sub}.portal.example") } else { "portal.example".to_string() };
            let mut target = if has_path { format!("/{path}/home") } else { "/".to_string() };
            if has_query {
                target.push_str(&format!("?tenant={query}"));
            }
            let (slug, source) = resolve_slug(None, &loc(&host, &target));

            let expected = if has_path {
                (path.clone(), SlugSource::Path)
            } else if has_query {
                (query.clone(), SlugSource::Query)
            } else if has_sub {
                (sub.clone(), SlugSource::Subdomain)
            } else {
                ("default".to_string(), SlugSource::Default)
            };
            prop_assert_eq!((slug.as_str().to_string(), source), expected);
        }
    }

    #[tokio::test]
    async fn resolves_applies_branding_and_caches() {
        let backend = Arc::new(StubTenantBackend::new([tenant(1, "acme", Some("#112233"), Some("#445566"))]));
        let nav = Arc::new(RecordingNavigator::at("portal.example", "/acme/dashboard"));
        let theme = Arc::new(RecordingTheme::default());
        let resolver = resolver(&backend, &nav, &theme);

        let first = resolver.resolve(None).await.unwrap();
        let second = resolver.resolve(None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls(), 1);
        assert_eq!(
            theme.variables(),
            vec![
                (PRIMARY_BRAND_VAR.to_string(), "#112233".to_string()),
                (ACCENT_BRAND_VAR.to_string(), "#445566".to_string()),
            ]
        );
        assert_eq!(resolver.resolved_slug().unwrap().as_str(), "acme");
        assert!(!resolver.is_loading());
    }

    #[tokio::test]
    async fn missing_colors_are_not_applied() {
        let backend = Arc::new(StubTenantBackend::new([tenant(1, "plain", None, Some("#abcdef"))]));
        let nav = Arc::new(RecordingNavigator::at("portal.example", "/plain"));
        let theme = Arc::new(RecordingTheme::default());

        resolver(&backend, &nav, &theme).resolve(None).await.unwrap();
        assert_eq!(theme.variables(), vec![(ACCENT_BRAND_VAR.to_string(), "#abcdef".to_string())]);
    }

    #[tokio::test]
    async fn unknown_slug_sets_not_found_without_navigating() {
        let backend = Arc::new(StubTenantBackend::new([tenant(1, "acme", Some("#111111"), None)]));
        let nav = Arc::new(RecordingNavigator::at("portal.example", "/acme/dashboard"));
        let theme = Arc::new(RecordingTheme::default());
        let resolver = resolver(&backend, &nav, &theme);
        resolver.resolve(None).await.unwrap();

        nav.set_location("portal.example", "/ghost/dashboard");
        let err = resolver.resolve(None).await.unwrap_err();

        assert_eq!(err, PortalError::NotFound);
        assert!(resolver.is_not_found());
        assert_eq!(resolver.tenant(), None);
        assert!(nav.history().is_empty());
        // The earlier branding stays applied.
        assert_eq!(theme.variables().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let backend = Arc::new(StubTenantBackend::new([]));
        let nav = Arc::new(RecordingNavigator::at("portal.example", "/ghost"));
        let theme = Arc::new(RecordingTheme::default());
        let resolver = resolver(&backend, &nav, &theme);

        assert!(resolver.resolve(None).await.is_err());
        assert!(resolver.resolve(None).await.is_err());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn switching_back_to_cached_slug_reapplies_branding_without_fetch() {
        let backend = Arc::new(StubTenantBackend::new([
            tenant(1, "acme", Some("#aaaaaa"), None),
            tenant(2, "beta", Some("#bbbbbb"), None),
        ]));
        let nav = Arc::new(RecordingNavigator::at("portal.example", "/acme"));
        let theme = Arc::new(RecordingTheme::default());
        let resolver = resolver(&backend, &nav, &theme);

        resolver.resolve(None).await.unwrap();
        nav.set_location("portal.example", "/beta");
        resolver.resolve(None).await.unwrap();
        nav.set_location("portal.example", "/acme");
        let back = resolver.resolve(None).await.unwrap();

        assert_eq!(back.slug.as_str(), "acme");
        assert_eq!(backend.calls(), 2);
        assert_eq!(theme.last_value(PRIMARY_BRAND_VAR).as_deref(), Some("#aaaaaa"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_result_does_not_overwrite_newer_slug() {
        let backend = Arc::new(StubTenantBackend::new([
            tenant(1, "slow", Some("#000001"), None),
            tenant(2, "fast", Some("#000002"), None),
        ]));
        backend.delay("slow", Duration::from_millis(500));
        let nav = Arc::new(RecordingNavigator::at("portal.example", "/slow"));
        let theme = Arc::new(RecordingTheme::default());
        let resolver = resolver(&backend, &nav, &theme);

        let slow = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve(None).await })
        };
        tokio::task::yield_now().await;

        nav.set_location("portal.example", "/fast");
        resolver.resolve(None).await.unwrap();

        let late = slow.await.unwrap().unwrap();
        assert_eq!(late.slug.as_str(), "slow");
        assert_eq!(resolver.tenant().unwrap().slug.as_str(), "fast");
        assert_eq!(theme.last_value(PRIMARY_BRAND_VAR).as_deref(), Some("#000002"));
        assert_eq!(resolver.state().slug.unwrap().as_str(), "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn previous_tenant_is_not_reported_while_switching() {
        let backend = Arc::new(StubTenantBackend::new([
            tenant(1, "acme", Some("#000001"), None),
            tenant(2, "globex", Some("#000002"), None),
        ]));
        backend.delay("globex", Duration::from_millis(500));
        let nav = Arc::new(RecordingNavigator::at("portal.example", "/acme"));
        let theme = Arc::new(RecordingTheme::default());
        let resolver = resolver(&backend, &nav, &theme);

        resolver.resolve(None).await.unwrap();
        assert_eq!(resolver.resolved_slug().unwrap().as_str(), "acme");

        nav.set_location("portal.example", "/globex");
        let switching = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve(None).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(resolver.resolved_slug(), None);

        switching.await.unwrap().unwrap();
        assert_eq!(resolver.resolved_slug().unwrap().as_str(), "globex");
    }
}
