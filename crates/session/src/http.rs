//! HTTP collaborators over the portal REST API.
//!
//! [`ApiClient`] carries the bearer token from the [`TokenStore`] and turns
//! any `401` into an `unauthorized` broadcast, so a request failing deep
//! inside some feature still ends the session. The identity endpoints used
//! while establishing a session opt out of that broadcast and report
//! `Unauthorized` to their caller instead.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use portal_auth::{LoginResponse, User};
use portal_core::{PortalConfig, PortalError, PortalResult, TenantSlug};
use portal_events::UnauthorizedSignal;

use crate::ports::{AuthBackend, TenantBackend, TokenStore};
use crate::tenant::Tenant;

/// Status-to-error mapping applied to non-success responses.
type StatusMapper = fn(StatusCode, Option<String>) -> PortalError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OnUnauthorized {
    Broadcast,
    Report,
}

/// Extract a human-readable message from an error body.
///
/// Understands `{"detail": "..."}` and validation lists of the form
/// `{"detail": [{"msg": "..."}, ...]}`.
pub fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(serde_json::Value::as_str))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    }
}

/// Default mapping from an HTTP failure status to the error taxonomy.
pub fn status_error(status: StatusCode, detail: Option<String>) -> PortalError {
    let message = || detail.clone().unwrap_or_else(|| "request rejected".to_string());
    match status {
        StatusCode::UNAUTHORIZED => PortalError::Unauthorized,
        StatusCode::NOT_FOUND => PortalError::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => PortalError::validation(message()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PortalError::Timeout,
        other => PortalError::unexpected(format!("HTTP {}: {}", other.as_u16(), message())),
    }
}

/// Password change: a wrong current password is `400`, a rejected new one `422`.
fn rotation_error(status: StatusCode, detail: Option<String>) -> PortalError {
    match status {
        StatusCode::BAD_REQUEST => PortalError::invalid_credentials(
            detail.unwrap_or_else(|| "incorrect current password".to_string()),
        ),
        StatusCode::UNPROCESSABLE_ENTITY => PortalError::policy_violation(
            detail.unwrap_or_else(|| "new password rejected".to_string()),
        ),
        _ => status_error(status, detail),
    }
}

/// Credential exchange: every client-side rejection is a credential problem.
fn login_error(status: StatusCode, detail: Option<String>) -> PortalError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PortalError::invalid_credentials(detail.unwrap_or_else(|| "login failed".to_string()))
        }
        _ => status_error(status, detail),
    }
}

fn transport_error(err: reqwest::Error) -> PortalError {
    if err.is_timeout() {
        PortalError::Timeout
    } else {
        PortalError::network(err.to_string())
    }
}

/// JSON client for the portal API.
#[derive(Clone)]
pub struct ApiClient {
    config: PortalConfig,
    client: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
    signal: UnauthorizedSignal,
}

impl core::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base_url", &self.config.api_base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        config: PortalConfig,
        tokens: Arc<dyn TokenStore>,
        signal: UnauthorizedSignal,
    ) -> PortalResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PortalError::unexpected(format!("http client: {e}")))?;
        Ok(Self {
            config,
            client,
            tokens,
            signal,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> PortalResult<T> {
        self.json(self.request(Method::GET, path)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> PortalResult<T> {
        self.json(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> PortalResult<T> {
        self.json(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> PortalResult<T> {
        self.json(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> PortalResult<T> {
        self.json(self.request(Method::DELETE, path)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.config.api_url(path))
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> PortalResult<T> {
        let bearer = self.tokens.get();
        self.exchange(req, bearer.as_deref(), OnUnauthorized::Broadcast, status_error)
            .await
    }

    /// Send `req` and decode a JSON body, mapping failures with `map`.
    async fn exchange<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        bearer: Option<&str>,
        on_unauthorized: OnUnauthorized,
        map: StatusMapper,
    ) -> PortalResult<T> {
        let req = match bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await.map_err(|e| {
            tracing::error!(error = %e, "request failed");
            transport_error(e)
        })?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| PortalError::unexpected(format!("invalid response body: {e}")));
        }

        let url = resp.url().path().to_string();
        let detail = resp.text().await.ok().and_then(|body| error_detail(&body));
        if status == StatusCode::UNAUTHORIZED && on_unauthorized == OnUnauthorized::Broadcast {
            tracing::warn!(%url, "request unauthorized; broadcasting");
            self.signal.broadcast_unauthorized();
        } else {
            tracing::debug!(%url, status = status.as_u16(), "request rejected");
        }
        Err(map(status, detail))
    }
}

#[derive(Serialize)]
struct PasswordChangeBody<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
struct MfaLoginBody<'a> {
    temp_token: &'a str,
    token: &'a str,
}

/// [`AuthBackend`] over the identity endpoints.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    api: ApiClient,
}

impl HttpAuthBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn current_user(&self, token: &str) -> PortalResult<User> {
        let req = self.api.request(Method::GET, "/users/me");
        self.api
            .exchange(req, Some(token), OnUnauthorized::Report, status_error)
            .await
    }

    async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> PortalResult<User> {
        let body = PasswordChangeBody {
            current_password,
            new_password,
        };
        let req = self.api.request(Method::POST, "/users/change-password").json(&body);
        self.api
            .exchange(req, Some(token), OnUnauthorized::Broadcast, rotation_error)
            .await
    }

    async fn login(&self, username: &str, password: &str) -> PortalResult<LoginResponse> {
        let req = self
            .api
            .request(Method::POST, "/login/access-token")
            .form(&[("username", username), ("password", password)]);
        self.api
            .exchange(req, None, OnUnauthorized::Report, login_error)
            .await
    }

    async fn mfa_login(&self, temp_token: &str, code: &str) -> PortalResult<LoginResponse> {
        let body = MfaLoginBody {
            temp_token,
            token: code,
        };
        let req = self.api.request(Method::POST, "/mfa/login").json(&body);
        self.api
            .exchange(req, None, OnUnauthorized::Report, login_error)
            .await
    }
}

/// [`TenantBackend`] over the public tenant directory.
#[derive(Debug, Clone)]
pub struct HttpTenantBackend {
    api: ApiClient,
}

impl HttpTenantBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TenantBackend for HttpTenantBackend {
    async fn get_by_slug(&self, slug: &TenantSlug) -> PortalResult<Tenant> {
        self.api.get(&format!("/tenants/by-slug/{slug}")).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::token_store::MemoryTokenStore;

    #[test]
    fn detail_from_string_and_validation_list() {
        assert_eq!(
            error_detail(r#"{"detail":"Incorrect current password"}"#).as_deref(),
            Some("Incorrect current password")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"loc":["body","new_password"],"msg":"too short"},{"msg":"too common"}]}"#)
                .as_deref(),
            Some("too short; too common")
        );
        assert_eq!(error_detail(r#"{"detail":""}"#), None);
        assert_eq!(error_detail(r#"{"error":"x"}"#), None);
        assert_eq!(error_detail("<html>bad gateway</html>"), None);
    }

    #[test]
    fn default_status_mapping() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, None), PortalError::Unauthorized);
        assert_eq!(status_error(StatusCode::NOT_FOUND, None), PortalError::NotFound);
        assert_eq!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, Some("bad".into())),
            PortalError::validation("bad")
        );
        assert_eq!(status_error(StatusCode::GATEWAY_TIMEOUT, None), PortalError::Timeout);
        assert_eq!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, None),
            PortalError::unexpected("HTTP 500: request rejected")
        );
    }

    #[test]
    fn rotation_statuses_map_to_form_errors() {
        assert_eq!(
            rotation_error(StatusCode::BAD_REQUEST, Some("Incorrect current password".into())),
            PortalError::invalid_credentials("Incorrect current password")
        );
        assert!(matches!(
            rotation_error(StatusCode::UNPROCESSABLE_ENTITY, None),
            PortalError::PolicyViolation(_)
        ));
        assert_eq!(rotation_error(StatusCode::UNAUTHORIZED, None), PortalError::Unauthorized);
    }

    #[test]
    fn login_rejections_are_credential_errors() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert!(matches!(login_error(status, None), PortalError::InvalidCredentials(_)));
        }
        assert!(!login_error(StatusCode::SERVICE_UNAVAILABLE, None).is_transient());
    }

    #[test]
    fn requests_target_the_configured_base() {
        let config = PortalConfig {
            api_base_url: "https://api.portal.example/api/v1".into(),
            ..PortalConfig::default()
        };
        let api = ApiClient::new(
            config,
            Arc::new(MemoryTokenStore::new()),
            UnauthorizedSignal::new(),
        )
        .unwrap();

        let req = api.request(Method::GET, "/tenants/by-slug/acme").build().unwrap();
        assert_eq!(req.url().as_str(), "https://api.portal.example/api/v1/tenants/by-slug/acme");
        assert_eq!(req.method(), &Method::GET);
    }

    #[test]
    fn transport_timeout_is_opt_in() {
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let plain = ApiClient::new(PortalConfig::default(), tokens.clone(), UnauthorizedSignal::new())
            .unwrap();
        assert_eq!(plain.config().request_timeout, None);

        let config = PortalConfig {
            request_timeout: Some(Duration::from_secs(3)),
            ..PortalConfig::default()
        };
        let bounded = ApiClient::new(config, tokens, UnauthorizedSignal::new()).unwrap();
        assert_eq!(bounded.config().request_timeout, Some(Duration::from_secs(3)));
    }
}
