//! HTTP client and configuration.

mod auth;
mod http;

pub use auth::AuthInfo;
pub use http::{HttpConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};

use crate::api::{BroadcastingApi, NotificationApi};
use crate::error::{Error, Result};
use crate::models::UserId;
use crate::realtime::{PusherTransport, RealtimeConfig};
use http::{build_client, HttpExecutor};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating NotifyClient.
pub struct NotifyClientBuilder {
    auth: Option<AuthInfo>,
    http_config: HttpConfig,
}

impl std::fmt::Debug for NotifyClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyClientBuilder")
            .field("auth", &self.auth.as_ref().map(|a| &a.user_id))
            .field("http_config", &self.http_config)
            .finish()
    }
}

impl Default for NotifyClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            auth: None,
            http_config: HttpConfig::default(),
        }
    }

    /// Set authentication.
    pub fn auth(mut self, token: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        self.auth = Some(AuthInfo::new(token, user_id));
        self
    }

    /// Set authentication from AuthInfo.
    pub fn with_auth(mut self, auth: AuthInfo) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.http_config.base_url = url.into();
        self
    }

    /// Set custom user agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.http_config.custom_user_agent = Some(ua.into());
        self
    }

    /// Set connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.http_config.connect_timeout = timeout;
        self
    }

    /// Set read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.http_config.read_timeout = timeout;
        self
    }

    /// Build NotifyClient.
    pub fn build(self) -> Result<NotifyClient> {
        // Fail early on a base URL nothing could be resolved against.
        self.http_config.resolve_url("")?;
        let http_client = build_client(&self.http_config)?;

        Ok(NotifyClient {
            inner: Arc::new(NotifyClientInner {
                http: http_client,
                config: self.http_config,
                auth: self.auth,
            }),
        })
    }
}

/// Internal client state.
pub(crate) struct NotifyClientInner {
    pub http: reqwest::Client,
    pub config: HttpConfig,
    pub auth: Option<AuthInfo>,
}

impl NotifyClientInner {
    /// Get the bearer token or error.
    pub fn bearer(&self) -> Result<&str> {
        self.auth
            .as_ref()
            .and_then(AuthInfo::credential)
            .ok_or(Error::AuthRequired)
    }

    /// Create HTTP executor.
    pub fn executor(&self) -> HttpExecutor<'_> {
        HttpExecutor::new(&self.http, &self.config)
    }

    /// Execute an authenticated request, returning the raw body.
    pub async fn send(
        &self,
        method: Method,
        api: &str,
        query: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
    ) -> Result<String> {
        let bearer = self.bearer()?;
        self.executor()
            .send(method, api, query, form, bearer)
            .await
    }
}

/// Client for the notification API.
#[derive(Clone)]
pub struct NotifyClient {
    pub(crate) inner: Arc<NotifyClientInner>,
}

impl NotifyClient {
    /// Create a new client builder.
    pub fn builder() -> NotifyClientBuilder {
        NotifyClientBuilder::new()
    }

    /// Get the notification API.
    pub fn notifications(&self) -> NotificationApi {
        NotificationApi::new(self.inner.clone())
    }

    /// Get the channel authorization API.
    pub fn broadcasting(&self, auth_endpoint: impl Into<String>) -> BroadcastingApi {
        BroadcastingApi::new(self.inner.clone(), auth_endpoint)
    }

    /// Create a push transport that authorizes channels through this client.
    pub fn realtime(&self, config: RealtimeConfig) -> PusherTransport {
        let authorizer = self.broadcasting(config.auth_endpoint.clone());
        PusherTransport::new(config, authorizer)
    }

    /// Check if the client is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.inner.auth.as_ref().is_some_and(AuthInfo::is_valid)
    }

    /// Get the current authentication info.
    pub fn auth_info(&self) -> Option<&AuthInfo> {
        self.inner.auth.as_ref()
    }

    /// Get the current user ID if authenticated.
    pub fn current_user(&self) -> Option<&UserId> {
        self.inner.auth.as_ref().map(|a| &a.user_id)
    }

    /// API base URL.
    pub fn base_url(&self) -> &str {
        &self.inner.config.base_url
    }
}

impl std::fmt::Debug for NotifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyClient")
            .field("authenticated", &self.is_authenticated())
            .field("base_url", &self.inner.config.base_url)
            .finish()
    }
}
