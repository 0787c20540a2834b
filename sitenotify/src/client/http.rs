//! HTTP client configuration and request execution.

use crate::error::{Error, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";

/// User agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("sitenotify/", env!("CARGO_PKG_VERSION"));

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL for API requests.
    pub base_url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read timeout.
    pub read_timeout: Duration,
    /// Custom user agent.
    pub custom_user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(20),
            custom_user_agent: None,
        }
    }
}

impl HttpConfig {
    /// Get the user agent to send.
    pub fn user_agent(&self) -> &str {
        self.custom_user_agent
            .as_deref()
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    /// Resolve an API path to a full URL.
    ///
    /// Relative paths, with or without a leading slash, are taken relative to
    /// the base URL. Absolute URLs pass through.
    pub fn resolve_url(&self, api: &str) -> Result<Url> {
        if api.starts_with("http://") || api.starts_with("https://") {
            return Url::parse(api).map_err(Error::Url);
        }

        let mut base = Url::parse(&self.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        base.join(api.trim_start_matches('/')).map_err(Error::Url)
    }
}

/// Build a reqwest client with the given configuration.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .gzip(true)
        .build()
        .map_err(Error::Network)
}

/// HTTP request executor.
pub struct HttpExecutor<'a> {
    client: &'a Client,
    config: &'a HttpConfig,
}

impl<'a> HttpExecutor<'a> {
    /// Create a new executor.
    pub fn new(client: &'a Client, config: &'a HttpConfig) -> Self {
        Self { client, config }
    }

    /// Build a request with common headers.
    fn build_request(&self, method: Method, url: Url, bearer: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(reqwest::header::USER_AGENT, self.config.user_agent())
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(bearer)
    }

    /// Execute a request and return the response text.
    pub async fn send(
        &self,
        method: Method,
        api: &str,
        query: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
        bearer: &str,
    ) -> Result<String> {
        let url = self.config.resolve_url(api)?;
        debug!(%method, %url, "API request");

        let query: Vec<(&str, &str)> = query
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .copied()
            .collect();

        let mut request = self.build_request(method, url, bearer);
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request.send().await.map_err(Error::Network)?;
        self.handle_response(response).await
    }

    /// Execute a request and deserialize the JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        api: &str,
        query: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
        bearer: &str,
    ) -> Result<T> {
        let text = self.send(method, api, query, form, bearer).await?;
        serde_json::from_str(&text).map_err(Error::Json)
    }

    /// Map the status line to an error, or return the body.
    async fn handle_response(&self, response: Response) -> Result<String> {
        let status = response.status();
        let text = response.text().await.map_err(Error::Network)?;
        trace!(status = status.as_u16(), body = %text, "API response");

        if status.is_success() {
            return Ok(text);
        }

        let message = error_message(&text)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_owned());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Auth(message)),
            _ => Err(Error::api(status.as_u16(), message)),
        }
    }
}

/// Extract the `message` field from a JSON error body.
fn error_message(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}
