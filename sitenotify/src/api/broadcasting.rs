//! Private channel authorization.

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;

use crate::{
    client::NotifyClientInner,
    error::{Error, Result},
};

/// Default authorization endpoint, relative to the API base.
pub const DEFAULT_AUTH_ENDPOINT: &str = "broadcasting/auth";

/// Signature returned by the authorizer for one socket/channel pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelAuth {
    /// `<app_key>:<signature>` token sent with the subscribe frame.
    pub auth: String,
    /// Presence channel member data, absent for private channels.
    #[serde(default)]
    pub channel_data: Option<String>,
}

/// API for authorizing private push channels.
#[derive(Clone)]
pub struct BroadcastingApi {
    client: Arc<NotifyClientInner>,
    endpoint: String,
}

impl std::fmt::Debug for BroadcastingApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastingApi")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl BroadcastingApi {
    pub(crate) fn new(client: Arc<NotifyClientInner>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Authorize `socket_id` to join `channel` with the session's bearer credential.
    pub async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelAuth> {
        let bearer = self.client.bearer()?;
        self.authorize_with(socket_id, channel, bearer).await
    }

    /// Authorize with an explicit bearer credential.
    pub async fn authorize_with(
        &self,
        socket_id: &str,
        channel: &str,
        bearer: &str,
    ) -> Result<ChannelAuth> {
        let auth: ChannelAuth = self
            .client
            .executor()
            .send_json(
                Method::POST,
                &self.endpoint,
                &[],
                Some(&[("socket_id", socket_id), ("channel_name", channel)]),
                bearer,
            )
            .await?;

        if auth.auth.is_empty() {
            return Err(Error::auth(format!("empty signature for {channel}")));
        }

        Ok(auth)
    }
}
