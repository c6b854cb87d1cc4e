//! Mastodon adapter (reqwest + tokio-tungstenite).
//!
//! Implements the `invitebot-core` reply and streaming ports over the Mastodon
//! REST and streaming APIs. Only the handful of endpoints the bot needs are
//! covered.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use invitebot_core::{
    domain::{Account, Status, StreamChannel},
    errors::Error,
    ports::ReplyPort,
    Result,
};

pub mod stream;

pub use stream::WebSocketTransport;

/// Explicit handle to one Mastodon instance, authenticated as the bot.
#[derive(Clone)]
pub struct MastodonClient {
    base_url: String,
    token: String,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct NewStatus<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_reply_to_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<&'a str>,
}

impl MastodonClient {
    /// `base_url` must include the scheme, e.g. `https://near.social`.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("invitebot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_err(e: reqwest::Error) -> Error {
        Error::External(format!("mastodon request error: {e}"))
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::External(format!(
            "mastodon {what} failed: {status} {}",
            body.chars().take(200).collect::<String>()
        )))
    }

    /// The account the access token belongs to.
    pub async fn verify_credentials(&self) -> Result<Account> {
        let resp = self
            .http
            .get(format!("{}/api/v1/accounts/verify_credentials", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::map_err)?;

        Self::check(resp, "verify_credentials")
            .await?
            .json::<Account>()
            .await
            .map_err(Self::map_err)
    }

    pub async fn post_status(
        &self,
        text: &str,
        in_reply_to_id: Option<&str>,
        visibility: Option<&str>,
    ) -> Result<Status> {
        let body = NewStatus {
            status: text,
            in_reply_to_id,
            visibility,
        };
        let resp = self
            .http
            .post(format!("{}/api/v1/statuses", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_err)?;

        Self::check(resp, "post status")
            .await?
            .json::<Status>()
            .await
            .map_err(Self::map_err)
    }

    /// Streaming endpoint for `channel`, with the access token in the query.
    pub fn streaming_url(&self, channel: StreamChannel) -> Result<reqwest::Url> {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{}", self.base_url)
        };

        let mut url = reqwest::Url::parse(&format!("{ws_base}/api/v1/streaming"))
            .map_err(|e| Error::Config(format!("invalid instance url {}: {e}", self.base_url)))?;
        url.query_pairs_mut()
            .append_pair("access_token", &self.token)
            .append_pair("stream", channel.as_str());
        Ok(url)
    }
}

#[async_trait]
impl ReplyPort for MastodonClient {
    async fn reply(&self, to: &Status, text: &str) -> Result<()> {
        let posted = self
            .post_status(text, Some(&to.id), to.visibility.as_deref())
            .await?;
        tracing::debug!(in_reply_to = %to.id, status_id = %posted.id, "reply posted");
        Ok(())
    }
}
