use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use ticketrelay_core::blocks::{Block, MessagePayload};
use ticketrelay_core::ports::{
    Destination, Directory, DirectoryError, DispatchError, Identity, NotificationSink,
};

use crate::endpoints::{EndpointError, SlackEndpoints};

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack {method} returned `{error}`")]
    Api { method: &'static str, error: String },
    #[error("slack {method} response is missing `{field}`")]
    MissingField { method: &'static str, field: &'static str },
    #[error("endpoint answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl SlackApiError {
    /// True when Slack understood the request and refused it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Status { .. })
    }
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    endpoints: SlackEndpoints,
    bot_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfoBody {
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<SlackProfile>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationOpenBody {
    #[serde(default)]
    channel: Option<ChannelRef>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "no_blocks")]
    blocks: &'a [Block],
}

fn no_blocks(blocks: &&[Block]) -> bool {
    blocks.is_empty()
}

impl SlackUser {
    /// Profile display name, then real name, then handle, then the raw id.
    fn display_name(&self) -> String {
        let profile = self.profile.as_ref();
        [
            profile.and_then(|p| p.display_name.as_deref()),
            self.real_name.as_deref(),
            profile.and_then(|p| p.real_name.as_deref()),
            self.name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(self.id.as_str())
        .to_owned()
    }
}

impl SlackApiClient {
    pub fn new(
        endpoints: SlackEndpoints,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("ticketrelay"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder().default_headers(headers).timeout(timeout).build()?;

        Ok(Self { http, endpoints, bot_token })
    }

    pub fn endpoints(&self) -> &SlackEndpoints {
        &self.endpoints
    }

    pub async fn user_identity(&self, user_id: &str) -> Result<Identity, SlackApiError> {
        let body: UserInfoBody = self
            .call("users.info", |url| self.http.post(url).form(&[("user", user_id)]))
            .await?;
        let user = body.user.ok_or(SlackApiError::MissingField { method: "users.info", field: "user" })?;

        Ok(Identity { display_name: user.display_name(), id: user.id })
    }

    /// Opens (or reuses) the direct-message conversation with `user_id`.
    pub async fn open_direct_message(&self, user_id: &str) -> Result<String, SlackApiError> {
        let body: ConversationOpenBody = self
            .call("conversations.open", |url| {
                self.http.post(url).json(&serde_json::json!({ "users": user_id }))
            })
            .await?;

        body.channel
            .map(|channel| channel.id)
            .filter(|id| !id.is_empty())
            .ok_or(SlackApiError::MissingField { method: "conversations.open", field: "channel" })
    }

    pub async fn post_message(
        &self,
        channel: &str,
        payload: &MessagePayload,
    ) -> Result<(), SlackApiError> {
        let request = PostMessageRequest { channel, text: &payload.text, blocks: &payload.blocks };
        let _: Empty =
            self.call("chat.postMessage", |url| self.http.post(url).json(&request)).await?;
        Ok(())
    }

    /// Posts to an incoming webhook or interaction `response_url`.
    pub async fn post_to_endpoint(
        &self,
        url: &str,
        payload: &MessagePayload,
    ) -> Result<(), SlackApiError> {
        let target = self.endpoints.rewrite(url)?;
        let response = self.http.post(&target).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackApiError::Status { status: status.as_u16(), body });
        }

        debug!(event_name = "slack.endpoint.posted", status = status.as_u16(), "endpoint accepted message");
        Ok(())
    }

    async fn call<T, F>(&self, method: &'static str, build: F) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
        F: FnOnce(String) -> reqwest::RequestBuilder,
    {
        let response = build(self.endpoints.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackApiError::Status { status: status.as_u16(), body });
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.ok {
            return Err(SlackApiError::Api {
                method,
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_owned()),
            });
        }
        Ok(envelope.body)
    }
}

#[async_trait]
impl Directory for SlackApiClient {
    async fn resolve(&self, user_ref: &str) -> Result<Identity, DirectoryError> {
        self.user_identity(user_ref).await.map_err(|error| match error {
            SlackApiError::Api { ref error, .. } if error == "user_not_found" => {
                DirectoryError::UnknownUser(user_ref.to_owned())
            }
            other => DirectoryError::Request(other.to_string()),
        })
    }
}

#[async_trait]
impl NotificationSink for SlackApiClient {
    async fn send(
        &self,
        destination: &Destination,
        payload: &MessagePayload,
    ) -> Result<(), DispatchError> {
        let result = match destination {
            Destination::Endpoint(url) => self.post_to_endpoint(url, payload).await,
            Destination::DirectMessage(user_id) => match self.open_direct_message(user_id).await {
                Ok(channel) => self.post_message(&channel, payload).await,
                Err(error) => Err(error),
            },
        };

        result.map_err(|error| {
            warn!(
                event_name = "slack.dispatch.failed",
                destination = %destination,
                error = %error,
                "slack did not accept the message"
            );
            let destination = destination.to_string();
            let reason = error.to_string();
            if error.is_rejection() {
                DispatchError::Rejected { destination, reason }
            } else {
                DispatchError::Request { destination, reason }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use secrecy::SecretString;
    use serde_json::json;

    use ticketrelay_core::blocks::MessagePayload;
    use ticketrelay_core::ports::{Destination, Directory, DirectoryError, DispatchError, NotificationSink};

    use super::SlackApiClient;
    use crate::endpoints::SlackEndpoints;

    fn client(server: &MockServer) -> SlackApiClient {
        let endpoints =
            SlackEndpoints::from_settings(Some(&server.base_url()), None).expect("endpoints");
        SlackApiClient::new(endpoints, SecretString::from("xoxb-test".to_owned()), Duration::from_secs(5))
            .expect("client")
    }

    #[tokio::test]
    async fn resolve_prefers_profile_display_name() {
        let server = MockServer::start_async().await;
        let users_info = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/users.info")
                    .header("authorization", "Bearer xoxb-test")
                    .body_contains("user=U024BE7LH");
                then.status(200).json_body(json!({
                    "ok": true,
                    "user": {
                        "id": "U024BE7LH",
                        "name": "jdoe",
                        "real_name": "Jane Q. Doe",
                        "profile": {"display_name": "Jane Doe", "real_name": "Jane Q. Doe"}
                    }
                }));
            })
            .await;

        let identity = client(&server).resolve("U024BE7LH").await.expect("resolve");

        users_info.assert_async().await;
        assert_eq!(identity.id, "U024BE7LH");
        assert_eq!(identity.display_name, "Jane Doe");
    }

    #[tokio::test]
    async fn resolve_falls_back_to_real_name_then_handle() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/users.info").body_contains("user=U1");
                then.status(200).json_body(json!({
                    "ok": true,
                    "user": {"id": "U1", "name": "sam", "real_name": "Sam Smith", "profile": {"display_name": ""}}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/users.info").body_contains("user=U2");
                then.status(200).json_body(json!({"ok": true, "user": {"id": "U2", "name": "robin"}}));
            })
            .await;

        let client = client(&server);
        assert_eq!(client.resolve("U1").await.expect("U1").display_name, "Sam Smith");
        assert_eq!(client.resolve("U2").await.expect("U2").display_name, "robin");
    }

    #[tokio::test]
    async fn unknown_user_maps_to_directory_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/users.info");
                then.status(200).json_body(json!({"ok": false, "error": "user_not_found"}));
            })
            .await;

        let error = client(&server).resolve("U404").await.expect_err("unknown");
        assert_eq!(error, DirectoryError::UnknownUser("U404".to_owned()));
    }

    #[tokio::test]
    async fn direct_message_opens_conversation_then_posts() {
        let server = MockServer::start_async().await;
        let open = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/conversations.open").body_contains("U024BE7LH");
                then.status(200).json_body(json!({"ok": true, "channel": {"id": "D123"}}));
            })
            .await;
        let post = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat.postMessage")
                    .body_contains("\"channel\":\"D123\"")
                    .body_contains("You have a new ticket");
                then.status(200).json_body(json!({"ok": true, "channel": "D123", "ts": "1.1"}));
            })
            .await;

        client(&server)
            .send(
                &Destination::DirectMessage("U024BE7LH".to_owned()),
                &MessagePayload::text("You have a new ticket"),
            )
            .await
            .expect("dm sent");

        open.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn endpoint_post_is_rewritten_onto_override_host() {
        let server = MockServer::start_async().await;
        let webhook = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/services/T/B/X")
                    .body_contains("\"replace_original\":true");
                then.status(200).body("ok");
            })
            .await;

        client(&server)
            .send(
                &Destination::Endpoint("https://hooks.slack.com/services/T/B/X".to_owned()),
                &MessagePayload::text("hello").replacing_original(),
            )
            .await
            .expect("webhook accepted");

        webhook.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_webhook_maps_to_rejected_dispatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/services/T/B/X");
                then.status(404).body("no_service");
            })
            .await;

        let error = client(&server)
            .send(
                &Destination::Endpoint(format!("{}/services/T/B/X", server.base_url())),
                &MessagePayload::text("hello"),
            )
            .await
            .expect_err("rejected");

        assert!(matches!(error, DispatchError::Rejected { ref reason, .. } if reason.contains("no_service")));
    }
}
