//! [`MessagingGateway`] over the Discord REST API.

use crate::entities::{AnnouncementRef, ChannelId, Eligibility, MessageId, RoleId, TenantId, UserId};
use crate::gateway::content::ENTRY_EMOJI;
use crate::gateway::{GatewayError, MessagingGateway};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10/";

/// Discord caps reaction listings at 100 users per request.
const REACTION_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordMember {
    #[serde(default)]
    roles: Vec<String>,
}

fn parse_snowflake(raw: &str) -> Result<u64, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::Unavailable(format!("malformed snowflake '{raw}'")))
}

pub struct DiscordGateway {
    http_client: reqwest::Client,
    api_base: Url,
    authorization: String,
    self_id: UserId,
}

impl DiscordGateway {
    /// Build the client and look up the bot's own account.
    ///
    /// `api_base` must end with a slash; `timeout` bounds every request.
    pub async fn connect(token: &str, api_base: Url, timeout: Duration) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut gateway = Self {
            http_client,
            api_base,
            authorization: format!("Bot {token}"),
            self_id: UserId(0),
        };

        let me: DiscordUser = Self::send(gateway.request(Method::GET, "users/@me")?)
            .await?
            .json()
            .await?;
        gateway.self_id = UserId(parse_snowflake(&me.id)?);
        info!(bot_id = %gateway.self_id, "Connected to Discord");
        Ok(gateway)
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.api_base
            .join(path)
            .map_err(|e| GatewayError::Unavailable(format!("invalid endpoint '{path}': {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        Ok(self
            .http_client
            .request(method, self.endpoint(path)?)
            .header(AUTHORIZATION, &self.authorization))
    }

    fn reaction_path(announcement: &AnnouncementRef) -> String {
        format!(
            "channels/{}/messages/{}/reactions/{}",
            announcement.channel_id,
            announcement.message_id,
            urlencoding::encode(ENTRY_EMOJI)
        )
    }

    async fn send(request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Unavailable(format!("{status}: {body}")))
    }
}

#[async_trait]
impl MessagingGateway for DiscordGateway {
    fn self_id(&self) -> UserId {
        self.self_id
    }

    async fn post_announcement(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<AnnouncementRef, GatewayError> {
        let message: DiscordMessage = Self::send(
            self.request(Method::POST, &format!("channels/{channel}/messages"))?
                .json(&json!({
                    "content": content,
                    "allowed_mentions": { "parse": ["users"] },
                })),
        )
        .await?
        .json()
        .await?;
        let announcement = AnnouncementRef {
            channel_id: channel,
            message_id: MessageId(parse_snowflake(&message.id)?),
        };

        // Users can still add the reaction themselves if this fails.
        let react = self
            .request(Method::PUT, &format!("{}/@me", Self::reaction_path(&announcement)))?
            .header(CONTENT_LENGTH, 0);
        if let Err(e) = Self::send(react).await {
            warn!(
                announcement = %announcement,
                error = %e,
                "Failed to add entry reaction to announcement"
            );
        }

        Ok(announcement)
    }

    async fn edit_announcement(
        &self,
        announcement: &AnnouncementRef,
        content: &str,
    ) -> Result<(), GatewayError> {
        let path = format!(
            "channels/{}/messages/{}",
            announcement.channel_id, announcement.message_id
        );
        Self::send(
            self.request(Method::PATCH, &path)?
                .json(&json!({ "content": content })),
        )
        .await?;
        Ok(())
    }

    async fn fetch_participants(
        &self,
        announcement: &AnnouncementRef,
    ) -> Result<Vec<UserId>, GatewayError> {
        let path = Self::reaction_path(announcement);
        let mut participants = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut url = self.endpoint(&path)?;
            url.query_pairs_mut()
                .append_pair("limit", &REACTION_PAGE_SIZE.to_string());
            if let Some(after) = &after {
                url.query_pairs_mut().append_pair("after", after);
            }
            let request = self
                .http_client
                .get(url)
                .header(AUTHORIZATION, &self.authorization);
            let page: Vec<DiscordUser> = Self::send(request).await?.json().await?;
            let page_len = page.len();
            after = page.last().map(|u| u.id.clone());

            for user in page.into_iter().filter(|u| !u.bot) {
                participants.push(UserId(parse_snowflake(&user.id)?));
            }
            if page_len < REACTION_PAGE_SIZE {
                break;
            }
        }

        debug!(
            announcement = %announcement,
            count = participants.len(),
            "Fetched giveaway participants"
        );
        Ok(participants)
    }

    async fn is_eligible(
        &self,
        tenant: TenantId,
        user: UserId,
        eligibility: &Eligibility,
    ) -> Result<bool, GatewayError> {
        let Some(required) = eligibility.required_role() else {
            return Ok(true);
        };
        let request = self.request(Method::GET, &format!("guilds/{tenant}/members/{user}"))?;
        let member: DiscordMember = match Self::send(request).await {
            Ok(response) => response.json().await?,
            // Left the server since reacting.
            Err(GatewayError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(member
            .roles
            .iter()
            .filter_map(|r| r.parse().ok().map(RoleId))
            .any(|r| r == required))
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        reply_to: Option<&AnnouncementRef>,
    ) -> Result<(), GatewayError> {
        let mut body = json!({
            "content": content,
            "allowed_mentions": { "parse": ["users"] },
        });
        if let Some(reply_to) = reply_to {
            body["message_reference"] = json!({
                "message_id": reply_to.message_id.to_string(),
                "channel_id": reply_to.channel_id.to_string(),
                "fail_if_not_exists": false,
            });
        }
        Self::send(
            self.request(Method::POST, &format!("channels/{channel}/messages"))?
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
