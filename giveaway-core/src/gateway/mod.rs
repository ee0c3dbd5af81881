//! Boundary to the chat platform that hosts the giveaways.

pub mod content;
pub mod discord;

use crate::entities::{AnnouncementRef, ChannelId, Eligibility, TenantId, UserId};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use discord::DiscordGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The announcement, channel or member no longer exists.
    #[error("not found on the messaging platform")]
    NotFound,
    #[error("messaging platform unavailable: {0}")]
    Unavailable(String),
    #[error("messaging platform call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Unavailable(e.to_string())
    }
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// The engine's own account, never counted as an entrant.
    fn self_id(&self) -> UserId;

    /// Post the announcement and add the entry reaction to it.
    async fn post_announcement(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<AnnouncementRef, GatewayError>;

    async fn edit_announcement(
        &self,
        announcement: &AnnouncementRef,
        content: &str,
    ) -> Result<(), GatewayError>;

    /// Everyone who reacted with the entry emoji, in platform order.
    async fn fetch_participants(
        &self,
        announcement: &AnnouncementRef,
    ) -> Result<Vec<UserId>, GatewayError>;

    async fn is_eligible(
        &self,
        tenant: TenantId,
        user: UserId,
        eligibility: &Eligibility,
    ) -> Result<bool, GatewayError>;

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        reply_to: Option<&AnnouncementRef>,
    ) -> Result<(), GatewayError>;
}

/// Bound a gateway call by `limit`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| GatewayError::Timeout(limit))?
}
