//! Guild platform gateway
//!
//! This module defines the seam between the moderation core and the Discord
//! API: every ban, kick, timeout, and log message goes through the
//! [`GuildGateway`] trait so the lifecycle can be exercised with fakes.

use crate::moderation::{ModerationError, ModerationResult};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{
    Cache, ChannelId, CreateActionRow, CreateEmbed, CreateMessage, EditMessage, GuildId, Http,
    MessageId, MessageReference, UserId,
};
use std::sync::Arc;
use tracing::info;

/// Platform operations the moderation core needs from a guild
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GuildGateway: Send + Sync {
    /// Ban a user with an audit-log reason
    async fn ban(&self, user_id: UserId, reason: &str) -> ModerationResult<()>;

    /// Lift a user's ban
    async fn unban(&self, user_id: UserId, reason: &str) -> ModerationResult<()>;

    /// Disable a member's communication until the given instant
    async fn timeout_until(&self, user_id: UserId, until: DateTime<Utc>) -> ModerationResult<()>;

    /// Clear a member's communication-disabled state
    async fn clear_timeout(&self, user_id: UserId) -> ModerationResult<()>;

    /// Remove a member from the guild with an audit-log reason
    async fn kick(&self, user_id: UserId, reason: &str) -> ModerationResult<()>;

    /// Post an embed to the moderation log channel, returning the message id
    async fn send_log(
        &self,
        embed: CreateEmbed,
        components: Vec<CreateActionRow>,
    ) -> ModerationResult<MessageId>;

    /// Edit an existing log message in place
    async fn edit_log(&self, message_id: MessageId, embed: CreateEmbed) -> ModerationResult<()>;

    /// Post an embed to the log channel as a reply to an earlier log message
    async fn reply_log(
        &self,
        message_id: MessageId,
        embed: CreateEmbed,
    ) -> ModerationResult<MessageId>;

    /// Send an embed to a user's DMs
    async fn dm_user(&self, user_id: UserId, embed: CreateEmbed) -> ModerationResult<()>;
}

/// [`GuildGateway`] backed by the serenity HTTP client. Member resolution
/// goes through the cache before falling back to a fetch.
pub struct SerenityGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
    guild_id: GuildId,
    log_channel_id: ChannelId,
}

impl SerenityGateway {
    #[must_use]
    pub fn new(
        http: Arc<Http>,
        cache: Arc<Cache>,
        guild_id: GuildId,
        log_channel_id: ChannelId,
    ) -> Self {
        Self {
            http,
            cache,
            guild_id,
            log_channel_id,
        }
    }

    /// Cache-first CacheHttp view over the client
    fn cache_http(&self) -> (&Arc<Cache>, &Http) {
        (&self.cache, &self.http)
    }
}

#[async_trait::async_trait]
impl GuildGateway for SerenityGateway {
    async fn ban(&self, user_id: UserId, reason: &str) -> ModerationResult<()> {
        self.guild_id
            .ban_with_reason(&self.http, user_id, 0, reason)
            .await?;
        info!(user_id = %user_id, guild_id = %self.guild_id, "User banned");
        Ok(())
    }

    async fn unban(&self, user_id: UserId, reason: &str) -> ModerationResult<()> {
        self.guild_id.unban(&self.http, user_id).await?;
        info!(user_id = %user_id, guild_id = %self.guild_id, reason = %reason, "User unbanned");
        Ok(())
    }

    async fn timeout_until(&self, user_id: UserId, until: DateTime<Utc>) -> ModerationResult<()> {
        let mut member = self
            .guild_id
            .member(self.cache_http(), user_id)
            .await
            .map_err(|e| {
                ModerationError::Other(format!(
                    "Failed to get member {user_id} in guild {}: {e}",
                    self.guild_id
                ))
            })?;

        member
            .disable_communication_until_datetime(&self.http, until.into())
            .await?;
        info!(user_id = %user_id, until = %until, "Member timed out");
        Ok(())
    }

    async fn clear_timeout(&self, user_id: UserId) -> ModerationResult<()> {
        let mut member = self
            .guild_id
            .member(self.cache_http(), user_id)
            .await
            .map_err(|e| {
                ModerationError::Other(format!(
                    "Failed to get member {user_id} in guild {}: {e}",
                    self.guild_id
                ))
            })?;

        member.enable_communication(&self.http).await?;
        info!(user_id = %user_id, "Member timeout cleared");
        Ok(())
    }

    async fn kick(&self, user_id: UserId, reason: &str) -> ModerationResult<()> {
        let member = self
            .guild_id
            .member(self.cache_http(), user_id)
            .await
            .map_err(|e| {
                ModerationError::Other(format!(
                    "Failed to get member {user_id} in guild {}: {e}",
                    self.guild_id
                ))
            })?;

        member.kick_with_reason(&self.http, reason).await?;
        info!(user_id = %user_id, guild_id = %self.guild_id, "Member kicked");
        Ok(())
    }

    async fn send_log(
        &self,
        embed: CreateEmbed,
        components: Vec<CreateActionRow>,
    ) -> ModerationResult<MessageId> {
        let mut message = CreateMessage::new().embed(embed);
        if !components.is_empty() {
            message = message.components(components);
        }

        let sent = self
            .log_channel_id
            .send_message(&self.http, message)
            .await?;
        Ok(sent.id)
    }

    async fn edit_log(&self, message_id: MessageId, embed: CreateEmbed) -> ModerationResult<()> {
        self.log_channel_id
            .edit_message(&self.http, message_id, EditMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    async fn reply_log(
        &self,
        message_id: MessageId,
        embed: CreateEmbed,
    ) -> ModerationResult<MessageId> {
        let reference = MessageReference::from((self.log_channel_id, message_id));
        let sent = self
            .log_channel_id
            .send_message(
                &self.http,
                CreateMessage::new().embed(embed).reference_message(reference),
            )
            .await?;
        Ok(sent.id)
    }

    async fn dm_user(&self, user_id: UserId, embed: CreateEmbed) -> ModerationResult<()> {
        let channel = user_id.create_dm_channel(self.cache_http()).await?;
        channel
            .id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }
}
