use crate::data::Data;
use crate::moderation::{InfractionLifecycle, embeds};
use poise::serenity_prelude::{
    self as serenity, ChannelId, ComponentInteraction, Context, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, EditChannel, EditMessage, EventHandler,
    GuildId, Interaction, Member, Ready, RoleId,
};
use tracing::{error, info, warn};

pub struct Handler;

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    /// Welcome flow: greet the member, grant configured roles, and refresh
    /// the member-count channel.
    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let Some(data) = get_data(&ctx).await else {
            return;
        };

        let record = data.guild_record(member.guild_id);

        if let Some(channel_id) = record.welcome_channel_id {
            if let Err(e) = send_welcome_message(&ctx, ChannelId::new(channel_id), &member).await {
                warn!(user_id = %member.user.id, error = %e, "Failed to send welcome message");
            }
        }

        for role_id in &record.new_member_roles {
            if let Err(e) = member.add_role(&ctx.http, RoleId::new(*role_id)).await {
                warn!(
                    user_id = %member.user.id,
                    role_id = %role_id,
                    error = %e,
                    "Failed to grant welcome role"
                );
            }
        }

        if let Some(channel_id) = record.member_count_channel_id {
            update_member_count_channel(&ctx, member.guild_id, ChannelId::new(channel_id)).await;
        }

        // Seed the economy record so the member shows up on the leaderboard.
        let user = data
            .store
            .get_or_default_user(member.user.id.get(), data.config.starting_balance);
        if let Err(e) = data.store.save_user(user).await {
            warn!(user_id = %member.user.id, error = %e, "Failed to seed user record");
        }
    }

    /// Routes component interactions: currently only the authorize button on
    /// pending-approval infraction logs.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            if component.data.custom_id == embeds::AUTHORIZE_BUTTON_ID {
                if let Err(e) = handle_authorize_button(&ctx, &component).await {
                    error!(error = %e, "Failed to handle authorize button");
                }
            }
        }
    }
}

/// Fetch the shared bot data out of serenity's type map
async fn get_data(ctx: &Context) -> Option<Data> {
    let data = ctx.data.read().await.get::<Data>().cloned();
    if data.is_none() {
        warn!("Bot data not yet available for event");
    }
    data
}

async fn send_welcome_message(
    ctx: &Context,
    channel_id: ChannelId,
    member: &Member,
) -> Result<(), serenity::Error> {
    channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .content(format!("<@{}>", member.user.id))
                .embed(
                    CreateEmbed::new()
                        .title("Welcome!")
                        .description(format!(
                            "Welcome to the server, <@{}> 👋. Say hi in here!",
                            member.user.id
                        )),
                ),
        )
        .await?;
    Ok(())
}

/// Rename the configured channel to show the current member count
async fn update_member_count_channel(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) {
    let member_count = ctx
        .cache
        .guild(guild_id)
        .map(|guild| guild.member_count);

    let Some(member_count) = member_count else {
        return;
    };

    if let Err(e) = channel_id
        .edit(&ctx.http, EditChannel::new().name(format!("Members: {member_count}")))
        .await
    {
        warn!(channel_id = %channel_id, error = %e, "Failed to update member count channel");
    }
}

/// A moderator with the required permission pressed "Authorize" on a
/// pending-approval infraction log: administer the stored punishment and
/// strip the button from the message.
async fn handle_authorize_button(
    ctx: &Context,
    component: &ComponentInteraction,
) -> Result<(), crate::Error> {
    let Some(data) = get_data(ctx).await else {
        return Ok(());
    };
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    // The infraction id travels in the log embed's footer.
    let infraction_id = component
        .message
        .embeds
        .first()
        .and_then(|embed| embed.footer.as_ref())
        .map(|footer| footer.text.clone());

    let Some(infraction_id) = infraction_id else {
        respond_ephemeral(ctx, component, "I cannot tell which infraction this is 😥.").await?;
        return Ok(());
    };

    let approver_permissions = component
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .unwrap_or_default();

    let gateway = data.gateway(ctx, guild_id, component.channel_id);
    let lifecycle =
        InfractionLifecycle::new(&data.store, &data.scheduler, &gateway, guild_id.get());

    match lifecycle
        .authorize_punishment(&infraction_id, approver_permissions)
        .await
    {
        Ok(_) => {
            respond_ephemeral(ctx, component, "Punishment administered 🎉!").await?;

            // Remove the button so the punishment cannot be authorized twice.
            component
                .channel_id
                .edit_message(
                    &ctx.http,
                    component.message.id,
                    EditMessage::new().components(Vec::new()),
                )
                .await?;
        }
        Err(e) => {
            respond_ephemeral(ctx, component, format!("Could not authorize: {e} 😔.")).await?;
        }
    }

    Ok(())
}

async fn respond_ephemeral(
    ctx: &Context,
    component: &ComponentInteraction,
    content: impl Into<String>,
) -> Result<(), serenity::Error> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content.into())
                    .ephemeral(true),
            ),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test the Handler struct can be created
    #[test]
    fn test_handler_creation() {
        let _handler = Handler;
    }

    // Since we can't easily mock Context and Ready objects due to their complex structure,
    // we'll test what we can about our handler implementation.
    #[test]
    fn test_handler_implements_event_handler() {
        // This test verifies at compile time that Handler implements EventHandler
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }
}
