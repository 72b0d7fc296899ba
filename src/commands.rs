//! Slash commands
//!
//! Thin glue between Discord interactions and the bot's subsystems: option
//! collection, validation, and ephemeral error reporting live here; the real
//! work happens in the moderation module and the store.

use crate::moderation::{
    InfractionLifecycle, ModerationError, Punishment, PunishmentKind, parse_human_duration,
};
use crate::store::{QuoteRecord, TimezoneRecord};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use poise::{CreateReply, command};

/// Punishment choices offered when administering an infraction
#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PunishmentChoice {
    #[name = "Timeout"]
    Timeout,
    #[name = "Kick"]
    Kick,
    #[name = "Tempban"]
    TempBan,
    #[name = "Ban"]
    Ban,
    #[name = "None"]
    None,
}

impl PunishmentChoice {
    fn kind(self) -> Option<PunishmentKind> {
        match self {
            Self::Timeout => Some(PunishmentKind::Timeout),
            Self::Kick => Some(PunishmentKind::Kick),
            Self::TempBan => Some(PunishmentKind::TempBan),
            Self::Ban => Some(PunishmentKind::Ban),
            Self::None => None,
        }
    }
}

/// Build a punishment from a choice and an optional human-readable duration.
/// Temporary penalties require the duration; permanent ones ignore it.
fn build_punishment(
    choice: PunishmentChoice,
    duration: Option<&str>,
) -> Result<Option<Punishment>, ModerationError> {
    let Some(kind) = choice.kind() else {
        return Ok(None);
    };

    if kind.is_temporary() {
        let input = duration.ok_or_else(|| {
            ModerationError::ValidationFailed(format!(
                "A {kind} punishment requires a duration (e.g. 30m, 2h, 7d)"
            ))
        })?;
        let ms = parse_human_duration(input)?;
        Ok(Some(Punishment::temporary(kind, ms)))
    } else {
        Ok(Some(Punishment::permanent(kind)))
    }
}

/// Report a failure to the invoking moderator without anyone else seeing it
async fn reply_ephemeral(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content.into()).ephemeral(true))
        .await?;
    Ok(())
}

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Manage member infractions.
#[command(
    slash_command,
    guild_only,
    subcommands("administer", "change", "delete"),
    default_member_permissions = "MODERATE_MEMBERS"
)]
pub async fn infraction(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Issue an infraction to a member, optionally with a punishment.
#[command(slash_command, guild_only)]
pub async fn administer(
    ctx: Context<'_>,
    #[description = "The member receiving the infraction"] user: serenity::User,
    #[description = "What they did"] reason: String,
    #[description = "The penalty to apply"] punishment: Option<PunishmentChoice>,
    #[description = "Duration for temporary penalties (e.g. 30m, 2h, 7d)"] duration: Option<
        String,
    >,
    #[description = "The channel where it happened"] channel: Option<serenity::ChannelId>,
    #[description = "Link to the offending message"] message: Option<String>,
    #[description = "Private moderator notes"]
    #[max_length = 1024]
    notes: Option<String>,
    #[description = "Notes shown to the member"]
    #[max_length = 1024]
    public_notes: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    if let Some(link) = &message {
        if !link.starts_with("https://discord.") {
            return reply_ephemeral(ctx, "Invalid message link ❌.").await;
        }
    }

    let new_punishment = match build_punishment(
        punishment.unwrap_or(PunishmentChoice::None),
        duration.as_deref(),
    ) {
        Ok(p) => p,
        Err(e) => return reply_ephemeral(ctx, format!("{e} ❌.")).await,
    };

    let channel_id = channel.unwrap_or_else(|| ctx.channel_id());
    let mut draft =
        crate::moderation::Infraction::new(user.id.get(), ctx.author().id.get(), channel_id.get(), reason);
    draft.set_punishment(new_punishment);
    draft.mod_notes = notes;
    draft.public_notes = public_notes;
    draft.related_message_link = message;

    let mod_permissions = ctx
        .author_member()
        .await
        .and_then(|member| member.permissions)
        .unwrap_or_default();

    let data = ctx.data();
    let gateway = data.gateway(ctx.serenity_context(), guild_id, ctx.channel_id());
    let lifecycle =
        InfractionLifecycle::new(&data.store, &data.scheduler, &gateway, guild_id.get());

    match lifecycle.administer_infraction(mod_permissions, draft).await {
        Ok(infraction) => {
            ctx.say(format!(
                "Infraction administered to <@{}> 🚨 (`{}`)",
                infraction.user_id, infraction.id
            ))
            .await?;
        }
        Err(e) => return reply_ephemeral(ctx, format!("Could not administer infraction: {e} ❌.")).await,
    }

    Ok(())
}

/// Change the punishment on an existing infraction.
#[command(slash_command, guild_only)]
pub async fn change(
    ctx: Context<'_>,
    #[description = "The infraction to change"] infraction_id: String,
    #[description = "The new penalty, or None to clear it"] punishment: PunishmentChoice,
    #[description = "Duration for temporary penalties (e.g. 30m, 2h, 7d)"] duration: Option<
        String,
    >,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let new_punishment = match build_punishment(punishment, duration.as_deref()) {
        Ok(p) => p,
        Err(e) => return reply_ephemeral(ctx, format!("{e} ❌.")).await,
    };

    let data = ctx.data();
    let gateway = data.gateway(ctx.serenity_context(), guild_id, ctx.channel_id());
    let lifecycle =
        InfractionLifecycle::new(&data.store, &data.scheduler, &gateway, guild_id.get());

    match lifecycle
        .change_infraction_punishment(&infraction_id, new_punishment, ctx.author().id.get())
        .await
    {
        Ok(infraction) => {
            let label = infraction
                .punishment
                .as_ref()
                .map_or_else(|| "None".to_string(), ToString::to_string);
            ctx.say(format!(
                "Punishment for `{}` changed to `{label}` ⚖️.",
                infraction.id
            ))
            .await?;
        }
        Err(e) => return reply_ephemeral(ctx, format!("Could not change punishment: {e} ❌.")).await,
    }

    Ok(())
}

/// Completely delete an infraction, reversing its punishment.
#[command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "The infraction to delete"] infraction_id: String,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let data = ctx.data();
    let gateway = data.gateway(ctx.serenity_context(), guild_id, ctx.channel_id());
    let lifecycle =
        InfractionLifecycle::new(&data.store, &data.scheduler, &gateway, guild_id.get());

    match lifecycle.remove_infraction(&infraction_id).await {
        Ok(()) => {
            ctx.say(format!("Infraction `{infraction_id}` deleted 🗑️."))
                .await?;
        }
        Err(e) => return reply_ephemeral(ctx, format!("Could not delete infraction: {e} ❌.")).await,
    }

    Ok(())
}

/// Check a member's balance.
#[command(slash_command, guild_only)]
pub async fn balance(
    ctx: Context<'_>,
    #[description = "The member to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let data = ctx.data();
    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    let record = data
        .store
        .get_or_default_user(target.id.get(), data.config.starting_balance);

    let owner = if target.id == ctx.author().id {
        "Your".to_string()
    } else {
        format!("<@{}>'s", target.id)
    };
    ctx.say(format!(
        "{owner} balance is **{} {}**.",
        record.money, data.config.currency_name
    ))
    .await?;

    Ok(())
}

/// Show the richest members.
#[command(slash_command, guild_only)]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let top = data.store.top_users(10);

    if top.is_empty() {
        ctx.say("Nobody has any money yet 💸.").await?;
        return Ok(());
    }

    let lines: Vec<String> = top
        .iter()
        .enumerate()
        .map(|(i, user)| {
            format!(
                "**{}.** <@{}> — {} {}",
                i + 1,
                user.id,
                user.money,
                data.config.currency_name
            )
        })
        .collect();

    ctx.send(
        CreateReply::default().embed(
            serenity::CreateEmbed::new()
                .title("Leaderboard")
                .description(lines.join("\n")),
        ),
    )
    .await?;

    Ok(())
}

/// Save or recall quotes.
#[command(slash_command, guild_only, subcommands("add", "random"))]
pub async fn quote(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Save a quote.
#[command(slash_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "The quote"]
    #[max_length = 4096]
    content: String,
    #[description = "Who said it"] author: Option<serenity::User>,
) -> Result<(), Error> {
    let data = ctx.data();
    let record = QuoteRecord {
        id: uuid::Uuid::new_v4().to_string(),
        content,
        author_id: author.map(|user| user.id.get()),
        created_at: Utc::now(),
    };
    data.store.save_quote(record).await?;

    ctx.say("Quote saved 📝.").await?;
    Ok(())
}

/// Recall a random quote.
#[command(slash_command, guild_only)]
pub async fn random(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    match data.store.random_quote() {
        Some(quote) => {
            let attribution = quote
                .author_id
                .map_or_else(String::new, |id| format!("\n— <@{id}>"));
            ctx.send(
                CreateReply::default().embed(
                    serenity::CreateEmbed::new()
                        .description(format!("{}{attribution}", quote.content)),
                ),
            )
            .await?;
        }
        None => {
            ctx.say("No quotes saved yet 🤷.").await?;
        }
    }
    Ok(())
}

/// Set your timezone.
#[command(slash_command)]
pub async fn timezone(
    ctx: Context<'_>,
    #[description = "Your timezone, e.g. Europe/London"] timezone: String,
) -> Result<(), Error> {
    let data = ctx.data();
    data.store
        .save_timezone(TimezoneRecord {
            user_id: ctx.author().id.get(),
            timezone: timezone.clone(),
        })
        .await?;

    reply_ephemeral(ctx, format!("Your timezone is now `{timezone}` 🕑.")).await
}

/// Show a member's timezone.
#[command(slash_command, guild_only)]
pub async fn time(
    ctx: Context<'_>,
    #[description = "The member to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let data = ctx.data();
    let target = user.as_ref().unwrap_or_else(|| ctx.author());

    match data.store.get_timezone(target.id.get()) {
        Some(record) => {
            ctx.say(format!(
                "<@{}> is in `{}` (it is currently <t:{}:t> for you).",
                target.id,
                record.timezone,
                Utc::now().timestamp()
            ))
            .await?;
        }
        None => {
            reply_ephemeral(
                ctx,
                "That member has not set a timezone yet. They can use `/timezone` 🕑.",
            )
            .await?;
        }
    }
    Ok(())
}

/// Configure roles given to new members.
#[command(
    slash_command,
    guild_only,
    subcommands("welcomeroles_add", "welcomeroles_clear"),
    required_permissions = "MANAGE_GUILD"
)]
pub async fn welcomeroles(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a role to grant new members.
#[command(slash_command, guild_only, rename = "add")]
pub async fn welcomeroles_add(
    ctx: Context<'_>,
    #[description = "The role to grant on join"] role: serenity::Role,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let data = ctx.data();
    let mut record = data.guild_record(guild_id);
    if !record.new_member_roles.contains(&role.id.get()) {
        record.new_member_roles.push(role.id.get());
        data.store.save_guild(record).await?;
    }

    reply_ephemeral(ctx, format!("New members will now receive <@&{}> 👋.", role.id)).await
}

/// Stop granting any roles to new members.
#[command(slash_command, guild_only, rename = "clear")]
pub async fn welcomeroles_clear(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let data = ctx.data();
    let mut record = data.guild_record(guild_id);
    record.new_member_roles.clear();
    data.store.save_guild(record).await?;

    reply_ephemeral(ctx, "New members will no longer receive any roles.").await
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        ping(),
        infraction(),
        balance(),
        leaderboard(),
        quote(),
        timezone(),
        time(),
        welcomeroles(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that the ping command is properly defined
    #[test]
    fn test_ping_command_definition() {
        let cmd = ping();
        assert_eq!(cmd.name, "ping");
        assert!(cmd.guild_only);
    }

    #[test]
    fn test_infraction_subcommands() {
        let cmd = infraction();
        assert_eq!(cmd.name, "infraction");
        let names: Vec<&str> = cmd
            .subcommands
            .iter()
            .map(|sub| sub.name.as_str())
            .collect();
        assert_eq!(names, vec!["administer", "change", "delete"]);
    }

    #[test]
    fn test_all_commands_registered() {
        let commands = all();
        assert_eq!(commands.len(), 8);
        assert!(commands.iter().any(|c| c.name == "infraction"));
        assert!(commands.iter().any(|c| c.name == "leaderboard"));
    }

    #[test]
    fn test_build_punishment_requires_duration_for_temporary() {
        assert!(build_punishment(PunishmentChoice::Timeout, None).is_err());
        assert!(build_punishment(PunishmentChoice::TempBan, None).is_err());
        assert!(build_punishment(PunishmentChoice::Timeout, Some("bogus")).is_err());

        let punishment = build_punishment(PunishmentChoice::Timeout, Some("30m"))
            .unwrap()
            .unwrap();
        assert_eq!(punishment.kind, PunishmentKind::Timeout);
        assert_eq!(punishment.duration, Some(1_800_000));
    }

    #[test]
    fn test_build_punishment_permanent_and_none() {
        let punishment = build_punishment(PunishmentChoice::Ban, None).unwrap().unwrap();
        assert_eq!(punishment.kind, PunishmentKind::Ban);
        assert!(punishment.duration.is_none());

        assert!(build_punishment(PunishmentChoice::None, None).unwrap().is_none());
    }
}
