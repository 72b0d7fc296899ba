//! Infraction embeds
//!
//! Builders for the staff log embed, the change-announcement reply, and the
//! summary sent to the affected user.

use crate::moderation::Infraction;
use poise::serenity_prelude::{
    ButtonStyle, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter,
};

/// Discord's per-field character limit
pub const EMBED_FIELD_LIMIT: usize = 1024;

/// Custom id of the authorize button attached to pending-approval logs
pub const AUTHORIZE_BUTTON_ID: &str = "authorize_infraction_punishment";

/// The staff-facing log embed for an infraction. `previous` is every earlier
/// infraction recorded against the same user.
#[must_use]
pub fn infraction_log_embed(infraction: &Infraction, previous: &[Infraction]) -> CreateEmbed {
    let punishment_label = infraction
        .punishment
        .as_ref()
        .map_or_else(|| "None".to_string(), ToString::to_string);
    let title_verb = infraction
        .punishment
        .as_ref()
        .map_or("Warned", |p| p.kind.label());

    CreateEmbed::new()
        .title(format!("Member Has Been {title_verb}"))
        .footer(CreateEmbedFooter::new(infraction.id.clone()))
        .field("Member", format!("<@{}>", infraction.user_id), true)
        .field("Channel", format!("<#{}>", infraction.channel_id), true)
        .field("Punishment", format!("`{punishment_label}`"), true)
        .field("Reason", format!("`{}`", infraction.reason), true)
        .field(
            "Date",
            format!("<t:{}>", infraction.created_at.timestamp()),
            true,
        )
        .field(
            "Notes",
            format!(
                "```{}```",
                infraction.mod_notes.as_deref().unwrap_or("No notes provided.")
            ),
            false,
        )
        .field("Moderator", format!("<@{}>", infraction.mod_id), false)
        .field(
            "Previous Infractions",
            render_previous_infractions(previous),
            true,
        )
}

/// The reply embed announcing a punishment change on an existing infraction
#[must_use]
pub fn punishment_change_embed(infraction: &Infraction) -> CreateEmbed {
    let new_punishment = infraction
        .punishment
        .as_ref()
        .map_or_else(|| "None".to_string(), ToString::to_string);

    CreateEmbed::new()
        .description(format!(
            "<@{}>'s infraction punishment has been changed to `{new_punishment}`",
            infraction.user_id
        ))
        .footer(CreateEmbedFooter::new(infraction.id.clone()))
}

/// The summary embed sent to the affected user
#[must_use]
pub fn public_infraction_embed(infraction: &Infraction) -> CreateEmbed {
    let punishment_label = infraction
        .punishment
        .as_ref()
        .map_or_else(|| "None".to_string(), ToString::to_string);

    let mut embed = CreateEmbed::new()
        .title("You have received an infraction")
        .field("Reason", format!("`{}`", infraction.reason), true)
        .field("Punishment", format!("`{punishment_label}`"), true)
        .field(
            "Date",
            format!("<t:{}>", infraction.created_at.timestamp()),
            true,
        );

    if let Some(notes) = &infraction.public_notes {
        embed = embed.field("Notes", format!("```{notes}```"), false);
    }

    embed
}

/// Button row offering to authorize a punishment that is pending approval
#[must_use]
pub fn authorize_button_row(punishment_label: &str) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(AUTHORIZE_BUTTON_ID)
            .label(format!("Authorize {punishment_label}"))
            .style(ButtonStyle::Secondary),
    ])
}

/// Render the previous-infraction list for the log embed. Entries are
/// dropped from the end until the rendered text fits the field limit.
#[must_use]
pub fn render_previous_infractions(previous: &[Infraction]) -> String {
    if previous.is_empty() {
        return "N/A".to_string();
    }

    let mut entries: Vec<String> = previous
        .iter()
        .map(|infraction| {
            let penalty = infraction
                .punishment
                .as_ref()
                .map_or("warn", |p| p.kind.label());
            format!(
                "\n`🔗` – <t:{}:R> `{penalty}`",
                infraction.created_at.timestamp()
            )
        })
        .collect();

    while entries.concat().len() > EMBED_FIELD_LIMIT && !entries.is_empty() {
        entries.pop();
    }

    if entries.is_empty() {
        "N/A".to_string()
    } else {
        entries.concat()
    }
}
