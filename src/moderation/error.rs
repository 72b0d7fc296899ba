//! Error types for the moderation system
//!
//! This module defines the various errors that can occur while administering,
//! changing, or removing infractions.

use crate::moderation::PunishmentKind;
use crate::scheduler::SchedulerError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur during moderation operations
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Punishment validation failed before anything was applied
    #[error("Punishment validation failed: {0}")]
    ValidationFailed(String),

    /// The requested punishment change is a refused de-escalation path
    #[error("Changing a {from} punishment to {to} is not allowed")]
    DisallowedTransition {
        from: PunishmentKind,
        to: PunishmentKind,
    },

    /// Infraction record not found
    #[error("Infraction not found: {0}")]
    InfractionNotFound(String),

    /// The acting moderator lacks the permission required for the penalty
    #[error("Missing permission required to administer a {0} punishment")]
    MissingPermission(PunishmentKind),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Scheduler error (e.g. scheduling or force-running an unban task)
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Persistence error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Generic error
    #[error("Moderation error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for ModerationError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl From<String> for ModerationError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
