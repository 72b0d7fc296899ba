//! Moderation system for Steward
//!
//! This module ties infraction records to live guild state: punishments are
//! applied and reversed through the punishment distributor, temporary bans
//! schedule their own reversal, and the lifecycle wrapper keeps the record,
//! the guild, and the log channel consistent.

pub mod distributor;
pub mod embeds;
mod error;
pub mod gateway;
mod infraction;
mod lifecycle;
mod punishment;

pub use distributor::{DistributorData, PunishmentDistributor, UNBAN_PRESET, UNBAN_REASON};
pub use error::{ModerationError, ModerationResult};
pub use gateway::{GuildGateway, SerenityGateway};
pub use infraction::{HistoricalPunishment, Infraction};
pub use lifecycle::InfractionLifecycle;
pub use punishment::{Punishment, PunishmentKind, format_duration, parse_human_duration};
