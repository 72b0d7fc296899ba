pub mod commands;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod moderation;
pub mod scheduler;
pub mod store;

// Customize these constants for your bot
pub const BOT_NAME: &str = "steward";
pub const COMMAND_TARGET: &str = "steward::command";
pub const ERROR_TARGET: &str = "steward::error";
pub const EVENT_TARGET: &str = "steward::handlers";
pub const CONSOLE_TARGET: &str = "steward";

pub use data::{BotConfig, Data, DataInner};
pub use moderation::{Infraction, Punishment, PunishmentKind};
pub use scheduler::{ScheduledTask, Scheduler};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
