use std::{
    default::Default,
    ops::Deref,
    sync::Arc,
};

use crate::moderation::SerenityGateway;
use crate::scheduler::Scheduler;
use crate::store::{GuildRecord, Store};
use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;

/// Runtime configuration read from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Directory the store persists its collections under
    pub data_dir: String,
    /// Balance a user starts with before any economy activity
    pub starting_balance: i64,
    /// Display name of the currency
    pub currency_name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            starting_balance: 1000,
            currency_name: "coins".to_string(),
        }
    }
}

impl BotConfig {
    /// Build the configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("STEWARD_DATA_DIR").unwrap_or(defaults.data_dir),
            starting_balance: std::env::var("STEWARD_STARTING_BALANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.starting_balance),
            currency_name: std::env::var("STEWARD_CURRENCY_NAME").unwrap_or(defaults.currency_name),
        }
    }
}

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map,
// which is how the event handlers reach the store and scheduler.
impl TypeMapKey for Data {
    type Value = Data;
}

/// Shared state handed to every command and event handler
pub struct DataInner {
    /// The document store backing every record collection
    pub store: Arc<Store>,
    /// The durable task scheduler
    pub scheduler: Scheduler,
    /// Runtime configuration
    pub config: BotConfig,
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Data {
    /// Create a new Data instance
    #[must_use]
    pub fn new(store: Arc<Store>, scheduler: Scheduler, config: BotConfig) -> Self {
        Self(Arc::new(DataInner {
            store,
            scheduler,
            config,
        }))
    }

    /// Get a guild's stored configuration, or a default one for its id
    #[must_use]
    pub fn guild_record(&self, guild_id: serenity::GuildId) -> GuildRecord {
        self.store.get_guild(guild_id.get()).unwrap_or(GuildRecord {
            id: guild_id.get(),
            ..Default::default()
        })
    }

    /// Build a serenity-backed gateway for moderation actions in a guild.
    /// Log messages go to the configured infraction log channel, or to
    /// `fallback_channel` when none is configured.
    #[must_use]
    pub fn gateway(
        &self,
        ctx: &serenity::Context,
        guild_id: serenity::GuildId,
        fallback_channel: serenity::ChannelId,
    ) -> SerenityGateway {
        let log_channel = self
            .guild_record(guild_id)
            .infraction_log_channel_id
            .map_or(fallback_channel, serenity::ChannelId::new);

        SerenityGateway::new(
            Arc::clone(&ctx.http),
            Arc::clone(&ctx.cache),
            guild_id,
            log_channel,
        )
    }
}
