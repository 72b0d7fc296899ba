//! Document store
//!
//! Keyed record collections held in memory and persisted as YAML documents
//! under the data directory. The in-memory maps are the working set; every
//! mutating operation rewrites the affected collection file so that records
//! survive a process restart.

use crate::moderation::Infraction;
use crate::scheduler::ScheduledTask;
use dashmap::DashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while reading or writing the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Economy and welcome-star record for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub money: i64,
    pub stars: u64,
}

/// Per-guild configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: u64,
    /// Roles granted to members when they join
    pub new_member_roles: Vec<u64>,
    /// Channel the welcome message is sent to
    pub welcome_channel_id: Option<u64>,
    /// Voice channel renamed to show the member count
    pub member_count_channel_id: Option<u64>,
    /// Channel infraction logs are posted to
    pub infraction_log_channel_id: Option<u64>,
}

/// A quotable piece of text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub id: String,
    pub content: String,
    pub author_id: Option<u64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A user's preferred timezone string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimezoneRecord {
    pub user_id: u64,
    pub timezone: String,
}

const INFRACTIONS_FILE: &str = "infractions.yaml";
const TASKS_FILE: &str = "tasks.yaml";
const USERS_FILE: &str = "users.yaml";
const GUILDS_FILE: &str = "guilds.yaml";
const QUOTES_FILE: &str = "quotes.yaml";
const TIMEZONES_FILE: &str = "timezones.yaml";

/// Keyed record collections backed by YAML files
pub struct Store {
    dir: PathBuf,
    infractions: DashMap<String, Infraction>,
    tasks: DashMap<String, ScheduledTask>,
    users: DashMap<u64, UserRecord>,
    guilds: DashMap<u64, GuildRecord>,
    quotes: DashMap<String, QuoteRecord>,
    timezones: DashMap<u64, TimezoneRecord>,
}

impl Store {
    /// Create an empty store rooted at the given directory
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            infractions: DashMap::new(),
            tasks: DashMap::new(),
            users: DashMap::new(),
            guilds: DashMap::new(),
            quotes: DashMap::new(),
            timezones: DashMap::new(),
        }
    }

    /// Load all collections from the data directory. Missing or unreadable
    /// files yield empty collections.
    pub async fn load(dir: impl Into<PathBuf>) -> Self {
        let store = Self::new(dir);

        for infraction in read_collection::<Infraction>(&store.dir.join(INFRACTIONS_FILE)).await {
            store.infractions.insert(infraction.id.clone(), infraction);
        }
        for task in read_collection::<ScheduledTask>(&store.dir.join(TASKS_FILE)).await {
            store.tasks.insert(task.id.clone(), task);
        }
        for user in read_collection::<UserRecord>(&store.dir.join(USERS_FILE)).await {
            store.users.insert(user.id, user);
        }
        for guild in read_collection::<GuildRecord>(&store.dir.join(GUILDS_FILE)).await {
            store.guilds.insert(guild.id, guild);
        }
        for quote in read_collection::<QuoteRecord>(&store.dir.join(QUOTES_FILE)).await {
            store.quotes.insert(quote.id.clone(), quote);
        }
        for tz in read_collection::<TimezoneRecord>(&store.dir.join(TIMEZONES_FILE)).await {
            store.timezones.insert(tz.user_id, tz);
        }

        store
    }

    // -------------------- Infractions -------------------- //

    /// Get an infraction by ID
    #[must_use]
    pub fn get_infraction(&self, id: &str) -> Option<Infraction> {
        self.infractions.get(id).map(|entry| entry.value().clone())
    }

    /// All infractions recorded against a user, oldest first
    #[must_use]
    pub fn infractions_for_user(&self, user_id: u64) -> Vec<Infraction> {
        let mut infractions: Vec<Infraction> = self
            .infractions
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        infractions.sort_by_key(|infraction| infraction.created_at);
        infractions
    }

    /// Insert or replace an infraction and persist the collection
    pub async fn save_infraction(&self, infraction: Infraction) -> StoreResult<()> {
        self.infractions.insert(infraction.id.clone(), infraction);
        self.persist_infractions().await
    }

    /// Delete an infraction by ID. Deleting a missing record is a no-op;
    /// returns whether a record was removed.
    pub async fn delete_infraction(&self, id: &str) -> StoreResult<bool> {
        let removed = self.infractions.remove(id).is_some();
        if removed {
            self.persist_infractions().await?;
        }
        Ok(removed)
    }

    async fn persist_infractions(&self) -> StoreResult<()> {
        let records: Vec<Infraction> = self.infractions.iter().map(|e| e.value().clone()).collect();
        write_collection(&self.dir, INFRACTIONS_FILE, &records).await
    }

    // -------------------- Scheduled tasks -------------------- //

    /// All persisted tasks
    #[must_use]
    pub fn all_tasks(&self) -> Vec<ScheduledTask> {
        self.tasks.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Get a task by ID
    #[must_use]
    pub fn get_task(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    /// Find a task by preset name and argument list, for manual lookups
    #[must_use]
    pub fn find_task(&self, name: &str, arguments: &[String]) -> Option<ScheduledTask> {
        self.tasks
            .iter()
            .find(|entry| {
                let task = entry.value();
                task.name == name && task.arguments == arguments
            })
            .map(|entry| entry.value().clone())
    }

    /// Insert a task and persist the collection
    pub async fn save_task(&self, task: ScheduledTask) -> StoreResult<()> {
        self.tasks.insert(task.id.clone(), task);
        self.persist_tasks().await
    }

    /// Delete a task by ID. Deleting a missing record is a no-op; returns
    /// whether a record was removed.
    pub async fn delete_task(&self, id: &str) -> StoreResult<bool> {
        let removed = self.tasks.remove(id).is_some();
        if removed {
            self.persist_tasks().await?;
        }
        Ok(removed)
    }

    async fn persist_tasks(&self) -> StoreResult<()> {
        let records: Vec<ScheduledTask> = self.tasks.iter().map(|e| e.value().clone()).collect();
        write_collection(&self.dir, TASKS_FILE, &records).await
    }

    // -------------------- Users -------------------- //

    /// Get a user record, or a fresh one with the given starting balance
    #[must_use]
    pub fn get_or_default_user(&self, id: u64, starting_balance: i64) -> UserRecord {
        self.users
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or(UserRecord {
                id,
                money: starting_balance,
                stars: 0,
            })
    }

    /// Insert or replace a user record and persist the collection
    pub async fn save_user(&self, user: UserRecord) -> StoreResult<()> {
        self.users.insert(user.id, user);
        let records: Vec<UserRecord> = self.users.iter().map(|e| e.value().clone()).collect();
        write_collection(&self.dir, USERS_FILE, &records).await
    }

    /// The top `limit` users by balance, richest first
    #[must_use]
    pub fn top_users(&self, limit: usize) -> Vec<UserRecord> {
        let mut users: Vec<UserRecord> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| b.money.cmp(&a.money));
        users.truncate(limit);
        users
    }

    // -------------------- Guilds -------------------- //

    /// Get a guild's configuration
    #[must_use]
    pub fn get_guild(&self, id: u64) -> Option<GuildRecord> {
        self.guilds.get(&id).map(|entry| entry.value().clone())
    }

    /// Insert or replace a guild configuration and persist the collection
    pub async fn save_guild(&self, guild: GuildRecord) -> StoreResult<()> {
        self.guilds.insert(guild.id, guild);
        let records: Vec<GuildRecord> = self.guilds.iter().map(|e| e.value().clone()).collect();
        write_collection(&self.dir, GUILDS_FILE, &records).await
    }

    // -------------------- Quotes -------------------- //

    /// Insert a quote and persist the collection
    pub async fn save_quote(&self, quote: QuoteRecord) -> StoreResult<()> {
        self.quotes.insert(quote.id.clone(), quote);
        let records: Vec<QuoteRecord> = self.quotes.iter().map(|e| e.value().clone()).collect();
        write_collection(&self.dir, QUOTES_FILE, &records).await
    }

    /// A uniformly random quote, if any exist
    #[must_use]
    pub fn random_quote(&self) -> Option<QuoteRecord> {
        use rand::seq::IteratorRandom;

        let mut rng = rand::rng();
        self.quotes
            .iter()
            .choose(&mut rng)
            .map(|entry| entry.value().clone())
    }

    // -------------------- Timezones -------------------- //

    /// Get a user's timezone record
    #[must_use]
    pub fn get_timezone(&self, user_id: u64) -> Option<TimezoneRecord> {
        self.timezones.get(&user_id).map(|entry| entry.value().clone())
    }

    /// Insert or replace a timezone record and persist the collection
    pub async fn save_timezone(&self, record: TimezoneRecord) -> StoreResult<()> {
        self.timezones.insert(record.user_id, record);
        let records: Vec<TimezoneRecord> =
            self.timezones.iter().map(|e| e.value().clone()).collect();
        write_collection(&self.dir, TIMEZONES_FILE, &records).await
    }
}

/// Read a collection file, returning an empty list if it is missing or does
/// not parse (a corrupt file is logged, not fatal).
async fn read_collection<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_yaml::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to parse {}: {e}", path.display());
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// Serialize a collection to YAML and write it under the data directory
async fn write_collection<T: Serialize>(dir: &Path, file: &str, records: &[T]) -> StoreResult<()> {
    if !dir.exists() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let yaml = serde_yaml::to_string(records)?;
    tokio::fs::write(dir.join(file), yaml).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{Punishment, PunishmentKind};
    use chrono::Utc;

    fn temp_store() -> Store {
        let dir = std::env::temp_dir()
            .join("steward-tests")
            .join(uuid::Uuid::new_v4().to_string());
        Store::new(dir)
    }

    #[tokio::test]
    async fn test_infraction_save_and_find() {
        let store = temp_store();

        let mut infraction = Infraction::new(12345, 67890, 555, "Spamming");
        infraction.set_punishment(Some(Punishment::permanent(PunishmentKind::Ban)));
        let id = infraction.id.clone();
        store.save_infraction(infraction).await.unwrap();

        let found = store.get_infraction(&id).unwrap();
        assert_eq!(found.user_id, 12345);
        assert_eq!(found.punishment.unwrap().kind, PunishmentKind::Ban);

        assert_eq!(store.infractions_for_user(12345).len(), 1);
        assert!(store.infractions_for_user(99999).is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_infraction_is_noop() {
        let store = temp_store();
        assert!(!store.delete_infraction("no-such-id").await.unwrap());
    }

    #[tokio::test]
    async fn test_infractions_sorted_oldest_first() {
        let store = temp_store();

        let mut first = Infraction::new(1, 2, 3, "first");
        first.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut second = Infraction::new(1, 2, 3, "second");
        second.created_at = Utc::now() - chrono::Duration::hours(1);

        // Insert newest first to make the sort visible.
        store.save_infraction(second).await.unwrap();
        store.save_infraction(first).await.unwrap();

        let infractions = store.infractions_for_user(1);
        assert_eq!(infractions[0].reason, "first");
        assert_eq!(infractions[1].reason, "second");
    }

    #[tokio::test]
    async fn test_find_task_by_name_and_arguments() {
        let store = temp_store();

        let task = ScheduledTask::new("unban_member", vec!["1".into(), "2".into()], Utc::now());
        let id = task.id.clone();
        store.save_task(task).await.unwrap();

        assert!(
            store
                .find_task("unban_member", &["1".to_string(), "2".to_string()])
                .is_some()
        );
        assert!(
            store
                .find_task("unban_member", &["1".to_string()])
                .is_none()
        );
        assert!(store.find_task("other", &["1".to_string(), "2".to_string()]).is_none());

        assert!(store.delete_task(&id).await.unwrap());
        assert!(!store.delete_task(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = std::env::temp_dir()
            .join("steward-tests")
            .join(uuid::Uuid::new_v4().to_string());

        let store = Store::new(&dir);
        store
            .save_user(UserRecord {
                id: 7,
                money: 500,
                stars: 2,
            })
            .await
            .unwrap();
        store
            .save_infraction(Infraction::new(1, 2, 3, "persisted"))
            .await
            .unwrap();

        let reloaded = Store::load(&dir).await;
        assert_eq!(reloaded.get_or_default_user(7, 0).money, 500);
        assert_eq!(reloaded.infractions_for_user(1).len(), 1);
    }

    #[tokio::test]
    async fn test_top_users_ordering() {
        let store = temp_store();
        for (id, money) in [(1u64, 100i64), (2, 300), (3, 200)] {
            store
                .save_user(UserRecord {
                    id,
                    money,
                    stars: 0,
                })
                .await
                .unwrap();
        }

        let top = store.top_users(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, 2);
        assert_eq!(top[1].id, 3);
    }

    #[tokio::test]
    async fn test_get_or_default_user() {
        let store = temp_store();
        let user = store.get_or_default_user(42, 1000);
        assert_eq!(user.money, 1000);
        assert_eq!(user.stars, 0);
    }
}
