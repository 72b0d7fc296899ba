//! Punishment distributor
//!
//! Translates a punishment record into platform actions. The distributor
//! applies and reverses penalties against the live guild and registers unban
//! tasks with the scheduler for temporary bans; recording the outcome in the
//! store is the caller's job.

use crate::moderation::{GuildGateway, ModerationResult, Punishment, PunishmentKind};
use crate::scheduler::Scheduler;
use chrono::Utc;
use poise::serenity_prelude::UserId;
use tracing::info;

/// Name of the scheduler preset that lifts a temporary ban
pub const UNBAN_PRESET: &str = "unban_member";

/// Audit-log reason used when a served ban is lifted
pub const UNBAN_REASON: &str = "User has served ban time associated with infraction.";

/// The working data the distributor acts on
#[derive(Debug, Clone)]
pub struct DistributorData {
    pub user_id: u64,
    pub guild_id: u64,
    pub reason: String,
    pub punishment: Option<Punishment>,
}

/// Applies and reverses a single punishment against the live platform
pub struct PunishmentDistributor<'a> {
    data: DistributorData,
    gateway: &'a dyn GuildGateway,
    scheduler: &'a Scheduler,
}

impl<'a> PunishmentDistributor<'a> {
    #[must_use]
    pub fn new(
        data: DistributorData,
        gateway: &'a dyn GuildGateway,
        scheduler: &'a Scheduler,
    ) -> Self {
        Self {
            data,
            gateway,
            scheduler,
        }
    }

    /// Replace the working data without side effects. Used to pivot from the
    /// old to the new punishment between the remove and administer halves of
    /// a change.
    pub fn set_infraction(&mut self, data: DistributorData) {
        self.data = data;
    }

    /// Apply the current punishment to the platform. A temporary ban also
    /// registers an unban task with the scheduler, due when the ban lapses.
    ///
    /// # Errors
    /// Fails before any platform call if a temporary punishment is missing a
    /// positive duration.
    pub async fn administer_punishment(&self) -> ModerationResult<()> {
        let Some(punishment) = &self.data.punishment else {
            return Ok(());
        };

        punishment.validate()?;

        let user_id = UserId::new(self.data.user_id);
        match punishment.kind {
            PunishmentKind::Ban | PunishmentKind::TempBan => {
                self.gateway.ban(user_id, &self.data.reason).await?;

                if punishment.kind == PunishmentKind::TempBan {
                    // validate() guarantees the duration is present here.
                    let duration_ms = punishment.duration.unwrap_or_default();
                    self.scheduler
                        .new_task(duration_ms / 1000, UNBAN_PRESET, self.unban_arguments())
                        .await?;
                }
            }
            PunishmentKind::Timeout => {
                // validate() guarantees the duration is present here.
                let until = punishment.expires_at(Utc::now()).unwrap_or_else(Utc::now);
                self.gateway.timeout_until(user_id, until).await?;
            }
            PunishmentKind::Kick => {
                self.gateway.kick(user_id, &self.data.reason).await?;
            }
        }

        info!(
            user_id = %self.data.user_id,
            guild_id = %self.data.guild_id,
            penalty = %punishment.kind,
            "Punishment administered"
        );

        Ok(())
    }

    /// Reverse the current punishment on the platform. A temporary ban is
    /// reversed by forcing its scheduled unban task to run now rather than
    /// duplicating the ban-removal logic here.
    pub async fn remove_punishment(&self) -> ModerationResult<()> {
        let Some(punishment) = &self.data.punishment else {
            return Ok(());
        };

        let user_id = UserId::new(self.data.user_id);
        match punishment.kind {
            PunishmentKind::Ban => {
                self.gateway.unban(user_id, UNBAN_REASON).await?;
            }
            PunishmentKind::Timeout => {
                self.gateway.clear_timeout(user_id).await?;
            }
            PunishmentKind::TempBan => {
                self.scheduler
                    .run_task_now(UNBAN_PRESET, self.unban_arguments())
                    .await?;
            }
            // A kick has already happened; there is nothing to reverse.
            PunishmentKind::Kick => {}
        }

        info!(
            user_id = %self.data.user_id,
            guild_id = %self.data.guild_id,
            penalty = %punishment.kind,
            "Punishment removed"
        );

        Ok(())
    }

    /// Reverse the previous punishment and apply the current working data's
    /// punishment. Callers must swap in the new data via [`set_infraction`]
    /// before calling.
    ///
    /// [`set_infraction`]: Self::set_infraction
    pub async fn change_punishment(&self) -> ModerationResult<()> {
        self.remove_punishment().await?;
        self.administer_punishment().await
    }

    fn unban_arguments(&self) -> Vec<String> {
        vec![self.data.user_id.to_string(), self.data.guild_id.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::gateway::MockGuildGateway;
    use crate::scheduler::{Scheduler, preset};
    use crate::store::Store;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_store() -> Arc<Store> {
        let dir = std::env::temp_dir()
            .join("steward-tests")
            .join(uuid::Uuid::new_v4().to_string());
        Arc::new(Store::new(dir))
    }

    fn unban_scheduler(store: Arc<Store>, counter: Arc<AtomicUsize>) -> Scheduler {
        let unban = preset(move |_args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        Scheduler::new(store, vec![(UNBAN_PRESET, unban)])
    }

    fn data(punishment: Option<Punishment>) -> DistributorData {
        DistributorData {
            user_id: 12345,
            guild_id: 67890,
            reason: "Spamming".to_string(),
            punishment,
        }
    }

    #[tokio::test]
    async fn test_temporary_without_duration_fails_before_any_call() {
        for kind in [PunishmentKind::Timeout, PunishmentKind::TempBan] {
            let store = temp_store();
            let scheduler = unban_scheduler(Arc::clone(&store), Arc::new(AtomicUsize::new(0)));
            // No expectations: any platform call would panic the mock.
            let gateway = MockGuildGateway::new();

            let invalid = Punishment {
                kind,
                duration: None,
                human_readable_duration: None,
            };
            let distributor = PunishmentDistributor::new(data(Some(invalid)), &gateway, &scheduler);

            assert!(distributor.administer_punishment().await.is_err());
            assert!(store.all_tasks().is_empty());
        }
    }

    #[tokio::test]
    async fn test_ban_and_kick_schedule_nothing() {
        let store = temp_store();
        let scheduler = unban_scheduler(Arc::clone(&store), Arc::new(AtomicUsize::new(0)));

        let mut gateway = MockGuildGateway::new();
        gateway
            .expect_ban()
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_kick()
            .times(1)
            .returning(|_, _| Ok(()));

        for kind in [PunishmentKind::Ban, PunishmentKind::Kick] {
            let distributor = PunishmentDistributor::new(
                data(Some(Punishment::permanent(kind))),
                &gateway,
                &scheduler,
            );
            distributor.administer_punishment().await.unwrap();
        }

        assert!(store.all_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_tempban_schedules_one_unban_task() {
        let store = temp_store();
        let scheduler = unban_scheduler(Arc::clone(&store), Arc::new(AtomicUsize::new(0)));

        let mut gateway = MockGuildGateway::new();
        gateway.expect_ban().times(1).returning(|_, _| Ok(()));

        let duration_ms = 3_600_000;
        let distributor = PunishmentDistributor::new(
            data(Some(Punishment::temporary(PunishmentKind::TempBan, duration_ms))),
            &gateway,
            &scheduler,
        );
        distributor.administer_punishment().await.unwrap();

        let tasks = store.all_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, UNBAN_PRESET);
        assert_eq!(tasks[0].arguments, vec!["12345", "67890"]);

        let due_in = (tasks[0].run_at - Utc::now()).num_seconds();
        assert!((3598..=3600).contains(&due_in), "due in {due_in}s");
    }

    #[tokio::test]
    async fn test_remove_tempban_forces_unban_task() {
        let store = temp_store();
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = unban_scheduler(Arc::clone(&store), Arc::clone(&counter));

        let mut gateway = MockGuildGateway::new();
        gateway.expect_ban().times(1).returning(|_, _| Ok(()));

        let distributor = PunishmentDistributor::new(
            data(Some(Punishment::temporary(PunishmentKind::TempBan, 3_600_000))),
            &gateway,
            &scheduler,
        );
        distributor.administer_punishment().await.unwrap();
        distributor.remove_punishment().await.unwrap();

        // The unban preset ran exactly once and the task is gone.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(store.all_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_remove_dispatch() {
        let store = temp_store();
        let scheduler = unban_scheduler(Arc::clone(&store), Arc::new(AtomicUsize::new(0)));

        let mut gateway = MockGuildGateway::new();
        gateway.expect_unban().times(1).returning(|_, _| Ok(()));
        gateway.expect_clear_timeout().times(1).returning(|_| Ok(()));

        let ban = PunishmentDistributor::new(
            data(Some(Punishment::permanent(PunishmentKind::Ban))),
            &gateway,
            &scheduler,
        );
        ban.remove_punishment().await.unwrap();

        let timeout = PunishmentDistributor::new(
            data(Some(Punishment::temporary(PunishmentKind::Timeout, 60_000))),
            &gateway,
            &scheduler,
        );
        timeout.remove_punishment().await.unwrap();

        // Kick and "no punishment" are both no-ops.
        let kick = PunishmentDistributor::new(
            data(Some(Punishment::permanent(PunishmentKind::Kick))),
            &gateway,
            &scheduler,
        );
        kick.remove_punishment().await.unwrap();

        let none = PunishmentDistributor::new(data(None), &gateway, &scheduler);
        none.remove_punishment().await.unwrap();
        none.administer_punishment().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_infraction_pivots_working_data() {
        let store = temp_store();
        let scheduler = unban_scheduler(Arc::clone(&store), Arc::new(AtomicUsize::new(0)));

        let mut gateway = MockGuildGateway::new();
        gateway.expect_unban().times(1).returning(|_, _| Ok(()));
        gateway
            .expect_timeout_until()
            .times(1)
            .returning(|_, _| Ok(()));

        // Start associated with a ban, pivot to a timeout, then change.
        let mut distributor = PunishmentDistributor::new(
            data(Some(Punishment::permanent(PunishmentKind::Ban))),
            &gateway,
            &scheduler,
        );
        distributor.remove_punishment().await.unwrap();
        distributor.set_infraction(data(Some(Punishment::temporary(
            PunishmentKind::Timeout,
            900_000,
        ))));
        distributor.administer_punishment().await.unwrap();
    }
}
