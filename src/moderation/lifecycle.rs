//! Infraction lifecycle
//!
//! Top-level orchestration tying record-keeping to punishment distribution:
//! administering new infractions (with the approval gate for ban-class
//! penalties), changing punishments on existing infractions, authorizing
//! pending punishments, and deleting infractions.

use crate::moderation::{
    DistributorData, GuildGateway, Infraction, ModerationError, ModerationResult, Punishment,
    PunishmentDistributor, embeds,
};
use crate::scheduler::Scheduler;
use crate::store::Store;
use chrono::Utc;
use poise::serenity_prelude::{MessageId, Permissions, UserId};
use tracing::{info, warn};

/// Length of the interim timeout applied while a ban awaits approval
const PENDING_APPROVAL_TIMEOUT_HOURS: i64 = 24;

/// Orchestrates infraction records, punishment distribution, and the log
/// trail. All collaborators are passed in explicitly so the lifecycle can be
/// driven with fakes.
pub struct InfractionLifecycle<'a> {
    store: &'a Store,
    scheduler: &'a Scheduler,
    gateway: &'a dyn GuildGateway,
    guild_id: u64,
}

impl<'a> InfractionLifecycle<'a> {
    #[must_use]
    pub fn new(
        store: &'a Store,
        scheduler: &'a Scheduler,
        gateway: &'a dyn GuildGateway,
        guild_id: u64,
    ) -> Self {
        Self {
            store,
            scheduler,
            gateway,
            guild_id,
        }
    }

    /// Administer a new infraction: apply the punishment (or gate it behind
    /// approval), post the staff log, persist the record, and notify the
    /// affected user. Returns the persisted infraction.
    ///
    /// A moderator who lacks the permission a ban-class penalty requires
    /// does not get the ban applied; the target receives a 24-hour interim
    /// timeout instead and the log message carries an authorize button.
    pub async fn administer_infraction(
        &self,
        mod_permissions: Permissions,
        mut infraction: Infraction,
    ) -> ModerationResult<Infraction> {
        if let Some(punishment) = &infraction.punishment {
            punishment.validate()?;
        }

        let authorized = infraction
            .punishment
            .as_ref()
            .is_none_or(|p| mod_permissions.contains(p.kind.required_permissions()));

        if authorized {
            if infraction.punishment.is_some() {
                self.distributor(&infraction).administer_punishment().await?;
            }
        } else if infraction
            .punishment
            .as_ref()
            .is_some_and(|p| p.kind.is_ban())
        {
            // Hold the member with an interim timeout until someone with ban
            // permissions approves.
            let until = Utc::now() + chrono::Duration::hours(PENDING_APPROVAL_TIMEOUT_HOURS);
            self.gateway
                .timeout_until(UserId::new(infraction.user_id), until)
                .await?;

            info!(
                infraction_id = %infraction.id,
                user_id = %infraction.user_id,
                mod_id = %infraction.mod_id,
                "Punishment pending approval, interim timeout applied"
            );
        }

        // Log before inserting so the record links to its log message and the
        // previous-infractions list excludes the new one.
        let previous = self.store.infractions_for_user(infraction.user_id);
        let components = if authorized {
            Vec::new()
        } else {
            let label = infraction
                .punishment
                .as_ref()
                .map_or("Punishment", |p| p.kind.label());
            vec![embeds::authorize_button_row(label)]
        };

        let log_id = self
            .gateway
            .send_log(
                embeds::infraction_log_embed(&infraction, &previous),
                components,
            )
            .await?;
        infraction.log_message_id = Some(log_id.get());

        self.store.save_infraction(infraction.clone()).await?;

        // The member may have left or closed their DMs; a failed notification
        // never rolls back the recorded infraction.
        if let Err(e) = self
            .gateway
            .dm_user(
                UserId::new(infraction.user_id),
                embeds::public_infraction_embed(&infraction),
            )
            .await
        {
            warn!(
                infraction_id = %infraction.id,
                user_id = %infraction.user_id,
                error = %e,
                "Failed to notify user of infraction"
            );
        }

        Ok(infraction)
    }

    /// Change the punishment on an existing infraction. The previous
    /// punishment is archived to history and reversed on the platform, the
    /// new one applied (or the punishment cleared), the original log message
    /// edited in place, and a reply log posted.
    ///
    /// `mod_id` is the moderator making the change, not the original issuer.
    pub async fn change_infraction_punishment(
        &self,
        infraction_id: &str,
        new_punishment: Option<Punishment>,
        mod_id: u64,
    ) -> ModerationResult<Infraction> {
        let mut infraction = self
            .store
            .get_infraction(infraction_id)
            .ok_or_else(|| ModerationError::InfractionNotFound(infraction_id.to_string()))?;

        // Both checks precede every mutation so a refused change leaves the
        // record and the guild untouched.
        if let (Some(current), Some(new)) = (&infraction.punishment, &new_punishment) {
            if !current.kind.transition_allowed(Some(new.kind)) {
                return Err(ModerationError::DisallowedTransition {
                    from: current.kind,
                    to: new.kind,
                });
            }
        }
        if let Some(punishment) = &new_punishment {
            punishment.validate()?;
        }

        let mut distributor = self.distributor(&infraction);

        if infraction.punishment.is_some() {
            infraction.archive_punishment(mod_id);
            distributor.remove_punishment().await?;
        }

        infraction.set_punishment(new_punishment.clone());
        if new_punishment.is_some() {
            distributor.set_infraction(self.distributor_data(&infraction));
            distributor.administer_punishment().await?;
        }

        if let Some(log_id) = infraction.log_message_id {
            let previous: Vec<Infraction> = self
                .store
                .infractions_for_user(infraction.user_id)
                .into_iter()
                .filter(|prior| prior.id != infraction.id)
                .collect();

            self.gateway
                .edit_log(
                    MessageId::new(log_id),
                    embeds::infraction_log_embed(&infraction, &previous),
                )
                .await?;
            self.gateway
                .reply_log(
                    MessageId::new(log_id),
                    embeds::punishment_change_embed(&infraction),
                )
                .await?;
        }

        self.store.save_infraction(infraction.clone()).await?;

        info!(
            infraction_id = %infraction.id,
            mod_id = %mod_id,
            new_penalty = ?infraction.punishment.as_ref().map(|p| p.kind),
            "Infraction punishment changed"
        );

        Ok(infraction)
    }

    /// Administer the punishment on an infraction that was left pending
    /// approval. The approver must hold the permission the penalty requires.
    pub async fn authorize_punishment(
        &self,
        infraction_id: &str,
        approver_permissions: Permissions,
    ) -> ModerationResult<Infraction> {
        let infraction = self
            .store
            .get_infraction(infraction_id)
            .ok_or_else(|| ModerationError::InfractionNotFound(infraction_id.to_string()))?;

        let Some(punishment) = &infraction.punishment else {
            return Err(ModerationError::ValidationFailed(
                "This infraction has no punishment to authorize".to_string(),
            ));
        };

        if !approver_permissions.contains(punishment.kind.required_permissions()) {
            return Err(ModerationError::MissingPermission(punishment.kind));
        }

        self.distributor(&infraction).administer_punishment().await?;

        info!(
            infraction_id = %infraction.id,
            user_id = %infraction.user_id,
            penalty = %punishment.kind,
            "Pending punishment authorized"
        );

        Ok(infraction)
    }

    /// Delete an infraction, reversing its punishment first if one is in
    /// force. Deleting an unknown id is a silent no-op.
    pub async fn remove_infraction(&self, infraction_id: &str) -> ModerationResult<()> {
        let Some(infraction) = self.store.get_infraction(infraction_id) else {
            return Ok(());
        };

        if infraction.punishment.is_some() {
            self.distributor(&infraction).remove_punishment().await?;
        }

        self.store.delete_infraction(infraction_id).await?;

        info!(
            infraction_id = %infraction_id,
            user_id = %infraction.user_id,
            "Infraction deleted"
        );

        Ok(())
    }

    fn distributor(&self, infraction: &Infraction) -> PunishmentDistributor<'a> {
        PunishmentDistributor::new(self.distributor_data(infraction), self.gateway, self.scheduler)
    }

    fn distributor_data(&self, infraction: &Infraction) -> DistributorData {
        DistributorData {
            user_id: infraction.user_id,
            guild_id: self.guild_id,
            reason: infraction.reason.clone(),
            punishment: infraction.punishment.clone(),
        }
    }
}
