//! Infraction records
//!
//! This module defines the infraction record stored for every moderation
//! incident, along with the archiving rules for superseded punishments.

use crate::moderation::Punishment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// A punishment that was superseded by a later change. Entries are appended
/// when the current punishment is replaced and are never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPunishment {
    /// The punishment as it was when it got replaced
    pub punishment: Punishment,
    /// The moderator who replaced it (not the original issuer)
    pub changed_by_id: u64,
    /// When this punishment was made historical
    pub historical_at: DateTime<Utc>,
}

/// Record of a moderation incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Infraction {
    /// Unique ID of this infraction
    pub id: String,
    /// ID of the user who received the infraction
    pub user_id: u64,
    /// ID of the moderator who issued it
    pub mod_id: u64,
    /// ID of the channel where the incident happened
    pub channel_id: u64,
    /// Why the infraction was issued
    pub reason: String,
    /// Notes only visible to moderators
    pub mod_notes: Option<String>,
    /// Notes shown to the affected user
    pub public_notes: Option<String>,
    /// Link to the message that sparked the infraction
    pub related_message_link: Option<String>,
    /// ID of the staff log message for this infraction
    pub log_message_id: Option<u64>,
    /// The punishment currently in force, if any
    pub punishment: Option<Punishment>,
    /// Punishments superseded by later changes, oldest first
    pub historical_punishments: Vec<HistoricalPunishment>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl Infraction {
    /// Create a new infraction record
    pub fn new(user_id: u64, mod_id: u64, channel_id: u64, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        let reason = reason.into();

        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            mod_id,
            channel_id,
            reason: if reason.is_empty() {
                "No reason provided.".to_string()
            } else {
                reason
            },
            mod_notes: None,
            public_notes: None,
            related_message_link: None,
            log_message_id: None,
            punishment: None,
            historical_punishments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the current punishment into the historical list, recording who
    /// replaced it and when. Returns the archived punishment, or `None` if
    /// there was nothing in force.
    pub fn archive_punishment(&mut self, changed_by_id: u64) -> Option<Punishment> {
        let punishment = self.punishment.take()?;

        self.historical_punishments.push(HistoricalPunishment {
            punishment: punishment.clone(),
            changed_by_id,
            historical_at: Utc::now(),
        });
        self.updated_at = Utc::now();

        info!(
            infraction_id = %self.id,
            user_id = %self.user_id,
            changed_by_id = %changed_by_id,
            penalty = %punishment.kind,
            "Punishment archived"
        );

        Some(punishment)
    }

    /// Set a new current punishment
    pub fn set_punishment(&mut self, punishment: Option<Punishment>) {
        self.punishment = punishment;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::PunishmentKind;

    #[test]
    fn test_new_infraction_defaults() {
        let infraction = Infraction::new(12345, 67890, 555, "Spamming");
        assert_eq!(infraction.user_id, 12345);
        assert_eq!(infraction.mod_id, 67890);
        assert_eq!(infraction.reason, "Spamming");
        assert!(infraction.punishment.is_none());
        assert!(infraction.historical_punishments.is_empty());

        let infraction = Infraction::new(12345, 67890, 555, "");
        assert_eq!(infraction.reason, "No reason provided.");
    }

    #[test]
    fn test_archive_appends_and_clears_current() {
        let mut infraction = Infraction::new(12345, 67890, 555, "Spamming");
        infraction.set_punishment(Some(Punishment::permanent(PunishmentKind::Ban)));

        let archived = infraction.archive_punishment(99999).unwrap();
        assert_eq!(archived.kind, PunishmentKind::Ban);
        assert!(infraction.punishment.is_none());
        assert_eq!(infraction.historical_punishments.len(), 1);
        assert_eq!(infraction.historical_punishments[0].changed_by_id, 99999);

        // Nothing in force, nothing to archive.
        assert!(infraction.archive_punishment(99999).is_none());
        assert_eq!(infraction.historical_punishments.len(), 1);
    }

    #[test]
    fn test_history_accumulates_in_order() {
        let mut infraction = Infraction::new(12345, 67890, 555, "Spamming");

        infraction.set_punishment(Some(Punishment::permanent(PunishmentKind::Kick)));
        infraction.archive_punishment(1);
        infraction.set_punishment(Some(Punishment::temporary(PunishmentKind::TempBan, 3_600_000)));
        infraction.archive_punishment(2);
        infraction.set_punishment(Some(Punishment::permanent(PunishmentKind::Ban)));

        let history = &infraction.historical_punishments;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].punishment.kind, PunishmentKind::Kick);
        assert_eq!(history[0].changed_by_id, 1);
        assert_eq!(history[1].punishment.kind, PunishmentKind::TempBan);
        assert_eq!(history[1].changed_by_id, 2);
        assert_eq!(
            infraction.punishment.as_ref().unwrap().kind,
            PunishmentKind::Ban
        );
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut infraction = Infraction::new(12345, 67890, 555, "Trolling");
        infraction.mod_notes = Some("Second offence".to_string());
        infraction.set_punishment(Some(Punishment::temporary(PunishmentKind::Timeout, 900_000)));

        let yaml = serde_yaml::to_string(&infraction).expect("Failed to serialize");
        assert!(yaml.contains("user_id: 12345"));
        assert!(yaml.contains("penalty") || yaml.contains("kind: timeout"));

        let deserialized: Infraction = serde_yaml::from_str(&yaml).expect("Failed to deserialize");
        assert_eq!(deserialized.id, infraction.id);
        assert_eq!(
            deserialized.punishment.unwrap().duration,
            Some(900_000)
        );
    }
}
