//! Punishment types
//!
//! This module defines the penalties that can be attached to an infraction,
//! the permission each penalty requires, and the punishment-change rules.

use crate::moderation::{ModerationError, ModerationResult};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::Permissions;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The penalty kinds that can be given to a user for an infraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentKind {
    Timeout,
    Kick,
    #[serde(rename = "tempban")]
    TempBan,
    Ban,
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Kick => write!(f, "kick"),
            Self::TempBan => write!(f, "tempban"),
            Self::Ban => write!(f, "ban"),
        }
    }
}

/// Punishment changes the system refuses: once a member has been banned,
/// tempbanned, or kicked, the infraction cannot be rewritten into a lighter
/// penalty after the fact.
const DISALLOWED_TRANSITIONS: [(PunishmentKind, PunishmentKind); 5] = [
    (PunishmentKind::Ban, PunishmentKind::Kick),
    (PunishmentKind::Ban, PunishmentKind::Timeout),
    (PunishmentKind::TempBan, PunishmentKind::Kick),
    (PunishmentKind::TempBan, PunishmentKind::Timeout),
    (PunishmentKind::Kick, PunishmentKind::Timeout),
];

impl PunishmentKind {
    /// Human-facing label ("Tempban", "Kick", ...)
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::Kick => "Kick",
            Self::TempBan => "Tempban",
            Self::Ban => "Ban",
        }
    }

    /// Check if this penalty requires a duration
    #[must_use]
    pub fn is_temporary(self) -> bool {
        matches!(self, Self::Timeout | Self::TempBan)
    }

    /// Check if this penalty is a ban (permanent or temporary)
    #[must_use]
    pub fn is_ban(self) -> bool {
        matches!(self, Self::Ban | Self::TempBan)
    }

    /// The guild permission a moderator must hold to administer this penalty
    #[must_use]
    pub fn required_permissions(self) -> Permissions {
        match self {
            Self::Ban | Self::TempBan => Permissions::BAN_MEMBERS,
            Self::Kick => Permissions::KICK_MEMBERS,
            Self::Timeout => Permissions::MODERATE_MEMBERS,
        }
    }

    /// Check whether changing a punishment of this kind to `to` is allowed.
    /// Clearing the punishment entirely (`to` = `None`) is always allowed.
    #[must_use]
    pub fn transition_allowed(self, to: Option<PunishmentKind>) -> bool {
        match to {
            Some(to) => !DISALLOWED_TRANSITIONS.contains(&(self, to)),
            None => true,
        }
    }
}

/// A penalty attached to an infraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punishment {
    pub kind: PunishmentKind,

    /// The duration of the punishment in milliseconds.
    /// Only applicable to temporary punishments.
    pub duration: Option<u64>,

    /// The duration as the moderator typed it (e.g. "2h"), kept for display.
    pub human_readable_duration: Option<String>,
}

impl Punishment {
    /// Create a permanent punishment (ban or kick)
    #[must_use]
    pub fn permanent(kind: PunishmentKind) -> Self {
        Self {
            kind,
            duration: None,
            human_readable_duration: None,
        }
    }

    /// Create a temporary punishment (timeout or tempban) from a duration in
    /// milliseconds
    #[must_use]
    pub fn temporary(kind: PunishmentKind, duration_ms: u64) -> Self {
        Self {
            kind,
            duration: Some(duration_ms),
            human_readable_duration: Some(format_duration(duration_ms)),
        }
    }

    /// Validate the duration invariant: temporary punishments require a
    /// positive duration. Must be called before any platform call or store
    /// write so that invalid punishments are never partially applied.
    pub fn validate(&self) -> ModerationResult<()> {
        if self.kind.is_temporary() && !self.duration.is_some_and(|d| d > 0) {
            return Err(ModerationError::ValidationFailed(format!(
                "A {} punishment requires a positive duration",
                self.kind
            )));
        }
        Ok(())
    }

    /// The instant a timeout of this duration would lapse, measured from `now`
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration
            .map(|ms| now + chrono::Duration::milliseconds(ms as i64))
    }
}

impl fmt::Display for Punishment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.human_readable_duration {
            Some(duration) => write!(f, "{} ({duration})", self.kind.label()),
            None => write!(f, "{}", self.kind.label()),
        }
    }
}

/// Converts human-readable time into milliseconds.
///
/// The input follows the pattern `{length}{unit}` where `{unit}` is one of
/// `m` (minutes), `h` (hours), `d` (days) or `w` (weeks), e.g. "15m", "2h".
pub fn parse_human_duration(input: &str) -> ModerationResult<u64> {
    let input = input.trim();
    let mut chars = input.chars();
    let unit = chars.next_back();
    let digits = chars.as_str();

    let length: u64 = digits
        .parse()
        .map_err(|_| ModerationError::ValidationFailed(format!("Invalid duration: {input}")))?;
    if length == 0 {
        return Err(ModerationError::ValidationFailed(format!(
            "Invalid duration: {input}"
        )));
    }

    let factor: u64 = match unit {
        Some('m') => 60 * 1000,
        Some('h') => 60 * 60 * 1000,
        Some('d') => 24 * 60 * 60 * 1000,
        Some('w') => 7 * 24 * 60 * 60 * 1000,
        _ => {
            return Err(ModerationError::ValidationFailed(format!(
                "Invalid duration unit: {input}"
            )));
        }
    };

    Ok(length * factor)
}

/// Formats a millisecond duration back into the largest whole unit
#[must_use]
pub fn format_duration(ms: u64) -> String {
    const UNITS: [(u64, &str); 4] = [
        (7 * 24 * 60 * 60 * 1000, "w"),
        (24 * 60 * 60 * 1000, "d"),
        (60 * 60 * 1000, "h"),
        (60 * 1000, "m"),
    ];

    for (factor, unit) in UNITS {
        if ms >= factor && ms % factor == 0 {
            return format!("{}{unit}", ms / factor);
        }
    }
    format!("{}s", ms / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [PunishmentKind; 4] = [
        PunishmentKind::Timeout,
        PunishmentKind::Kick,
        PunishmentKind::TempBan,
        PunishmentKind::Ban,
    ];

    #[test]
    fn test_temporary_kinds_require_duration() {
        for kind in [PunishmentKind::Timeout, PunishmentKind::TempBan] {
            let punishment = Punishment {
                kind,
                duration: None,
                human_readable_duration: None,
            };
            assert!(punishment.validate().is_err());

            let punishment = Punishment {
                kind,
                duration: Some(0),
                human_readable_duration: None,
            };
            assert!(punishment.validate().is_err());

            assert!(Punishment::temporary(kind, 60_000).validate().is_ok());
        }
    }

    #[test]
    fn test_permanent_kinds_need_no_duration() {
        for kind in [PunishmentKind::Kick, PunishmentKind::Ban] {
            assert!(Punishment::permanent(kind).validate().is_ok());
        }
    }

    #[test]
    fn test_transition_table() {
        let disallowed = [
            (PunishmentKind::Ban, PunishmentKind::Kick),
            (PunishmentKind::Ban, PunishmentKind::Timeout),
            (PunishmentKind::TempBan, PunishmentKind::Kick),
            (PunishmentKind::TempBan, PunishmentKind::Timeout),
            (PunishmentKind::Kick, PunishmentKind::Timeout),
        ];

        // Every ordered pair, including self-transitions, follows the table.
        for from in ALL_KINDS {
            for to in ALL_KINDS {
                let expected = !disallowed.contains(&(from, to));
                assert_eq!(
                    from.transition_allowed(Some(to)),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }

        // Clearing the punishment is always allowed.
        for from in ALL_KINDS {
            assert!(from.transition_allowed(None));
        }
    }

    #[test]
    fn test_required_permissions() {
        assert_eq!(
            PunishmentKind::Ban.required_permissions(),
            Permissions::BAN_MEMBERS
        );
        assert_eq!(
            PunishmentKind::TempBan.required_permissions(),
            Permissions::BAN_MEMBERS
        );
        assert_eq!(
            PunishmentKind::Kick.required_permissions(),
            Permissions::KICK_MEMBERS
        );
        assert_eq!(
            PunishmentKind::Timeout.required_permissions(),
            Permissions::MODERATE_MEMBERS
        );
    }

    #[test]
    fn test_parse_human_duration() {
        assert_eq!(parse_human_duration("15m").unwrap(), 900_000);
        assert_eq!(parse_human_duration("2h").unwrap(), 7_200_000);
        assert_eq!(parse_human_duration("5d").unwrap(), 432_000_000);
        assert_eq!(parse_human_duration("1w").unwrap(), 604_800_000);

        assert!(parse_human_duration("").is_err());
        assert!(parse_human_duration("h").is_err());
        assert!(parse_human_duration("0m").is_err());
        assert!(parse_human_duration("10x").is_err());
        assert!(parse_human_duration("ten minutes").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(900_000), "15m");
        assert_eq!(format_duration(7_200_000), "2h");
        assert_eq!(format_duration(604_800_000), "1w");
        assert_eq!(format_duration(90_000), "90s");
    }

    #[test]
    fn test_serde_penalty_names() {
        let yaml = serde_yaml::to_string(&PunishmentKind::TempBan).unwrap();
        assert_eq!(yaml.trim(), "tempban");
        let kind: PunishmentKind = serde_yaml::from_str("timeout").unwrap();
        assert_eq!(kind, PunishmentKind::Timeout);
    }

    #[test]
    fn test_display() {
        let punishment = Punishment::temporary(PunishmentKind::TempBan, 7_200_000);
        assert_eq!(punishment.to_string(), "Tempban (2h)");

        let punishment = Punishment::permanent(PunishmentKind::Ban);
        assert_eq!(punishment.to_string(), "Ban");
    }
}
