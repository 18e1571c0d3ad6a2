// Per-company notification settings and their validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::Sport;

/// How often score-only updates may be posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFrequency {
    #[default]
    EveryPoint,
    EveryMinute,
    EveryQuarter,
}

impl UpdateFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateFrequency::EveryPoint => "every_point",
            UpdateFrequency::EveryMinute => "every_minute",
            UpdateFrequency::EveryQuarter => "every_quarter",
        }
    }
}

impl fmt::Display for UpdateFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every_point" => Ok(UpdateFrequency::EveryPoint),
            "every_minute" => Ok(UpdateFrequency::EveryMinute),
            "every_quarter" => Ok(UpdateFrequency::EveryQuarter),
            other => Err(format!("unknown update frequency: {other}")),
        }
    }
}

/// Rejections surfaced to admins when saving settings. These never reach
/// the engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("company id is required")]
    MissingCompanyId,

    #[error("notifications are enabled but no channel is configured")]
    NoChannelConfigured,

    #[error("channel id at position {index} is blank")]
    BlankChannel { index: usize },

    #[error("tracked game id at position {index} is blank")]
    BlankGameId { index: usize },
}

/// Notification configuration for one company and sport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub company_id: String,
    pub sport: Sport,
    pub enabled: bool,
    /// Delivery order follows this list.
    pub channel_ids: Vec<String>,
    pub update_frequency: UpdateFrequency,
    pub notify_game_start: bool,
    pub notify_game_end: bool,
    pub notify_quarter_end: bool,
    pub tracked_games: Vec<String>,
}

impl NotificationSettings {
    /// Settings created on first read: disabled, nothing tracked, all event
    /// toggles on.
    pub fn new(company_id: &str, sport: Sport) -> Self {
        Self {
            company_id: company_id.to_string(),
            sport,
            enabled: false,
            channel_ids: Vec::new(),
            update_frequency: UpdateFrequency::default(),
            notify_game_start: true,
            notify_game_end: true,
            notify_quarter_end: true,
            tracked_games: Vec::new(),
        }
    }

    /// Check the rules an admin save must satisfy.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.company_id.trim().is_empty() {
            return Err(SettingsError::MissingCompanyId);
        }
        if let Some(index) = self.channel_ids.iter().position(|c| c.trim().is_empty()) {
            return Err(SettingsError::BlankChannel { index });
        }
        if let Some(index) = self.tracked_games.iter().position(|g| g.trim().is_empty()) {
            return Err(SettingsError::BlankGameId { index });
        }
        if self.enabled && self.channel_ids.is_empty() {
            return Err(SettingsError::NoChannelConfigured);
        }
        Ok(())
    }

    /// Trim ids and drop duplicates, keeping first occurrence order.
    pub fn normalize(&mut self) {
        self.company_id = self.company_id.trim().to_string();
        dedup_trimmed(&mut self.channel_ids);
        dedup_trimmed(&mut self.tracked_games);
    }
}

fn dedup_trimmed(ids: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain_mut(|id| {
        *id = id.trim().to_string();
        seen.insert(id.clone())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_settings() -> NotificationSettings {
        NotificationSettings {
            enabled: true,
            channel_ids: vec!["chan_1".into()],
            tracked_games: vec!["401".into()],
            ..NotificationSettings::new("biz_1", Sport::Nba)
        }
    }

    #[test]
    fn defaults_are_disabled_with_all_toggles_on() {
        let s = NotificationSettings::new("biz_1", Sport::Nfl);
        assert!(!s.enabled);
        assert!(s.channel_ids.is_empty());
        assert_eq!(s.update_frequency, UpdateFrequency::EveryPoint);
        assert!(s.notify_game_start && s.notify_game_end && s.notify_quarter_end);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn enabled_without_channel_is_rejected() {
        let s = NotificationSettings {
            channel_ids: vec![],
            ..enabled_settings()
        };
        assert_eq!(s.validate(), Err(SettingsError::NoChannelConfigured));
    }

    #[test]
    fn blank_company_is_rejected() {
        let s = NotificationSettings {
            company_id: "  ".into(),
            ..enabled_settings()
        };
        assert_eq!(s.validate(), Err(SettingsError::MissingCompanyId));
    }

    #[test]
    fn blank_entries_report_position() {
        let s = NotificationSettings {
            channel_ids: vec!["a".into(), "".into()],
            ..enabled_settings()
        };
        assert_eq!(s.validate(), Err(SettingsError::BlankChannel { index: 1 }));

        let s = NotificationSettings {
            tracked_games: vec![" ".into()],
            ..enabled_settings()
        };
        assert_eq!(s.validate(), Err(SettingsError::BlankGameId { index: 0 }));
    }

    #[test]
    fn normalize_trims_and_dedups_in_order() {
        let mut s = NotificationSettings {
            channel_ids: vec![" b ".into(), "a".into(), "b".into()],
            tracked_games: vec!["2".into(), "1".into(), " 2".into()],
            ..enabled_settings()
        };
        s.normalize();
        assert_eq!(s.channel_ids, vec!["b", "a"]);
        assert_eq!(s.tracked_games, vec!["2", "1"]);
    }

    #[test]
    fn frequency_serde_uses_snake_case() {
        let json = serde_json::to_string(&UpdateFrequency::EveryMinute).unwrap();
        assert_eq!(json, "\"every_minute\"");
        assert_eq!(
            "every_quarter".parse::<UpdateFrequency>().unwrap(),
            UpdateFrequency::EveryQuarter
        );
        assert!("hourly".parse::<UpdateFrequency>().is_err());
    }

    #[test]
    fn settings_json_is_camel_case() {
        let value = serde_json::to_value(enabled_settings()).unwrap();
        assert_eq!(value["companyId"], "biz_1");
        assert_eq!(value["sport"], "nba");
        assert_eq!(value["updateFrequency"], "every_point");
        assert_eq!(value["notifyQuarterEnd"], true);
    }
}
