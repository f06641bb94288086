// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-facing runtime settings.
//!
//! The settings UI itself lives outside this crate; the core reads these
//! values as configuration input and persists selection changes back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often the refresh cycles run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshInterval {
    #[serde(rename = "15s")]
    FifteenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
}

impl Default for RefreshInterval {
    fn default() -> Self {
        RefreshInterval::ThirtySeconds
    }
}

impl RefreshInterval {
    pub fn as_duration(self) -> Duration {
        match self {
            RefreshInterval::FifteenSeconds => Duration::from_secs(15),
            RefreshInterval::ThirtySeconds => Duration::from_secs(30),
            RefreshInterval::OneMinute => Duration::from_secs(60),
            RefreshInterval::FiveMinutes => Duration::from_secs(300),
        }
    }
}

/// Alert thresholds and switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled: bool,
    pub threshold_high: u32,
    pub threshold_low: u32,
    pub on_spike: bool,
    pub on_drop: bool,
    pub daily_user_goal: u32,
    pub goal_alerts: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_high: 500,
            threshold_low: 10,
            on_spike: true,
            on_drop: true,
            daily_user_goal: 1000,
            goal_alerts: true,
        }
    }
}

/// Everything the user can tune, serialized as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub selected_property_id: Option<String>,
    pub selected_site_url: Option<String>,
    pub refresh_interval: RefreshInterval,
    pub alerts: AlertSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_round_trips_through_serde() {
        let json = serde_json::to_string(&RefreshInterval::FiveMinutes).unwrap();
        assert_eq!(json, "\"5m\"");
        let back: RefreshInterval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RefreshInterval::FiveMinutes);
    }

    #[test]
    fn settings_default_when_fields_missing() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.refresh_interval, RefreshInterval::ThirtySeconds);
        assert_eq!(settings.alerts.threshold_high, 500);
        assert_eq!(settings.alerts.daily_user_goal, 1000);
        assert!(settings.selected_property_id.is_none());
    }
}
