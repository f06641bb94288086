// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Display formatting helpers for the menubar/dashboard collaborators.
//!
//! All numeric formatters are total: non-finite or negative input renders as
//! zero rather than propagating NaN into the UI.

use chrono::{DateTime, Utc};

/// Compact count, e.g. `1.5M`, `2.3K`, `842`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() || value < 0.0 {
        return "0".to_string();
    }
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{:.0}", value)
    }
}

/// Session duration in seconds, e.g. `3m 07s`.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0m 00s".to_string();
    }
    let total = seconds as u64;
    format!("{}m {:02}s", total / 60, total % 60)
}

/// Percentage clamped to the displayable 0..100 range, e.g. `42.7%`.
pub fn format_percentage(value: f64) -> String {
    if !value.is_finite() {
        return "0.0%".to_string();
    }
    format!("{:.1}%", value.clamp(0.0, 100.0))
}

/// Signed percent change clamped to ±999%, e.g. `+12.5%`, `-3.0%`.
pub fn format_change(value: f64) -> String {
    if !value.is_finite() {
        return "+0.0%".to_string();
    }
    let clamped = value.clamp(-999.0, 999.0);
    let sign = if clamped >= 0.0 { "+" } else { "" };
    format!("{}{:.1}%", sign, clamped)
}

/// Relative time, e.g. "just now", "5m ago", "2h ago".
pub fn time_ago(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - date).num_seconds().max(0);
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else {
        format!("{}h ago", seconds / 3600)
    }
}

/// Compact relative time for the menubar, e.g. "now", "5m", "2h", "3d".
pub fn time_ago_compact(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - date).num_seconds().max(0);
    if seconds < 60 {
        "now".to_string()
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h", seconds / 3600)
    } else {
        format!("{}d", seconds / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn number_scales() {
        assert_eq!(format_number(1_500_000.0), "1.5M");
        assert_eq!(format_number(2_300.0), "2.3K");
        assert_eq!(format_number(842.0), "842");
        assert_eq!(format_number(f64::NAN), "0");
        assert_eq!(format_number(-5.0), "0");
    }

    #[test]
    fn duration_zero_pads_seconds() {
        assert_eq!(format_duration(187.0), "3m 07s");
        assert_eq!(format_duration(f64::INFINITY), "0m 00s");
        assert_eq!(format_duration(-1.0), "0m 00s");
    }

    #[test]
    fn percentage_clamps() {
        assert_eq!(format_percentage(42.71), "42.7%");
        assert_eq!(format_percentage(140.0), "100.0%");
        assert_eq!(format_percentage(f64::NAN), "0.0%");
    }

    #[test]
    fn change_clamps_and_signs() {
        assert_eq!(format_change(12.49), "+12.5%");
        assert_eq!(format_change(-3.0), "-3.0%");
        assert_eq!(format_change(5000.0), "+999.0%");
        assert_eq!(format_change(f64::INFINITY), "+0.0%");
    }

    #[test]
    fn relative_time() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "just now");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(time_ago_compact(now - Duration::hours(2), now), "2h");
        assert_eq!(time_ago_compact(now - Duration::days(3), now), "3d");
    }
}
