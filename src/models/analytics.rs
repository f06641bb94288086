// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GA4 metric models published to the UI collaborator.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of realtime samples kept for the sparkline chart.
pub const MAX_SPARKLINE_POINTS: usize = 30;

/// A Google Analytics 4 property, as listed by the Admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ga4Property {
    /// Resource name, e.g. `properties/123456789`.
    pub id: String,
    pub display_name: String,
}

/// Today-vs-yesterday (or current-vs-previous-period) comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub today: f64,
    pub yesterday: f64,
}

impl MetricComparison {
    pub fn new(today: f64, yesterday: f64) -> Self {
        Self { today, yesterday }
    }

    /// Relative change in percent. A zero baseline never divides: it maps to
    /// 100% when today has any traffic and 0% when both sides are empty.
    pub fn percent_change(&self) -> f64 {
        if self.yesterday > 0.0 {
            (self.today - self.yesterday) / self.yesterday * 100.0
        } else if self.today > 0.0 {
            100.0
        } else {
            0.0
        }
    }

    pub fn is_positive(&self) -> bool {
        self.percent_change() >= 0.0
    }
}

/// Realtime active users plus the recent-history buffer for the sparkline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeData {
    pub active_users: u32,
    /// Bounded FIFO of recent samples, oldest first, newest last.
    pub sparkline: Vec<u32>,
}

/// Today-vs-yesterday daily metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub users: MetricComparison,
    pub sessions: MetricComparison,
    pub pageviews: MetricComparison,
    /// Percent (already scaled from the API's 0..1 ratio).
    pub bounce_rate: MetricComparison,
    /// Seconds.
    pub avg_session_duration: MetricComparison,
}

/// A single day on the 28-day trend chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// 28-day extended metrics with the daily trend for charting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedMetrics {
    pub active_users_28day: MetricComparison,
    pub event_count: MetricComparison,
    pub pageviews: MetricComparison,
    /// Current-period daily values, sorted ascending by date.
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPage {
    pub path: String,
    pub title: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSource {
    pub source: String,
    pub medium: String,
    /// Share of today's sessions, 0..100.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryData {
    pub country_code: String,
    pub country_name: String,
    pub users: u64,
    /// Share of today's active users, 0..100.
    pub percentage: f64,
}

/// Desktop/mobile/tablet share of today's active users, each 0..100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceBreakdown {
    pub desktop: f64,
    pub mobile: f64,
    pub tablet: f64,
}

/// The atomically-published aggregate of everything one GA4 refresh cycle
/// fetched. Replaced wholesale at the end of a successful cycle; on failure
/// only `is_connected` and `last_error` change so stale-but-present data
/// stays visible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub realtime: RealtimeData,
    pub daily: DailyMetrics,
    pub extended: ExtendedMetrics,
    pub top_pages: Vec<TopPage>,
    pub traffic_sources: Vec<TrafficSource>,
    pub countries: Vec<CountryData>,
    pub devices: DeviceBreakdown,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_connected: bool,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_change_zero_baseline() {
        assert_eq!(MetricComparison::new(0.0, 0.0).percent_change(), 0.0);
        assert_eq!(MetricComparison::new(5.0, 0.0).percent_change(), 100.0);
    }

    #[test]
    fn percent_change_regular() {
        let cmp = MetricComparison::new(150.0, 100.0);
        assert_eq!(cmp.percent_change(), 50.0);
        assert!(cmp.is_positive());

        let down = MetricComparison::new(50.0, 100.0);
        assert_eq!(down.percent_change(), -50.0);
        assert!(!down.is_positive());
    }
}
