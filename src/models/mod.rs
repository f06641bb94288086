// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod alert;
pub mod analytics;
pub mod search;
pub mod settings;

pub use alert::{AlertItem, AlertKind, MAX_RECENT_ALERTS};
pub use analytics::{
    AnalyticsSnapshot, CountryData, DailyMetrics, DeviceBreakdown, ExtendedMetrics, Ga4Property,
    MetricComparison, RealtimeData, TopPage, TrafficSource, TrendPoint, MAX_SPARKLINE_POINTS,
};
pub use search::{
    SearchConsoleMetrics, SearchConsoleSite, SearchConsoleSnapshot, SearchPage, SearchQuery,
    SearchTrendPoint,
};
pub use settings::{AlertSettings, RefreshInterval, Settings};
