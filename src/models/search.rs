// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Search Console models, parallel in shape to the GA4 snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MetricComparison;

/// A site (or domain property) the signed-in user can read in Search Console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConsoleSite {
    pub site_url: String,
    pub permission_level: String,
}

impl SearchConsoleSite {
    /// Human-friendly name without the `sc-domain:`/scheme prefixes.
    pub fn display_name(&self) -> String {
        self.site_url
            .trim_start_matches("sc-domain:")
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string()
    }
}

/// One day on the search-performance trend chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTrendPoint {
    pub date: NaiveDate,
    pub clicks: u64,
    pub impressions: u64,
    /// Percent, 0..100.
    pub ctr: f64,
    pub position: f64,
}

/// 28-day search performance vs the previous 28-day period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConsoleMetrics {
    pub clicks: MetricComparison,
    pub impressions: MetricComparison,
    pub ctr: MetricComparison,
    pub position: MetricComparison,
    pub trend: Vec<SearchTrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub page: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

/// Published Search Console aggregate. Same atomic-replace discipline as
/// [`crate::models::AnalyticsSnapshot`], fetched and failed independently of
/// GA4.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConsoleSnapshot {
    pub metrics: SearchConsoleMetrics,
    pub top_queries: Vec<SearchQuery>,
    pub top_pages: Vec<SearchPage>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_connected: bool,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_prefixes() {
        let domain = SearchConsoleSite {
            site_url: "sc-domain:example.com".into(),
            permission_level: "siteOwner".into(),
        };
        assert_eq!(domain.display_name(), "example.com");

        let url = SearchConsoleSite {
            site_url: "https://example.com/".into(),
            permission_level: "siteFullUser".into(),
        };
        assert_eq!(url.display_name(), "example.com/");
    }
}
