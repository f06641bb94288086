// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pure response-normalization helpers.
//!
//! Report payloads from the GA4 Data API and the Search Console API are
//! schemaless enough (string-typed metric values, optional row arrays) that
//! we walk them as `serde_json::Value` and normalize into the typed models
//! here. Every function in this module is total: missing fields and parse
//! failures become zeros or skipped rows, never errors.

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::{
    CountryData, DailyMetrics, DeviceBreakdown, ExtendedMetrics, Ga4Property, MetricComparison,
    SearchConsoleMetrics, SearchConsoleSite, SearchPage, SearchQuery, SearchTrendPoint, TopPage,
    TrafficSource, TrendPoint,
};

/// Parse a string-typed metric value, defaulting to 0 on failure.
pub fn metric_f64(raw: &str) -> f64 {
    raw.parse().unwrap_or(0.0)
}

/// Share of `value` in `total` as a percentage. Zero totals are 0%, not NaN.
pub fn percent_of_total(value: f64, total: f64) -> f64 {
    if total > 0.0 {
        value / total * 100.0
    } else {
        0.0
    }
}

fn rows(report: &Value) -> &[Value] {
    report["rows"].as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn dimension(row: &Value, index: usize) -> &str {
    row["dimensionValues"][index]["value"].as_str().unwrap_or("")
}

fn metric(row: &Value, index: usize) -> f64 {
    metric_f64(row["metricValues"][index]["value"].as_str().unwrap_or("0"))
}

/// The GA4 `date` dimension comes back as `YYYYMMDD`; be liberal and accept
/// ISO dates too.
fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

// ─── GA4 Admin API ──────────────────────────────────────────────────────────

/// Flatten an `accountSummaries` response into the property list.
pub fn parse_account_summaries(response: &Value) -> Vec<Ga4Property> {
    let accounts = response["accountSummaries"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut properties = Vec::new();
    for account in accounts {
        let summaries = account["propertySummaries"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for prop in summaries {
            if let (Some(id), Some(display_name)) =
                (prop["property"].as_str(), prop["displayName"].as_str())
            {
                properties.push(Ga4Property {
                    id: id.to_string(),
                    display_name: display_name.to_string(),
                });
            }
        }
    }
    properties
}

// ─── GA4 Data API ───────────────────────────────────────────────────────────

/// Active users from a realtime report (first row, first metric).
pub fn parse_realtime_active_users(report: &Value) -> u32 {
    rows(report)
        .first()
        .map(|row| metric(row, 0) as u32)
        .unwrap_or(0)
}

/// Parse the two-range daily report into today-vs-yesterday comparisons.
///
/// The two date ranges come back tagged with an explicit `date_range_N`
/// dimension value; row order is not significant. Range 0 is yesterday,
/// range 1 is today, matching the order the request listed them in.
pub fn parse_daily_metrics(report: &Value) -> DailyMetrics {
    let mut yesterday = [0.0f64; 5];
    let mut today = [0.0f64; 5];

    for row in rows(report) {
        let values: Vec<f64> = (0..5).map(|i| metric(row, i)).collect();
        let target = if dimension(row, 0) == "date_range_0" {
            &mut yesterday
        } else {
            &mut today
        };
        target.copy_from_slice(&values);
    }

    DailyMetrics {
        users: MetricComparison::new(today[0], yesterday[0]),
        sessions: MetricComparison::new(today[1], yesterday[1]),
        pageviews: MetricComparison::new(today[2], yesterday[2]),
        // bounceRate is a 0..1 ratio in the API
        bounce_rate: MetricComparison::new(today[3] * 100.0, yesterday[3] * 100.0),
        avg_session_duration: MetricComparison::new(today[4], yesterday[4]),
    }
}

/// Period boundaries used both to build the 28-day request and to bucket its
/// response rows.
#[derive(Debug, Clone, Copy)]
pub struct PeriodBounds {
    pub current_start: NaiveDate,
    pub current_end: NaiveDate,
    pub previous_start: NaiveDate,
    pub previous_end: NaiveDate,
}

impl PeriodBounds {
    /// Two back-to-back 28-day windows ending yesterday.
    pub fn trailing_28_days(today: NaiveDate) -> Self {
        let current_end = today - chrono::Duration::days(1);
        let current_start = current_end - chrono::Duration::days(28);
        let previous_end = current_start - chrono::Duration::days(1);
        let previous_start = previous_end - chrono::Duration::days(28);
        Self {
            current_start,
            current_end,
            previous_start,
            previous_end,
        }
    }
}

/// Bucket the combined two-range 28-day report by date into current vs
/// previous period sums, collecting the current period's daily trend.
pub fn parse_extended_metrics(report: &Value, bounds: PeriodBounds) -> ExtendedMetrics {
    let mut current = [0.0f64; 3];
    let mut previous = [0.0f64; 3];
    let mut trend = Vec::new();

    for row in rows(report) {
        let Some(date) = parse_report_date(dimension(row, 0)) else {
            continue;
        };
        let users = metric(row, 0);
        let events = metric(row, 1);
        let pageviews = metric(row, 2);

        if date >= bounds.current_start && date <= bounds.current_end {
            current[0] += users;
            current[1] += events;
            current[2] += pageviews;
            trend.push(TrendPoint { date, value: users });
        } else if date >= bounds.previous_start && date <= bounds.previous_end {
            previous[0] += users;
            previous[1] += events;
            previous[2] += pageviews;
        }
    }

    trend.sort_by_key(|point| point.date);

    ExtendedMetrics {
        active_users_28day: MetricComparison::new(current[0], previous[0]),
        event_count: MetricComparison::new(current[1], previous[1]),
        pageviews: MetricComparison::new(current[2], previous[2]),
        trend,
    }
}

pub fn parse_top_pages(report: &Value) -> Vec<TopPage> {
    rows(report)
        .iter()
        .filter_map(|row| {
            let path = row["dimensionValues"][0]["value"].as_str()?;
            let title = row["dimensionValues"][1]["value"].as_str()?;
            Some(TopPage {
                path: path.to_string(),
                title: title.to_string(),
                views: metric(row, 0) as u64,
            })
        })
        .collect()
}

pub fn parse_traffic_sources(report: &Value) -> Vec<TrafficSource> {
    let total: f64 = rows(report).iter().map(|row| metric(row, 0)).sum();

    rows(report)
        .iter()
        .filter_map(|row| {
            let source = row["dimensionValues"][0]["value"].as_str()?;
            let medium = row["dimensionValues"][1]["value"].as_str()?;
            Some(TrafficSource {
                source: source.to_string(),
                medium: medium.to_string(),
                percentage: percent_of_total(metric(row, 0), total),
            })
        })
        .collect()
}

pub fn parse_countries(report: &Value) -> Vec<CountryData> {
    let total: f64 = rows(report).iter().map(|row| metric(row, 0)).sum();

    rows(report)
        .iter()
        .filter_map(|row| {
            let name = row["dimensionValues"][0]["value"].as_str()?;
            let code = row["dimensionValues"][1]["value"].as_str()?;
            let users = metric(row, 0);
            Some(CountryData {
                country_code: code.to_string(),
                country_name: name.to_string(),
                users: users as u64,
                percentage: percent_of_total(users, total),
            })
        })
        .collect()
}

pub fn parse_devices(report: &Value) -> DeviceBreakdown {
    let mut desktop = 0.0;
    let mut mobile = 0.0;
    let mut tablet = 0.0;
    let mut total = 0.0;

    for row in rows(report) {
        let users = metric(row, 0);
        total += users;
        match dimension(row, 0).to_ascii_lowercase().as_str() {
            "desktop" => desktop += users,
            "mobile" => mobile += users,
            "tablet" => tablet += users,
            _ => {}
        }
    }

    DeviceBreakdown {
        desktop: percent_of_total(desktop, total),
        mobile: percent_of_total(mobile, total),
        tablet: percent_of_total(tablet, total),
    }
}

// ─── Search Console ─────────────────────────────────────────────────────────

/// Flatten a `sites` listing.
pub fn parse_sites(response: &Value) -> Vec<SearchConsoleSite> {
    response["siteEntry"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter_map(|entry| {
            Some(SearchConsoleSite {
                site_url: entry["siteUrl"].as_str()?.to_string(),
                permission_level: entry["permissionLevel"].as_str()?.to_string(),
            })
        })
        .collect()
}

fn search_rows(response: &Value) -> &[Value] {
    response["rows"].as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Combine a current-period query (with `date` dimension) and a previous
/// period aggregate (no dimensions) into the comparison metrics.
pub fn parse_search_metrics(current: &Value, previous: &Value) -> SearchConsoleMetrics {
    let current_rows = search_rows(current);

    let mut total_clicks = 0.0;
    let mut total_impressions = 0.0;
    let mut position_sum = 0.0;
    let mut trend = Vec::new();

    for row in current_rows {
        let clicks = row["clicks"].as_f64().unwrap_or(0.0);
        let impressions = row["impressions"].as_f64().unwrap_or(0.0);
        let ctr = row["ctr"].as_f64().unwrap_or(0.0);
        let position = row["position"].as_f64().unwrap_or(0.0);

        total_clicks += clicks;
        total_impressions += impressions;
        position_sum += position;

        if let Some(date) = row["keys"][0].as_str().and_then(parse_date_key) {
            trend.push(SearchTrendPoint {
                date,
                clicks: clicks as u64,
                impressions: impressions as u64,
                ctr: ctr * 100.0,
                position,
            });
        }
    }

    trend.sort_by_key(|point| point.date);

    let (total_ctr, avg_position) = if current_rows.is_empty() {
        (0.0, 0.0)
    } else {
        (
            total_clicks / total_impressions.max(1.0) * 100.0,
            position_sum / current_rows.len() as f64,
        )
    };

    let prev = search_rows(previous).first();
    let prev_clicks = prev.map_or(0.0, |r| r["clicks"].as_f64().unwrap_or(0.0));
    let prev_impressions = prev.map_or(0.0, |r| r["impressions"].as_f64().unwrap_or(0.0));
    let prev_ctr = prev.map_or(0.0, |r| r["ctr"].as_f64().unwrap_or(0.0)) * 100.0;
    let prev_position = prev.map_or(0.0, |r| r["position"].as_f64().unwrap_or(0.0));

    SearchConsoleMetrics {
        clicks: MetricComparison::new(total_clicks, prev_clicks),
        impressions: MetricComparison::new(total_impressions, prev_impressions),
        ctr: MetricComparison::new(total_ctr, prev_ctr),
        position: MetricComparison::new(avg_position, prev_position),
        trend,
    }
}

fn parse_date_key(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

pub fn parse_search_queries(response: &Value) -> Vec<SearchQuery> {
    search_rows(response)
        .iter()
        .filter_map(|row| {
            let query = row["keys"][0].as_str()?;
            Some(SearchQuery {
                query: query.to_string(),
                clicks: row["clicks"].as_f64().unwrap_or(0.0) as u64,
                impressions: row["impressions"].as_f64().unwrap_or(0.0) as u64,
                ctr: row["ctr"].as_f64().unwrap_or(0.0) * 100.0,
                position: row["position"].as_f64().unwrap_or(0.0),
            })
        })
        .collect()
}

pub fn parse_search_pages(response: &Value) -> Vec<SearchPage> {
    search_rows(response)
        .iter()
        .filter_map(|row| {
            let page = row["keys"][0].as_str()?;
            Some(SearchPage {
                page: page.to_string(),
                clicks: row["clicks"].as_f64().unwrap_or(0.0) as u64,
                impressions: row["impressions"].as_f64().unwrap_or(0.0) as u64,
                ctr: row["ctr"].as_f64().unwrap_or(0.0) * 100.0,
                position: row["position"].as_f64().unwrap_or(0.0),
            })
        })
        .collect()
}
