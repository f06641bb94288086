// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GA4 Admin + Data API client.
//!
//! Every report is a Bearer-authorized POST against a per-property path;
//! responses are normalized by [`crate::services::normalize`].

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::{
    CountryData, DailyMetrics, DeviceBreakdown, ExtendedMetrics, Ga4Property, TopPage,
    TrafficSource,
};
use crate::services::normalize::{self, PeriodBounds};

const ADMIN_API_BASE: &str = "https://analyticsadmin.googleapis.com/v1beta";
const DATA_API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta";

/// The GA4 fetch surface used by the refresh orchestrator. Substitutable in
/// tests.
#[async_trait]
pub trait Ga4Api: Send + Sync {
    async fn list_properties(&self, token: &str) -> Result<Vec<Ga4Property>>;
    async fn realtime_active_users(&self, token: &str, property_id: &str) -> Result<u32>;
    async fn daily_metrics(&self, token: &str, property_id: &str) -> Result<DailyMetrics>;
    async fn extended_metrics(&self, token: &str, property_id: &str) -> Result<ExtendedMetrics>;
    async fn top_pages(&self, token: &str, property_id: &str) -> Result<Vec<TopPage>>;
    async fn traffic_sources(&self, token: &str, property_id: &str) -> Result<Vec<TrafficSource>>;
    async fn countries(&self, token: &str, property_id: &str) -> Result<Vec<CountryData>>;
    async fn devices(&self, token: &str, property_id: &str) -> Result<DeviceBreakdown>;
}

/// GA4 API client.
#[derive(Clone)]
pub struct Ga4Client {
    http: reqwest::Client,
    admin_base: String,
    data_base: String,
}

impl Default for Ga4Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Ga4Client {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            admin_base: ADMIN_API_BASE.to_string(),
            data_base: DATA_API_BASE.to_string(),
        }
    }

    /// Point at non-default API bases (local test server).
    pub fn with_bases(mut self, admin_base: String, data_base: String) -> Self {
        self.admin_base = admin_base;
        self.data_base = data_base;
        self
    }

    async fn get_json(&self, url: &str, token: &str) -> Result<Value> {
        let response = self.http.get(url).bearer_auth(token).send().await?;
        check_response_json(response).await
    }

    /// POST a report request body to `{property_id}:{method}`.
    async fn run_report(
        &self,
        token: &str,
        property_id: &str,
        method: &str,
        body: &Value,
    ) -> Result<Value> {
        let url = format!("{}/{}:{}", self.data_base, property_id, method);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check_response_json(response).await
    }
}

/// Surface the Google error message when the API rejects a request.
async fn check_response_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| format!("Request failed with status {}", status));
        return Err(AppError::Api(message));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Api(format!("JSON parse error: {}", e)))
}

#[async_trait]
impl Ga4Api for Ga4Client {
    async fn list_properties(&self, token: &str) -> Result<Vec<Ga4Property>> {
        let url = format!("{}/accountSummaries", self.admin_base);
        let response = self.get_json(&url, token).await?;
        Ok(normalize::parse_account_summaries(&response))
    }

    async fn realtime_active_users(&self, token: &str, property_id: &str) -> Result<u32> {
        let body = json!({ "metrics": [{"name": "activeUsers"}] });
        let report = self
            .run_report(token, property_id, "runRealtimeReport", &body)
            .await?;
        Ok(normalize::parse_realtime_active_users(&report))
    }

    async fn daily_metrics(&self, token: &str, property_id: &str) -> Result<DailyMetrics> {
        let body = json!({
            "dateRanges": [
                {"startDate": "yesterday", "endDate": "yesterday"},
                {"startDate": "today", "endDate": "today"}
            ],
            "metrics": [
                {"name": "activeUsers"},
                {"name": "sessions"},
                {"name": "screenPageViews"},
                {"name": "bounceRate"},
                {"name": "averageSessionDuration"}
            ]
        });
        let report = self
            .run_report(token, property_id, "runReport", &body)
            .await?;
        Ok(normalize::parse_daily_metrics(&report))
    }

    async fn extended_metrics(&self, token: &str, property_id: &str) -> Result<ExtendedMetrics> {
        let bounds = PeriodBounds::trailing_28_days(Utc::now().date_naive());
        let body = json!({
            "dateRanges": [
                {
                    "startDate": bounds.current_start.to_string(),
                    "endDate": bounds.current_end.to_string()
                },
                {
                    "startDate": bounds.previous_start.to_string(),
                    "endDate": bounds.previous_end.to_string()
                }
            ],
            "dimensions": [{"name": "date"}],
            "metrics": [
                {"name": "active28DayUsers"},
                {"name": "eventCount"},
                {"name": "screenPageViews"}
            ],
            "orderBys": [{"dimension": {"dimensionName": "date"}}]
        });
        let report = self
            .run_report(token, property_id, "runReport", &body)
            .await?;
        Ok(normalize::parse_extended_metrics(&report, bounds))
    }

    async fn top_pages(&self, token: &str, property_id: &str) -> Result<Vec<TopPage>> {
        let body = json!({
            "dateRanges": [{"startDate": "today", "endDate": "today"}],
            "dimensions": [{"name": "pagePath"}, {"name": "pageTitle"}],
            "metrics": [{"name": "screenPageViews"}],
            "limit": 5,
            "orderBys": [{"metric": {"metricName": "screenPageViews"}, "desc": true}]
        });
        let report = self
            .run_report(token, property_id, "runReport", &body)
            .await?;
        Ok(normalize::parse_top_pages(&report))
    }

    async fn traffic_sources(&self, token: &str, property_id: &str) -> Result<Vec<TrafficSource>> {
        let body = json!({
            "dateRanges": [{"startDate": "today", "endDate": "today"}],
            "dimensions": [{"name": "sessionSource"}, {"name": "sessionMedium"}],
            "metrics": [{"name": "sessions"}],
            "limit": 5,
            "orderBys": [{"metric": {"metricName": "sessions"}, "desc": true}]
        });
        let report = self
            .run_report(token, property_id, "runReport", &body)
            .await?;
        Ok(normalize::parse_traffic_sources(&report))
    }

    async fn countries(&self, token: &str, property_id: &str) -> Result<Vec<CountryData>> {
        let body = json!({
            "dateRanges": [{"startDate": "today", "endDate": "today"}],
            "dimensions": [{"name": "country"}, {"name": "countryId"}],
            "metrics": [{"name": "activeUsers"}],
            "limit": 5,
            "orderBys": [{"metric": {"metricName": "activeUsers"}, "desc": true}]
        });
        let report = self
            .run_report(token, property_id, "runReport", &body)
            .await?;
        Ok(normalize::parse_countries(&report))
    }

    async fn devices(&self, token: &str, property_id: &str) -> Result<DeviceBreakdown> {
        let body = json!({
            "dateRanges": [{"startDate": "today", "endDate": "today"}],
            "dimensions": [{"name": "deviceCategory"}],
            "metrics": [{"name": "activeUsers"}]
        });
        let report = self
            .run_report(token, property_id, "runReport", &body)
            .await?;
        Ok(normalize::parse_devices(&report))
    }
}
