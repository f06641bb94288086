// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Search Console API client and its refresh orchestrator.
//!
//! The cycle here is isomorphic to the GA4 one but independently scheduled
//! and guarded: a Search Console outage never blocks GA4 refresh and vice
//! versa.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};

use crate::config::SettingsHandle;
use crate::error::{AppError, Result};
use crate::models::{
    SearchConsoleMetrics, SearchConsoleSite, SearchConsoleSnapshot, SearchPage, SearchQuery,
};
use crate::services::auth::AuthService;
use crate::services::normalize::{self, PeriodBounds};

const API_BASE: &str = "https://searchconsole.googleapis.com/webmasters/v3";

/// Search Console fetch surface, substitutable in tests.
#[async_trait]
pub trait SearchConsoleApi: Send + Sync {
    async fn list_sites(&self, token: &str) -> Result<Vec<SearchConsoleSite>>;
    async fn metrics(&self, token: &str, site_url: &str) -> Result<SearchConsoleMetrics>;
    async fn top_queries(&self, token: &str, site_url: &str) -> Result<Vec<SearchQuery>>;
    async fn top_pages(&self, token: &str, site_url: &str) -> Result<Vec<SearchPage>>;
}

/// Search Console API client.
#[derive(Clone)]
pub struct SearchConsoleClient {
    http: reqwest::Client,
    base: String,
}

impl Default for SearchConsoleClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchConsoleClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base: API_BASE.to_string(),
        }
    }

    /// Point at a non-default API base (local test server).
    pub fn with_base(mut self, base: String) -> Self {
        self.base = base;
        self
    }

    /// POST a `searchAnalytics/query` request for one site.
    async fn query(
        &self,
        token: &str,
        site_url: &str,
        start_date: &str,
        end_date: &str,
        dimensions: &[&str],
        row_limit: u32,
    ) -> Result<Value> {
        let url = format!(
            "{}/sites/{}/searchAnalytics/query",
            self.base,
            urlencoding::encode(site_url)
        );

        let mut body = json!({
            "startDate": start_date,
            "endDate": end_date,
            "rowLimit": row_limit,
        });
        if !dimensions.is_empty() {
            body["dimensions"] = json!(dimensions);
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check_response_json(response).await
    }
}

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
impl SearchConsoleApi for SearchConsoleClient {
    async fn list_sites(&self, token: &str) -> Result<Vec<SearchConsoleSite>> {
        let url = format!("{}/sites", self.base);
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let json = check_response_json(response).await?;
        Ok(normalize::parse_sites(&json))
    }

    async fn metrics(&self, token: &str, site_url: &str) -> Result<SearchConsoleMetrics> {
        let bounds = PeriodBounds::trailing_28_days(Utc::now().date_naive());

        let current = self
            .query(
                token,
                site_url,
                &bounds.current_start.to_string(),
                &bounds.current_end.to_string(),
                &["date"],
                1000,
            )
            .await?;
        let previous = self
            .query(
                token,
                site_url,
                &bounds.previous_start.to_string(),
                &bounds.previous_end.to_string(),
                &[],
                1000,
            )
            .await?;

        Ok(normalize::parse_search_metrics(&current, &previous))
    }

    async fn top_queries(&self, token: &str, site_url: &str) -> Result<Vec<SearchQuery>> {
        let bounds = PeriodBounds::trailing_28_days(Utc::now().date_naive());
        let response = self
            .query(
                token,
                site_url,
                &bounds.current_start.to_string(),
                &bounds.current_end.to_string(),
                &["query"],
                10,
            )
            .await?;
        Ok(normalize::parse_search_queries(&response))
    }

    async fn top_pages(&self, token: &str, site_url: &str) -> Result<Vec<SearchPage>> {
        let bounds = PeriodBounds::trailing_28_days(Utc::now().date_naive());
        let response = self
            .query(
                token,
                site_url,
                &bounds.current_start.to_string(),
                &bounds.current_end.to_string(),
                &["page"],
                10,
            )
            .await?;
        Ok(normalize::parse_search_pages(&response))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SearchConsoleService - refresh orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct SearchConsoleService {
    api: Arc<dyn SearchConsoleApi>,
    auth: Arc<AuthService>,
    settings: Arc<SettingsHandle>,
    snapshot_tx: watch::Sender<SearchConsoleSnapshot>,
    is_loading: AtomicBool,
    sites: Mutex<Vec<SearchConsoleSite>>,
    selected: Mutex<Option<SearchConsoleSite>>,
}

impl SearchConsoleService {
    pub fn new(
        api: Arc<dyn SearchConsoleApi>,
        auth: Arc<AuthService>,
        settings: Arc<SettingsHandle>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SearchConsoleSnapshot::default());
        Self {
            api,
            auth,
            settings,
            snapshot_tx,
            is_loading: AtomicBool::new(false),
            sites: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchConsoleSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SearchConsoleSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub async fn sites(&self) -> Vec<SearchConsoleSite> {
        self.sites.lock().await.clone()
    }

    pub async fn selected_site(&self) -> Option<SearchConsoleSite> {
        self.selected.lock().await.clone()
    }

    /// Select a site, persist the choice, and refresh immediately.
    pub async fn select_site(&self, site: SearchConsoleSite) {
        self.settings
            .update(|s| s.selected_site_url = Some(site.site_url.clone()));
        *self.selected.lock().await = Some(site);
        self.refresh().await;
    }

    /// Run one refresh cycle, independently guarded from the GA4 cycle.
    pub async fn refresh(&self) {
        if !self.auth.state().is_authenticated {
            return;
        }
        if self.is_loading.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.run_cycle().await {
            tracing::warn!(error = %e, "Search Console refresh failed");
            self.snapshot_tx.send_modify(|snapshot| {
                snapshot.is_connected = false;
                snapshot.last_error = Some(e.to_string());
            });
        }

        self.is_loading.store(false, Ordering::SeqCst);
    }

    async fn run_cycle(&self) -> Result<()> {
        self.snapshot_tx
            .send_modify(|snapshot| snapshot.last_error = None);

        {
            let mut sites = self.sites.lock().await;
            if sites.is_empty() {
                let token = self.auth.get_valid_access_token().await?;
                *sites = self.api.list_sites(&token).await?;
                tracing::debug!(count = sites.len(), "Fetched Search Console sites");
            }

            let mut selected = self.selected.lock().await;
            if selected.is_none() {
                let saved_url = self.settings.read().selected_site_url;
                *selected = saved_url
                    .and_then(|url| sites.iter().find(|s| s.site_url == url).cloned())
                    .or_else(|| sites.first().cloned());
            }
        }

        let Some(site) = self.selected.lock().await.clone() else {
            return Ok(());
        };

        let token = self.auth.get_valid_access_token().await?;

        let (metrics, top_queries, top_pages) = tokio::try_join!(
            self.api.metrics(&token, &site.site_url),
            self.api.top_queries(&token, &site.site_url),
            self.api.top_pages(&token, &site.site_url),
        )?;

        self.snapshot_tx.send_replace(SearchConsoleSnapshot {
            metrics,
            top_queries,
            top_pages,
            last_updated: Some(Utc::now()),
            is_connected: true,
            last_error: None,
        });

        Ok(())
    }

    async fn clear_all_data(&self) {
        self.sites.lock().await.clear();
        *self.selected.lock().await = None;
        self.snapshot_tx
            .send_replace(SearchConsoleSnapshot::default());
    }

    async fn reset_for_new_session(&self) {
        self.sites.lock().await.clear();
        *self.selected.lock().await = None;
        self.snapshot_tx
            .send_modify(|snapshot| snapshot.is_connected = false);
    }

    /// Periodic refresh loop, mirroring the GA4 orchestrator's scheduling.
    pub async fn run(self: Arc<Self>) {
        let mut interval_rx = self.settings.subscribe_interval();
        let mut auth_rx = self.auth.subscribe();

        let mut period = interval_rx.borrow_and_update().as_duration();
        let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut was_authenticated = auth_rx.borrow_and_update().is_authenticated;

        if was_authenticated {
            self.refresh().await;
        }

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.refresh().await;
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    period = interval_rx.borrow_and_update().as_duration();
                    timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                }
                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let is_authenticated = auth_rx.borrow_and_update().is_authenticated;
                    if is_authenticated && !was_authenticated {
                        self.reset_for_new_session().await;
                        self.refresh().await;
                    } else if !is_authenticated && was_authenticated {
                        self.clear_all_data().await;
                    }
                    was_authenticated = is_authenticated;
                }
            }
        }
    }
}
