// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Refresh orchestration: the in-flight guard, stale-data-preserving failure
//! handling, the bounded sparkline, and GA4/Search Console independence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sitepulse::config::SettingsHandle;
use sitepulse::error::{AppError, Result};
use sitepulse::models::{
    AlertKind, AlertSettings, CountryData, DailyMetrics, DeviceBreakdown, ExtendedMetrics,
    Ga4Property, MetricComparison, SearchConsoleMetrics, SearchConsoleSite, SearchPage,
    SearchQuery, Settings, TopPage, TrafficSource,
};
use sitepulse::services::auth::{TokenResponse, UserInfo};
use sitepulse::services::{
    AlertService, AnalyticsService, AuthService, Credentials, Ga4Api, MemoryTokenStore,
    NullNotifier, SearchConsoleApi, SearchConsoleService, TokenEndpoint,
};

// ─────────────────────────────────────────────────────────────────────────────
// Fakes
// ─────────────────────────────────────────────────────────────────────────────

/// Endpoint that should never need to refresh; credentials in these tests are
/// always fresh.
struct StaticEndpoint;

#[async_trait]
impl TokenEndpoint for StaticEndpoint {
    async fn exchange_code(&self, _code: &str, _redirect_uri: &str) -> Result<TokenResponse> {
        Err(AppError::TokenExchangeFailed)
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse> {
        Err(AppError::TokenRefreshFailed)
    }

    async fn fetch_user_info(&self, _access_token: &str) -> Result<UserInfo> {
        Ok(UserInfo {
            email: "dev@example.com".to_string(),
        })
    }
}

#[derive(Default)]
struct FakeGa4 {
    realtime_calls: AtomicUsize,
    fail: AtomicBool,
    delay_ms: u64,
    /// Realtime samples handed out in order; the last one repeats.
    samples: Mutex<VecDeque<u32>>,
}

impl FakeGa4 {
    fn with_samples(samples: impl IntoIterator<Item = u32>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
            ..Self::default()
        }
    }

    fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn realtime_calls(&self) -> usize {
        self.realtime_calls.load(Ordering::SeqCst)
    }

    fn next_sample(&self) -> u32 {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() > 1 {
            samples.pop_front().unwrap()
        } else {
            samples.front().copied().unwrap_or(42)
        }
    }
}

#[async_trait]
impl Ga4Api for FakeGa4 {
    async fn list_properties(&self, _token: &str) -> Result<Vec<Ga4Property>> {
        Ok(vec![Ga4Property {
            id: "properties/111".to_string(),
            display_name: "Main site".to_string(),
        }])
    }

    async fn realtime_active_users(&self, _token: &str, _property_id: &str) -> Result<u32> {
        self.realtime_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Api("realtime report unavailable".to_string()));
        }
        Ok(self.next_sample())
    }

    async fn daily_metrics(&self, _token: &str, _property_id: &str) -> Result<DailyMetrics> {
        Ok(DailyMetrics {
            users: MetricComparison::new(100.0, 80.0),
            sessions: MetricComparison::new(120.0, 95.0),
            pageviews: MetricComparison::new(340.0, 300.0),
            bounce_rate: MetricComparison::new(41.0, 44.0),
            avg_session_duration: MetricComparison::new(187.0, 170.0),
        })
    }

    async fn extended_metrics(&self, _token: &str, _property_id: &str) -> Result<ExtendedMetrics> {
        Ok(ExtendedMetrics::default())
    }

    async fn top_pages(&self, _token: &str, _property_id: &str) -> Result<Vec<TopPage>> {
        Ok(vec![TopPage {
            path: "/".to_string(),
            title: "Home".to_string(),
            views: 200,
        }])
    }

    async fn traffic_sources(&self, _token: &str, _property_id: &str) -> Result<Vec<TrafficSource>> {
        Ok(Vec::new())
    }

    async fn countries(&self, _token: &str, _property_id: &str) -> Result<Vec<CountryData>> {
        Ok(Vec::new())
    }

    async fn devices(&self, _token: &str, _property_id: &str) -> Result<DeviceBreakdown> {
        Ok(DeviceBreakdown {
            desktop: 60.0,
            mobile: 35.0,
            tablet: 5.0,
        })
    }
}

#[derive(Default)]
struct FakeSearchConsole {
    fail: AtomicBool,
    metrics_calls: AtomicUsize,
}

#[async_trait]
impl SearchConsoleApi for FakeSearchConsole {
    async fn list_sites(&self, _token: &str) -> Result<Vec<SearchConsoleSite>> {
        Ok(vec![SearchConsoleSite {
            site_url: "sc-domain:example.com".to_string(),
            permission_level: "siteOwner".to_string(),
        }])
    }

    async fn metrics(&self, _token: &str, _site_url: &str) -> Result<SearchConsoleMetrics> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Api("search analytics unavailable".to_string()));
        }
        Ok(SearchConsoleMetrics {
            clicks: MetricComparison::new(900.0, 700.0),
            impressions: MetricComparison::new(30_000.0, 28_000.0),
            ctr: MetricComparison::new(3.0, 2.5),
            position: MetricComparison::new(12.3, 14.1),
            trend: Vec::new(),
        })
    }

    async fn top_queries(&self, _token: &str, _site_url: &str) -> Result<Vec<SearchQuery>> {
        Ok(vec![SearchQuery {
            query: "example".to_string(),
            clicks: 120,
            impressions: 4000,
            ctr: 3.0,
            position: 8.2,
        }])
    }

    async fn top_pages(&self, _token: &str, _site_url: &str) -> Result<Vec<SearchPage>> {
        Ok(Vec::new())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn authenticated_auth() -> Arc<AuthService> {
    let store = Arc::new(MemoryTokenStore::with_credentials(Credentials {
        access_token: "at-test".to_string(),
        refresh_token: Some("rt-test".to_string()),
        expires_at: Utc::now() + Duration::hours(1),
    }));
    let auth = Arc::new(AuthService::new(Arc::new(StaticEndpoint), store));
    auth.load_persisted().await.unwrap();
    auth
}

async fn analytics_service(api: Arc<FakeGa4>, settings: Settings) -> Arc<AnalyticsService> {
    let auth = authenticated_auth().await;
    let alerts = Arc::new(AlertService::new(Arc::new(NullNotifier)));
    Arc::new(AnalyticsService::new(
        api,
        auth,
        alerts,
        Arc::new(SettingsHandle::in_memory(settings)),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// GA4 orchestrator
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_publishes_a_connected_snapshot() {
    let api = Arc::new(FakeGa4::with_samples([17]));
    let service = analytics_service(Arc::clone(&api), Settings::default()).await;
    let mut rx = service.subscribe();

    service.refresh().await;

    let snapshot = rx.borrow_and_update().clone();
    assert!(snapshot.is_connected);
    assert!(snapshot.last_error.is_none());
    assert!(snapshot.last_updated.is_some());
    assert_eq!(snapshot.realtime.active_users, 17);
    assert_eq!(snapshot.realtime.sparkline, vec![17]);
    assert_eq!(snapshot.daily.users.today, 100.0);
    assert_eq!(snapshot.top_pages.len(), 1);
    assert_eq!(service.selected_property().await.unwrap().id, "properties/111");
}

#[tokio::test]
async fn concurrent_refreshes_run_one_cycle() {
    let api = Arc::new(FakeGa4::with_samples([10]).with_delay(50));
    let service = analytics_service(Arc::clone(&api), Settings::default()).await;

    tokio::join!(service.refresh(), service.refresh());

    assert_eq!(api.realtime_calls(), 1);
}

#[tokio::test]
async fn failed_cycle_keeps_stale_data_and_records_the_error() {
    let api = Arc::new(FakeGa4::with_samples([25]));
    let service = analytics_service(Arc::clone(&api), Settings::default()).await;

    service.refresh().await;
    let before = service.snapshot();
    assert!(before.is_connected);

    api.set_failing(true);
    service.refresh().await;

    let after = service.snapshot();
    assert!(!after.is_connected);
    assert!(after.last_error.as_deref().unwrap().contains("unavailable"));
    // Previously fetched data stays visible.
    assert_eq!(after.daily, before.daily);
    assert_eq!(after.realtime, before.realtime);
    assert_eq!(after.last_updated, before.last_updated);

    // Recovery clears the error again.
    api.set_failing(false);
    service.refresh().await;
    let recovered = service.snapshot();
    assert!(recovered.is_connected);
    assert!(recovered.last_error.is_none());
}

#[tokio::test]
async fn sparkline_is_a_bounded_fifo() {
    let api = Arc::new(FakeGa4::with_samples(1u32..=31));
    let service = analytics_service(Arc::clone(&api), Settings::default()).await;

    for _ in 0..31 {
        service.refresh().await;
    }

    let sparkline = service.snapshot().realtime.sparkline;
    assert_eq!(sparkline.len(), 30);
    // The oldest sample fell off the front.
    assert_eq!(sparkline.first().copied(), Some(2));
    assert_eq!(sparkline.last().copied(), Some(31));
}

#[tokio::test]
async fn refresh_is_a_noop_while_signed_out() {
    let api = Arc::new(FakeGa4::with_samples([10]));
    let auth = Arc::new(AuthService::new(
        Arc::new(StaticEndpoint),
        Arc::new(MemoryTokenStore::new()),
    ));
    let service = Arc::new(AnalyticsService::new(
        Arc::clone(&api) as Arc<dyn Ga4Api>,
        auth,
        Arc::new(AlertService::new(Arc::new(NullNotifier))),
        Arc::new(SettingsHandle::in_memory(Settings::default())),
    ));

    service.refresh().await;

    assert_eq!(api.realtime_calls(), 0);
    assert!(!service.snapshot().is_connected);
}

#[tokio::test]
async fn select_property_persists_and_refreshes() {
    let api = Arc::new(FakeGa4::with_samples([10]));
    let settings = Arc::new(SettingsHandle::in_memory(Settings::default()));
    let auth = authenticated_auth().await;
    let service = Arc::new(AnalyticsService::new(
        Arc::clone(&api) as Arc<dyn Ga4Api>,
        auth,
        Arc::new(AlertService::new(Arc::new(NullNotifier))),
        Arc::clone(&settings),
    ));

    service
        .select_property(Ga4Property {
            id: "properties/222".to_string(),
            display_name: "Second site".to_string(),
        })
        .await;

    assert_eq!(
        settings.read().selected_property_id.as_deref(),
        Some("properties/222")
    );
    assert_eq!(api.realtime_calls(), 1);
    assert_eq!(service.selected_property().await.unwrap().id, "properties/222");
}

#[tokio::test]
async fn threshold_alert_fires_from_a_refresh_cycle() {
    let api = Arc::new(FakeGa4::with_samples([600]));
    let settings = Settings {
        alerts: AlertSettings {
            // Keep the default goal out of the way of the fake's 100 users.
            daily_user_goal: 100_000,
            ..AlertSettings::default()
        },
        ..Settings::default()
    };
    let auth = authenticated_auth().await;
    let alerts = Arc::new(AlertService::new(Arc::new(NullNotifier)));
    let service = Arc::new(AnalyticsService::new(
        api,
        auth,
        Arc::clone(&alerts),
        Arc::new(SettingsHandle::in_memory(settings)),
    ));

    service.refresh().await;

    let fired = alerts.recent_alerts();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].kind, AlertKind::Spike);
}

// ─────────────────────────────────────────────────────────────────────────────
// Search Console orchestrator
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_console_refresh_publishes_independently() {
    let auth = authenticated_auth().await;
    let settings = Arc::new(SettingsHandle::in_memory(Settings::default()));

    let ga4 = Arc::new(FakeGa4::with_samples([10]));
    let analytics = Arc::new(AnalyticsService::new(
        Arc::clone(&ga4) as Arc<dyn Ga4Api>,
        Arc::clone(&auth),
        Arc::new(AlertService::new(Arc::new(NullNotifier))),
        Arc::clone(&settings),
    ));

    let sc_api = Arc::new(FakeSearchConsole::default());
    let search = Arc::new(SearchConsoleService::new(
        Arc::clone(&sc_api) as Arc<dyn SearchConsoleApi>,
        Arc::clone(&auth),
        settings,
    ));

    // Search Console is down; GA4 keeps working.
    sc_api.fail.store(true, Ordering::SeqCst);
    tokio::join!(analytics.refresh(), search.refresh());

    assert!(analytics.snapshot().is_connected);
    let sc_snapshot = search.snapshot();
    assert!(!sc_snapshot.is_connected);
    assert!(sc_snapshot.last_error.is_some());

    // And recovers on its own next cycle.
    sc_api.fail.store(false, Ordering::SeqCst);
    search.refresh().await;
    let recovered = search.snapshot();
    assert!(recovered.is_connected);
    assert_eq!(recovered.metrics.clicks.today, 900.0);
    assert_eq!(recovered.top_queries.len(), 1);
    assert_eq!(
        search.selected_site().await.unwrap().site_url,
        "sc-domain:example.com"
    );
}

#[tokio::test]
async fn select_site_persists_choice() {
    let auth = authenticated_auth().await;
    let settings = Arc::new(SettingsHandle::in_memory(Settings::default()));
    let sc_api = Arc::new(FakeSearchConsole::default());
    let search = Arc::new(SearchConsoleService::new(
        Arc::clone(&sc_api) as Arc<dyn SearchConsoleApi>,
        auth,
        Arc::clone(&settings),
    ));

    search
        .select_site(SearchConsoleSite {
            site_url: "https://blog.example.com/".to_string(),
            permission_level: "siteFullUser".to_string(),
        })
        .await;

    assert_eq!(
        settings.read().selected_site_url.as_deref(),
        Some("https://blog.example.com/")
    );
    assert_eq!(sc_api.metrics_calls.load(Ordering::SeqCst), 1);
}
