// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GA4 refresh orchestrator.
//!
//! Drives the periodic refresh cycle: resolve the selected property, fan out
//! the seven category fetches concurrently, normalize, and publish one
//! consistent snapshot atomically. A cycle in flight refuses (not queues)
//! further refresh requests; a failed cycle records the error and leaves the
//! previous snapshot data visible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};

use crate::config::SettingsHandle;
use crate::error::Result;
use crate::models::{AnalyticsSnapshot, Ga4Property, RealtimeData, MAX_SPARKLINE_POINTS};
use crate::services::alerts::AlertService;
use crate::services::auth::AuthService;
use crate::services::ga4::Ga4Api;

pub struct AnalyticsService {
    api: Arc<dyn Ga4Api>,
    auth: Arc<AuthService>,
    alerts: Arc<AlertService>,
    settings: Arc<SettingsHandle>,
    snapshot_tx: watch::Sender<AnalyticsSnapshot>,
    /// In-flight guard: a refresh while one is running is a no-op.
    is_loading: AtomicBool,
    properties: Mutex<Vec<Ga4Property>>,
    selected: Mutex<Option<Ga4Property>>,
    sparkline: Mutex<Vec<u32>>,
}

impl AnalyticsService {
    pub fn new(
        api: Arc<dyn Ga4Api>,
        auth: Arc<AuthService>,
        alerts: Arc<AlertService>,
        settings: Arc<SettingsHandle>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(AnalyticsSnapshot::default());
        Self {
            api,
            auth,
            alerts,
            settings,
            snapshot_tx,
            is_loading: AtomicBool::new(false),
            properties: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
            sparkline: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<AnalyticsSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub async fn properties(&self) -> Vec<Ga4Property> {
        self.properties.lock().await.clone()
    }

    pub async fn selected_property(&self) -> Option<Ga4Property> {
        self.selected.lock().await.clone()
    }

    /// Select a property, persist the choice, and refresh immediately.
    pub async fn select_property(&self, property: Ga4Property) {
        self.settings
            .update(|s| s.selected_property_id = Some(property.id.clone()));
        *self.selected.lock().await = Some(property);
        self.refresh().await;
    }

    /// Run one refresh cycle. No-op while unauthenticated or while another
    /// cycle is in flight.
    pub async fn refresh(&self) {
        if !self.auth.state().is_authenticated {
            return;
        }
        if self.is_loading.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.run_cycle().await {
            tracing::warn!(error = %e, "Analytics refresh failed");
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

        // Resolve the property list and selection first.
        {
            let mut properties = self.properties.lock().await;
            if properties.is_empty() {
                let token = self.auth.get_valid_access_token().await?;
                *properties = self.api.list_properties(&token).await?;
                tracing::debug!(count = properties.len(), "Fetched GA4 properties");
            }

            let mut selected = self.selected.lock().await;
            if selected.is_none() {
                let saved_id = self.settings.read().selected_property_id;
                *selected = saved_id
                    .and_then(|id| properties.iter().find(|p| p.id == id).cloned())
                    .or_else(|| properties.first().cloned());
            }
        }

        let Some(property) = self.selected.lock().await.clone() else {
            // Nothing to fetch yet; still a completed, non-erroring cycle.
            return Ok(());
        };

        // Token acquisition (and any refresh) happens once, ahead of the
        // fan-out.
        let token = self.auth.get_valid_access_token().await?;

        let (active_users, daily, extended, top_pages, sources, countries, devices) = tokio::try_join!(
            self.api.realtime_active_users(&token, &property.id),
            self.api.daily_metrics(&token, &property.id),
            self.api.extended_metrics(&token, &property.id),
            self.api.top_pages(&token, &property.id),
            self.api.traffic_sources(&token, &property.id),
            self.api.countries(&token, &property.id),
            self.api.devices(&token, &property.id),
        )?;

        // Append the new realtime sample to the bounded history.
        let (sparkline, previous_users) = {
            let mut history = self.sparkline.lock().await;
            let previous = history.last().copied().unwrap_or(0);
            history.push(active_users);
            if history.len() > MAX_SPARKLINE_POINTS {
                history.remove(0);
            }
            (history.clone(), previous)
        };

        let cfg = self.settings.read().alerts;
        self.alerts
            .check_thresholds(active_users, previous_users, &cfg);
        self.alerts
            .check_goal_progress(daily.users.today as u32, &cfg);

        self.snapshot_tx.send_replace(AnalyticsSnapshot {
            realtime: RealtimeData {
                active_users,
                sparkline,
            },
            daily,
            extended,
            top_pages,
            traffic_sources: sources,
            countries,
            devices,
            last_updated: Some(Utc::now()),
            is_connected: true,
            last_error: None,
        });

        Ok(())
    }

    /// Drop everything published and cached (sign-out path).
    async fn clear_all_data(&self) {
        self.properties.lock().await.clear();
        *self.selected.lock().await = None;
        self.sparkline.lock().await.clear();
        self.snapshot_tx.send_replace(AnalyticsSnapshot::default());
    }

    /// Reset cached lists ahead of the first refresh of a new session.
    async fn reset_for_new_session(&self) {
        self.properties.lock().await.clear();
        *self.selected.lock().await = None;
        self.sparkline.lock().await.clear();
        self.snapshot_tx
            .send_modify(|snapshot| snapshot.is_connected = false);
    }

    /// Periodic refresh loop. Restarts the timer from zero when the interval
    /// setting changes; auth transitions trigger an immediate out-of-band
    /// refresh (sign-in) or clear all data (sign-out).
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
                    tracing::info!(seconds = period.as_secs(), "Refresh interval changed");
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
