// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stateful alert engine.
//!
//! Evaluates each realtime sample against the configured thresholds and the
//! previous sample, fires goal alerts as today's user count crosses the
//! daily goal, and keeps the bounded newest-first alert log. Spike-family
//! and drop-family alerts share per-category cooldowns; goal alerts use a
//! trailing one-hour de-duplication window instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::error::Result;
use crate::models::{AlertItem, AlertKind, AlertSettings, MAX_RECENT_ALERTS};

/// Minimum seconds between two alerts of the same category.
const ALERT_COOLDOWN_SECS: i64 = 300;
/// Relative change (percent) that counts as a sudden spike/drop.
const SUDDEN_CHANGE_PCT: f64 = 50.0;
/// Ignore sudden-change detection below this user count to avoid noise.
const SUDDEN_CHANGE_FLOOR: u32 = 50;
/// Goal alerts of the same kind are suppressed within this window.
const GOAL_DEDUP_SECS: i64 = 3600;

/// Outbound notification boundary, fire-and-forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Drops notifications on the floor; used in tests and headless runs.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _title: &str, _body: &str) -> Result<()> {
        Ok(())
    }
}

/// Shells out to the platform notifier (`osascript` on macOS, `notify-send`
/// elsewhere).
pub struct CommandNotifier;

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                body.replace('"', "'"),
                title.replace('"', "'")
            );
            let mut cmd = tokio::process::Command::new("osascript");
            cmd.arg("-e").arg(script);
            cmd
        } else {
            let mut cmd = tokio::process::Command::new("notify-send");
            cmd.arg(title).arg(body);
            cmd
        };

        command
            .status()
            .await
            .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

#[derive(Default)]
struct AlertLog {
    recent: Vec<AlertItem>,
    unread: bool,
    last_high: Option<DateTime<Utc>>,
    last_low: Option<DateTime<Utc>>,
}

impl AlertLog {
    fn cooldown_over(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last {
            Some(t) => now - t >= Duration::seconds(ALERT_COOLDOWN_SECS),
            None => true,
        }
    }

    fn has_recent(&self, kind: AlertKind, now: DateTime<Utc>) -> bool {
        let window_start = now - Duration::seconds(GOAL_DEDUP_SECS);
        self.recent
            .iter()
            .any(|alert| alert.kind == kind && alert.timestamp > window_start)
    }

    fn push(&mut self, alert: AlertItem) {
        self.recent.insert(0, alert);
        self.recent.truncate(MAX_RECENT_ALERTS);
        self.unread = true;
    }
}

/// Alert service holding the log and cooldown state.
pub struct AlertService {
    notifier: Arc<dyn Notifier>,
    log: std::sync::Mutex<AlertLog>,
    alerts_tx: watch::Sender<Vec<AlertItem>>,
}

impl AlertService {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        let (alerts_tx, _) = watch::channel(Vec::new());
        Self {
            notifier,
            log: std::sync::Mutex::new(AlertLog::default()),
            alerts_tx,
        }
    }

    /// Subscribe to the published alert log (newest first).
    pub fn subscribe(&self) -> watch::Receiver<Vec<AlertItem>> {
        self.alerts_tx.subscribe()
    }

    pub fn recent_alerts(&self) -> Vec<AlertItem> {
        self.log.lock().unwrap().recent.clone()
    }

    pub fn has_unread(&self) -> bool {
        self.log.lock().unwrap().unread
    }

    pub fn mark_all_read(&self) {
        self.log.lock().unwrap().unread = false;
    }

    pub fn clear_alerts(&self) {
        {
            let mut log = self.log.lock().unwrap();
            log.recent.clear();
            log.unread = false;
        }
        self.alerts_tx.send_replace(Vec::new());
    }

    /// Evaluate one realtime sample against thresholds and the previous
    /// sample.
    pub fn check_thresholds(&self, active_users: u32, previous_users: u32, cfg: &AlertSettings) {
        self.check_thresholds_at(Utc::now(), active_users, previous_users, cfg)
    }

    pub fn check_thresholds_at(
        &self,
        now: DateTime<Utc>,
        active_users: u32,
        previous_users: u32,
        cfg: &AlertSettings,
    ) {
        if !cfg.enabled {
            return;
        }

        let mut fired = Vec::new();
        {
            let mut log = self.log.lock().unwrap();

            // High threshold.
            if cfg.on_spike
                && active_users >= cfg.threshold_high
                && AlertLog::cooldown_over(log.last_high, now)
            {
                log.last_high = Some(now);
                let alert = AlertItem {
                    kind: AlertKind::Spike,
                    title: "Traffic spike!".to_string(),
                    message: format!("You have {} active users right now", active_users),
                    timestamp: now,
                };
                log.push(alert.clone());
                fired.push(alert);
            }

            // Low threshold, only on crossing from above.
            if cfg.on_drop
                && active_users <= cfg.threshold_low
                && previous_users > cfg.threshold_low
                && AlertLog::cooldown_over(log.last_low, now)
            {
                log.last_low = Some(now);
                let alert = AlertItem {
                    kind: AlertKind::Drop,
                    title: "Low traffic".to_string(),
                    message: format!("Only {} active users - is everything OK?", active_users),
                    timestamp: now,
                };
                log.push(alert.clone());
                fired.push(alert);
            }

            // Sudden spike: >=50% up, above the noise floor.
            if cfg.on_spike && previous_users > 0 {
                let increase = (active_users as f64 - previous_users as f64)
                    / previous_users as f64
                    * 100.0;
                if increase >= SUDDEN_CHANGE_PCT
                    && active_users > SUDDEN_CHANGE_FLOOR
                    && previous_users > SUDDEN_CHANGE_FLOOR
                    && AlertLog::cooldown_over(log.last_high, now)
                {
                    log.last_high = Some(now);
                    let alert = AlertItem {
                        kind: AlertKind::Spike,
                        title: "You're trending!".to_string(),
                        message: format!(
                            "Traffic up {}% - {} users now",
                            increase as i64, active_users
                        ),
                        timestamp: now,
                    };
                    log.push(alert.clone());
                    fired.push(alert);
                }
            }

            // Sudden drop: >=50% down from a baseline above the floor.
            if cfg.on_drop && previous_users > 0 {
                let decrease = (previous_users as f64 - active_users as f64)
                    / previous_users as f64
                    * 100.0;
                if decrease >= SUDDEN_CHANGE_PCT
                    && previous_users > SUDDEN_CHANGE_FLOOR
                    && AlertLog::cooldown_over(log.last_low, now)
                {
                    log.last_low = Some(now);
                    let alert = AlertItem {
                        kind: AlertKind::Drop,
                        title: "Traffic dropped".to_string(),
                        message: format!("Down {}% to {} users", decrease as i64, active_users),
                        timestamp: now,
                    };
                    log.push(alert.clone());
                    fired.push(alert);
                }
            }
        }

        self.dispatch(fired);
    }

    /// Fire goal alerts as today's user count crosses 100% and 150% of the
    /// daily goal, de-duplicated within a trailing hour per exact kind.
    pub fn check_goal_progress(&self, today_users: u32, cfg: &AlertSettings) {
        self.check_goal_progress_at(Utc::now(), today_users, cfg)
    }

    pub fn check_goal_progress_at(
        &self,
        now: DateTime<Utc>,
        today_users: u32,
        cfg: &AlertSettings,
    ) {
        if !cfg.goal_alerts || cfg.daily_user_goal == 0 {
            return;
        }

        let goal = cfg.daily_user_goal;
        let progress = today_users as f64 / goal as f64;

        let mut fired = Vec::new();
        {
            let mut log = self.log.lock().unwrap();
            if progress >= 1.5 && !log.has_recent(AlertKind::GoalExceeded, now) {
                let alert = AlertItem {
                    kind: AlertKind::GoalExceeded,
                    title: "Goal crushed!".to_string(),
                    message: format!("150% of daily goal reached ({}/{})", today_users, goal),
                    timestamp: now,
                };
                log.push(alert.clone());
                fired.push(alert);
            } else if progress >= 1.0
                && progress < 1.5
                && !log.has_recent(AlertKind::GoalReached, now)
            {
                let alert = AlertItem {
                    kind: AlertKind::GoalReached,
                    title: "Goal reached!".to_string(),
                    message: format!("Daily goal of {} users achieved!", goal),
                    timestamp: now,
                };
                log.push(alert.clone());
                fired.push(alert);
            }
        }

        self.dispatch(fired);
    }

    /// Publish the updated log and send system notifications best-effort.
    /// Notification failures never touch log state.
    fn dispatch(&self, fired: Vec<AlertItem>) {
        if fired.is_empty() {
            return;
        }

        self.alerts_tx.send_replace(self.recent_alerts());

        for alert in fired {
            tracing::info!(kind = ?alert.kind, title = %alert.title, "Alert fired");
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&alert.title, &alert.message).await {
                    tracing::warn!(error = %e, "Notification delivery failed");
                }
            });
        }
    }
}
