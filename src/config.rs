// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables, plus the
//! shared handle to the user's runtime settings file.

use std::env;
use std::path::PathBuf;
use std::sync::RwLock;

use tokio::sync::watch;

use crate::models::{RefreshInterval, Settings};

/// Static configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Google OAuth client ID (public).
    pub google_client_id: String,
    /// OAuth client secret. Optional: desktop-app client types work without
    /// one.
    pub google_client_secret: Option<String>,
    /// Loopback port for the OAuth redirect.
    pub redirect_port: u16,
    /// Directory holding the token store and the settings file.
    pub data_dir: PathBuf,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            google_client_secret: None,
            redirect_port: 8585,
            data_dir: std::env::temp_dir().join("sitepulse-test"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let data_dir = env::var("SITEPULSE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".sitepulse")
            });

        Ok(Self {
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            redirect_port: env::var("SITEPULSE_REDIRECT_PORT")
                .unwrap_or_else(|_| "8585".to_string())
                .parse()
                .unwrap_or(8585),
            data_dir,
        })
    }

    /// Loopback redirect URI registered with the OAuth client.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

/// Shared handle to the user's settings.
///
/// The settings UI lives outside this crate; the core reads thresholds and
/// intervals from here and writes back selection changes. Interval changes
/// are additionally published on a watch channel so the refresh cycles can
/// restart their timers from zero.
pub struct SettingsHandle {
    path: Option<PathBuf>,
    inner: RwLock<Settings>,
    interval_tx: watch::Sender<RefreshInterval>,
}

impl SettingsHandle {
    /// Load from the settings file, falling back to defaults on absence or
    /// parse failure.
    pub fn load(path: PathBuf) -> Self {
        let settings = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "Unreadable settings, using defaults");
                Settings::default()
            }),
            Err(_) => Settings::default(),
        };
        Self::build(Some(path), settings)
    }

    /// Non-persistent handle for tests.
    pub fn in_memory(settings: Settings) -> Self {
        Self::build(None, settings)
    }

    fn build(path: Option<PathBuf>, settings: Settings) -> Self {
        let (interval_tx, _) = watch::channel(settings.refresh_interval);
        Self {
            path,
            inner: RwLock::new(settings),
            interval_tx,
        }
    }

    pub fn read(&self) -> Settings {
        self.inner.read().unwrap().clone()
    }

    /// Mutate settings, persist best-effort, and publish the (possibly
    /// changed) refresh interval.
    pub fn update(&self, mutate: impl FnOnce(&mut Settings)) {
        let snapshot = {
            let mut guard = self.inner.write().unwrap();
            mutate(&mut guard);
            guard.clone()
        };

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match serde_json::to_string_pretty(&snapshot) {
                Ok(raw) => {
                    if let Err(e) = std::fs::write(path, raw) {
                        tracing::warn!(error = %e, "Failed to persist settings");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize settings"),
            }
        }

        // send_if_modified avoids waking the timers on unrelated changes.
        self.interval_tx
            .send_if_modified(|current| {
                if *current != snapshot.refresh_interval {
                    *current = snapshot.refresh_interval;
                    true
                } else {
                    false
                }
            });
    }

    pub fn subscribe_interval(&self) -> watch::Receiver<RefreshInterval> {
        self.interval_tx.subscribe()
    }
}
