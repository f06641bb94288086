// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SitePulse data core
//!
//! Runs the Google OAuth sign-in flow, then the scheduled GA4 and Search
//! Console refresh loops, publishing snapshots and alerts until interrupted.

use std::sync::Arc;

use sitepulse::{
    config::{Config, SettingsHandle},
    services::{
        auth::{self, CallbackOutcome},
        AlertService, AnalyticsService, AuthService, CommandNotifier, FileTokenStore, Ga4Client,
        HttpTokenEndpoint, SearchConsoleClient, SearchConsoleService,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;
    tracing::info!(data_dir = %config.data_dir.display(), "Starting SitePulse");

    let settings = Arc::new(SettingsHandle::load(config.settings_path()));

    let store = Arc::new(FileTokenStore::new(&config.data_dir)?);
    let endpoint = Arc::new(HttpTokenEndpoint::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    ));
    let auth_service = Arc::new(AuthService::new(endpoint, store));
    auth_service.load_persisted().await?;

    let alerts = Arc::new(AlertService::new(Arc::new(CommandNotifier)));
    let analytics = Arc::new(AnalyticsService::new(
        Arc::new(Ga4Client::new()),
        Arc::clone(&auth_service),
        Arc::clone(&alerts),
        Arc::clone(&settings),
    ));
    let search_console = Arc::new(SearchConsoleService::new(
        Arc::new(SearchConsoleClient::new()),
        Arc::clone(&auth_service),
        Arc::clone(&settings),
    ));

    tokio::spawn(Arc::clone(&analytics).run());
    tokio::spawn(Arc::clone(&search_console).run());

    if !auth_service.state().is_authenticated {
        sign_in(&auth_service, &config).await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

/// Interactive sign-in over the loopback redirect.
async fn sign_in(auth_service: &AuthService, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let redirect_uri = config.redirect_uri();
    let url = auth::authorization_url(&config.google_client_id, &redirect_uri);

    auth_service.begin_sign_in();
    println!("Open this URL in your browser to sign in:\n\n{}\n", url);

    match auth::listen_for_callback(config.redirect_port).await? {
        CallbackOutcome::Code(code) => {
            auth_service.complete_sign_in(&code, &redirect_uri).await?;
        }
        CallbackOutcome::Cancelled => {
            auth_service.sign_in_cancelled();
            tracing::info!("Sign-in cancelled by user");
        }
        CallbackOutcome::Error(message) => {
            auth_service.sign_in_failed(message.clone());
            tracing::error!(error = %message, "Sign-in failed");
        }
    }
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitepulse=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
