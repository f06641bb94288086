// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

pub mod alerts;
pub mod analytics;
pub mod auth;
pub mod ga4;
pub mod normalize;
pub mod search_console;
pub mod token_store;

pub use alerts::{AlertService, CommandNotifier, Notifier, NullNotifier};
pub use analytics::AnalyticsService;
pub use auth::{AuthService, AuthState, HttpTokenEndpoint, TokenEndpoint};
pub use ga4::{Ga4Api, Ga4Client};
pub use search_console::{SearchConsoleApi, SearchConsoleClient, SearchConsoleService};
pub use token_store::{Credentials, FileTokenStore, MemoryTokenStore, TokenStore};
