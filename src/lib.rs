// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SitePulse: live Google Analytics 4 and Search Console metrics at a glance
//!
//! This crate provides the data core behind the SitePulse status display:
//! the Google OAuth token lifecycle, the scheduled refresh cycles that fan
//! out over the GA4 and Search Console APIs, response normalization into
//! display-ready snapshots, and the stateful alert engine.

pub mod config;
pub mod error;
pub mod format;
pub mod models;
pub mod services;
