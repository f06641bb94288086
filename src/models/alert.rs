// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Alert log entries produced by the alert engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of alerts retained in the log (oldest trimmed).
pub const MAX_RECENT_ALERTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Spike,
    Drop,
    GoalReached,
    GoalExceeded,
}

/// One fired alert. The log is newest-first and append-only apart from the
/// cap trim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
