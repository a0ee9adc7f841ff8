// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect suppression after a failed connection

use std::time::{Duration, Instant};

/// Default time to wait after a failure before contacting the router again
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    last_failure: Option<Instant>,
    reconnect_timeout: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_TIMEOUT)
    }
}

impl Backoff {
    pub(crate) fn new(reconnect_timeout: Duration) -> Self {
        Self {
            last_failure: None,
            reconnect_timeout,
        }
    }

    pub(crate) fn set_reconnect_timeout(&mut self, timeout: Duration) {
        self.reconnect_timeout = timeout;
    }

    /// Whether a failure happened less than the reconnect timeout before `now`
    pub(crate) fn is_suppressed(&self, now: Instant) -> bool {
        self.last_failure
            .is_some_and(|failed| now.saturating_duration_since(failed) < self.reconnect_timeout)
    }

    pub(crate) fn record_failure(&mut self, now: Instant) {
        self.last_failure = Some(now);
    }

    pub(crate) fn record_success(&mut self) {
        self.last_failure = None;
    }
}
