use std::collections::VecDeque;

use chrono::Utc;
use tracing::warn;

use crate::events::{Alert, AlertKind};

const DEFAULT_CAPACITY: usize = 50;

/// Bounded rolling log of operator alerts; the oldest entry falls off when
/// full. Every alert is also emitted as a warning log line.
pub struct AlertLog {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl AlertLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, kind: AlertKind, message: impl Into<String>) {
        let message = message.into();
        warn!(?kind, %message, "alert");
        if self.alerts.len() == self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(Alert {
            kind,
            message,
            at: Utc::now(),
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
