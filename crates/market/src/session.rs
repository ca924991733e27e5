use std::time::Duration;

use chrono::Utc;
use optionbot_core::calendar::MarketCalendar;
use optionbot_core::events::MarketPhase;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Publishes market open/closed transitions over a `watch` channel.
///
/// Downstream consumers (the data-acquisition switch, the engine's status
/// snapshot) react to transitions rather than polling the calendar
/// themselves.
pub struct SessionMonitor {
    calendar: MarketCalendar,
    check_interval: Duration,
}

impl SessionMonitor {
    #[must_use]
    pub fn new(calendar: MarketCalendar) -> Self {
        Self {
            calendar,
            check_interval: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Spawns the monitor task. The receiver always carries the current
    /// phase; a new value is sent only on a transition.
    #[must_use]
    pub fn spawn(self) -> (watch::Receiver<MarketPhase>, JoinHandle<()>) {
        let initial = self.calendar.phase_at(Utc::now());
        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.check_interval);
            loop {
                interval.tick().await;
                let phase = self.calendar.phase_at(Utc::now());
                let changed = tx.send_if_modified(|current| {
                    if *current == phase {
                        false
                    } else {
                        *current = phase;
                        true
                    }
                });
                if changed {
                    info!(?phase, "market phase transition");
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optionbot_core::config::MarketHoursConfig;

    #[tokio::test]
    async fn receiver_starts_with_current_phase() {
        let monitor = SessionMonitor::new(MarketCalendar::new(MarketHoursConfig::default()));
        let expected = MarketCalendar::new(MarketHoursConfig::default()).phase_at(Utc::now());

        let (rx, handle) = monitor.spawn();
        assert_eq!(*rx.borrow(), expected);
        handle.abort();
    }

    #[tokio::test]
    async fn task_stops_once_all_receivers_drop() {
        let monitor = SessionMonitor::new(MarketCalendar::new(MarketHoursConfig::default()))
            .with_check_interval(Duration::from_millis(10));
        let (rx, handle) = monitor.spawn();
        drop(rx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor exits")
            .expect("no panic");
    }
}
