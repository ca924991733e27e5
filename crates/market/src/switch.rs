use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use optionbot_core::config::FeedConfig;
use optionbot_core::events::{MarketPhase, PriceTick};
use optionbot_core::traits::MarketData;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::reconnect::{FailureOutcome, ReconnectPolicy, ReconnectTracker};

/// How ticks are currently being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedMode {
    /// Subscribed to the push stream (market open).
    Push,
    /// Periodic polling (market closed, or push persistently unavailable).
    Poll,
}

/// Point-in-time feed health, exposed in the engine status snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub mode: FeedMode,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// Shared freshness tracker. The switch writes, status readers snapshot.
pub struct FeedHealth {
    inner: RwLock<FeedSnapshot>,
}

impl FeedHealth {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(FeedSnapshot {
                mode: FeedMode::Poll,
                last_tick_at: None,
                consecutive_failures: 0,
            }),
        })
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        *self.inner.read().await
    }

    /// Stale means no tick for longer than the configured window. A feed
    /// that has never ticked is stale by definition.
    pub async fn is_stale(&self, now: DateTime<Utc>, stale_after_secs: u64) -> bool {
        let snapshot = self.snapshot().await;
        match snapshot.last_tick_at {
            Some(at) => now - at > chrono::Duration::seconds(stale_after_secs as i64),
            None => true,
        }
    }

    async fn set_mode(&self, mode: FeedMode) {
        self.inner.write().await.mode = mode;
    }

    async fn record_tick(&self, at: DateTime<Utc>) {
        self.inner.write().await.last_tick_at = Some(at);
    }

    async fn set_failures(&self, consecutive: u32) {
        self.inner.write().await.consecutive_failures = consecutive;
    }
}

/// Feed conditions the engine turns into alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// The reconnect streak crossed the alert threshold.
    ReconnectFailing { consecutive: u32 },
    /// Push came back after a degraded stretch.
    PushRecovered,
}

/// Chooses push or poll acquisition based solely on the session monitor's
/// open/closed signal, and forwards every accepted tick downstream.
///
/// Push loss never stops the engine: the supervisor retries on a fixed delay
/// and the only observable effect is a stale `last_tick_at`. Poll-mode ticks
/// keep last-known prices fresh; whether they generate entry signals is the
/// consumer's decision (it must not act on closed-market data).
pub struct DataAcquisitionSwitch {
    market_data: Arc<dyn MarketData>,
    instrument_ids: Vec<String>,
    feed: FeedConfig,
    phase_rx: watch::Receiver<MarketPhase>,
    tick_tx: mpsc::Sender<PriceTick>,
    event_tx: mpsc::Sender<FeedEvent>,
    health: Arc<FeedHealth>,
}

impl DataAcquisitionSwitch {
    #[must_use]
    pub fn new(
        market_data: Arc<dyn MarketData>,
        instrument_ids: Vec<String>,
        feed: FeedConfig,
        phase_rx: watch::Receiver<MarketPhase>,
        tick_tx: mpsc::Sender<PriceTick>,
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Self {
            market_data,
            instrument_ids,
            feed,
            phase_rx,
            tick_tx,
            event_tx,
            health: FeedHealth::new(),
        }
    }

    #[must_use]
    pub fn health(&self) -> Arc<FeedHealth> {
        Arc::clone(&self.health)
    }

    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            if self.tick_tx.is_closed() || self.phase_rx.has_changed().is_err() {
                break;
            }
            let phase = *self.phase_rx.borrow_and_update();
            match phase {
                MarketPhase::Open => self.run_push().await,
                MarketPhase::Closed => self.run_poll().await,
            }
        }
        debug!("data acquisition switch stopped");
    }

    /// Push acquisition until the market closes or the consumer goes away.
    /// Detector rings live downstream, so nothing here resets on re-entry.
    async fn run_push(&mut self) {
        self.health.set_mode(FeedMode::Push).await;
        info!("acquisition mode: push");
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::from_feed_config(&self.feed));
        let mut degraded = false;

        while *self.phase_rx.borrow() == MarketPhase::Open && !self.tick_tx.is_closed() {
            tracker.on_attempt();
            match self.market_data.subscribe(&self.instrument_ids).await {
                Ok(mut stream) => {
                    tracker.on_connected();
                    self.health.set_failures(0).await;
                    if degraded {
                        degraded = false;
                        let _ = self.event_tx.send(FeedEvent::PushRecovered).await;
                    }
                    info!("push feed connected");
                    loop {
                        tokio::select! {
                            changed = self.phase_rx.changed() => {
                                if changed.is_err()
                                    || *self.phase_rx.borrow() == MarketPhase::Closed
                                {
                                    return;
                                }
                            }
                            next = stream.next_tick() => match next {
                                Ok(Some(tick)) => {
                                    self.health.record_tick(tick.ts_received).await;
                                    if self.tick_tx.send(tick).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => {
                                    warn!("push stream ended; reconnecting");
                                    break;
                                }
                                Err(error) => {
                                    warn!(%error, "push stream error; reconnecting");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(error) => warn!(%error, "push subscribe failed"),
            }

            degraded = true;
            let outcome = tracker.on_failure();
            self.health
                .set_failures(tracker.consecutive_failures())
                .await;
            let after = match outcome {
                FailureOutcome::RetryAndAlert { after, consecutive } => {
                    let _ = self
                        .event_tx
                        .send(FeedEvent::ReconnectFailing { consecutive })
                        .await;
                    after
                }
                FailureOutcome::Retry { after } => after,
            };
            self.sleep_or_phase_change(after).await;
        }
    }

    /// Poll acquisition while the market is closed.
    async fn run_poll(&mut self) {
        self.health.set_mode(FeedMode::Poll).await;
        info!("acquisition mode: poll");
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.feed.poll_interval_secs.max(1)));

        while *self.phase_rx.borrow() == MarketPhase::Closed && !self.tick_tx.is_closed() {
            tokio::select! {
                _ = interval.tick() => {
                    match self.market_data.poll(&self.instrument_ids).await {
                        Ok(ticks) => {
                            for tick in ticks {
                                self.health.record_tick(tick.ts_received).await;
                                if self.tick_tx.send(tick).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(error) => debug!(%error, "poll failed; retrying next interval"),
                    }
                }
                changed = self.phase_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn sleep_or_phase_change(&mut self, delay: Duration) {
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = self.phase_rx.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use optionbot_core::traits::TickStream;
    use rust_decimal_macros::dec;

    fn tick(id: &str) -> PriceTick {
        PriceTick {
            instrument_id: id.to_string(),
            price: dec!(100),
            ts_exchange: Utc::now(),
            ts_received: Utc::now(),
        }
    }

    struct ScriptedStream {
        ticks: Vec<PriceTick>,
    }

    #[async_trait]
    impl TickStream for ScriptedStream {
        async fn next_tick(&mut self) -> Result<Option<PriceTick>> {
            match self.ticks.pop() {
                Some(t) => Ok(Some(t)),
                // Keep the connection open once the script runs out.
                None => std::future::pending().await,
            }
        }
    }

    struct ScriptedFeed {
        subscribe_fails: bool,
    }

    #[async_trait]
    impl MarketData for ScriptedFeed {
        async fn subscribe(&self, instrument_ids: &[String]) -> Result<Box<dyn TickStream>> {
            if self.subscribe_fails {
                return Err(anyhow!("connection refused"));
            }
            Ok(Box::new(ScriptedStream {
                ticks: instrument_ids.iter().map(|id| tick(id)).collect(),
            }))
        }

        async fn poll(&self, instrument_ids: &[String]) -> Result<Vec<PriceTick>> {
            Ok(instrument_ids.iter().map(|id| tick(id)).collect())
        }
    }

    fn feed_config() -> FeedConfig {
        FeedConfig {
            reconnect_delay_secs: 0,
            max_reconnect_failures: 3,
            poll_interval_secs: 1,
            reconcile_interval_secs: 5,
            stale_after_secs: 30,
            broker_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn push_mode_forwards_ticks_and_tracks_freshness() {
        let (_phase_tx, phase_rx) = {
            let (tx, rx) = watch::channel(MarketPhase::Open);
            (tx, rx)
        };
        let (tick_tx, mut tick_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = mpsc::channel(16);
        let switch = DataAcquisitionSwitch::new(
            Arc::new(ScriptedFeed {
                subscribe_fails: false,
            }),
            vec!["NIFTY".to_string()],
            feed_config(),
            phase_rx,
            tick_tx,
            event_tx,
        );
        let health = switch.health();
        let handle = switch.spawn();

        let received = tick_rx.recv().await.expect("tick");
        assert_eq!(received.instrument_id, "NIFTY");
        let snapshot = health.snapshot().await;
        assert_eq!(snapshot.mode, FeedMode::Push);
        assert!(snapshot.last_tick_at.is_some());
        assert!(!health.is_stale(Utc::now(), 30).await);

        handle.abort();
    }

    #[tokio::test]
    async fn poll_mode_forwards_ticks_while_closed() {
        let (_phase_tx, phase_rx) = {
            let (tx, rx) = watch::channel(MarketPhase::Closed);
            (tx, rx)
        };
        let (tick_tx, mut tick_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = mpsc::channel(16);
        let switch = DataAcquisitionSwitch::new(
            Arc::new(ScriptedFeed {
                subscribe_fails: false,
            }),
            vec!["NIFTY".to_string()],
            feed_config(),
            phase_rx,
            tick_tx,
            event_tx,
        );
        let health = switch.health();
        let handle = switch.spawn();

        let received = tick_rx.recv().await.expect("tick");
        assert_eq!(received.instrument_id, "NIFTY");
        assert_eq!(health.snapshot().await.mode, FeedMode::Poll);

        handle.abort();
    }

    #[tokio::test]
    async fn push_failures_degrade_freshness_and_raise_one_alert() {
        let (_phase_tx, phase_rx) = {
            let (tx, rx) = watch::channel(MarketPhase::Open);
            (tx, rx)
        };
        let (tick_tx, tick_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let switch = DataAcquisitionSwitch::new(
            Arc::new(ScriptedFeed {
                subscribe_fails: true,
            }),
            vec!["NIFTY".to_string()],
            feed_config(),
            phase_rx,
            tick_tx,
            event_tx,
        );
        let health = switch.health();
        let handle = switch.spawn();

        // Third consecutive failure crosses the threshold.
        let event = event_rx.recv().await.expect("event");
        assert_eq!(event, FeedEvent::ReconnectFailing { consecutive: 3 });
        assert!(health.snapshot().await.consecutive_failures >= 3);
        // The feed never ticked, so it reads as stale but nothing panicked
        // and the tick channel is still open.
        assert!(health.is_stale(Utc::now(), 30).await);
        drop(tick_rx);

        handle.abort();
    }
}
