use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optionbot_core::events::PriceTick;
use optionbot_core::traits::{MarketData, TickStream};
use tokio::time::sleep;

/// Replays recorded ticks in exchange-timestamp order, scaling the gaps
/// between them by a speed factor. Drives historical sessions through the
/// same `MarketData` seam the live feed uses.
pub struct ReplaySource {
    ticks: Arc<Vec<PriceTick>>,
    speed: f64,
}

impl ReplaySource {
    /// `speed` of 1.0 replays in real time; 60.0 compresses a minute into a
    /// second. Non-positive values fall back to real time.
    #[must_use]
    pub fn new(mut ticks: Vec<PriceTick>, speed: f64) -> Self {
        ticks.sort_by_key(|t| t.ts_exchange);
        Self {
            ticks: Arc::new(ticks),
            speed: if speed.is_finite() && speed > 0.0 {
                speed
            } else {
                1.0
            },
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

#[async_trait]
impl MarketData for ReplaySource {
    async fn subscribe(&self, instrument_ids: &[String]) -> Result<Box<dyn TickStream>> {
        Ok(Box::new(ReplayStream {
            ticks: Arc::clone(&self.ticks),
            wanted: instrument_ids.iter().cloned().collect(),
            idx: 0,
            prev_ts: None,
            speed: self.speed,
        }))
    }

    /// Last recorded tick per requested instrument.
    async fn poll(&self, instrument_ids: &[String]) -> Result<Vec<PriceTick>> {
        let wanted: HashSet<&String> = instrument_ids.iter().collect();
        let mut latest: HashMap<&str, &PriceTick> = HashMap::new();
        for tick in self.ticks.iter() {
            if wanted.contains(&tick.instrument_id) {
                latest.insert(tick.instrument_id.as_str(), tick);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }
}

struct ReplayStream {
    ticks: Arc<Vec<PriceTick>>,
    wanted: HashSet<String>,
    idx: usize,
    prev_ts: Option<DateTime<Utc>>,
    speed: f64,
}

#[async_trait]
impl TickStream for ReplayStream {
    async fn next_tick(&mut self) -> Result<Option<PriceTick>> {
        while self.idx < self.ticks.len() {
            let tick = &self.ticks[self.idx];
            self.idx += 1;
            if !self.wanted.is_empty() && !self.wanted.contains(&tick.instrument_id) {
                continue;
            }
            if let Some(prev) = self.prev_ts {
                let gap = (tick.ts_exchange - prev).to_std().unwrap_or_default();
                let scaled = gap.div_f64(self.speed);
                if !scaled.is_zero() {
                    sleep(scaled).await;
                }
            }
            self.prev_ts = Some(tick.ts_exchange);
            let mut tick = tick.clone();
            tick.ts_received = Utc::now();
            return Ok(Some(tick));
        }
        Ok(None)
    }
}
