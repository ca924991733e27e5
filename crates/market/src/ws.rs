use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use optionbot_core::events::PriceTick;
use optionbot_core::traits::{MarketData, TickStream};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

/// One tick as pushed by the feed gateway.
#[derive(Debug, Deserialize)]
struct WireTick {
    instrument_id: String,
    price: Decimal,
    ts: DateTime<Utc>,
}

/// WebSocket-backed market data. Subscribe opens a long-lived push stream;
/// poll opens a short-lived connection and takes one snapshot tick per
/// instrument. Reconnection is the supervisor's job, not this adapter's.
pub struct WsMarketData {
    url: String,
    snapshot_window: Duration,
}

impl WsMarketData {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            snapshot_window: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl MarketData for WsMarketData {
    async fn subscribe(&self, instrument_ids: &[String]) -> Result<Box<dyn TickStream>> {
        let stream = WsTickStream::connect(&self.url, instrument_ids).await?;
        Ok(Box::new(stream))
    }

    async fn poll(&self, instrument_ids: &[String]) -> Result<Vec<PriceTick>> {
        let mut stream = WsTickStream::connect(&self.url, instrument_ids).await?;
        let deadline = tokio::time::Instant::now() + self.snapshot_window;
        let mut seen: HashMap<String, PriceTick> = HashMap::new();

        while seen.len() < instrument_ids.len() {
            match tokio::time::timeout_at(deadline, stream.next_tick()).await {
                Ok(Ok(Some(tick))) => {
                    seen.insert(tick.instrument_id.clone(), tick);
                }
                Ok(Ok(None)) => break,
                Ok(Err(error)) => return Err(error),
                Err(_elapsed) => break,
            }
        }
        Ok(seen.into_values().collect())
    }
}

/// A subscribed push stream. Answers pings, skips frames that do not parse
/// as ticks, and reports a server close as end-of-stream.
pub struct WsTickStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTickStream {
    /// Connects and subscribes to the given instruments.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the subscribe frame fails.
    pub async fn connect(url: &str, instrument_ids: &[String]) -> Result<Self> {
        debug!(%url, "connecting to tick feed");
        let (mut socket, _response) = connect_async(url)
            .await
            .context("websocket connect failed")?;

        let subscribe = serde_json::json!({
            "action": "subscribe",
            "instruments": instrument_ids,
        });
        socket
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("subscribe send failed")?;

        Ok(Self { socket })
    }
}

#[async_trait]
impl TickStream for WsTickStream {
    async fn next_tick(&mut self) -> Result<Option<PriceTick>> {
        while let Some(message) = self.socket.next().await {
            match message.context("websocket read failed")? {
                Message::Text(text) => match serde_json::from_str::<WireTick>(&text) {
                    Ok(wire) => {
                        return Ok(Some(PriceTick {
                            instrument_id: wire.instrument_id,
                            price: wire.price,
                            ts_exchange: wire.ts,
                            ts_received: Utc::now(),
                        }))
                    }
                    Err(error) => trace!(%error, "ignoring non-tick frame"),
                },
                Message::Ping(payload) => {
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .context("pong send failed")?;
                }
                Message::Close(frame) => {
                    warn!(?frame, "feed closed the connection");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }
}
