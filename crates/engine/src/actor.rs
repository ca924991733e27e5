use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use optionbot_broker::contracts::{monthly_expiry, select_contract};
use optionbot_core::calendar::MarketCalendar;
use optionbot_core::config::TradingConfig;
use optionbot_core::error::{BrokerError, EngineError};
use optionbot_core::events::{Bar, MarketPhase, PriceTick, Timeframe};
use optionbot_core::sizing::lots_for_capital;
use optionbot_core::traits::{Brokerage, MarketData};
use optionbot_core::types::{CloseReason, Instrument, OptionSide, TriggerKind};
use optionbot_market::session::SessionMonitor;
use optionbot_market::switch::{DataAcquisitionSwitch, FeedEvent, FeedHealth};
use optionbot_strategy::bars::BarBuilder;
use optionbot_strategy::trend::TrendDetector;
use optionbot_strategy::triggers::{EntrySignal, EvalContext, TriggerEvaluator};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertLog;
use crate::commands::{EngineCommand, EngineMode, EngineState};
use crate::events::{AlertKind, EngineStatus, PauseCause, Performance, PositionInfo};
use crate::handle::EngineHandle;
use crate::monitor::check_exit;
use crate::reconcile::Reconciler;

const COMMAND_BUFFER: usize = 32;
const TICK_BUFFER: usize = 256;
const FEED_EVENT_BUFFER: usize = 32;

enum Flow {
    Continue,
    Shutdown,
}

/// The engine actor. All session state lives here; commands, ticks, feed
/// events, and the reconcile timer are multiplexed through one task, so no
/// transition ever races another.
pub struct EngineActor {
    command_rx: mpsc::Receiver<EngineCommand>,
    status_tx: watch::Sender<EngineStatus>,
    config: Option<TradingConfig>,
    market_data: Arc<dyn MarketData>,
    broker: Arc<dyn Brokerage>,
    /// Deadline on every brokerage round-trip. The loop awaits them inline,
    /// so a broker that stops answering must not hold it hostage.
    broker_timeout: Duration,
    alerts: AlertLog,
    /// Sticky auth gate: set by `AuthExpired`, cleared only by
    /// `AuthRestored`. While set, `resume` is rejected no matter how the
    /// commands interleave, so a forced pause always wins the race.
    auth_expired: bool,
    session: Option<Session>,
    // Receivers live outside the session so the select loop can poll them
    // alongside it. `None` whenever no feed is attached.
    tick_rx: Option<mpsc::Receiver<PriceTick>>,
    feed_event_rx: Option<mpsc::Receiver<FeedEvent>>,
}

/// Everything owned by one start..stop lifetime.
struct Session {
    mode: EngineMode,
    state: EngineState,
    pause_cause: Option<PauseCause>,
    contract_expiry: Option<NaiveDate>,
    suspend_call_entries: bool,
    suspend_put_entries: bool,
    config: TradingConfig,
    calendar: MarketCalendar,
    major_bars: BarBuilder,
    minor_bars: BarBuilder,
    major_trend: TrendDetector,
    minor_trend: TrendDetector,
    evaluator: TriggerEvaluator,
    reconciler: Reconciler,
    performance: Performance,
    next_intent_seq: u64,
    last_exchange_ts: Option<DateTime<Utc>>,
    phase_rx: watch::Receiver<MarketPhase>,
    feed_health: Option<Arc<FeedHealth>>,
    // Historical sessions run on a synthetic always-open phase; the senders
    // must outlive the session.
    _synthetic_phase: Option<watch::Sender<MarketPhase>>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineActor {
    #[must_use]
    pub fn new(
        config: Option<TradingConfig>,
        market_data: Arc<dyn MarketData>,
        broker: Arc<dyn Brokerage>,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(EngineStatus::default());
        let handle = EngineHandle::new(command_tx, status_rx);
        let broker_timeout = Duration::from_secs(
            config
                .as_ref()
                .map_or(10, |c| c.feed.broker_timeout_secs)
                .max(1),
        );
        let actor = Self {
            command_rx,
            status_tx,
            config,
            market_data,
            broker,
            broker_timeout,
            alerts: AlertLog::new(),
            auth_expired: false,
            session: None,
            tick_rx: None,
            feed_event_rx: None,
        };
        (actor, handle)
    }

    pub async fn run(mut self) {
        info!("engine actor started");
        let reconcile_secs = self
            .config
            .as_ref()
            .map_or(5, |c| c.feed.reconcile_interval_secs)
            .max(1);
        let mut reconcile_interval = tokio::time::interval(Duration::from_secs(reconcile_secs));
        reconcile_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => match maybe_command {
                    Some(command) => {
                        if let Flow::Shutdown = self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                maybe_tick = recv_or_pending(&mut self.tick_rx), if self.tick_rx.is_some() => {
                    match maybe_tick {
                        Some(tick) => self.on_tick(tick).await,
                        None => self.on_feed_closed().await,
                    }
                },
                Some(event) = recv_or_pending(&mut self.feed_event_rx), if self.feed_event_rx.is_some() => {
                    self.on_feed_event(event);
                    self.publish_status().await;
                },
                _ = reconcile_interval.tick(), if self.session.is_some() => {
                    self.reconcile().await;
                },
            }
        }

        if self.session.is_some() {
            if let Err(error) = self.stop().await {
                error!(%error, "session teardown failed during shutdown");
            }
        }
        self.publish_status().await;
        info!("engine actor stopped");
    }

    async fn handle_command(&mut self, command: EngineCommand) -> Flow {
        match command {
            EngineCommand::Start {
                mode,
                contract_expiry,
                reply,
            } => {
                let _ = reply.send(self.start(mode, contract_expiry));
            }
            EngineCommand::Pause { reply } => {
                let _ = reply.send(self.pause(PauseCause::Manual));
            }
            EngineCommand::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            EngineCommand::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            EngineCommand::SetSuspension {
                side,
                suspended,
                reply,
            } => {
                let _ = reply.send(self.set_suspension(side, suspended));
            }
            EngineCommand::AdoptUntracked {
                trading_symbol,
                reply,
            } => {
                let _ = reply.send(self.adopt_untracked(&trading_symbol));
            }
            EngineCommand::GetStatus { reply } => {
                let _ = reply.send(self.snapshot().await);
            }
            EngineCommand::AuthExpired => {
                self.force_auth_pause("broker session expired");
            }
            EngineCommand::AuthRestored => {
                self.auth_expired = false;
                info!("broker session restored");
                self.alerts
                    .push(AlertKind::Session, "broker session restored; resume to continue");
            }
            EngineCommand::Shutdown => return Flow::Shutdown,
        }
        self.publish_status().await;
        Flow::Continue
    }

    fn start(
        &mut self,
        mode: EngineMode,
        contract_expiry: Option<NaiveDate>,
    ) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let config = self.config.clone().ok_or(EngineError::ConfigMissing)?;
        let calendar = MarketCalendar::new(config.market.clone());
        if mode == EngineMode::Historical && calendar.is_open_at(Utc::now()) {
            return Err(EngineError::HistoricalRequiresMarketClosed);
        }

        let (tick_tx, tick_rx) = mpsc::channel(TICK_BUFFER);
        let (feed_event_tx, feed_event_rx) = mpsc::channel(FEED_EVENT_BUFFER);
        let mut tasks = Vec::new();
        let mut synthetic_phase = None;
        let mut feed_health = None;

        let phase_rx = match mode {
            EngineMode::Live => {
                let (phase_rx, monitor_task) = SessionMonitor::new(calendar.clone()).spawn();
                tasks.push(monitor_task);
                let switch = DataAcquisitionSwitch::new(
                    Arc::clone(&self.market_data),
                    vec![config.underlying_id.clone()],
                    config.feed.clone(),
                    phase_rx.clone(),
                    tick_tx,
                    feed_event_tx,
                );
                feed_health = Some(switch.health());
                tasks.push(switch.spawn());
                phase_rx
            }
            EngineMode::Historical => {
                // Replay runs on a synthetic always-open phase; session-time
                // rules use recorded exchange timestamps instead.
                let (phase_tx, phase_rx) = watch::channel(MarketPhase::Open);
                synthetic_phase = Some(phase_tx);
                let market_data = Arc::clone(&self.market_data);
                tasks.push(tokio::spawn(async move {
                    // Keep the event sender alive for the replay's lifetime.
                    let _feed_event_tx = feed_event_tx;
                    // Empty filter: replay every recorded instrument.
                    match market_data.subscribe(&[]).await {
                        Ok(mut stream) => loop {
                            match stream.next_tick().await {
                                Ok(Some(tick)) => {
                                    if tick_tx.send(tick).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(error) => {
                                    warn!(%error, "replay stream error");
                                    break;
                                }
                            }
                        },
                        Err(error) => error!(%error, "replay subscribe failed"),
                    }
                    // Dropping tick_tx tells the actor the replay is done.
                }));
                phase_rx
            }
        };

        info!(?mode, config_id = %config.config_id, "session started");
        self.tick_rx = Some(tick_rx);
        self.feed_event_rx = Some(feed_event_rx);
        self.session = Some(Session {
            mode,
            state: EngineState::Running,
            pause_cause: None,
            contract_expiry,
            suspend_call_entries: config.suspend_call_entries,
            suspend_put_entries: config.suspend_put_entries,
            major_bars: BarBuilder::new(config.underlying_id.clone(), config.major_timeframe_mins),
            minor_bars: BarBuilder::new(config.underlying_id.clone(), config.minor_timeframe_mins),
            major_trend: TrendDetector::new(
                Timeframe::Major,
                config.ma_short_period,
                config.ma_long_period,
                config.band_std_devs,
            ),
            minor_trend: TrendDetector::new(
                Timeframe::Minor,
                config.ma_short_period,
                config.ma_long_period,
                config.band_std_devs,
            ),
            evaluator: TriggerEvaluator::new(config.clone()),
            reconciler: Reconciler::new(),
            performance: Performance::default(),
            next_intent_seq: 0,
            last_exchange_ts: None,
            phase_rx,
            feed_health,
            _synthetic_phase: synthetic_phase,
            config,
            calendar,
            tasks,
        });
        Ok(())
    }

    fn pause(&mut self, cause: PauseCause) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::NotRunning);
        };
        if session.state != EngineState::Running {
            return Err(EngineError::NotRunning);
        }
        session.state = EngineState::Paused;
        session.pause_cause = Some(cause);
        info!(?cause, "session paused");
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::NotPaused);
        };
        if session.state != EngineState::Paused {
            return Err(EngineError::NotPaused);
        }
        if self.auth_expired {
            return Err(EngineError::AuthExpired);
        }
        session.state = EngineState::Running;
        session.pause_cause = None;
        info!("session resumed");
        Ok(())
    }

    /// Best-effort square-off, then tear down the session's tasks. Per-
    /// instrument close failures become alerts; the stop itself always
    /// completes, and stopping a stopped engine is a no-op.
    async fn stop(&mut self) -> Result<(), EngineError> {
        let Some(mut session) = self.session.take() else {
            debug!("stop with no active session");
            return Ok(());
        };
        self.tick_rx = None;
        self.feed_event_rx = None;
        info!("stopping session");

        let open: Vec<(String, String)> = session
            .reconciler
            .open_intents()
            .map(|i| (i.id.clone(), i.instrument.trading_symbol.clone()))
            .collect();
        for (id, symbol) in open {
            match with_deadline(
                self.broker_timeout,
                "square-off",
                self.broker.close_position(&symbol),
            )
            .await
            {
                Ok(()) => {
                    if let Some(intent) = session.reconciler.mark_closed(&id, CloseReason::SquareOff)
                    {
                        session.performance.realized_pnl += intent.unrealized_pnl;
                        session.performance.trades += 1;
                    }
                }
                Err(BrokerError::AuthExpired) => {
                    self.auth_expired = true;
                    self.alerts.push(
                        AlertKind::Trade,
                        format!("square-off of {symbol} failed: auth expired"),
                    );
                }
                Err(error) => {
                    self.alerts
                        .push(AlertKind::Trade, format!("square-off of {symbol} failed: {error}"));
                }
            }
        }

        for task in session.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        info!(
            trades = session.performance.trades,
            realized_pnl = %session.performance.realized_pnl,
            "session stopped"
        );
        Ok(())
    }

    fn set_suspension(&mut self, side: OptionSide, suspended: bool) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::NotRunning);
        };
        match side {
            OptionSide::Call => session.suspend_call_entries = suspended,
            OptionSide::Put => session.suspend_put_entries = suspended,
        }
        info!(%side, suspended, "entry suspension updated");
        Ok(())
    }

    fn adopt_untracked(&mut self, trading_symbol: &str) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::NotRunning);
        };
        let view = session.reconciler.view();
        let Some(position) = view
            .untracked
            .iter()
            .find(|p| p.trading_symbol == trading_symbol)
        else {
            return Err(EngineError::UntrackedNotFound(trading_symbol.to_string()));
        };

        // Manage the adopted position with the first-priority trigger's
        // target/stop parameters.
        let kind = session
            .config
            .trigger_priority
            .first()
            .copied()
            .unwrap_or(TriggerKind::ShortMa);
        let params = session.config.trigger(kind);
        let target = position.avg_price * (Decimal::ONE_HUNDRED + pct(params.target_pct))
            / Decimal::ONE_HUNDRED;
        let stop = position.avg_price * (Decimal::ONE_HUNDRED - pct(params.stop_loss_pct))
            / Decimal::ONE_HUNDRED;
        session
            .reconciler
            .adopt_untracked(trading_symbol, target, stop, Utc::now());
        self.alerts
            .push(AlertKind::Reconcile, format!("adopted {trading_symbol}"));
        Ok(())
    }

    fn force_auth_pause(&mut self, reason: &str) {
        self.auth_expired = true;
        self.alerts.push(AlertKind::Session, reason);
        if let Some(session) = self.session.as_mut() {
            if session.state == EngineState::Running {
                session.state = EngineState::Paused;
                info!("session force-paused: auth expired");
            }
            session.pause_cause = Some(PauseCause::AuthExpired);
        }
    }

    async fn on_tick(&mut self, tick: PriceTick) {
        let mut completed_minor = None;
        {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            session.last_exchange_ts = Some(tick.ts_exchange);
            if tick.instrument_id == session.config.underlying_id {
                if let Some(bar) = session.major_bars.on_tick(&tick) {
                    if let Some(change) = session.major_trend.on_bar(&bar) {
                        info!(timeframe = %change.timeframe, direction = ?change.direction, "trend changed");
                    }
                }
                if let Some(bar) = session.minor_bars.on_tick(&tick) {
                    if let Some(change) = session.minor_trend.on_bar(&bar) {
                        info!(timeframe = %change.timeframe, direction = ?change.direction, "trend changed");
                    }
                    completed_minor = Some(bar);
                }
            } else {
                session.reconciler.update_price(&tick.instrument_id, tick.price);
            }
        }

        if let Some(bar) = completed_minor {
            self.evaluate_entry(&bar).await;
        }
        self.check_exits(tick.ts_exchange).await;
        self.publish_status().await;
    }

    /// One evaluator cycle, run per completed minor bar. Frozen while
    /// paused; live sessions additionally require the market to be open.
    async fn evaluate_entry(&mut self, bar: &Bar) {
        let decision = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            if session.state != EngineState::Running {
                return;
            }
            if session.mode == EngineMode::Live
                && *session.phase_rx.borrow() == MarketPhase::Closed
            {
                return;
            }
            let ctx = EvalContext {
                spot: bar.close,
                major: session.major_trend.state(),
                minor: session.minor_trend.state(),
                suspend_call_entries: session.suspend_call_entries,
                suspend_put_entries: session.suspend_put_entries,
                has_open_position: session.reconciler.has_open_or_pending(),
            };
            let Some(signal) = session.evaluator.evaluate(&ctx) else {
                return;
            };
            let exchange_date = bar
                .start
                .with_timezone(&session.config.market.timezone)
                .date_naive();
            let expiry = session
                .contract_expiry
                .unwrap_or_else(|| monthly_expiry(exchange_date));
            (
                signal,
                select_contract(&session.config, signal.side, bar.close, expiry),
            )
        };
        let (signal, instrument) = decision;
        self.open_position(signal, instrument).await;
    }

    async fn open_position(&mut self, signal: EntrySignal, mut instrument: Instrument) {
        let quote = tokio::time::timeout(
            self.broker_timeout,
            self.market_data.poll(&[instrument.id.clone()]),
        )
        .await;
        let premium = match quote {
            Ok(Ok(ticks)) => ticks
                .into_iter()
                .find(|t| t.instrument_id == instrument.id)
                .map(|t| t.price),
            Ok(Err(error)) => {
                debug!(%error, symbol = %instrument.trading_symbol, "premium quote failed");
                None
            }
            Err(_) => {
                debug!(symbol = %instrument.trading_symbol, "premium quote timed out");
                None
            }
        };
        let Some(premium) = premium else {
            self.alerts.push(
                AlertKind::Trade,
                format!("no quote for {}; entry skipped", instrument.trading_symbol),
            );
            return;
        };

        let capital = match with_deadline(
            self.broker_timeout,
            "capital check",
            self.broker.available_capital(),
        )
        .await
        {
            Ok(capital) => capital,
            Err(BrokerError::AuthExpired) => {
                self.force_auth_pause("broker session expired");
                return;
            }
            Err(error) => {
                self.alerts
                    .push(AlertKind::Trade, format!("capital check failed: {error}"));
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let lots = lots_for_capital(
            capital,
            premium,
            session.config.lot_size,
            session.config.capital_allocation_pct,
        );
        if lots == 0 {
            self.alerts.push(
                AlertKind::Trade,
                format!(
                    "insufficient capital for one lot of {}",
                    instrument.trading_symbol
                ),
            );
            return;
        }
        let quantity = lots * session.config.lot_size;

        instrument.last_price = premium;
        session.next_intent_seq += 1;
        let id = format!("{}-{}", session.config.config_id, session.next_intent_seq);
        let intent =
            session
                .evaluator
                .build_intent(id, signal, instrument, premium, quantity, Utc::now());

        match with_deadline(
            self.broker_timeout,
            "order submit",
            self.broker.submit_order(&intent),
        )
        .await
        {
            Ok(ack) => {
                info!(
                    correlation_id = %ack.correlation_id,
                    symbol = %intent.instrument.trading_symbol,
                    quantity,
                    %premium,
                    "order submitted"
                );
                session.reconciler.track(intent);
            }
            Err(BrokerError::AuthExpired) => {
                session.state = EngineState::Paused;
                session.pause_cause = Some(PauseCause::AuthExpired);
                self.auth_expired = true;
                self.alerts
                    .push(AlertKind::Session, "broker session expired during submit");
            }
            Err(BrokerError::Rejected(reason)) => {
                let id = intent.id.clone();
                session.reconciler.track(intent);
                session.reconciler.mark_closed(&id, CloseReason::Rejected);
                self.alerts
                    .push(AlertKind::Trade, format!("order rejected: {reason}"));
            }
            Err(error) => {
                self.alerts
                    .push(AlertKind::Trade, format!("order submit failed: {error}"));
            }
        }
    }

    /// Target/stop/square-off checks. Runs on every tick and every
    /// reconcile pass, including while paused: exits stay monitored even
    /// when the evaluator is frozen.
    async fn check_exits(&mut self, at: DateTime<Utc>) {
        let exits: Vec<(String, String, CloseReason)> = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            let past_cutoff = session
                .calendar
                .is_past_cutoff(at, session.config.square_off_time);
            session
                .reconciler
                .open_intents()
                .filter(|i| !i.orphaned)
                .filter_map(|i| {
                    check_exit(i, i.last_price, past_cutoff)
                        .map(|reason| (i.id.clone(), i.instrument.trading_symbol.clone(), reason))
                })
                .collect()
        };

        for (id, symbol, reason) in exits {
            match with_deadline(
                self.broker_timeout,
                "position close",
                self.broker.close_position(&symbol),
            )
            .await
            {
                Ok(()) => {
                    if let Some(session) = self.session.as_mut() {
                        if let Some(intent) = session.reconciler.mark_closed(&id, reason) {
                            session.performance.realized_pnl += intent.unrealized_pnl;
                            session.performance.trades += 1;
                        }
                    }
                    self.alerts
                        .push(AlertKind::Trade, format!("{symbol} closed: {reason}"));
                }
                Err(BrokerError::AuthExpired) => {
                    self.force_auth_pause("broker session expired during exit");
                    return;
                }
                Err(error) => {
                    self.alerts
                        .push(AlertKind::Trade, format!("close of {symbol} failed: {error}"));
                }
            }
        }
    }

    async fn reconcile(&mut self) {
        let orders = match with_deadline(
            self.broker_timeout,
            "order fetch",
            self.broker.list_orders(),
        )
        .await
        {
            Ok(orders) => orders,
            Err(BrokerError::AuthExpired) => {
                self.force_auth_pause("broker session expired");
                self.publish_status().await;
                return;
            }
            Err(error) => {
                self.alerts
                    .push(AlertKind::Reconcile, format!("order fetch failed: {error}"));
                return;
            }
        };
        let positions = match with_deadline(
            self.broker_timeout,
            "position fetch",
            self.broker.list_positions(),
        )
        .await
        {
            Ok(positions) => positions,
            Err(BrokerError::AuthExpired) => {
                self.force_auth_pause("broker session expired");
                self.publish_status().await;
                return;
            }
            Err(error) => {
                self.alerts
                    .push(AlertKind::Reconcile, format!("position fetch failed: {error}"));
                return;
            }
        };

        let at = {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            let outcome = session.reconciler.apply(&orders, &positions);
            for id in &outcome.rejected {
                self.alerts
                    .push(AlertKind::Trade, format!("intent {id} rejected by broker"));
            }
            for id in &outcome.orphaned {
                self.alerts.push(
                    AlertKind::Reconcile,
                    format!("intent {id} has no broker position"),
                );
            }
            for symbol in &outcome.untracked {
                self.alerts.push(
                    AlertKind::Reconcile,
                    format!("untracked broker position in {symbol}"),
                );
            }
            for symbol in &outcome.shorts {
                self.alerts.push(
                    AlertKind::Reconcile,
                    format!("short broker position in {symbol} ignored"),
                );
            }
            match session.mode {
                EngineMode::Historical => session.last_exchange_ts.unwrap_or_else(Utc::now),
                EngineMode::Live => Utc::now(),
            }
        };

        self.check_exits(at).await;
        self.publish_status().await;
    }

    fn on_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::ReconnectFailing { consecutive } => self.alerts.push(
                AlertKind::Feed,
                format!("push feed reconnect failing ({consecutive} consecutive)"),
            ),
            FeedEvent::PushRecovered => {
                self.alerts.push(AlertKind::Feed, "push feed recovered");
            }
        }
    }

    /// The tick channel closed. For a historical session that means the
    /// replay finished; live sessions keep their feed tasks until stop, so
    /// closure there is a defect worth an alert.
    async fn on_feed_closed(&mut self) {
        self.tick_rx = None;
        let Some(mode) = self.session.as_ref().map(|s| s.mode) else {
            return;
        };
        if mode == EngineMode::Historical {
            self.alerts
                .push(AlertKind::Session, "replay complete; stopping session");
            if let Err(error) = self.stop().await {
                error!(%error, "post-replay stop failed");
            }
        } else {
            self.alerts
                .push(AlertKind::Feed, "tick channel closed unexpectedly");
        }
        self.publish_status().await;
    }

    async fn snapshot(&self) -> EngineStatus {
        let mut status = EngineStatus {
            alerts: self.alerts.snapshot(),
            ..EngineStatus::default()
        };
        let Some(session) = self.session.as_ref() else {
            return status;
        };

        status.state = session.state;
        status.mode = Some(session.mode);
        status.pause_cause = session.pause_cause;
        status.market_phase = *session.phase_rx.borrow();
        status.trend_major = session.major_trend.state().clone();
        status.trend_minor = session.minor_trend.state().clone();

        let view = session.reconciler.view();
        status.open_positions = view
            .intents
            .iter()
            .filter(|i| i.is_open())
            .map(|i| PositionInfo {
                trading_symbol: i.instrument.trading_symbol.clone(),
                side: i.side,
                quantity: i.quantity,
                entry_price: i.entry_price,
                last_price: i.last_price,
                target_price: i.target_price,
                stop_loss_price: i.stop_loss_price,
                unrealized_pnl: i.unrealized_pnl,
                orphaned: i.orphaned,
            })
            .collect();
        status.untracked = view
            .untracked
            .iter()
            .map(|p| p.trading_symbol.clone())
            .collect();

        status.performance = session.performance;
        status.performance.open_pnl = session
            .reconciler
            .open_intents()
            .map(|i| i.unrealized_pnl)
            .sum();
        if let Some(health) = &session.feed_health {
            status.feed = Some(health.snapshot().await);
        }
        status
    }

    async fn publish_status(&self) {
        let status = self.snapshot().await;
        let _ = self.status_tx.send(status);
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Bounds one brokerage round-trip so a hung broker cannot park the actor
/// loop and freeze command and tick processing.
async fn with_deadline<T>(
    deadline: Duration,
    what: &str,
    call: impl std::future::Future<Output = Result<T, BrokerError>>,
) -> Result<T, BrokerError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::Other(anyhow::anyhow!(
            "{what} timed out after {}s",
            deadline.as_secs()
        ))),
    }
}

fn pct(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}
