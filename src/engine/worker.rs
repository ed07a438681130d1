use super::events::{EngineEvent, EngineState, EventSink, TradeInfo};
use super::handle::EngineCommand;
use super::{Clock, EngineConfig, EngineSummary, TradingConfig, TradingEngine};
use crate::broker::BrokerGateway;
use crate::error::{ErrorKind, TraderError};
use crate::execution::{ClosedTrade, Decision, DecisionEngine, PositionLedger};
use crate::market::{BarStore, FeatureWindow, WindowBuilder};
use crate::models::{Credentials, Position, Side};
use crate::predictor::{Predictor, TrainingReport};
use crate::report::ReportExporter;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Everything the worker owns. Never shared outside the worker task.
pub(crate) struct TradingContext {
    config: EngineConfig,
    trading: TradingConfig,
    credentials: Credentials,
    broker: Box<dyn BrokerGateway>,
    clock: Arc<dyn Clock>,
    exporter: Option<Box<dyn ReportExporter>>,
    store: BarStore,
    windows: WindowBuilder,
    predictor: Predictor,
    decisions: DecisionEngine,
    ledger: PositionLedger,
    events: EventSink,
    state: watch::Sender<EngineState>,
    stop: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    ticks: u64,
    training: Option<TrainingReport>,
    last_fault: Option<String>,
}

impl TradingContext {
    pub(crate) fn new(
        engine: TradingEngine,
        events: EventSink,
        state: watch::Sender<EngineState>,
        stop: watch::Receiver<bool>,
        commands: mpsc::UnboundedReceiver<EngineCommand>,
    ) -> Self {
        let config = engine.config;
        let windows = WindowBuilder::new(config.window).with_max_gap(config.timeframe.max_gap());

        Self {
            store: BarStore::new(config.store_capacity),
            windows,
            predictor: Predictor::new(engine.predictor),
            decisions: DecisionEngine::new(),
            ledger: PositionLedger::new(config.symbol.clone(), engine.trading.tax_rate),
            trading: engine.trading,
            credentials: engine.credentials,
            broker: engine.broker,
            clock: engine.clock,
            exporter: engine.exporter,
            config,
            events,
            state,
            stop,
            commands,
            ticks: 0,
            training: None,
            last_fault: None,
        }
    }

    pub(crate) async fn run(mut self) -> EngineSummary {
        self.set_state(EngineState::Initializing);
        self.events.emit(EngineEvent::Loading(true));
        let setup = self.setup().await;
        self.events.emit(EngineEvent::Loading(false));

        if let Err(err) = setup {
            let text = format!("Error in trading bot: {}", err);
            tracing::error!("❌ {}", text);
            self.events.status(text.clone());
            self.last_fault = Some(text);
            self.broker.disconnect().await;
            self.set_state(EngineState::Failed);
            return self.into_summary();
        }

        if self.stop_requested() {
            tracing::info!("Stop requested during setup, no tick started");
        } else {
            self.set_state(EngineState::Running);
            self.events.status("Trading started");
            self.run_ticks().await;
        }

        self.set_state(EngineState::Stopping);
        self.shutdown().await;
        self.set_state(EngineState::Stopped);
        self.into_summary()
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    async fn setup(&mut self) -> Result<()> {
        if !self.credentials.is_complete() {
            return Err(TraderError::Auth("login credentials are missing".to_string()));
        }
        let session = self.broker.connect(&self.credentials).await?;
        self.events.status(format!("Connected to {}", session.server));

        let history = self
            .broker
            .fetch_bars(
                &self.config.symbol,
                self.config.timeframe,
                self.config.history_bars,
            )
            .await?;
        if history.is_empty() {
            return Err(TraderError::Fetch(format!(
                "no historical bars for {}",
                self.config.symbol
            )));
        }

        let fetched = history.len();
        let rejected = self.store.extend(history);
        if rejected > 0 {
            tracing::warn!(rejected, "Out-of-order bars dropped from history");
        }
        tracing::info!(
            symbol = %self.config.symbol,
            timeframe = %self.config.timeframe,
            fetched,
            stored = self.store.len(),
            "📊 Historical data loaded"
        );

        self.set_state(EngineState::Training);
        self.events.status("Training model...");

        let bars = self.store.snapshot();
        let windows: Vec<FeatureWindow> = self.windows.build(&bars).collect();
        let report = self.predictor.fit(&windows)?;

        self.events.status(format!(
            "Model trained on {} windows (validation MSE {})",
            report.windows,
            report
                .validation_mse
                .map(|mse| format!("{:.6}", mse))
                .unwrap_or_else(|| "n/a".to_string())
        ));
        self.training = Some(report);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tick scheduling
    // ------------------------------------------------------------------

    async fn run_ticks(&mut self) {
        let step = chrono::Duration::from_std(self.config.tick_interval())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let mut next_tick = self.clock.now();

        tracing::info!(
            interval_ms = self.config.tick_interval_ms,
            "🔄 Trading loop running"
        );

        loop {
            if self.stop_requested() {
                break;
            }

            self.handle_commands().await;
            if self.stop_requested() {
                break;
            }

            self.tick().await;
            self.ticks += 1;

            if self.config.report_every_ticks > 0
                && self.ticks % self.config.report_every_ticks == 0
            {
                self.flush_reports();
            }

            if let Some(max_ticks) = self.config.max_ticks {
                if self.ticks >= max_ticks {
                    tracing::info!(ticks = self.ticks, "Tick limit reached");
                    break;
                }
            }
            if self.stop_requested() {
                break;
            }

            next_tick = next_tick + step;
            let now = self.clock.now();
            if next_tick > now {
                let wait = (next_tick - now).to_std().unwrap_or_default();
                tokio::select! {
                    _ = self.clock.sleep(wait) => {}
                    _ = self.stop.changed() => {}
                }
            } else {
                // Overran the interval, start the next tick right away
                next_tick = now;
            }
        }
    }

    fn stop_requested(&self) -> bool {
        // A dropped sender means every handle is gone
        *self.stop.borrow() || self.stop.has_changed().is_err()
    }

    async fn handle_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::PlaceSingleOrder => {
                    if let Err(err) = self.place_single_order().await {
                        self.fault("Error placing order", &err);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // One tick
    // ------------------------------------------------------------------

    async fn tick(&mut self) {
        if let Err(err) = self.trade_step().await {
            self.fault("Error in trading loop", &err);
        }
        if let Err(err) = self.record_equity().await {
            self.fault("Error logging equity", &err);
        }
    }

    /// Refresh data, predict, decide and act
    async fn trade_step(&mut self) -> Result<Decision> {
        let bars = self
            .broker
            .fetch_bars(&self.config.symbol, self.config.timeframe, 1)
            .await?;
        for bar in bars {
            if let Err(err) = self.store.append(bar) {
                self.fault("Discarded bar", &err);
            }
        }

        let required = self.windows.window() + 1;
        let window = self
            .windows
            .latest(&self.store.recent(required))
            .ok_or(TraderError::InsufficientData {
                available: self.store.len(),
                required,
            })?;
        let current_price = window.last_close().ok_or(TraderError::InsufficientData {
            available: 0,
            required,
        })?;
        let predicted = self.predictor.predict(&window)?;

        let mut info = TradeInfo {
            open_price: self.ledger.position().map(|p| p.entry_price),
            current_value: Some(current_price),
            profit_loss_pct: self.unrealized_pct(current_price),
            predicted_price: Some(predicted),
        };

        let decision = self
            .decisions
            .decide(predicted, current_price, self.ledger.position());
        tracing::debug!(
            action = ?decision.action,
            predicted,
            current_price,
            "{}",
            decision.reason
        );

        let outcome = match decision.action {
            Decision::OpenLong => self.open_long(current_price).await.map(|opened| {
                if let Some(position) = opened {
                    info.open_price = Some(position.entry_price);
                    info.profit_loss_pct = None;
                }
            }),
            Decision::Close => self.close_position(current_price).await.map(|trade| {
                info.open_price = Some(trade.position.entry_price);
                info.profit_loss_pct = Some(trade.profit_loss_pct());
            }),
            Decision::Hold => Ok(()),
        };

        self.events.emit(EngineEvent::TradeInfo(info));
        outcome.map(|_| decision.action)
    }

    fn unrealized_pct(&self, price: f64) -> Option<f64> {
        let entry = self.ledger.position()?.entry_price;
        let pnl = self.ledger.calculate_pnl(price).ok()?;
        (entry != 0.0).then(|| pnl / entry * 100.0)
    }

    async fn record_equity(&mut self) -> Result<()> {
        let account = self.broker.account_info().await?;
        self.ledger
            .record_equity_at(account.balance, account.equity, self.clock.now());
        self.events.emit(EngineEvent::AccountInfo {
            balance: account.balance,
            equity: account.equity,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Open a long position sized from the symbol's volume constraints
    ///
    /// `Ok(None)` when the balance guard refuses the trade.
    async fn open_long(&mut self, price: f64) -> Result<Option<Position>> {
        let account = self.broker.account_info().await?;
        if account.balance < self.trading.min_balance {
            tracing::warn!(
                balance = account.balance,
                min_balance = self.trading.min_balance,
                "Account balance too low, order skipped"
            );
            self.events.status("Account balance too low");
            return Ok(None);
        }

        let volume = self
            .broker
            .symbol_info(&self.config.symbol)
            .await?
            .order_volume();
        let order_id = self
            .broker
            .place_order(&self.config.symbol, Side::Long, volume, price)
            .await?;

        let position = self
            .ledger
            .open_at(order_id, Side::Long, price, volume, self.clock.now())?
            .clone();

        tracing::info!(
            "🟢 BUY {} {} @ {:.5} (order {})",
            volume,
            self.config.symbol,
            price,
            order_id
        );
        self.events.status(format!(
            "Opened long {} {} @ {:.5}",
            volume, self.config.symbol, price
        ));
        Ok(Some(position))
    }

    async fn close_position(&mut self, price: f64) -> Result<ClosedTrade> {
        let order_id = self
            .ledger
            .position()
            .map(|p| p.id)
            .ok_or(TraderError::NoOpenPosition)?;

        self.broker.close_order(order_id, price).await?;
        let trade = self.ledger.close_at(price, self.clock.now())?;

        tracing::info!(
            "🔴 CLOSE order {} @ {:.5} | P/L {:.5} ({:+.2}%)",
            order_id,
            price,
            trade.profit_loss,
            trade.profit_loss_pct()
        );
        self.events.status(format!(
            "Closed position @ {:.5}, P/L {:.5}",
            price, trade.profit_loss
        ));
        Ok(trade)
    }

    /// Manual order: close whatever is open, then go long at the last close
    async fn place_single_order(&mut self) -> Result<()> {
        let price = self
            .store
            .latest()
            .map(|bar| bar.close)
            .ok_or(TraderError::InsufficientData {
                available: 0,
                required: 1,
            })?;

        if self.ledger.has_open_position() {
            let trade = self.close_position(price).await?;
            self.events.emit(EngineEvent::TradeInfo(TradeInfo {
                open_price: Some(trade.position.entry_price),
                current_value: Some(price),
                profit_loss_pct: Some(trade.profit_loss_pct()),
                predicted_price: None,
            }));
        }

        if let Some(position) = self.open_long(price).await? {
            self.events.emit(EngineEvent::TradeInfo(TradeInfo {
                open_price: Some(position.entry_price),
                current_value: Some(price),
                ..TradeInfo::default()
            }));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shutdown and reporting
    // ------------------------------------------------------------------

    async fn shutdown(&mut self) {
        if self.config.close_on_stop && self.ledger.has_open_position() {
            match self.store.latest().map(|bar| bar.close) {
                Some(price) => {
                    if let Err(err) = self.close_position(price).await {
                        self.fault("Error closing position on shutdown", &err);
                    }
                }
                None => tracing::warn!("No price available to close the open position"),
            }
        }

        self.flush_reports();
        self.broker.disconnect().await;

        tracing::info!(
            ticks = self.ticks,
            trades = self.ledger.trade_log().len(),
            total_pnl = self.ledger.total_pnl(),
            "👋 Trading stopped"
        );
        self.events.status("Disconnected");
    }

    fn flush_reports(&mut self) {
        let Some(exporter) = self.exporter.as_mut() else {
            return;
        };

        match exporter.export(self.ledger.trade_log(), self.ledger.equity_log()) {
            Ok(files) => {
                tracing::info!(
                    trades = %files.trades.display(),
                    equity = %files.equity.display(),
                    "💾 Reports saved"
                );
                self.events.status("Reports saved");
            }
            Err(err) => self.fault("Error saving reports", &err),
        }
    }

    // ------------------------------------------------------------------
    // Observer plumbing
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: EngineState) {
        let previous = self.state.send_replace(state);
        tracing::info!(from = %previous, to = %state, "Engine state changed");
        self.events.emit(EngineEvent::StateChanged(state));
    }

    /// Log `err` at the level its kind calls for and surface it as a status
    fn fault(&mut self, context: &str, err: &TraderError) {
        let text = format!("{}: {}", context, err);
        match err.kind() {
            ErrorKind::SkipTick => {
                tracing::debug!("Skipping tick, {}", err);
                self.events.status(format!("Waiting for data: {}", err));
                return;
            }
            ErrorKind::Recoverable => tracing::warn!("⚠️  {}", text),
            ErrorKind::Fatal => tracing::error!("❌ {}", text),
        }

        self.events.status(text.clone());
        self.last_fault = Some(text);
    }

    fn into_summary(self) -> EngineSummary {
        let state = *self.state.borrow();
        EngineSummary {
            state,
            ticks: self.ticks,
            training: self.training,
            trades: self.ledger.trade_log().to_vec(),
            equity: self.ledger.equity_log().to_vec(),
            total_pnl: self.ledger.total_pnl(),
            last_fault: self.last_fault,
        }
    }
}
