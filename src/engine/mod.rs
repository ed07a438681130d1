// Trading loop: a single background worker driven through an EngineHandle
pub mod clock;
pub mod events;
pub mod handle;
mod worker;

pub use clock::{Clock, ManualClock, TokioClock};
pub use events::{EngineEvent, EngineState, TradeInfo};
pub use handle::{EngineHandle, StopSignal};

use crate::broker::BrokerGateway;
use crate::models::{Credentials, EquitySnapshot, TradeLogEntry, Timeframe};
use crate::predictor::{PredictorConfig, TrainingReport};
use crate::report::ReportExporter;
use events::EventSink;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use worker::TradingContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Fixed delay between tick starts
    pub tick_interval_ms: u64,
    /// Bars fetched once for training
    pub history_bars: usize,
    pub store_capacity: usize,
    /// Bars per feature window
    pub window: usize,
    /// Flush reports every N ticks, 0 disables periodic flushes
    pub report_every_ticks: u64,
    pub report_dir: PathBuf,
    /// Close an open position through the broker when stopping
    pub close_on_stop: bool,
    /// Stop on its own after this many ticks
    pub max_ticks: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M1,
            tick_interval_ms: 1_000,
            history_bars: 1_000,
            store_capacity: 1_000,
            window: 20,
            report_every_ticks: 60,
            report_dir: PathBuf::from("reports"),
            close_on_stop: true,
            max_ticks: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Money management knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Share of profit/loss withheld on close
    pub tax_rate: f64,
    /// Balance below which no new position is opened
    pub min_balance: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.20,
            min_balance: 40.0,
        }
    }
}

/// What the worker leaves behind when it exits
#[derive(Debug, Clone)]
pub struct EngineSummary {
    pub state: EngineState,
    pub ticks: u64,
    pub training: Option<TrainingReport>,
    pub trades: Vec<TradeLogEntry>,
    pub equity: Vec<EquitySnapshot>,
    pub total_pnl: f64,
    /// Most recent fault reported to the observer
    pub last_fault: Option<String>,
}

/// Builder for the trading worker
///
/// ```ignore
/// let broker = PaperBroker::new(PaperBrokerConfig::default());
/// let (handle, mut events) = TradingEngine::new(config, Box::new(broker), credentials)
///     .with_exporter(CsvReportExporter::new("reports"))
///     .spawn();
/// ```
pub struct TradingEngine {
    config: EngineConfig,
    trading: TradingConfig,
    predictor: PredictorConfig,
    credentials: Credentials,
    broker: Box<dyn BrokerGateway>,
    clock: Arc<dyn Clock>,
    exporter: Option<Box<dyn ReportExporter>>,
}

impl TradingEngine {
    pub fn new(
        config: EngineConfig,
        broker: Box<dyn BrokerGateway>,
        credentials: Credentials,
    ) -> Self {
        Self {
            config,
            trading: TradingConfig::default(),
            predictor: PredictorConfig::default(),
            credentials,
            broker,
            clock: Arc::new(TokioClock),
            exporter: None,
        }
    }

    pub fn with_trading(mut self, trading: TradingConfig) -> Self {
        self.trading = trading;
        self
    }

    pub fn with_predictor(mut self, predictor: PredictorConfig) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_exporter(mut self, exporter: impl ReportExporter + 'static) -> Self {
        self.exporter = Some(Box::new(exporter));
        self
    }

    /// Start the worker on the tokio runtime
    ///
    /// Returns the control handle and the observer's event stream.
    pub fn spawn(self) -> (EngineHandle, mpsc::UnboundedReceiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(EngineState::Initializing);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let context = TradingContext::new(
            self,
            EventSink::new(event_tx),
            state_tx,
            stop_rx,
            command_rx,
        );
        let worker = tokio::spawn(context.run());

        (
            EngineHandle::new(stop_tx, command_tx, state_rx, worker),
            event_rx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.window, 20);
        assert_eq!(config.store_capacity, 1_000);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(config.close_on_stop);
        assert!(config.max_ticks.is_none());
    }

    #[test]
    fn test_trading_config_defaults() {
        let trading = TradingConfig::default();

        assert_eq!(trading.tax_rate, 0.20);
        assert_eq!(trading.min_balance, 40.0);
    }
}
