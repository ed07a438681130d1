use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Initializing,
    Training,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Stopped | EngineState::Failed)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Initializing => "INITIALIZING",
            EngineState::Training => "TRAINING",
            EngineState::Running => "RUNNING",
            EngineState::Stopping => "STOPPING",
            EngineState::Stopped => "STOPPED",
            EngineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Per-tick price information shown to the observer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeInfo {
    pub open_price: Option<f64>,
    pub current_value: Option<f64>,
    pub profit_loss_pct: Option<f64>,
    pub predicted_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineEvent {
    Status(String),
    AccountInfo { balance: f64, equity: f64 },
    TradeInfo(TradeInfo),
    Loading(bool),
    StateChanged(EngineState),
}

/// Sending half of the observer channel
///
/// Sends never block and a dropped receiver is ignored.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn status(&self, text: impl Into<String>) {
        self.emit(EngineEvent::Status(text.into()));
    }
}
