use super::events::EngineState;
use super::EngineSummary;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

/// Requests queued for the worker, drained at tick boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineCommand {
    PlaceSingleOrder,
}

/// Cloneable stop trigger detached from the handle
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Control surface of a running engine
///
/// Dropping every handle and stop signal stops the worker at the next tick
/// boundary.
#[derive(Debug)]
pub struct EngineHandle {
    stop: StopSignal,
    commands: mpsc::UnboundedSender<EngineCommand>,
    state: watch::Receiver<EngineState>,
    worker: JoinHandle<EngineSummary>,
}

impl EngineHandle {
    pub(crate) fn new(
        stop_tx: watch::Sender<bool>,
        commands: mpsc::UnboundedSender<EngineCommand>,
        state: watch::Receiver<EngineState>,
        worker: JoinHandle<EngineSummary>,
    ) -> Self {
        Self {
            stop: StopSignal {
                tx: Arc::new(stop_tx),
            },
            commands,
            state,
            worker,
        }
    }

    /// Ask the worker to stop once the in-flight tick completes
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Queue a long order for the next tick boundary
    ///
    /// Returns false when the worker has already exited.
    pub fn place_single_order(&self) -> bool {
        self.commands.send(EngineCommand::PlaceSingleOrder).is_ok()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker to exit
    pub async fn join(self) -> Result<EngineSummary, JoinError> {
        self.worker.await
    }
}
