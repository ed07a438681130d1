// Position bookkeeping and trade decisions
pub mod decision;
pub mod ledger;

pub use decision::{Decision, DecisionEngine, ExecutionDecision};
pub use ledger::{ClosedTrade, PositionLedger};
