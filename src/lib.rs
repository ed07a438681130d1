// Core modules
pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod market;
pub mod models;
pub mod predictor;
pub mod report;

// Re-export commonly used types
pub use broker::{BrokerGateway, PaperBroker, PaperBrokerConfig};
pub use engine::{EngineEvent, EngineHandle, EngineState, TradingEngine};
pub use error::{ErrorKind, TraderError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, TraderError>;
