// Layered settings: compiled defaults, optional TOML file, AUTOTRADER__* environment
use crate::broker::PaperBrokerConfig;
use crate::engine::{EngineConfig, TradingConfig};
use crate::error::TraderError;
use crate::models::Credentials;
use crate::predictor::PredictorConfig;
use crate::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file looked up in the working directory (extension optional)
pub const DEFAULT_CONFIG_FILE: &str = "autotrader";

const ENV_PREFIX: &str = "AUTOTRADER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub model: PredictorConfig,
    pub trading: TradingConfig,
    pub paper: PaperBrokerConfig,
}

impl Settings {
    /// Load settings, later sources overriding earlier ones
    ///
    /// With `path` the file must exist; without it `autotrader.toml` is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.symbol.trim().is_empty() {
            return Err(invalid("engine.symbol must not be empty"));
        }
        if engine.window == 0 {
            return Err(invalid("engine.window must be at least 1"));
        }
        if engine.store_capacity <= engine.window {
            return Err(invalid(format!(
                "engine.store_capacity ({}) must exceed engine.window ({})",
                engine.store_capacity, engine.window
            )));
        }
        if engine.history_bars <= engine.window {
            return Err(invalid(format!(
                "engine.history_bars ({}) must exceed engine.window ({})",
                engine.history_bars, engine.window
            )));
        }
        if engine.tick_interval_ms == 0 {
            return Err(invalid("engine.tick_interval_ms must be positive"));
        }

        if !(0.0..1.0).contains(&self.trading.tax_rate) {
            return Err(invalid(format!(
                "trading.tax_rate must be in [0, 1), got {}",
                self.trading.tax_rate
            )));
        }
        if self.trading.min_balance < 0.0 {
            return Err(invalid("trading.min_balance must not be negative"));
        }

        let model = &self.model;
        if model.min_training_windows == 0 {
            return Err(invalid("model.min_training_windows must be at least 1"));
        }
        if !(0.0..1.0).contains(&model.validation_fraction) {
            return Err(invalid(format!(
                "model.validation_fraction must be in [0, 1), got {}",
                model.validation_fraction
            )));
        }
        if model.ridge_lambda < 0.0 {
            return Err(invalid("model.ridge_lambda must not be negative"));
        }

        if self.paper.start_price <= 0.0 {
            return Err(invalid("paper.start_price must be positive"));
        }
        if self.paper.volatility < 0.0 {
            return Err(invalid("paper.volatility must not be negative"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> TraderError {
    TraderError::Config(message.into())
}

/// Broker credentials from `AUTOTRADER_LOGIN`, `AUTOTRADER_PASSWORD`, `AUTOTRADER_SERVER`
pub fn credentials_from_env() -> Credentials {
    credentials_from(|key| std::env::var(key).ok())
}

fn credentials_from(lookup: impl Fn(&str) -> Option<String>) -> Credentials {
    let read = |suffix: &str| {
        lookup(&format!("{}_{}", ENV_PREFIX, suffix))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    Credentials {
        login: read("LOGIN"),
        password: read("PASSWORD"),
        server: read("SERVER"),
    }
}
