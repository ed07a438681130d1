use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One OHLCV market sample for a fixed time period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: f64,
}

impl Bar {
    /// Feature row fed to the predictor: open, high, low, close, tick volume
    pub fn features(&self) -> [f64; 5] {
        [self.open, self.high, self.low, self.close, self.tick_volume]
    }
}

/// Bar period, named the way terminals name them
///
/// Parsing ignores case, both from the command line and from settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    /// Nominal length of one bar (a month is taken as 30 days)
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
            Timeframe::MN1 => Duration::days(30),
        }
    }

    /// Largest spacing between two bars still treated as contiguous
    ///
    /// Allows 50% tolerance for slight timing variations
    pub fn max_gap(&self) -> Duration {
        let secs = self.duration().num_seconds();
        Duration::seconds(secs + secs / 2)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        };
        f.write_str(name)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            "W1" => Ok(Timeframe::W1),
            "MN1" => Ok(Timeframe::MN1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Direction of a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "buy",
            Side::Short => "sell",
        }
    }
}

/// Broker ticket identifying an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker login
#[derive(Clone, Default)]
pub struct Credentials {
    pub login: String,
    pub password: String,
    pub server: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.login.is_empty() && !self.password.is_empty() && !self.server.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .field("server", &self.server)
            .finish()
    }
}

/// Established broker session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub server: String,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
}

/// Volume constraints for a tradable symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SymbolInfo {
    pub min_volume: f64,
    pub volume_step: f64,
}

impl SymbolInfo {
    /// Smallest volume the broker will accept for a fresh order
    pub fn order_volume(&self) -> f64 {
        self.min_volume.max(self.volume_step)
    }
}

/// Open position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: OrderId,
    pub side: Side,
    pub entry_price: f64,
    pub volume: f64,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeAction {
    Open,
    Close,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Open => "open",
            TradeAction::Close => "close",
        }
    }
}

/// Trade history row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: TradeAction,
    pub price: f64,
    pub volume: f64,
    pub profit_loss: Option<f64>,
}

/// Account balance and equity at one loop iteration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquitySnapshot {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    pub equity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_features() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            tick_volume: 120.0,
        };

        assert_eq!(bar.features(), [1.0, 2.0, 0.5, 1.5, 120.0]);
    }

    #[test]
    fn test_timeframe_parse_and_display() {
        assert_eq!("m15".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!("MN1".parse::<Timeframe>().unwrap(), Timeframe::MN1);
        assert!("M2".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::H4.to_string(), "H4");
    }

    #[test]
    fn test_timeframe_deserialize_ignores_case() {
        let parsed: Timeframe = serde_json::from_str("\"m5\"").unwrap();
        assert_eq!(parsed, Timeframe::M5);
        assert!(serde_json::from_str::<Timeframe>("\"m2\"").is_err());
        assert_eq!(serde_json::to_string(&Timeframe::H1).unwrap(), "\"H1\"");
    }

    #[test]
    fn test_timeframe_max_gap() {
        assert_eq!(Timeframe::M1.max_gap(), Duration::seconds(90));
        assert_eq!(Timeframe::H1.max_gap(), Duration::seconds(5400));
    }

    #[test]
    fn test_order_volume() {
        let info = SymbolInfo {
            min_volume: 0.01,
            volume_step: 0.1,
        };
        assert_eq!(info.order_volume(), 0.1);
    }

    #[test]
    fn test_credentials_redacted() {
        let creds = Credentials {
            login: "5025".to_string(),
            password: "secret".to_string(),
            server: "Demo".to_string(),
        };

        assert!(creds.is_complete());
        assert!(!format!("{:?}", creds).contains("secret"));
        assert!(!Credentials::default().is_complete());
    }
}
