// Broker connectivity
pub mod paper;

pub use paper::{PaperBroker, PaperBrokerConfig};

use crate::models::{AccountInfo, Bar, Credentials, OrderId, Session, Side, SymbolInfo, Timeframe};
use crate::Result;
use async_trait::async_trait;

/// Order execution and market data provided by a broker terminal
///
/// Implementations report failures with the matching `TraderError` variant:
/// `Auth` from `connect`, `Fetch` from `fetch_bars`, `Query` from account and
/// symbol lookups, `Order` from order placement and closure.
#[async_trait]
pub trait BrokerGateway: Send {
    async fn connect(&mut self, credentials: &Credentials) -> Result<Session>;

    /// Most recent `count` bars, oldest first. The last bar may still be forming.
    async fn fetch_bars(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>>;

    async fn account_info(&mut self) -> Result<AccountInfo>;

    async fn symbol_info(&mut self, symbol: &str) -> Result<SymbolInfo>;

    async fn place_order(
        &mut self,
        symbol: &str,
        side: Side,
        volume: f64,
        price: f64,
    ) -> Result<OrderId>;

    async fn close_order(&mut self, order_id: OrderId, price: f64) -> Result<()>;

    /// Release the session. Safe to call when not connected.
    async fn disconnect(&mut self);
}
