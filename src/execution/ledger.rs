use chrono::{DateTime, Utc};

use crate::error::TraderError;
use crate::models::{EquitySnapshot, OrderId, Position, Side, TradeAction, TradeLogEntry};
use crate::Result;

/// Result of closing the position
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: f64,
    pub profit_loss: f64,
}

impl ClosedTrade {
    /// Profit/loss relative to the entry price, in percent
    pub fn profit_loss_pct(&self) -> f64 {
        if self.position.entry_price == 0.0 {
            return 0.0;
        }
        self.profit_loss / self.position.entry_price * 100.0
    }
}

/// Tracks the single open position, trade history and equity history
///
/// Owned by the trading worker; all mutations happen sequentially.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    symbol: String,
    tax_rate: f64,
    position: Option<Position>,
    trade_log: Vec<TradeLogEntry>,
    equity_log: Vec<EquitySnapshot>,
    total_pnl: f64, // Track total P&L across all trades
}

impl PositionLedger {
    pub fn new(symbol: impl Into<String>, tax_rate: f64) -> Self {
        Self {
            symbol: symbol.into(),
            tax_rate,
            position: None,
            trade_log: Vec::new(),
            equity_log: Vec::new(),
            total_pnl: 0.0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn has_open_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn trade_log(&self) -> &[TradeLogEntry] {
        &self.trade_log
    }

    pub fn equity_log(&self) -> &[EquitySnapshot] {
        &self.equity_log
    }

    /// Get total realized P&L
    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }

    /// Record a new position filled by the broker under `order_id`
    pub fn open(
        &mut self,
        order_id: OrderId,
        side: Side,
        price: f64,
        volume: f64,
    ) -> Result<&Position> {
        self.open_at(order_id, side, price, volume, Utc::now())
    }

    /// Record a new position with explicit timestamp
    pub fn open_at(
        &mut self,
        order_id: OrderId,
        side: Side,
        price: f64,
        volume: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<&Position> {
        if let Some(existing) = &self.position {
            return Err(TraderError::PositionAlreadyOpen(existing.id.0));
        }

        self.trade_log.push(TradeLogEntry {
            timestamp,
            symbol: self.symbol.clone(),
            action: TradeAction::Open,
            price,
            volume,
            profit_loss: None,
        });

        tracing::info!(
            order = %order_id,
            side = side.as_str(),
            price,
            volume,
            "Position opened"
        );

        Ok(self.position.insert(Position {
            id: order_id,
            side,
            entry_price: price,
            volume,
            opened_at: timestamp,
        }))
    }

    /// Profit/loss of the open position if it were closed at `price`
    ///
    /// (exit − entry) × (1 − tax_rate), sign inverted for shorts.
    pub fn calculate_pnl(&self, price: f64) -> Result<f64> {
        let position = self.position.as_ref().ok_or(TraderError::NoOpenPosition)?;
        Ok(self.pnl_for(position, price))
    }

    fn pnl_for(&self, position: &Position, exit_price: f64) -> f64 {
        let gross = match position.side {
            Side::Long => exit_price - position.entry_price,
            Side::Short => position.entry_price - exit_price,
        };
        gross * (1.0 - self.tax_rate)
    }

    /// Close the position
    pub fn close(&mut self, exit_price: f64) -> Result<ClosedTrade> {
        self.close_at(exit_price, Utc::now())
    }

    /// Close the position with explicit timestamp
    pub fn close_at(&mut self, exit_price: f64, timestamp: DateTime<Utc>) -> Result<ClosedTrade> {
        let position = self.position.take().ok_or(TraderError::NoOpenPosition)?;
        let profit_loss = self.pnl_for(&position, exit_price);

        self.trade_log.push(TradeLogEntry {
            timestamp,
            symbol: self.symbol.clone(),
            action: TradeAction::Close,
            price: exit_price,
            volume: position.volume,
            profit_loss: Some(profit_loss),
        });
        self.total_pnl += profit_loss;

        tracing::info!(
            order = %position.id,
            exit_price,
            profit_loss,
            "Position closed"
        );

        Ok(ClosedTrade {
            position,
            exit_price,
            profit_loss,
        })
    }

    pub fn record_equity(&mut self, balance: f64, equity: f64) {
        self.record_equity_at(balance, equity, Utc::now());
    }

    pub fn record_equity_at(&mut self, balance: f64, equity: f64, timestamp: DateTime<Utc>) {
        self.equity_log.push(EquitySnapshot {
            timestamp,
            balance,
            equity,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> PositionLedger {
        PositionLedger::new("EURUSD", 0.20)
    }

    #[test]
    fn test_open_position() {
        let mut ledger = ledger();
        let position = ledger.open(OrderId(1), Side::Long, 100.0, 0.1).unwrap().clone();

        assert!(ledger.has_open_position());
        assert_eq!(position.id, OrderId(1));
        assert_eq!(position.entry_price, 100.0);
        assert_eq!(position.volume, 0.1);

        assert_eq!(ledger.trade_log().len(), 1);
        let entry = &ledger.trade_log()[0];
        assert_eq!(entry.action, TradeAction::Open);
        assert_eq!(entry.symbol, "EURUSD");
        assert_eq!(entry.profit_loss, None);
    }

    #[test]
    fn test_prevent_second_position() {
        let mut ledger = ledger();
        ledger.open(OrderId(1), Side::Long, 100.0, 0.1).unwrap();

        let result = ledger.open(OrderId(2), Side::Short, 105.0, 0.1);
        assert!(matches!(result, Err(TraderError::PositionAlreadyOpen(1))));
        assert_eq!(ledger.trade_log().len(), 1);
        assert_eq!(ledger.position().unwrap().id, OrderId(1));
    }

    #[test]
    fn test_close_without_position() {
        let mut ledger = ledger();

        let result = ledger.close(100.0);
        assert!(matches!(result, Err(TraderError::NoOpenPosition)));
        assert!(ledger.trade_log().is_empty());
    }

    #[test]
    fn test_close_long_applies_tax() {
        let mut ledger = ledger();
        ledger.open(OrderId(1), Side::Long, 100.0, 1.0).unwrap();

        let closed = ledger.close(110.0).unwrap();

        assert!((closed.profit_loss - 8.0).abs() < 1e-9); // 10 * (1 - 0.2)
        assert!((closed.profit_loss_pct() - 8.0).abs() < 1e-9);
        assert!(!ledger.has_open_position());

        let entry = ledger.trade_log().last().unwrap();
        assert_eq!(entry.action, TradeAction::Close);
        assert_eq!(entry.price, 110.0);
        assert_eq!(entry.volume, 1.0);
        assert_eq!(entry.profit_loss, Some(closed.profit_loss));
        assert_eq!(ledger.total_pnl(), closed.profit_loss);
    }

    #[test]
    fn test_close_short_inverts_sign() {
        let mut ledger = ledger();
        ledger.open(OrderId(3), Side::Short, 100.0, 1.0).unwrap();

        let closed = ledger.close(90.0).unwrap();
        assert!((closed.profit_loss - 8.0).abs() < 1e-9);

        ledger.open(OrderId(4), Side::Short, 100.0, 1.0).unwrap();
        let closed = ledger.close(110.0).unwrap();
        assert!((closed.profit_loss + 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_break_even_for_any_tax_rate() {
        for tax_rate in [0.0, 0.1, 0.2, 0.5, 0.99] {
            for side in [Side::Long, Side::Short] {
                let mut ledger = PositionLedger::new("EURUSD", tax_rate);
                ledger.open(OrderId(1), side, 1.2345, 0.01).unwrap();

                let closed = ledger.close(1.2345).unwrap();
                assert_eq!(closed.profit_loss, 0.0);
            }
        }
    }

    #[test]
    fn test_calculate_pnl() {
        let mut ledger = ledger();
        assert!(ledger.calculate_pnl(100.0).is_err());

        ledger.open(OrderId(1), Side::Long, 100.0, 2.0).unwrap();
        assert!((ledger.calculate_pnl(95.0).unwrap() + 4.0).abs() < 1e-9);
        // Still open afterwards
        assert!(ledger.has_open_position());
    }

    #[test]
    fn test_record_equity() {
        let mut ledger = ledger();

        ledger.record_equity(10_000.0, 10_000.0);
        ledger.record_equity(10_000.0, 10_012.5);

        assert_eq!(ledger.equity_log().len(), 2);
        assert_eq!(ledger.equity_log()[1].equity, 10_012.5);
    }

    #[test]
    fn test_reopen_after_close() {
        let mut ledger = ledger();

        ledger.open(OrderId(1), Side::Long, 100.0, 1.0).unwrap();
        ledger.close(101.0).unwrap();
        ledger.open(OrderId(2), Side::Long, 101.0, 1.0).unwrap();

        assert_eq!(ledger.position().unwrap().id, OrderId(2));
        assert_eq!(ledger.trade_log().len(), 3);
    }
}
