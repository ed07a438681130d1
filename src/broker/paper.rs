use super::BrokerGateway;
use crate::error::TraderError;
use crate::models::{AccountInfo, Bar, Credentials, OrderId, Session, Side, SymbolInfo, Timeframe};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperBrokerConfig {
    pub initial_balance: f64,
    pub start_price: f64,
    /// Maximum relative close-to-close move per bar
    pub volatility: f64,
    pub min_volume: f64,
    pub volume_step: f64,
    pub seed: u64,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            start_price: 1.1000,
            volatility: 0.001,
            min_volume: 0.01,
            volume_step: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    side: Side,
    volume: f64,
    entry_price: f64,
}

/// Simulated broker terminal
///
/// Generates a seeded random walk of OHLCV bars. The first `fetch_bars`
/// call back-fills the requested history ending at the current period; every
/// later call advances the market by one bar. Only as many bars as the
/// largest request are kept. Orders fill at the requested price and realise
/// P/L into the balance when closed.
pub struct PaperBroker {
    config: PaperBrokerConfig,
    rng: StdRng,
    session: Option<Session>,
    series: VecDeque<Bar>,
    retain: usize,
    balance: f64,
    orders: HashMap<OrderId, PaperOrder>,
    next_ticket: u64,
}

impl PaperBroker {
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            balance: config.initial_balance,
            config,
            session: None,
            series: VecDeque::new(),
            retain: 0,
            orders: HashMap::new(),
            next_ticket: 1,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn open_orders(&self) -> usize {
        self.orders.len()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.session.is_none() {
            return Err(TraderError::Query("not connected".to_string()));
        }
        Ok(())
    }

    fn last_price(&self) -> f64 {
        self.series
            .back()
            .map(|b| b.close)
            .unwrap_or(self.config.start_price)
    }

    fn unrealized(&self) -> f64 {
        let price = self.last_price();
        self.orders
            .values()
            .map(|o| match o.side {
                Side::Long => (price - o.entry_price) * o.volume,
                Side::Short => (o.entry_price - price) * o.volume,
            })
            .sum()
    }

    /// Bar stamped `timestamp` that opens at `previous_close`
    fn next_bar(&mut self, previous_close: f64, timestamp: DateTime<Utc>) -> Bar {
        let vol = self.config.volatility.max(1e-9);
        let close = (previous_close * (1.0 + self.rng.gen_range(-vol..vol))).max(f64::EPSILON);

        // Intrabar range around open and close
        let open = previous_close;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..vol / 2.0));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..vol / 2.0));
        let tick_volume = self.rng.gen_range(50.0..500.0_f64).round();

        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            tick_volume,
        }
    }

    fn backfill(&mut self, timeframe: Timeframe, count: usize) {
        let step = timeframe.duration();
        let step_secs = step.num_seconds().max(1);
        let now = Utc::now().timestamp();
        let aligned = now - now.rem_euclid(step_secs);
        let end = Utc.timestamp_opt(aligned, 0).single().unwrap_or_else(Utc::now);
        let start = end - step * (count.saturating_sub(1) as i32);

        let mut price = self.config.start_price;
        for i in 0..count {
            let bar = self.next_bar(price, start + step * i as i32);
            price = bar.close;
            self.series.push_back(bar);
        }
    }

    fn advance(&mut self, timeframe: Timeframe) {
        if let Some(last) = self.series.back() {
            let (close, timestamp) = (last.close, last.timestamp + timeframe.duration());
            let bar = self.next_bar(close, timestamp);
            self.series.push_back(bar);
        }
        while self.series.len() > self.retain {
            self.series.pop_front();
        }
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn connect(&mut self, credentials: &Credentials) -> Result<Session> {
        if !credentials.is_complete() {
            return Err(TraderError::Auth("login credentials are missing".to_string()));
        }

        let session = Session {
            id: Uuid::new_v4(),
            server: credentials.server.clone(),
            opened_at: Utc::now(),
        };
        self.session = Some(session.clone());

        tracing::info!(server = %session.server, session = %session.id, "Paper broker connected");
        Ok(session)
    }

    async fn fetch_bars(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>> {
        if self.session.is_none() {
            return Err(TraderError::Fetch("not connected".to_string()));
        }
        if count == 0 {
            return Err(TraderError::Fetch(format!("no bars requested for {}", symbol)));
        }

        self.retain = self.retain.max(count);
        if self.series.is_empty() {
            self.backfill(timeframe, count);
        } else {
            self.advance(timeframe);
        }

        let start = self.series.len().saturating_sub(count);
        Ok(self.series.iter().skip(start).cloned().collect())
    }

    async fn account_info(&mut self) -> Result<AccountInfo> {
        self.ensure_connected()?;
        Ok(AccountInfo {
            balance: self.balance,
            equity: self.balance + self.unrealized(),
        })
    }

    async fn symbol_info(&mut self, _symbol: &str) -> Result<SymbolInfo> {
        self.ensure_connected()?;
        Ok(SymbolInfo {
            min_volume: self.config.min_volume,
            volume_step: self.config.volume_step,
        })
    }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: Side,
        volume: f64,
        price: f64,
    ) -> Result<OrderId> {
        if self.session.is_none() {
            return Err(TraderError::Order("not connected".to_string()));
        }
        if volume < self.config.min_volume {
            return Err(TraderError::Order(format!(
                "volume {} below minimum {}",
                volume, self.config.min_volume
            )));
        }

        let id = OrderId(self.next_ticket);
        self.next_ticket += 1;
        self.orders.insert(
            id,
            PaperOrder {
                side,
                volume,
                entry_price: price,
            },
        );

        tracing::debug!(
            %symbol,
            order = %id,
            side = side.as_str(),
            volume,
            price,
            "Paper order filled"
        );
        Ok(id)
    }

    async fn close_order(&mut self, order_id: OrderId, price: f64) -> Result<()> {
        if self.session.is_none() {
            return Err(TraderError::Order("not connected".to_string()));
        }

        let order = self
            .orders
            .remove(&order_id)
            .ok_or_else(|| TraderError::Order(format!("unknown order {}", order_id)))?;

        let pnl = match order.side {
            Side::Long => (price - order.entry_price) * order.volume,
            Side::Short => (order.entry_price - price) * order.volume,
        };
        self.balance += pnl;

        tracing::debug!(order = %order_id, price, pnl, "Paper order closed");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(session = %session.id, "Paper broker disconnected");
        }
    }
}
