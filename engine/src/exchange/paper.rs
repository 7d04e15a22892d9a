//! Simulated venue that fills orders against a market feed

use crate::error::EngineError;
use crate::exchange::{
    split_symbol, BuyAndSellTradeInfo, ExchangeClient, MarketFeed, OcoLeg, Order, OrderSide,
    OrderStatus, OrderType,
};
use crate::data::Candle;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Balances below this are treated as zero
const DUST: f64 = 1e-9;

/// Paper trading exchange
///
/// Market orders fill immediately at the feed price. OCO orders are filled
/// lazily when their status is queried, by scanning the 1-minute candles
/// closed since placement; the stop leg wins when one candle touches both.
pub struct PaperExchange {
    feed: Arc<dyn MarketFeed>,
    orders: DashMap<String, Order>,
    balances: DashMap<String, f64>,
    next_id: AtomicU64,
}

impl PaperExchange {
    pub fn new(feed: Arc<dyn MarketFeed>) -> Self {
        Self {
            feed,
            orders: DashMap::new(),
            balances: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seed a starting balance
    pub fn with_balance(self, asset: &str, amount: f64) -> Self {
        self.balances.insert(asset.to_uppercase(), amount);
        self
    }

    pub fn feed(&self) -> Arc<dyn MarketFeed> {
        Arc::clone(&self.feed)
    }

    /// Every order ever placed, in placement order
    pub fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.iter().map(|entry| entry.value().clone()).collect();
        orders.sort_by_key(|order| order.id.parse::<u64>().unwrap_or(u64::MAX));
        orders
    }

    pub fn balances(&self) -> Vec<(String, f64)> {
        let mut balances: Vec<(String, f64)> = self
            .balances
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        balances.sort_by(|a, b| a.0.cmp(&b.0));
        balances
    }

    fn next_order_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn free(&self, asset: &str) -> f64 {
        self.balances.get(asset).map(|b| *b).unwrap_or(0.0)
    }

    fn credit(&self, asset: &str, amount: f64) {
        *self.balances.entry(asset.to_string()).or_insert(0.0) += amount;
    }

    fn debit(&self, asset: &str, amount: f64) -> Result<()> {
        let mut balance = self.balances.entry(asset.to_string()).or_insert(0.0);
        if *balance + DUST < amount {
            return Err(EngineError::InsufficientBalance {
                asset: asset.to_string(),
                needed: amount,
                available: *balance,
            });
        }
        *balance = (*balance - amount).max(0.0);
        Ok(())
    }

    fn order(&self, order_id: &str) -> Result<Order> {
        self.orders
            .get(order_id)
            .map(|order| order.clone())
            .ok_or_else(|| EngineError::Exchange(format!("unknown order {order_id}")))
    }

    /// First candle that triggers one of the OCO legs
    fn triggered_leg(order: &Order, candles: &[Candle]) -> Option<(OcoLeg, f64)> {
        let take_profit = order.price?;
        let stop = order.stop_price?;
        let stop_limit = order.stop_limit_price?;
        candles.iter().find_map(|candle| {
            if candle.low <= stop {
                Some((OcoLeg::StopLoss, stop_limit))
            } else if candle.high >= take_profit {
                Some((OcoLeg::TakeProfit, take_profit))
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn price(&self, symbol: &str, time: DateTime<Utc>) -> Result<f64> {
        self.feed.price(symbol, time).await
    }

    async fn klines(&self, symbol: &str, end: DateTime<Utc>, limit: usize) -> Result<Vec<Candle>> {
        self.feed.klines(symbol, end, limit).await
    }

    async fn balance(&self, asset: &str) -> Result<f64> {
        Ok(self.free(&asset.to_uppercase()))
    }

    async fn market_buy(&self, symbol: &str, quantity: f64, time: DateTime<Utc>) -> Result<Order> {
        let (base, quote) = split_symbol(symbol);
        let price = self.feed.price(symbol, time).await?;
        let cost = quantity * price;

        self.debit(&quote, cost)?;
        self.credit(&base, quantity);

        let mut order = Order::market(self.next_order_id(), symbol, OrderSide::Buy, quantity, time);
        order.fill(price, time);
        info!(symbol = %symbol, order_id = %order.id, quantity, price, "paper market buy filled");
        self.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn place_oco_sell(
        &self,
        symbol: &str,
        trade: &BuyAndSellTradeInfo,
        time: DateTime<Utc>,
    ) -> Result<Order> {
        let (base, _) = split_symbol(symbol);
        // the sold quantity stays locked until a leg fills or the order is cancelled
        self.debit(&base, trade.quantity)?;

        let order = Order::oco_sell(self.next_order_id(), symbol, trade, time);
        info!(
            symbol = %symbol,
            order_id = %order.id,
            take_profit = trade.sell_price,
            stop = trade.stop_price,
            "paper OCO sell placed"
        );
        self.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str, time: DateTime<Utc>) -> Result<Order> {
        let (base, _) = split_symbol(symbol);
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::Exchange(format!("unknown order {order_id}")))?;
        if !entry.is_active() {
            return Ok(entry.clone());
        }
        entry.status = OrderStatus::Cancelled;
        entry.updated_at = time;
        let order = entry.clone();
        drop(entry);

        if order.order_type == OrderType::Oco {
            self.credit(&base, order.quantity);
        }
        debug!(symbol = %symbol, order_id, "paper order cancelled");
        Ok(order)
    }

    async fn order_status(&self, symbol: &str, order_id: &str, time: DateTime<Utc>) -> Result<Order> {
        let order = self.order(order_id)?;
        if order.order_type != OrderType::Oco || !order.is_active() {
            return Ok(order);
        }

        let candles = self.feed.candles_between(symbol, order.created_at, time).await?;
        let Some((leg, price)) = Self::triggered_leg(&order, &candles) else {
            return Ok(order);
        };

        let (_, quote) = split_symbol(symbol);
        let filled = {
            let mut entry = self
                .orders
                .get_mut(order_id)
                .ok_or_else(|| EngineError::Exchange(format!("unknown order {order_id}")))?;
            // a concurrent query may have filled it already
            if !entry.is_active() {
                return Ok(entry.clone());
            }
            entry.fill(price, time);
            entry.filled_leg = Some(leg);
            entry.clone()
        };
        self.credit(&quote, filled.quantity * price);
        info!(symbol = %symbol, order_id, ?leg, price, "paper OCO sell filled");
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::exchange::ReplayFeed;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn exchange(bars: &[(f64, f64, f64, f64)]) -> PaperExchange {
        let candles = bars.iter().enumerate().map(|(i, (o, h, l, c))| {
            Candle::one_minute(t0() + Duration::minutes(i as i64), *o, *h, *l, *c).unwrap()
        });
        let feed = ReplayFeed::from_candles("BTCUSDT", candles).unwrap();
        PaperExchange::new(Arc::new(feed)).with_balance("USDT", 100.0)
    }

    #[tokio::test]
    async fn test_market_buy_moves_balances() {
        let exchange = exchange(&[(100.0, 100.0, 100.0, 100.0), (100.0, 100.0, 100.0, 100.0)]);
        let t = t0() + Duration::minutes(1);

        let order = exchange.market_buy("BTCUSDT", 0.2, t).await.unwrap();

        assert!(order.is_filled());
        assert_eq!(order.avg_fill_price, Some(100.0));
        assert!((exchange.balance("USDT").await.unwrap() - 80.0).abs() < 1e-9);
        assert!((exchange.balance("BTC").await.unwrap() - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_market_buy_rejects_overspend() {
        let exchange = exchange(&[(100.0, 100.0, 100.0, 100.0), (100.0, 100.0, 100.0, 100.0)]);
        let err = exchange
            .market_buy("BTCUSDT", 2.0, t0() + Duration::minutes(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert!(exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_oco_fills_take_profit_lazily() {
        let exchange = exchange(&[
            (100.0, 100.0, 100.0, 100.0),
            (100.0, 100.5, 99.5, 100.2),
            (100.2, 101.5, 100.1, 101.2),
            (101.2, 101.3, 101.0, 101.1),
        ]);
        let t = t0() + Duration::minutes(1);
        exchange.market_buy("BTCUSDT", 0.2, t).await.unwrap();
        let trade = BuyAndSellTradeInfo::from_fill(100.0, 0.2, &RiskConfig::default());
        let oco = exchange.place_oco_sell("BTCUSDT", &trade, t).await.unwrap();

        let pending = exchange
            .order_status("BTCUSDT", &oco.id, t0() + Duration::minutes(2))
            .await
            .unwrap();
        assert!(pending.is_active());

        let filled = exchange
            .order_status("BTCUSDT", &oco.id, t0() + Duration::minutes(3))
            .await
            .unwrap();
        assert_eq!(filled.filled_leg, Some(OcoLeg::TakeProfit));
        assert_eq!(filled.avg_fill_price, Some(101.0));
        assert!((exchange.balance("USDT").await.unwrap() - 100.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_oco_stop_wins_when_both_legs_touch() {
        let exchange = exchange(&[(100.0, 100.0, 100.0, 100.0), (100.0, 102.0, 98.0, 100.0)]);
        let t = t0() + Duration::minutes(1);
        exchange.market_buy("BTCUSDT", 0.2, t).await.unwrap();
        let trade = BuyAndSellTradeInfo::from_fill(100.0, 0.2, &RiskConfig::default());
        let oco = exchange.place_oco_sell("BTCUSDT", &trade, t).await.unwrap();

        let filled = exchange
            .order_status("BTCUSDT", &oco.id, t0() + Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(filled.filled_leg, Some(OcoLeg::StopLoss));
        assert_eq!(filled.avg_fill_price, Some(trade.stop_loss_limit_price));
    }

    #[tokio::test]
    async fn test_cancel_releases_locked_quantity() {
        let exchange = exchange(&[(100.0, 100.0, 100.0, 100.0), (100.0, 100.0, 100.0, 100.0)]);
        let t = t0() + Duration::minutes(1);
        exchange.market_buy("BTCUSDT", 0.2, t).await.unwrap();
        let trade = BuyAndSellTradeInfo::from_fill(100.0, 0.2, &RiskConfig::default());
        let oco = exchange.place_oco_sell("BTCUSDT", &trade, t).await.unwrap();
        assert!(exchange.balance("BTC").await.unwrap() < 1e-9);

        let cancelled = exchange.cancel_order("BTCUSDT", &oco.id, t).await.unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!((exchange.balance("BTC").await.unwrap() - 0.2).abs() < 1e-9);
    }
}
