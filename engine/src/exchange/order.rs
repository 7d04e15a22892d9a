//! Order management

use crate::config::{round_to, RiskConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Market order
    Market,
    /// Take-profit limit paired with a stop-limit; one cancels the other
    Oco,
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted, not yet filled
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// Which leg of an OCO order executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcoLeg {
    TakeProfit,
    StopLoss,
}

/// Order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub id: String,
    /// Symbol
    pub symbol: String,
    /// Order type
    pub order_type: OrderType,
    /// Order side
    pub side: OrderSide,
    /// Base quantity
    pub quantity: f64,
    /// Limit price (take-profit leg for OCO)
    pub price: Option<f64>,
    /// Stop trigger price (OCO only)
    pub stop_price: Option<f64>,
    /// Stop-limit price (OCO only)
    pub stop_limit_price: Option<f64>,
    /// Filled quantity
    pub filled_quantity: f64,
    /// Average fill price
    pub avg_fill_price: Option<f64>,
    /// Executed OCO leg
    pub filled_leg: Option<OcoLeg>,
    /// Status
    pub status: OrderStatus,
    /// Created time (logical)
    pub created_at: DateTime<Utc>,
    /// Updated time (logical)
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create new market order
    pub fn market(id: String, symbol: &str, side: OrderSide, quantity: f64, time: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            order_type: OrderType::Market,
            side,
            quantity,
            price: None,
            stop_price: None,
            stop_limit_price: None,
            filled_quantity: 0.0,
            avg_fill_price: None,
            filled_leg: None,
            status: OrderStatus::New,
            created_at: time,
            updated_at: time,
        }
    }

    /// Create new OCO sell order from a trade plan
    pub fn oco_sell(id: String, symbol: &str, trade: &BuyAndSellTradeInfo, time: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            order_type: OrderType::Oco,
            side: OrderSide::Sell,
            quantity: trade.quantity,
            price: Some(trade.sell_price),
            stop_price: Some(trade.stop_price),
            stop_limit_price: Some(trade.stop_loss_limit_price),
            filled_quantity: 0.0,
            avg_fill_price: None,
            filled_leg: None,
            status: OrderStatus::New,
            created_at: time,
            updated_at: time,
        }
    }

    /// Mark the whole quantity filled at `price`
    pub fn fill(&mut self, price: f64, time: DateTime<Utc>) {
        self.filled_quantity = self.quantity;
        self.avg_fill_price = Some(price);
        self.status = OrderStatus::Filled;
        self.updated_at = time;
    }

    /// Check if order is filled
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Check if order is active (new or partially filled)
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// Prices and quantity of one committed trade, fixed once the buy fills
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyAndSellTradeInfo {
    pub buy_price: f64,
    /// Take-profit limit price
    pub sell_price: f64,
    pub stop_price: f64,
    pub stop_loss_limit_price: f64,
    pub quantity: f64,
}

impl BuyAndSellTradeInfo {
    /// Derive exit prices from the filled buy
    pub fn from_fill(buy_price: f64, quantity: f64, risk: &RiskConfig) -> Self {
        let stop_price = buy_price * (1.0 - risk.stop_loss);
        Self {
            buy_price,
            sell_price: round_to(buy_price * (1.0 + risk.take_profit), risk.price_precision),
            stop_price: round_to(stop_price, risk.price_precision),
            stop_loss_limit_price: round_to(
                buy_price * (1.0 - risk.stop_loss - risk.stop_limit_slippage),
                risk.price_precision,
            ),
            quantity,
        }
    }

    pub fn quote_order_quantity_on_win(&self, quote_precision: u32) -> f64 {
        round_to(self.quantity * self.sell_price, quote_precision)
    }

    pub fn quote_order_quantity_on_loss(&self, quote_precision: u32) -> f64 {
        round_to(self.quantity * self.stop_loss_limit_price, quote_precision)
    }

    /// Quote spent on the buy
    pub fn quote_spent(&self, quote_precision: u32) -> f64 {
        round_to(self.quantity * self.buy_price, quote_precision)
    }
}
