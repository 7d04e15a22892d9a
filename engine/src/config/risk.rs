//! Trade sizing and exit configuration

use crate::error::EngineError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Trade sizing and exit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Quote currency spent per entry (e.g., 20 USDT)
    pub quote_order_amount: f64,
    /// Take-profit distance above the buy price (e.g., 0.01 = 1%)
    pub take_profit: f64,
    /// Stop-loss distance below the buy price (e.g., 0.01 = 1%)
    pub stop_loss: f64,
    /// Stop-limit price offset below the stop price
    pub stop_limit_slippage: f64,
    /// Decimal places for order prices
    pub price_precision: u32,
    /// Decimal places for base quantities
    pub quantity_precision: u32,
    /// Decimal places for quote amounts
    pub quote_precision: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            quote_order_amount: 20.0,
            take_profit: 0.01,
            stop_loss: 0.01,
            stop_limit_slippage: 0.001,
            price_precision: 4,
            quantity_precision: 5,
            quote_precision: 2,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.quote_order_amount <= 0.0 {
            return Err(EngineError::Config("quote_order_amount must be positive".into()));
        }
        if self.take_profit <= 0.0 {
            return Err(EngineError::Config("take_profit must be positive".into()));
        }
        if self.stop_loss <= 0.0 || self.stop_loss >= 1.0 {
            return Err(EngineError::Config("stop_loss must be within (0, 1)".into()));
        }
        if self.stop_limit_slippage < 0.0 || self.stop_loss + self.stop_limit_slippage >= 1.0 {
            return Err(EngineError::Config("stop_limit_slippage out of range".into()));
        }
        Ok(())
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Round toward zero to `decimals` places
pub fn floor_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).trunc() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(0.123456789, 5), 0.12346);
        assert_eq!(round_to(99.5, 0), 100.0);
        assert_eq!(floor_to(0.123456789, 5), 0.12345);
    }

    #[test]
    fn test_validation() {
        RiskConfig::default().validate().unwrap();
        let bad = RiskConfig {
            stop_loss: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
