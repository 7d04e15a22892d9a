//! Backtest report generation

use crate::bot::{BotResult, BotResultDetails};

/// Backtest report
#[derive(Debug, Clone)]
pub struct BacktestReport {
    results: Vec<BotResultDetails>,
    starting_balance: f64,
    ending_balance: f64,
    quote_precision: u32,
}

impl BacktestReport {
    pub fn new(
        results: Vec<BotResultDetails>,
        starting_balance: f64,
        ending_balance: f64,
        quote_precision: u32,
    ) -> Self {
        Self {
            results,
            starting_balance,
            ending_balance,
            quote_precision,
        }
    }

    pub fn results(&self) -> &[BotResultDetails] {
        &self.results
    }

    pub fn count(&self, result: BotResult) -> usize {
        self.results.iter().filter(|d| d.result == result).count()
    }

    /// Strategy runs that ended in a trade
    pub fn trades(&self) -> usize {
        self.results.iter().filter(|d| d.trade.is_some()).count()
    }

    /// Wins as a percentage of trades
    pub fn win_rate(&self) -> f64 {
        let trades = self.trades();
        if trades == 0 {
            return 0.0;
        }
        self.count(BotResult::Win) as f64 / trades as f64 * 100.0
    }

    /// Realised quote PnL summed over all trades
    pub fn total_profit(&self) -> f64 {
        self.results
            .iter()
            .map(|d| d.profit(self.quote_precision))
            .sum()
    }

    /// Gross profit over gross loss; zero without losses
    pub fn profit_factor(&self) -> f64 {
        let (gains, losses) = self
            .results
            .iter()
            .map(|d| d.profit(self.quote_precision))
            .fold((0.0, 0.0), |(g, l), p| if p > 0.0 { (g + p, l) } else { (g, l - p) });
        if losses == 0.0 {
            return 0.0;
        }
        gains / losses
    }

    pub fn ending_balance(&self) -> f64 {
        self.ending_balance
    }

    /// Format report as string
    pub fn format(&self) -> String {
        let mut report = format!(
            r#"
Backtest Results
================
Starting Balance: ${:.2}
Ending Balance: ${:.2}
Realised PnL: ${:.2}
Strategy Runs: {}
Trades: {}
Wins: {}
Losses: {}
Even: {}
Faulted: {}
Win Rate: {:.2}%
Profit Factor: {:.2}
"#,
            self.starting_balance,
            self.ending_balance,
            self.total_profit(),
            self.results.len(),
            self.trades(),
            self.count(BotResult::Win),
            self.count(BotResult::Loss),
            self.count(BotResult::Even),
            self.count(BotResult::Faulted),
            self.win_rate(),
            self.profit_factor(),
        );
        for details in &self.results {
            report.push_str(&format!("  {details}\n"));
        }
        report
    }
}
