//! One method per strategy phase
//!
//! The executor is shared by every generation of a symbol's bot tree and
//! keeps no per-call state. Each phase takes the symbol, the caller's
//! logical time, its cancellation scope and its phase log, and returns the
//! new time with the phase outcome. Retry policy belongs to the caller.

use crate::bot::BotResult;
use crate::cancel::CancelScope;
use crate::clock::Clock;
use crate::config::{floor_to, ExitWatch, RiskConfig, StrategyConfig};
use crate::error::EngineError;
use crate::exchange::{retry_read, BuyAndSellTradeInfo, Order};
use crate::notify::Notifier;
use crate::phase::{Phase, PhaseLog};
use crate::polling::{PollingEngine, PollingOutcome, PollingResponse};
use crate::provider::DataProvider;
use crate::strategy::{PriceAndRsi, SignalQueue, Validators};
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Closed trade produced by [`PhaseExecutor::buy_and_place_sell`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    pub result: BotResult,
    pub trade: BuyAndSellTradeInfo,
    pub exit_price: f64,
}

pub struct PhaseExecutor {
    polling: PollingEngine,
    validators: Validators,
    strategy: StrategyConfig,
    risk: RiskConfig,
}

impl PhaseExecutor {
    /// Rejects configurations inconsistent with the store's candle size
    pub fn new(
        clock: Arc<dyn Clock>,
        provider: DataProvider,
        notifier: Arc<dyn Notifier>,
        strategy: StrategyConfig,
        risk: RiskConfig,
    ) -> Result<Self> {
        strategy.validate(provider.store().config())?;
        risk.validate()?;
        let provider = provider.with_clock(clock.clone());
        Ok(Self {
            polling: PollingEngine::new(clock, provider.clone(), strategy.clone()),
            validators: Validators::new(provider, notifier, strategy.green_candle_min_rise),
            strategy,
            risk,
        })
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn provider(&self) -> &DataProvider {
        self.polling.provider()
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        self.validators.notifier()
    }

    /// Fresh lookback queue sized for this strategy
    pub fn signal_queue(&self) -> SignalQueue {
        SignalQueue::new(
            self.strategy.signal_queue_capacity,
            chrono::Duration::seconds(self.strategy.signal_min_age_secs as i64),
        )
    }

    fn ensure_running(scope: &CancelScope) -> Result<()> {
        if scope.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Poll until the lower-price/higher-RSI signal appears
    pub async fn wait_for_signal(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        log: &mut PhaseLog,
        queue: &mut SignalQueue,
    ) -> Result<(DateTime<Utc>, PriceAndRsi)> {
        let (time, sample) = self
            .polling
            .lower_price_higher_rsi(symbol, scope, time, queue)
            .await
            .into_result()?;
        log.push(
            time,
            Phase::WaitingSignal,
            format!("signal at price {} with RSI {:.2}", sample.price, sample.rsi),
        );
        Ok((time, sample))
    }

    pub async fn validate_red(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        log: &mut PhaseLog,
    ) -> Result<(DateTime<Utc>, bool)> {
        Self::ensure_running(scope)?;
        let red = self.validators.is_red_candle(symbol, time).await?;
        log.push(time, Phase::ValidatingRed, if red { "red candle" } else { "not a red candle" });
        Ok((time, red))
    }

    pub async fn validate_price_below_mean_average(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        log: &mut PhaseLog,
    ) -> Result<(DateTime<Utc>, bool)> {
        Self::ensure_running(scope)?;
        let below = self.validators.is_price_below_mean_average(symbol, time).await?;
        log.push(
            time,
            Phase::ValidatingMeanAverage,
            if below { "price below mean average" } else { "price not below mean average" },
        );
        Ok((time, below))
    }

    pub async fn validate_green(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        log: &mut PhaseLog,
    ) -> Result<(DateTime<Utc>, bool)> {
        Self::ensure_running(scope)?;
        let green = self.validators.is_green_candle(symbol, time).await?;
        log.push(time, Phase::ValidatingGreen, if green { "green candle" } else { "not a green candle" });
        Ok((time, green))
    }

    /// Confirm the entry on the MACD histogram
    ///
    /// A non-negative histogram confirms at once. A negative one is polled
    /// until it turns; running out of iterations means "not confirmed", not
    /// a fault.
    pub async fn wait_for_macd_turn(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        log: &mut PhaseLog,
    ) -> Result<(DateTime<Utc>, bool)> {
        Self::ensure_running(scope)?;
        if !self.validators.is_macd_negative(symbol, time).await? {
            log.push(time, Phase::MacdConfirmation, "MACD already non-negative");
            return Ok((time, true));
        }
        debug!(symbol = %symbol, %time, "MACD negative, waiting for the turn");

        let response = self.polling.macd_non_negative(symbol, scope, time).await;
        if response.is_timed_out() {
            log.push(response.time, Phase::MacdConfirmation, "MACD stayed negative");
            return Ok((response.time, false));
        }
        let (time, macd) = response.into_result()?;
        log.push(time, Phase::MacdConfirmation, format!("MACD histogram {:.6}", macd.histogram));
        Ok((time, true))
    }

    pub async fn wait(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        log: &mut PhaseLog,
        seconds: u64,
        label: &str,
    ) -> Result<DateTime<Utc>> {
        let time = self.polling.clock().wait(scope, symbol, seconds, label, time).await?;
        log.push(time, Phase::Waiting, format!("waited {seconds} s ({label})"));
        Ok(time)
    }

    /// Buy with the configured quote amount, protect the position with an
    /// OCO sell and follow it to the exit
    pub async fn buy_and_place_sell(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        log: &mut PhaseLog,
    ) -> Result<(DateTime<Utc>, TradeOutcome)> {
        let provider = self.polling.provider();
        let exchange = provider.exchange();

        let quote_asset = exchange.quote_asset(symbol);
        let available =
            retry_read(provider.clock().as_ref(), "balance", || exchange.balance(&quote_asset)).await?;
        if available < self.risk.quote_order_amount {
            return Err(EngineError::InsufficientBalance {
                asset: quote_asset,
                needed: self.risk.quote_order_amount,
                available,
            });
        }

        let price = provider.price(symbol, time).await?;
        let quantity = floor_to(self.risk.quote_order_amount / price, self.risk.quantity_precision);
        if quantity <= 0.0 {
            return Err(EngineError::Config(format!(
                "quote amount {} buys nothing at price {price}",
                self.risk.quote_order_amount
            )));
        }

        // order-mutating calls are never retried
        let buy = exchange.market_buy(symbol, quantity, time).await?;
        let (time, buy) = self.await_buy_fill(symbol, time, scope, buy).await?;

        let fill_price = buy.avg_fill_price.unwrap_or(price);
        let trade = BuyAndSellTradeInfo::from_fill(fill_price, buy.filled_quantity, &self.risk);
        log.push(
            time,
            Phase::TradeEntered,
            format!("bought {} at {fill_price}", trade.quantity),
        );
        info!(symbol = %symbol, quantity = trade.quantity, price = fill_price, "trade entered");

        let oco = exchange.place_oco_sell(symbol, &trade, time).await?;
        log.push(
            time,
            Phase::AwaitingExit,
            format!(
                "OCO sell {} take profit {} stop {} limit {}",
                oco.id, trade.sell_price, trade.stop_price, trade.stop_loss_limit_price
            ),
        );
        self.validators
            .notifier()
            .notify(&format!(
                "{symbol}: bought {} at {fill_price}, take profit {}, stop {}",
                trade.quantity, trade.sell_price, trade.stop_price
            ))
            .await;

        let (time, sold) = self.await_exit(symbol, time, scope, &trade, &oco).await?;
        let exit_price = sold.avg_fill_price.ok_or_else(|| {
            EngineError::Invariant(format!("filled order {} has no fill price", sold.id))
        })?;
        let result = BotResult::from_exit(trade.buy_price, exit_price);
        log.push(time, Phase::Finished, format!("{result}: sold at {exit_price}"));

        Ok((
            time,
            TradeOutcome {
                result,
                trade,
                exit_price,
            },
        ))
    }

    async fn await_buy_fill(
        &self,
        symbol: &str,
        time: DateTime<Utc>,
        scope: &CancelScope,
        buy: Order,
    ) -> Result<(DateTime<Utc>, Order)> {
        let response = self.polling.order_status(symbol, scope, time, &buy.id).await;
        match response.outcome {
            PollingOutcome::Success(order) if order.is_filled() => Ok((response.time, order)),
            PollingOutcome::Success(order) => Err(EngineError::OrderNotFilled {
                symbol: symbol.to_string(),
                order_id: order.id,
            }),
            PollingOutcome::TimedOut { .. } => {
                warn!(symbol = %symbol, order_id = %buy.id, "buy not filled in time, cancelling");
                self.polling
                    .provider()
                    .exchange()
                    .cancel_order(symbol, &buy.id, response.time)
                    .await?;
                Err(EngineError::OrderNotFilled {
                    symbol: symbol.to_string(),
                    order_id: buy.id,
                })
            }
            PollingOutcome::Cancelled => Err(EngineError::Cancelled),
            PollingOutcome::Faulted(e) => Err(e),
        }
    }

    /// Watch the market until the exit range is reached, then confirm the
    /// OCO fill; an unconfirmed fill resumes watching
    async fn await_exit(
        &self,
        symbol: &str,
        mut time: DateTime<Utc>,
        scope: &CancelScope,
        trade: &BuyAndSellTradeInfo,
        oco: &Order,
    ) -> Result<(DateTime<Utc>, Order)> {
        loop {
            time = match self.strategy.exit_watch {
                ExitWatch::Price => {
                    self.polling
                        .price_range(symbol, scope, time, trade.stop_price, trade.sell_price)
                        .await
                        .into_result()?
                        .0
                }
                ExitWatch::Candle => {
                    self.polling
                        .candle_range(symbol, scope, time, trade.stop_price, trade.sell_price)
                        .await
                        .into_result()?
                        .0
                }
            };
            debug!(symbol = %symbol, %time, "exit range reached");

            let response: PollingResponse<Order> =
                self.polling.order_status(symbol, scope, time, &oco.id).await;
            if response.is_timed_out() {
                time = response.time;
                continue;
            }
            let (time, order) = response.into_result()?;
            if order.is_filled() {
                return Ok((time, order));
            }
            return Err(EngineError::OrderNotFilled {
                symbol: symbol.to_string(),
                order_id: order.id,
            });
        }
    }
}
