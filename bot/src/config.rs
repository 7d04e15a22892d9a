use anyhow::{anyhow, bail, Context};
use cryptobot_engine::config::{ExitWatch, IndicatorConfig, RiskConfig, StrategyConfig};
use dotenv::dotenv;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Backtest,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Mode::Live),
            "backtest" => Ok(Mode::Backtest),
            other => Err(anyhow!("unknown mode {other:?}, expected live or backtest")),
        }
    }
}

pub struct Config {
    pub mode: Mode,
    pub symbols: Vec<String>,
    pub bot_token: Option<String>,
    pub notify_chat_id: Option<i64>,
    pub binance_base_url: String,
    pub backtest_candles_path: Option<PathBuf>,
    pub export_path: PathBuf,
    pub results_path: PathBuf,
    pub export_interval_secs: u64,
    pub starting_balance: f64,
    pub indicators: IndicatorConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let mode = env.parse("MODE", Mode::Live)?;
        // a backtest without SYMBOLS replays every symbol in the candle file
        let default_symbols = if mode == Mode::Live { "BTCUSDT" } else { "" };
        let symbols: Vec<String> = env
            .string("SYMBOLS")
            .unwrap_or_else(|| default_symbols.to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = IndicatorConfig::default();
        let indicators = IndicatorConfig {
            candle_minutes: env.parse("CANDLE_MINUTES", defaults.candle_minutes)?,
            rsi_period: env.parse("RSI_PERIOD", defaults.rsi_period)?,
            macd_fast: env.parse("MACD_FAST", defaults.macd_fast)?,
            macd_slow: env.parse("MACD_SLOW", defaults.macd_slow)?,
            macd_signal: env.parse("MACD_SIGNAL", defaults.macd_signal)?,
            mean_average_period: env.parse("MEAN_AVERAGE_PERIOD", defaults.mean_average_period)?,
            retention_minutes: match env.string("RETENTION_MINUTES").as_deref() {
                None => defaults.retention_minutes,
                Some("none") | Some("0") => None,
                Some(raw) => Some(
                    raw.parse()
                        .with_context(|| format!("RETENTION_MINUTES={raw:?}"))?,
                ),
            },
        };

        let defaults = StrategyConfig::default();
        let strategy = StrategyConfig {
            max_rsi: env.parse("MAX_RSI", defaults.max_rsi)?,
            signal_queue_capacity: env.parse("SIGNAL_QUEUE_CAPACITY", defaults.signal_queue_capacity)?,
            signal_min_age_secs: env.parse("SIGNAL_MIN_AGE_SECS", defaults.signal_min_age_secs)?,
            price_poll_secs: env.parse("PRICE_POLL_SECS", defaults.price_poll_secs)?,
            indicator_poll_secs: env.parse("INDICATOR_POLL_SECS", defaults.indicator_poll_secs)?,
            retry_delay_secs: env.parse("RETRY_DELAY_SECS", defaults.retry_delay_secs)?,
            fork_wait_secs: env.parse("FORK_WAIT_SECS", defaults.fork_wait_secs)?,
            max_generations: env.parse("MAX_GENERATIONS", defaults.max_generations)?,
            green_candle_min_rise: env.parse("GREEN_CANDLE_MIN_RISE", defaults.green_candle_min_rise)?,
            macd_confirmation: env.parse("MACD_CONFIRMATION", defaults.macd_confirmation)?,
            require_price_below_mean_average: env.parse(
                "REQUIRE_PRICE_BELOW_MEAN_AVERAGE",
                defaults.require_price_below_mean_average,
            )?,
            exit_watch: match env.string("EXIT_WATCH").map(|s| s.to_ascii_lowercase()).as_deref() {
                None => defaults.exit_watch,
                Some("price") => ExitWatch::Price,
                Some("candle") => ExitWatch::Candle,
                Some(other) => bail!("EXIT_WATCH={other:?}, expected price or candle"),
            },
            ..defaults
        };

        let defaults = RiskConfig::default();
        let risk = RiskConfig {
            quote_order_amount: env.parse("QUOTE_ORDER_AMOUNT", defaults.quote_order_amount)?,
            take_profit: env.parse("TAKE_PROFIT", defaults.take_profit)?,
            stop_loss: env.parse("STOP_LOSS", defaults.stop_loss)?,
            ..defaults
        };

        indicators.validate()?;
        strategy.validate(&indicators)?;
        risk.validate()?;

        let backtest_candles_path = env.string("BACKTEST_CANDLES_PATH").map(PathBuf::from);
        if mode == Mode::Backtest && backtest_candles_path.is_none() {
            bail!("MODE=backtest needs BACKTEST_CANDLES_PATH");
        }
        if mode == Mode::Live && symbols.is_empty() {
            bail!("SYMBOLS must name at least one symbol");
        }

        Ok(Config {
            mode,
            symbols,
            bot_token: env.string("BOT_TOKEN"),
            notify_chat_id: env.string("NOTIFY_CHAT_ID").map(|raw| raw.parse()).transpose()
                .context("NOTIFY_CHAT_ID must be a numeric chat id")?,
            binance_base_url: env
                .string("BINANCE_BASE_URL")
                .unwrap_or_else(|| "https://api.binance.com".to_string()),
            backtest_candles_path,
            export_path: env
                .string("EXPORT_PATH")
                .unwrap_or_else(|| "./data/indicators.csv".to_string())
                .into(),
            results_path: env
                .string("RESULTS_PATH")
                .unwrap_or_else(|| "./data/results.csv".to_string())
                .into(),
            export_interval_secs: env.parse("EXPORT_INTERVAL_SECS", 900)?,
            starting_balance: env.parse("STARTING_BALANCE", 1000.0)?,
            indicators,
            strategy,
            risk,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, anyhow::Error>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e| anyhow!("{key}={raw:?}: {e}")),
        }
    }
}
