//! Runtime configuration
//!
//! Every address, interval and threshold is read from the environment (with
//! `.env` support through `dotenvy`) so nothing has to be recompiled to point
//! components at each other or to retune the strategy.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tick gateway (broadcaster) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Instruments the gateway generates prices for
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,

    /// Milliseconds between PRICE rounds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Milliseconds between NEWS events
    #[serde(default = "default_news_interval")]
    pub news_interval_ms: u64,

    /// New connections beyond this are refused
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,

    /// Frames buffered per subscriber before it is considered too slow
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,

    /// A single socket write taking longer than this evicts the subscriber
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Fixed RNG seed for reproducible price walks (random when unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl GatewayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn news_interval(&self) -> Duration {
        Duration::from_millis(self.news_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Connection retry policy
///
/// The default is an unbounded retry loop with a fixed delay: long-lived
/// processes are expected to sit and wait for their upstream to come up.
/// Set `max_attempts` to cap it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay between connection attempts in milliseconds
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Maximum connection attempts (0 = infinite)
    #[serde(default)]
    pub max_attempts: u64,
}

impl ReconnectConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn is_infinite(&self) -> bool {
        self.max_attempts == 0
    }
}

/// Tick consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// `host:port` of the tick gateway
    #[serde(default = "default_gateway_addr")]
    pub gateway_addr: String,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Order relay configuration (server bind address and client target)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRelayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_relay_port")]
    pub port: u16,

    /// How long a client waits for its confirmation
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// How a client (re)connects to the relay; `max_attempts` must be finite
    #[serde(default = "default_relay_reconnect")]
    pub reconnect: ReconnectConfig,
}

impl OrderRelayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Threshold strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Buy when price drops below this while flat or short
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: f64,

    /// Sell when price rises above this while long
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: f64,

    /// Quantity bought per entry
    #[serde(default = "default_lot_size")]
    pub lot_size: u64,
}

/// Complete process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub relay: OrderRelayConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
}

impl AppConfig {
    /// Load from process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a specific env file without touching the process environment
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Build from any key lookup, falling back to defaults for missing keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gateway = GatewayConfig {
            host: lookup("TICK_GATEWAY_HOST").unwrap_or_else(default_host),
            port: parse_var(&lookup, "TICK_GATEWAY_PORT", default_gateway_port())?,
            instruments: lookup("TICK_INSTRUMENTS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_else(default_instruments),
            tick_interval_ms: parse_var(&lookup, "TICK_INTERVAL_MS", default_tick_interval())?,
            news_interval_ms: parse_var(&lookup, "TICK_NEWS_INTERVAL_MS", default_news_interval())?,
            max_subscribers: parse_var(&lookup, "TICK_MAX_SUBSCRIBERS", default_max_subscribers())?,
            subscriber_queue: parse_var(&lookup, "TICK_SUBSCRIBER_QUEUE", default_subscriber_queue())?,
            write_timeout_ms: parse_var(&lookup, "TICK_WRITE_TIMEOUT_MS", default_write_timeout())?,
            seed: lookup("TICK_SEED")
                .map(|raw| parse_value("TICK_SEED", &raw))
                .transpose()?,
        };

        let consumer = ConsumerConfig {
            gateway_addr: lookup("CONSUMER_GATEWAY_ADDR").unwrap_or_else(|| gateway.addr()),
            reconnect: ReconnectConfig {
                retry_interval_ms: parse_var(&lookup, "RETRY_INTERVAL_MS", default_retry_interval())?,
                max_attempts: parse_var(&lookup, "RETRY_MAX_ATTEMPTS", 0)?,
            },
        };

        let relay = OrderRelayConfig {
            host: lookup("RELAY_HOST").unwrap_or_else(default_host),
            port: parse_var(&lookup, "RELAY_PORT", default_relay_port())?,
            read_timeout_ms: parse_var(&lookup, "RELAY_READ_TIMEOUT_MS", default_read_timeout())?,
            reconnect: ReconnectConfig {
                retry_interval_ms: parse_var(
                    &lookup,
                    "RELAY_RETRY_INTERVAL_MS",
                    default_relay_retry_interval(),
                )?,
                max_attempts: parse_var(&lookup, "RELAY_CONNECT_ATTEMPTS", default_relay_attempts())?,
            },
        };

        let decision = DecisionConfig {
            buy_threshold: parse_var(&lookup, "STRATEGY_BUY_THRESHOLD", default_buy_threshold())?,
            sell_threshold: parse_var(&lookup, "STRATEGY_SELL_THRESHOLD", default_sell_threshold())?,
            lot_size: parse_var(&lookup, "STRATEGY_LOT_SIZE", default_lot_size())?,
        };

        let config = Self {
            gateway,
            consumer,
            relay,
            decision,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the components cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.instruments.is_empty() {
            return Err(ConfigError::Invalid("at least one instrument is required".into()));
        }
        if self.gateway.tick_interval_ms == 0 || self.gateway.news_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick and news intervals must be non-zero".into()));
        }
        if self.gateway.max_subscribers == 0 || self.gateway.subscriber_queue == 0 {
            return Err(ConfigError::Invalid(
                "max_subscribers and subscriber_queue must be non-zero".into(),
            ));
        }
        if self.relay.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("relay read timeout must be non-zero".into()));
        }
        if self.relay.reconnect.is_infinite() {
            return Err(ConfigError::Invalid("relay connect attempts must be non-zero".into()));
        }

        let decision = &self.decision;
        if !decision.buy_threshold.is_finite() || !decision.sell_threshold.is_finite() {
            return Err(ConfigError::Invalid("strategy thresholds must be finite".into()));
        }
        if decision.buy_threshold > decision.sell_threshold {
            return Err(ConfigError::Invalid(format!(
                "buy threshold {} is above sell threshold {}",
                decision.buy_threshold, decision.sell_threshold
            )));
        }
        if decision.lot_size == 0 {
            return Err(ConfigError::Invalid("lot size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_gateway_port(),
            instruments: default_instruments(),
            tick_interval_ms: default_tick_interval(),
            news_interval_ms: default_news_interval(),
            max_subscribers: default_max_subscribers(),
            subscriber_queue: default_subscriber_queue(),
            write_timeout_ms: default_write_timeout(),
            seed: None,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval(),
            max_attempts: 0, // infinite
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            gateway_addr: default_gateway_addr(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for OrderRelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_relay_port(),
            read_timeout_ms: default_read_timeout(),
            reconnect: default_relay_reconnect(),
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            lot_size: default_lot_size(),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// Default value functions for serde
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    9000
}

fn default_relay_port() -> u16 {
    9001
}

fn default_gateway_addr() -> String {
    format!("{}:{}", default_host(), default_gateway_port())
}

fn default_instruments() -> Vec<String> {
    vec!["AAPL".to_string(), "MSFT".to_string(), "GOOG".to_string()]
}

fn default_tick_interval() -> u64 {
    200
}

fn default_news_interval() -> u64 {
    3000
}

fn default_max_subscribers() -> usize {
    64
}

fn default_subscriber_queue() -> usize {
    256
}

fn default_write_timeout() -> u64 {
    1000
}

fn default_retry_interval() -> u64 {
    2000
}

fn default_read_timeout() -> u64 {
    5000
}

fn default_relay_retry_interval() -> u64 {
    500
}

fn default_relay_attempts() -> u64 {
    3
}

fn default_relay_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        retry_interval_ms: default_relay_retry_interval(),
        max_attempts: default_relay_attempts(),
    }
}

fn default_buy_threshold() -> f64 {
    100.0
}

fn default_sell_threshold() -> f64 {
    105.0
}

fn default_lot_size() -> u64 {
    10
}
