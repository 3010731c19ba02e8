// Configuration management for the DCA trading bot

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Route orders to the in-process paper exchange instead of Bybit
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_base_order")]
    pub base_order: f64,
    #[serde(default = "default_safety_order")]
    pub safety_order: f64,
    #[serde(default = "default_price_deviation")]
    pub price_deviation: f64,            // First rung distance below reference price
    #[serde(default = "default_scale")]
    pub safety_order_volume_scale: f64,
    #[serde(default = "default_scale")]
    pub safety_order_step_scale: f64,
    #[serde(default = "default_max_safety_orders")]
    pub max_safety_orders: u32,
    #[serde(default = "default_take_profit")]
    pub take_profit_percent: f64,        // 0.01 = 1% above average entry
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,            // Decimal places for order prices
    #[serde(default = "default_supported_pairs")]
    pub supported_pairs: Vec<String>,    // Empty list accepts any pair
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillDetection {
    /// Rung counts as filled once the sampled price trades at or below it
    PriceCross,
    /// Ask the exchange for each open rung's order status
    ExchangeStatus,
}

impl Default for FillDetection {
    fn default() -> Self {
        FillDetection::PriceCross
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub fill_detection: FillDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub log_to_file: bool,
    #[serde(default = "default_log_dir")]
    pub log_directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default value functions
fn default_rest_url() -> String { "https://api-testnet.bybit.com".to_string() }
fn default_category() -> String { "spot".to_string() }
fn default_recv_window() -> u64 { 5000 }
fn default_request_timeout() -> u64 { 10 }
fn default_base_order() -> f64 { 30.0 }
fn default_safety_order() -> f64 { 60.0 }
fn default_price_deviation() -> f64 { 0.005 }
fn default_scale() -> f64 { 2.0 }
fn default_max_safety_orders() -> u32 { 6 }
fn default_take_profit() -> f64 { 0.01 }
fn default_price_precision() -> u32 { 5 }
fn default_supported_pairs() -> Vec<String> { vec!["HBARUSDT".to_string(), "HYPEUSDT".to_string()] }
fn default_interval() -> u64 { 60 }
fn default_db_path() -> String { "data/dca_bot.db".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }
fn default_log_dir() -> String { "logs".to_string() }

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            rest_url: default_rest_url(),
            category: default_category(),
            recv_window_ms: default_recv_window(),
            request_timeout_secs: default_request_timeout(),
            dry_run: false,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            base_order: default_base_order(),
            safety_order: default_safety_order(),
            price_deviation: default_price_deviation(),
            safety_order_volume_scale: default_scale(),
            safety_order_step_scale: default_scale(),
            max_safety_orders: default_max_safety_orders(),
            take_profit_percent: default_take_profit(),
            price_precision: default_price_precision(),
            supported_pairs: default_supported_pairs(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            fill_detection: FillDetection::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_to_file: default_true(),
            log_directory: default_log_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            strategy: StrategyConfig::default(),
            monitor: MonitorConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Paper trades go to a sibling file so they never mix with live ones
    pub fn effective_path(&self, dry_run: bool) -> PathBuf {
        let path = PathBuf::from(&self.db_path);
        if !dry_run {
            return path;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dca_bot".to_string());
        let file_name = match path.extension() {
            Some(ext) => format!("{}.paper.{}", stem, ext.to_string_lossy()),
            None => format!("{}.paper", stem),
        };
        path.with_file_name(file_name)
    }
}

impl StrategyConfig {
    /// Validate strategy parameters; any failure is fatal at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_order > 0.0) {
            return Err(ConfigError::Validation("base_order must be positive".to_string()));
        }

        if !(self.safety_order > 0.0) {
            return Err(ConfigError::Validation("safety_order must be positive".to_string()));
        }

        if !(self.price_deviation > 0.0 && self.price_deviation < 1.0) {
            return Err(ConfigError::Validation(
                "price_deviation must be between 0 and 1".to_string()
            ));
        }

        if !(self.safety_order_volume_scale > 0.0) {
            return Err(ConfigError::Validation(
                "safety_order_volume_scale must be positive".to_string()
            ));
        }

        if !(self.safety_order_step_scale > 0.0) {
            return Err(ConfigError::Validation(
                "safety_order_step_scale must be positive".to_string()
            ));
        }

        if !(self.take_profit_percent > 0.0) {
            return Err(ConfigError::Validation("take_profit_percent must be positive".to_string()));
        }

        if self.price_precision > 12 {
            return Err(ConfigError::Validation("price_precision must be at most 12".to_string()));
        }

        Ok(())
    }

    /// Check whether a pair may be traded
    pub fn supports_pair(&self, pair: &str) -> bool {
        self.supported_pairs.is_empty()
            || self.supported_pairs.iter().any(|p| p.eq_ignore_ascii_case(pair))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::FileWrite(e.to_string()))?;
            }
        }

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.to_file(&path)?;
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Exchange credentials from the environment take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("BYBIT_API_KEY") {
            if !key.trim().is_empty() {
                self.exchange.api_key = key.trim().to_string();
            }
        }
        if let Ok(secret) = std::env::var("BYBIT_API_SECRET") {
            if !secret.trim().is_empty() {
                self.exchange.api_secret = secret.trim().to_string();
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;

        if self.monitor.interval_seconds == 0 {
            return Err(ConfigError::Validation("interval_seconds must be greater than 0".to_string()));
        }

        if self.exchange.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than 0".to_string()
            ));
        }

        if self.database.db_path.trim().is_empty() {
            return Err(ConfigError::Validation("db_path must not be empty".to_string()));
        }

        Ok(())
    }

    /// Check if exchange credentials are present
    pub fn has_api_keys(&self) -> bool {
        !self.exchange.api_key.is_empty() && !self.exchange.api_secret.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
