use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Control API port (default: 8080)
    #[serde(default)]
    pub api_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes between scheduled decision cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_minutes: u64,
    /// Minutes between account snapshots
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_minutes: u64,
}

fn default_cycle_interval() -> u64 {
    30
}

fn default_snapshot_interval() -> u64 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_minutes: default_cycle_interval(),
            snapshot_interval_minutes: default_snapshot_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Exchange-local timezone (IANA name)
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Exchange holidays as YYYY-MM-DD dates
    #[serde(default)]
    pub holidays: Vec<String>,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            holidays: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Maximum fraction of total account value a single buy may allocate
    #[serde(default = "default_max_allocation_pct")]
    pub max_allocation_pct: Decimal,
    /// Hard ceiling on the engine's risk score (0-100)
    #[serde(default = "default_max_risk_score")]
    pub max_risk_score: u8,
    /// Account drawdown fraction that forces a close-all circuit breaker
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Per-position loss fraction that forces a close (zero disables)
    #[serde(default = "default_position_stop_loss_pct")]
    pub position_stop_loss_pct: Decimal,
    /// Per-position gain fraction that takes profit (zero disables)
    #[serde(default = "default_position_take_profit_pct")]
    pub position_take_profit_pct: Decimal,
}

fn default_max_allocation_pct() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

fn default_max_risk_score() -> u8 {
    85
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

fn default_position_stop_loss_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_position_take_profit_pct() -> Decimal {
    Decimal::new(15, 2) // 0.15
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_allocation_pct: default_max_allocation_pct(),
            max_risk_score: default_max_risk_score(),
            stop_loss_pct: default_stop_loss_pct(),
            position_stop_loss_pct: default_position_stop_loss_pct(),
            position_take_profit_pct: default_position_take_profit_pct(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Timeout for a single decision-engine call
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

fn default_engine_timeout() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_engine_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReflectionConfig {
    /// Filled trades between reflections
    #[serde(default = "default_trades_threshold")]
    pub trades_threshold: u32,
}

fn default_trades_threshold() -> u32 {
    5
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            trades_threshold: default_trades_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgres://localhost/tiller".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TILLER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TILLER_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("TILLER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.scheduler.cycle_interval_minutes == 0 {
            errors.push("cycle_interval_minutes must be positive".to_string());
        }

        if self.scheduler.snapshot_interval_minutes == 0 {
            errors.push("snapshot_interval_minutes must be positive".to_string());
        }

        if self.risk.max_allocation_pct <= Decimal::ZERO
            || self.risk.max_allocation_pct > Decimal::ONE
        {
            errors.push("max_allocation_pct must be in (0, 1]".to_string());
        }

        if self.risk.max_risk_score > 100 {
            errors.push("max_risk_score must be in 0..=100".to_string());
        }

        if self.risk.stop_loss_pct <= Decimal::ZERO || self.risk.stop_loss_pct >= Decimal::ONE {
            errors.push("stop_loss_pct must be between 0 and 1".to_string());
        }

        if self.risk.position_stop_loss_pct < Decimal::ZERO
            || self.risk.position_take_profit_pct < Decimal::ZERO
        {
            errors.push("position exit thresholds must not be negative".to_string());
        }

        if self.engine.timeout_secs == 0 {
            errors.push("engine timeout_secs must be positive".to_string());
        }

        if self.reflection.trades_threshold == 0 {
            errors.push("reflection trades_threshold must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            market: MarketConfig::default(),
            risk: RiskConfig::default(),
            engine: EngineConfig::default(),
            reflection: ReflectionConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            api_port: Some(8080),
        }
    }
}
