use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub settlement_delay_min_ms: u64,
    pub settlement_delay_max_ms: u64,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("port", 3000_i64)?
        .set_default("database_url", "mem://exchange")?
        .set_default("redis_url", "mem://exchange")?
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/exchange.log")?
        .set_default("settlement_delay_min_ms", 1000_i64)?
        .set_default("settlement_delay_max_ms", 3000_i64)?
        // Add configuration from a file
        .add_source(File::with_name("config/config").required(false))
        // Add configuration from environment variables (PORT, DATABASE_URL, ...)
        .add_source(config::Environment::default())
        .build()?;

    s.try_deserialize()
}
