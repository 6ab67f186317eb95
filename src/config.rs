use crate::domain::{Balance, Price};
use crate::harness::Concurrency;
use crate::store::IsolationLevel;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub store: StoreSettings,
    pub trial: TrialSettings,
    pub logging: LoggingSettings,
}

/// Which backend a trial runs against.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Postgres => f.write_str("postgres"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database_name: String,
    pub max_connections: u32,
    pub isolation: IsolationLevel,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrialSettings {
    pub initial_balance: Balance,
    pub price: Price,
    pub concurrency: Concurrency,
    /// Simulated per-operation round-trip for the memory backend, in
    /// milliseconds. Zero disables injection.
    pub latency_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("store.backend", "memory")?
            .set_default("store.host", "localhost")?
            .set_default("store.port", 5432)?
            .set_default("store.username", "postgres")?
            .set_default("store.password", "password")?
            .set_default("store.database_name", "overdraft")?
            .set_default("store.max_connections", 32)?
            .set_default("store.isolation", "read-committed")?
            .set_default("trial.initial_balance", 100)?
            .set_default("trial.price", 10)?
            .set_default("trial.concurrency", 50)?
            .set_default("trial.latency_ms", 2)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("OVERDRAFT").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.store.username,
            self.store.password,
            self.store.host,
            self.store.port,
            self.store.database_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_can_be_loaded() {
        let settings = Settings::new();
        assert!(settings.is_ok());
    }

    #[test]
    fn test_defaults_describe_the_canonical_trial() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.trial.initial_balance, Balance::new(100));
        assert_eq!(settings.trial.price, Price::try_new(10).unwrap());
        assert_eq!(
            settings.trial.concurrency,
            Concurrency::try_new(50).unwrap()
        );
    }

    #[test]
    fn test_database_url_format() {
        let settings = Settings::new().unwrap();
        let url = settings.database_url();
        assert!(url.starts_with("postgres://"));
        assert!(url.contains(&settings.store.username));
        assert!(url.contains(&settings.store.database_name));
    }
}
