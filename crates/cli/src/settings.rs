//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml` and from `WALLET_LEDGER__*` environment
//! variables (`WALLET_LEDGER__APP__LEVEL=debug`).
//!
//! See `settings.toml` for the configuration.
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use engine::{ReferenceGenerator, RetryPolicy};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./wallet_ledger.db?mode=rwc";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub write_attempts: u32,
    pub write_base_delay_ms: u64,
    pub write_max_delay_ms: u64,
    pub read_attempts: u32,
    pub read_base_delay_ms: u64,
    pub read_max_delay_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        let writes = RetryPolicy::writes();
        let reads = RetryPolicy::reads();
        Self {
            write_attempts: writes.max_attempts,
            write_base_delay_ms: writes.base_delay.as_millis() as u64,
            write_max_delay_ms: writes.max_delay.as_millis() as u64,
            read_attempts: reads.max_attempts,
            read_base_delay_ms: reads.base_delay.as_millis() as u64,
            read_max_delay_ms: reads.max_delay.as_millis() as u64,
        }
    }
}

impl Retry {
    pub fn writes(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.write_attempts,
            Duration::from_millis(self.write_base_delay_ms),
            Duration::from_millis(self.write_max_delay_ms),
        )
    }

    pub fn reads(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.read_attempts,
            Duration::from_millis(self.read_base_delay_ms),
            Duration::from_millis(self.read_max_delay_ms),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Reference {
    pub suffix_len: Option<usize>,
    pub max_attempts: Option<u32>,
}

impl Reference {
    pub fn generator(&self) -> ReferenceGenerator {
        let mut generator = ReferenceGenerator::default();
        if let Some(len) = self.suffix_len {
            generator = generator.suffix_len(len);
        }
        if let Some(attempts) = self.max_attempts {
            generator = generator.max_attempts(attempts);
        }
        generator
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Option<Database>,
    pub retry: Retry,
    pub reference: Reference,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("WALLET_LEDGER").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// `override_url` (from `--database-url`) wins over the configured database.
    pub fn database_url(&self, override_url: Option<&str>) -> String {
        match (override_url, &self.database) {
            (Some(url), _) => url.to_string(),
            (None, Some(database)) => database.url(),
            (None, None) => DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_toml(raw: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_configuration_uses_defaults() {
        let settings = from_toml("");
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.retry.writes(), RetryPolicy::writes());
        assert_eq!(settings.retry.reads(), RetryPolicy::reads());
        assert_eq!(settings.database_url(None), DEFAULT_DATABASE_URL);
        assert_eq!(settings.database_url(Some("sqlite::memory:")), "sqlite::memory:");
    }

    #[test]
    fn reads_database_and_retry_sections() {
        let settings = from_toml(
            r#"
            [app]
            level = "debug"

            [database]
            sqlite = "/tmp/ledger.db"

            [retry]
            write_attempts = 8
            write_base_delay_ms = 1
            write_max_delay_ms = 4
            "#,
        );
        assert_eq!(settings.app.level, "debug");
        assert_eq!(settings.database_url(None), "sqlite:/tmp/ledger.db?mode=rwc");
        let writes = settings.retry.writes();
        assert_eq!(writes.max_attempts, 8);
        assert_eq!(writes.max_delay, Duration::from_millis(4));
        assert_eq!(settings.retry.reads(), RetryPolicy::reads());
    }

    #[test]
    fn memory_database_is_a_plain_string() {
        let settings = from_toml(r#"database = "memory""#);
        assert_eq!(settings.database_url(None), "sqlite::memory:");
    }
}
