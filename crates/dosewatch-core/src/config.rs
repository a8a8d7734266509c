use anyhow::Result;
use config::Config;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub notification: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// ## Summary
    /// Returns the bind address as a string in the format "host:port".
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Scheduling engine tuning.
///
/// The grace window is deliberately configurable: deployments have run
/// with both 5 and 30 minutes, and the default here is the conservative
/// 30.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes after firing before an unactioned reminder is escalated.
    pub grace_window_minutes: i64,
    /// How far ahead bulk re-priming schedules jobs, in hours.
    pub prime_horizon_hours: i64,
    /// Interval between full re-priming runs, in hours.
    pub refresh_interval_hours: u64,
    /// Interval between safety re-scans of the upcoming horizon, in minutes.
    pub safety_scan_interval_minutes: u64,
    /// Queue worker poll interval, in seconds.
    pub poll_interval_secs: u64,
    /// Maximum jobs claimed per poll.
    pub batch_size: i64,
    /// Attempts before a failing job is dropped.
    pub max_attempts: i32,
    /// Base delay for exponential retry backoff, in seconds.
    pub retry_base_secs: i64,
}

impl SchedulerConfig {
    #[must_use]
    pub fn grace_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.grace_window_minutes)
    }

    #[must_use]
    pub fn prime_horizon(&self) -> chrono::Duration {
        chrono::Duration::hours(self.prime_horizon_hours)
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_hours * 3600)
    }

    #[must_use]
    pub const fn safety_scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.safety_scan_interval_minutes * 60)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn retry_base(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retry_base_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// IANA timezone name used when rendering times in outgoing messages.
    /// Stored instants stay UTC; this is presentation only.
    pub display_timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `.env` file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8710)?
            .set_default("database.max_connections", 4)?
            .set_default("scheduler.grace_window_minutes", 30)?
            .set_default("scheduler.prime_horizon_hours", 48)?
            .set_default("scheduler.refresh_interval_hours", 24)?
            .set_default("scheduler.safety_scan_interval_minutes", 60)?
            .set_default("scheduler.poll_interval_secs", 5)?
            .set_default("scheduler.batch_size", 32)?
            .set_default("scheduler.max_attempts", 3)?
            .set_default("scheduler.retry_base_secs", 60)?
            .set_default("notification.display_timezone", "UTC")?
            .set_default("logging.level", "debug")?
            // Env file
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            // TOML file
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
