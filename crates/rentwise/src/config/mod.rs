use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub marketplace: MarketplaceConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            marketplace: MarketplaceConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Marketplace engine knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketplaceConfig {
    /// Probability that a simulated settlement succeeds.
    pub settlement_success_rate: f64,
    /// Upper bound on a single store-backed request.
    pub store_timeout: Duration,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            settlement_success_rate: 0.9,
            store_timeout: Duration::from_millis(2_000),
        }
    }
}

impl MarketplaceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settlement_success_rate = match env::var("MARKETPLACE_SETTLEMENT_SUCCESS_RATE") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|rate| (0.0..=1.0).contains(rate))
                .ok_or(ConfigError::InvalidSuccessRate { value: raw })?,
            Err(_) => defaults.settlement_success_rate,
        };

        let store_timeout = match env::var("MARKETPLACE_STORE_TIMEOUT_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis)
                .ok_or(ConfigError::InvalidStoreTimeout { value: raw })?,
            Err(_) => defaults.store_timeout,
        };

        Ok(Self {
            settlement_success_rate,
            store_timeout,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidSuccessRate { value: String },
    InvalidStoreTimeout { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidSuccessRate { value } => write!(
                f,
                "MARKETPLACE_SETTLEMENT_SUCCESS_RATE must be a number between 0 and 1, got '{value}'"
            ),
            ConfigError::InvalidStoreTimeout { value } => write!(
                f,
                "MARKETPLACE_STORE_TIMEOUT_MS must be a positive integer, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidSuccessRate { .. }
            | ConfigError::InvalidStoreTimeout { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("MARKETPLACE_SETTLEMENT_SUCCESS_RATE");
        env::remove_var("MARKETPLACE_STORE_TIMEOUT_MS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.marketplace, MarketplaceConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn marketplace_settings_are_read_and_range_checked() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MARKETPLACE_SETTLEMENT_SUCCESS_RATE", "0.75");
        env::set_var("MARKETPLACE_STORE_TIMEOUT_MS", "150");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.marketplace.settlement_success_rate, 0.75);
        assert_eq!(config.marketplace.store_timeout, Duration::from_millis(150));

        env::set_var("MARKETPLACE_SETTLEMENT_SUCCESS_RATE", "1.5");
        let err = AppConfig::load().expect_err("rate above one");
        assert!(matches!(err, ConfigError::InvalidSuccessRate { .. }));

        env::set_var("MARKETPLACE_SETTLEMENT_SUCCESS_RATE", "0.9");
        env::set_var("MARKETPLACE_STORE_TIMEOUT_MS", "0");
        let err = AppConfig::load().expect_err("zero timeout");
        assert!(err.to_string().contains("MARKETPLACE_STORE_TIMEOUT_MS"));
        reset_env();
    }
}
