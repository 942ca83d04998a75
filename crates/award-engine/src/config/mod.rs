use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

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

/// Top-level configuration for the award engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub procurement: ProcurementConfig,
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
            procurement: ProcurementConfig::from_env()?,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

pub const DEFAULT_AWARD_RESPONSE_HOURS: i64 = 72;

/// Review chain, administrative roles and the vendor response window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcurementConfig {
    pub review_chain: Vec<String>,
    pub admin_roles: Vec<String>,
    pub award_response_hours: i64,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            review_chain: Vec::new(),
            admin_roles: vec!["Administrator".to_string()],
            award_response_hours: DEFAULT_AWARD_RESPONSE_HOURS,
        }
    }
}

impl ProcurementConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let review_chain = env::var("PROCUREMENT_REVIEW_CHAIN")
            .map(|value| split_list(&value))
            .unwrap_or(defaults.review_chain);
        let admin_roles = env::var("PROCUREMENT_ADMIN_ROLES")
            .map(|value| split_list(&value))
            .unwrap_or(defaults.admin_roles);

        let award_response_hours = match env::var("PROCUREMENT_AWARD_RESPONSE_HOURS") {
            Ok(value) => value
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::InvalidResponseWindow { value })?,
            Err(_) => defaults.award_response_hours,
        };

        Ok(Self {
            review_chain,
            admin_roles,
            award_response_hours,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidResponseWindow { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidResponseWindow { value } => write!(
                f,
                "PROCUREMENT_AWARD_RESPONSE_HOURS must be a positive number of hours, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort | ConfigError::InvalidResponseWindow { .. } => None,
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
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "PROCUREMENT_REVIEW_CHAIN",
            "PROCUREMENT_ADMIN_ROLES",
            "PROCUREMENT_AWARD_RESPONSE_HOURS",
        ] {
            env::remove_var(key);
        }
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
        assert_eq!(config.procurement, ProcurementConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn review_chain_is_read_in_order() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PROCUREMENT_REVIEW_CHAIN", "Committee, Director,,President");
        env::set_var("PROCUREMENT_ADMIN_ROLES", "Administrator,Auditor");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.procurement.review_chain,
            vec!["Committee", "Director", "President"]
        );
        assert_eq!(config.procurement.admin_roles, vec!["Administrator", "Auditor"]);
        reset_env();
    }

    #[test]
    fn rejects_non_positive_response_window() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PROCUREMENT_AWARD_RESPONSE_HOURS", "0");
        match AppConfig::load() {
            Err(ConfigError::InvalidResponseWindow { value }) => assert_eq!(value, "0"),
            other => panic!("expected invalid response window, got {other:?}"),
        }
        reset_env();
    }
}
