use std::{env, fmt, net::SocketAddr};

use chrono::NaiveDate;
use chrono_tz::Tz;

use super::server_bind_address;

pub const DEFAULT_PAYROLL_TIMEZONE: &str = "America/Denver";
pub const DEFAULT_PAYROLL_ANCHOR: &str = "2024-12-22";
pub const DEFAULT_SIGNAL_BUFFER: usize = 128;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    /// Zone pay periods are laid out in.
    pub payroll_timezone: Tz,
    /// Local start date of any one pay period; the rest of the grid follows.
    pub payroll_anchor: NaiveDate,
    pub signal_buffer: usize,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let timezone = env_or("PAYROLL_TIMEZONE", DEFAULT_PAYROLL_TIMEZONE);
        let payroll_timezone = timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(timezone.clone()))?;

        let anchor = env_or("PAYROLL_ANCHOR_DATE", DEFAULT_PAYROLL_ANCHOR);
        let payroll_anchor = NaiveDate::parse_from_str(&anchor, "%Y-%m-%d")
            .map_err(|_| ConfigError::InvalidAnchorDate(anchor.clone()))?;

        let signal_buffer = match env::var("SIGNAL_BUFFER") {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(value) if value > 0 => value,
                _ => return Err(ConfigError::InvalidSignalBuffer(raw)),
            },
            Err(_) => DEFAULT_SIGNAL_BUFFER,
        };

        Ok(Self {
            bind_addr,
            environment,
            payroll_timezone,
            payroll_anchor,
            signal_buffer,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidTimezone(String),
    InvalidAnchorDate(String),
    InvalidSignalBuffer(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidTimezone(value) => {
                write!(f, "PAYROLL_TIMEZONE must be an IANA zone name (got {value})")
            }
            Self::InvalidAnchorDate(value) => {
                write!(f, "PAYROLL_ANCHOR_DATE must be YYYY-MM-DD (got {value})")
            }
            Self::InvalidSignalBuffer(value) => {
                write!(f, "SIGNAL_BUFFER must be a positive integer (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
