use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::NaiveTime;

use crate::scheduling::{BusinessHours, ConflictRule, SchedulingConfig, ServiceId};

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
    pub scheduling: SchedulingConfig,
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
            scheduling: load_scheduling()?,
        })
    }
}

/// Reads the `SALON_*` variables; anything unset keeps the built-in default.
fn load_scheduling() -> Result<SchedulingConfig, ConfigError> {
    let mut config = SchedulingConfig::default();
    let defaults = BusinessHours::default();

    let hours = BusinessHours {
        opens_at: time_var("SALON_OPENS_AT", defaults.opens_at)?,
        closes_at: time_var("SALON_CLOSES_AT", defaults.closes_at)?,
        increment_minutes: positive_var("SALON_SLOT_MINUTES", defaults.increment_minutes)?,
        horizon_days: positive_var("SALON_HORIZON_DAYS", defaults.horizon_days)?,
    };
    if hours.opens_at >= hours.closes_at {
        return Err(ConfigError::EmptyBusinessDay {
            opens_at: hours.opens_at,
            closes_at: hours.closes_at,
        });
    }
    config.hours = hours;

    if let Ok(raw) = env::var("SALON_CONFLICT_RULE") {
        config.conflict_rule =
            ConflictRule::parse(&raw).ok_or(ConfigError::InvalidConflictRule { value: raw })?;
    }

    if let Ok(raw) = env::var("SALON_SPECIAL_SERVICES") {
        config.loyalty.special_services = raw
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| ServiceId(id.to_string()))
            .collect::<BTreeSet<_>>();
    }

    config.suggestion_ttl_minutes =
        positive_var("SALON_SUGGESTION_TTL_MINUTES", config.suggestion_ttl_minutes)?;

    Ok(config)
}

fn time_var(name: &'static str, default: NaiveTime) -> Result<NaiveTime, ConfigError> {
    match env::var(name) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map_err(|_| ConfigError::InvalidTime { var: name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn positive_var(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { var: name, value: raw })?,
        Err(_) => default,
    };
    if value == 0 {
        return Err(ConfigError::ZeroValue { var: name });
    }
    Ok(value)
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

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTime { var: &'static str, value: String },
    InvalidNumber { var: &'static str, value: String },
    InvalidConflictRule { value: String },
    EmptyBusinessDay { opens_at: NaiveTime, closes_at: NaiveTime },
    ZeroValue { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTime { var, value } => {
                write!(f, "{var} must be a time in HH:MM format, got '{value}'")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a whole number, got '{value}'")
            }
            ConfigError::InvalidConflictRule { value } => write!(
                f,
                "SALON_CONFLICT_RULE must be 'exact' or 'overlap', got '{value}'"
            ),
            ConfigError::EmptyBusinessDay {
                opens_at,
                closes_at,
            } => write!(
                f,
                "SALON_OPENS_AT ({}) must be earlier than SALON_CLOSES_AT ({})",
                opens_at.format("%H:%M"),
                closes_at.format("%H:%M")
            ),
            ConfigError::ZeroValue { var } => write!(f, "{var} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
