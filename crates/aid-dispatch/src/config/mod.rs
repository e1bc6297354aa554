use crate::workflows::distribution::domain::RecencyBucket;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

const DEFAULT_AGENTS: &str = "agent-north,agent-gaza,agent-middle,agent-south";
/// A failed delivery is rescheduled automatically at most once.
pub const MAX_AUTO_RETRIES: u8 = 1;

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
    pub distribution: DistributionConfig,
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
            distribution: DistributionConfig::from_env()?,
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

/// Dispatch policy shared by the planner and the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionConfig {
    /// Field agents receiving delivery tasks, in round-robin order.
    pub agents: Vec<String>,
    /// Most recent receipt bucket still counted as "recently served".
    pub recency_threshold: RecencyBucket,
    /// Automatic reschedules granted to a failed delivery before it is final.
    pub max_auto_retries: u8,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            agents: split_agents(DEFAULT_AGENTS),
            recency_threshold: RecencyBucket::Week,
            max_auto_retries: 1,
        }
    }
}

impl DistributionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let agents = match env::var("DISPATCH_AGENTS") {
            Ok(raw) => split_agents(&raw),
            Err(_) => defaults.agents,
        };
        if agents.is_empty() {
            return Err(ConfigError::EmptyAgentPool);
        }

        let recency_threshold = match env::var("DISPATCH_RECENCY_THRESHOLD") {
            Ok(raw) => match RecencyBucket::parse(&raw) {
                Some(RecencyBucket::Older) | None => {
                    return Err(ConfigError::InvalidRecencyThreshold(raw))
                }
                Some(bucket) => bucket,
            },
            Err(_) => defaults.recency_threshold,
        };

        let max_auto_retries = match env::var("DISPATCH_MAX_AUTO_RETRIES") {
            Ok(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|retries| *retries <= MAX_AUTO_RETRIES)
                .ok_or(ConfigError::InvalidRetryLimit)?,
            Err(_) => defaults.max_auto_retries,
        };

        Ok(Self {
            agents,
            recency_threshold,
            max_auto_retries,
        })
    }
}

fn split_agents(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|agent| !agent.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    EmptyAgentPool,
    InvalidRecencyThreshold(String),
    InvalidRetryLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::EmptyAgentPool => {
                write!(f, "DISPATCH_AGENTS must name at least one field agent")
            }
            ConfigError::InvalidRecencyThreshold(value) => write!(
                f,
                "DISPATCH_RECENCY_THRESHOLD must be week, month or quarter (got '{}')",
                value
            ),
            ConfigError::InvalidRetryLimit => {
                write!(
                    f,
                    "DISPATCH_MAX_AUTO_RETRIES must be between 0 and {}",
                    MAX_AUTO_RETRIES
                )
            }
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
        env::remove_var("DISPATCH_AGENTS");
        env::remove_var("DISPATCH_RECENCY_THRESHOLD");
        env::remove_var("DISPATCH_MAX_AUTO_RETRIES");
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
        assert_eq!(config.distribution, DistributionConfig::default());
        assert_eq!(config.distribution.agents.len(), 4);
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
    fn reads_dispatch_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DISPATCH_AGENTS", " amal , , karim ");
        env::set_var("DISPATCH_RECENCY_THRESHOLD", "Month");
        env::set_var("DISPATCH_MAX_AUTO_RETRIES", "0");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.distribution.agents, vec!["amal", "karim"]);
        assert_eq!(config.distribution.recency_threshold, RecencyBucket::Month);
        assert_eq!(config.distribution.max_auto_retries, 0);
        reset_env();
    }

    #[test]
    fn rejects_blank_agent_pool_and_unbounded_threshold() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DISPATCH_AGENTS", " , ");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::EmptyAgentPool)
        ));

        reset_env();
        env::set_var("DISPATCH_RECENCY_THRESHOLD", "older");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidRecencyThreshold(_))
        ));
        reset_env();
    }

    #[test]
    fn rejects_more_than_one_automatic_retry() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        for raw in ["2", "255", "-1", "once"] {
            env::set_var("DISPATCH_MAX_AUTO_RETRIES", raw);
            assert!(
                matches!(AppConfig::load(), Err(ConfigError::InvalidRetryLimit)),
                "{raw} should be rejected"
            );
        }

        env::set_var("DISPATCH_MAX_AUTO_RETRIES", " 1 ");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.distribution.max_auto_retries, MAX_AUTO_RETRIES);
        reset_env();
    }
}
