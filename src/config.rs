use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://subscriptions.db?mode=rwc".to_string(),
            max_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_timeout_secs() -> u64 {
    30
}

/// Prefill values handed to the checkout page.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CheckoutPrefill {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    pub host: String,
    pub port: u16,
    /// Gateway page the loopback form posts to
    pub hosted_url: String,
    pub merchant_name: String,
    pub description: String,
    pub theme_color: String,
    pub timeout_secs: u64,
    /// Command used to open the local checkout URL, e.g. `xdg-open`
    pub open_command: Option<String>,
    pub prefill: CheckoutPrefill,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            hosted_url: "https://api.razorpay.com/v1/checkout/embedded".to_string(),
            merchant_name: "Trucking Platform".to_string(),
            description: "Subscription".to_string(),
            theme_color: "#F37254".to_string(),
            timeout_secs: 600,
            open_command: None,
            prefill: CheckoutPrefill::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn local_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Bounds for reconciling a checkout against the remote status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval_ms: 3000,
        }
    }
}

impl VerificationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // No file: the API base URL is the only value without a default
                let base_url = env::var("API_BASE_URL").map_err(|_| {
                    AppError::ConfigError(format!(
                        "API_BASE_URL is not set and {config_path} was not found"
                    ))
                })?;

                Config {
                    database: DatabaseConfig::default(),
                    api: ApiConfig {
                        base_url,
                        auth_token: None,
                        timeout_secs: default_api_timeout_secs(),
                    },
                    checkout: CheckoutConfig::default(),
                    verification: VerificationConfig::default(),
                    analytics: AnalyticsConfig::default(),
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "Unable to read config file {config_path}: {e}"
                )));
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(config_str: &str) -> AppResult<Self> {
        toml::from_str(config_str)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {e}")))
    }

    fn apply_env_overrides(&mut self) {
        fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
            env::var(name).ok().and_then(|v| v.parse::<T>().ok())
        }

        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(n) = parse_env("DB_MAX_CONNECTIONS") {
            self.database.max_connections = n;
        }
        if let Ok(v) = env::var("API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Ok(v) = env::var("API_AUTH_TOKEN") {
            self.api.auth_token = Some(v);
        }
        if let Some(n) = parse_env("API_TIMEOUT_SECS") {
            self.api.timeout_secs = n;
        }
        if let Ok(v) = env::var("CHECKOUT_HOST") {
            self.checkout.host = v;
        }
        if let Some(p) = parse_env("CHECKOUT_PORT") {
            self.checkout.port = p;
        }
        if let Ok(v) = env::var("CHECKOUT_HOSTED_URL") {
            self.checkout.hosted_url = v;
        }
        if let Some(n) = parse_env("CHECKOUT_TIMEOUT_SECS") {
            self.checkout.timeout_secs = n;
        }
        if let Ok(v) = env::var("CHECKOUT_OPEN_COMMAND") {
            self.checkout.open_command = Some(v);
        }
        if let Ok(v) = env::var("PREFILL_NAME") {
            self.checkout.prefill.name = Some(v);
        }
        if let Ok(v) = env::var("PREFILL_EMAIL") {
            self.checkout.prefill.email = Some(v);
        }
        if let Ok(v) = env::var("PREFILL_CONTACT") {
            self.checkout.prefill.contact = Some(v);
        }
        if let Some(n) = parse_env("VERIFICATION_MAX_ATTEMPTS") {
            self.verification.max_attempts = n;
        }
        if let Some(n) = parse_env("VERIFICATION_INTERVAL_MS") {
            self.verification.interval_ms = n;
        }
        if let Ok(v) = env::var("ANALYTICS_ENDPOINT") {
            self.analytics.endpoint = Some(v);
        }
    }
}
