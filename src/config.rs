use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub waterscope: WaterscopeConfig,
    #[validate(nested)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}
impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// How the client obtains an authenticated portal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Full B2C login with username and password.
    #[default]
    Credentials,
    /// Import a session cookie string captured from a browser.
    Cookies,
}

#[derive(Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_auth"))]
pub struct WaterscopeConfig {
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub session_cookies: String,
    #[validate(url)]
    pub base_url: String,
    #[validate(url)]
    pub b2c_base_url: String,
    pub tenant: String,
    pub policy: String,
    pub user_agent: String,
    #[validate(range(min = 1))]
    pub http_timeout_seconds: u64,
    #[validate(range(min = 1))]
    pub connect_timeout_seconds: u64,
}

impl WaterscopeConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Account label used for sensor unique ids.
    pub fn account(&self) -> &str {
        match self.auth_mode {
            AuthMode::Credentials => &self.username,
            AuthMode::Cookies => "cookies",
        }
    }
}

// Credentials never reach the logs through Debug.
impl std::fmt::Debug for WaterscopeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterscopeConfig")
            .field("auth_mode", &self.auth_mode)
            .field("username", &crate::mask_username(&self.username))
            .field("password", &"***")
            .field("session_cookies", &format_args!("<{} bytes>", self.session_cookies.len()))
            .field("base_url", &self.base_url)
            .field("b2c_base_url", &self.b2c_base_url)
            .field("tenant", &self.tenant)
            .field("policy", &self.policy)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

fn validate_auth(cfg: &WaterscopeConfig) -> Result<(), ValidationError> {
    match cfg.auth_mode {
        AuthMode::Credentials if cfg.username.trim().is_empty() || cfg.password.is_empty() => {
            Err(ValidationError::new("credentials_required"))
        }
        AuthMode::Cookies if cfg.session_cookies.trim().is_empty() => {
            Err(ValidationError::new("session_cookies_required"))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PollerConfig {
    #[validate(range(min = 60))]
    pub interval_seconds: u64,
    #[validate(range(min = 1, max = 5))]
    pub max_login_attempts: u32,
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { json: default_json() }
    }
}

fn default_json() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));
        if let Ok(path) = std::env::var("WATERSCOPE_CONFIG") {
            figment = figment.merge(Toml::file(path));
        }
        let cfg: Config = figment
            .merge(Env::prefixed("WATERSCOPE__").split("__"))
            .extract()
            .context("failed to load configuration")?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Config = Figment::new()
            .merge(Toml::string(raw))
            .extract()
            .context("failed to parse configuration")?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

#[cfg(test)]
pub(crate) fn sample() -> Config {
    Config::from_toml_str(tests::BASE).expect("sample config")
}
