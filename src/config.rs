use std::{env, net::SocketAddr, str::FromStr};

use thiserror::Error;

pub const JINA_TOKEN_VAR: &str = "JINA_TOKEN";
pub const GOOGLE_API_KEY_VAR: &str = "GOOGLE_GENERATIVE_AI_API_KEY";

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_JINA_READER_URL: &str = "https://r.jina.ai/";
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Deployment credentials and port.
///
/// Either captured from the process environment at startup, or supplied by an
/// embedding platform per request through the request extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub jina_token: Option<String>,
    pub google_api_key: Option<String>,
    /// Only the startup value binds the listener (`Config::bind_port`). A platform
    /// supplied port is carried through resolution but never rebinds.
    pub port: Option<String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            jina_token: non_empty(lookup(JINA_TOKEN_VAR)),
            google_api_key: non_empty(lookup(GOOGLE_API_KEY_VAR)),
            port: non_empty(lookup("PORT")),
        }
    }

    /// Platform context values take precedence over the process environment.
    pub fn resolve(context: Option<&Environment>, process: &Environment) -> Environment {
        let Some(context) = context else {
            return process.clone();
        };

        Environment {
            jina_token: non_empty(context.jina_token.clone()).or_else(|| process.jina_token.clone()),
            google_api_key: non_empty(context.google_api_key.clone())
                .or_else(|| process.google_api_key.clone()),
            port: non_empty(context.port.clone()).or_else(|| process.port.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Direct,
    Jina,
    Gemini,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Jina => "jina",
            Self::Gemini => "gemini",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "jina" | "proxy" => Ok(Self::Jina),
            "gemini" | "llm" => Ok(Self::Gemini),
            _ => Err(ConfigError::InvalidStrategy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    PerRequest,
    Singleton,
}

impl FromStr for Lifecycle {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per-request" | "per_request" => Ok(Self::PerRequest),
            "singleton" => Ok(Self::Singleton),
            _ => Err(ConfigError::InvalidLifecycle),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub strategy: StrategyKind,
    pub lifecycle: Lifecycle,
    pub sessions: bool,
    pub jina_reader_url: String,
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub environment: Environment,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("FETCH_STRATEGY must be one of: direct, jina, gemini")]
    InvalidStrategy,
    #[error("MCP_LIFECYCLE must be one of: per-request, singleton")]
    InvalidLifecycle,
    #[error("MCP_SESSIONS must be true or false")]
    InvalidSessions,
    #[error("MCP_SESSIONS requires MCP_LIFECYCLE=singleton")]
    SessionsRequireSingleton,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = Environment::from_lookup(&lookup);

        let bind_addr = non_empty(lookup("BIND_ADDR")).unwrap_or_else(|| "0.0.0.0".to_string());
        let bind_port = environment
            .port
            .as_deref()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);
        let strategy = non_empty(lookup("FETCH_STRATEGY"))
            .map(|value| value.parse::<StrategyKind>())
            .transpose()?
            .unwrap_or(StrategyKind::Jina);
        let lifecycle = non_empty(lookup("MCP_LIFECYCLE"))
            .map(|value| value.parse::<Lifecycle>())
            .transpose()?
            .unwrap_or(Lifecycle::PerRequest);
        let sessions = non_empty(lookup("MCP_SESSIONS"))
            .map(|value| parse_bool(&value))
            .transpose()?
            .unwrap_or(false);

        if sessions && lifecycle != Lifecycle::Singleton {
            return Err(ConfigError::SessionsRequireSingleton);
        }

        let config = Self {
            bind_addr,
            bind_port,
            strategy,
            lifecycle,
            sessions,
            jina_reader_url: non_empty(lookup("JINA_READER_URL"))
                .unwrap_or_else(|| DEFAULT_JINA_READER_URL.to_string()),
            gemini_api_url: non_empty(lookup("GEMINI_API_URL"))
                .unwrap_or_else(|| DEFAULT_GEMINI_API_URL.to_string()),
            gemini_model: non_empty(lookup("GEMINI_MODEL"))
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            environment,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidSessions),
    }
}
