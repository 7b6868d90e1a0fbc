//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    fmt,
    net::SocketAddr,
    num::NonZeroU32,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CacheOverrides, ClearCacheArgs, CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "chatcache";
const ENV_PREFIX: &str = "CHATCACHE";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ADMIN_PORT: u16 = 8001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_REDIS_DB: u32 = 0;
const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 600;
const DEFAULT_CACHE_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CACHE_OPERATION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_GENERATION_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_GENERATION_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.7;
const DEFAULT_GENERATION_MAX_TOKENS: u32 = 1024;
const DEFAULT_GENERATION_TOP_P: f32 = 1.0;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FALLBACK_DELAY_MS: u64 = 500;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend `{other}` (expected redis|memory)")),
        }
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub expiration: Duration,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
}

#[derive(Clone)]
pub struct GenerationSettings {
    /// `None` when no credential is configured; the generator then serves fallbacks.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: NonZeroU32,
    pub top_p: f32,
    pub timeout: Duration,
    pub fallback_delay: Duration,
}

impl fmt::Debug for GenerationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("timeout", &self.timeout)
            .field("fallback_delay", &self.fallback_delay)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    load_with_env(cli, |name| std::env::var(name).ok())
}

fn load_with_env<F>(cli: &CliArgs, lookup: F) -> Result<Settings, LoadError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_env_overrides(lookup)?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::ClearCache(args)) => raw.apply_cache_overrides(&args.cache),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    generation: RawGenerationSettings,
}

impl RawSettings {
    /// Apply the conventional variables (`GROQ_API_KEY`, `REDIS_HOST`, ...) on top of
    /// file and prefixed-environment values.
    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), LoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = non_blank(lookup("GROQ_API_KEY")) {
            self.generation.api_key = Some(key);
        }
        if let Some(model) = non_blank(lookup("GROQ_MODEL")) {
            self.generation.model = Some(model);
        }
        if let Some(host) = non_blank(lookup("REDIS_HOST")) {
            self.cache.host = Some(host);
        }
        if let Some(port) = non_blank(lookup("REDIS_PORT")) {
            self.cache.port = Some(parse_env("REDIS_PORT", &port)?);
        }
        if let Some(db) = non_blank(lookup("REDIS_DB")) {
            self.cache.db = Some(parse_env("REDIS_DB", &db)?);
        }
        if let Some(ttl) = non_blank(lookup("CACHE_EXPIRATION")) {
            self.cache.expiration_seconds = Some(parse_env("CACHE_EXPIRATION", &ttl)?);
        }
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(model) = overrides.generation_model.as_ref() {
            self.generation.model = Some(model.clone());
        }
        if let Some(url) = overrides.generation_base_url.as_ref() {
            self.generation.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.generation_timeout_seconds {
            self.generation.timeout_seconds = Some(seconds);
        }
        if let Some(delay) = overrides.generation_fallback_delay_ms {
            self.generation.fallback_delay_ms = Some(delay);
        }

        self.apply_cache_overrides(&overrides.cache);
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(host) = overrides.cache_host.as_ref() {
            self.cache.host = Some(host.clone());
        }
        if let Some(port) = overrides.cache_port {
            self.cache.port = Some(port);
        }
        if let Some(db) = overrides.cache_db {
            self.cache.db = Some(db);
        }
        if let Some(seconds) = overrides.cache_expiration_seconds {
            self.cache.expiration_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            generation,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let generation = build_generation_settings(generation)?;

        Ok(Self {
            server,
            logging,
            cache,
            generation,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_host", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = non_zero_secs(graceful_secs, "server.graceful_shutdown_seconds")?;

    Ok(ServerSettings {
        public_addr,
        admin_addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(value) => CacheBackendKind::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackendKind::Redis,
    };

    let host = cache
        .host
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string());
    if host.is_empty() {
        return Err(LoadError::invalid("cache.host", "host must not be empty"));
    }

    let port = cache.port.unwrap_or(DEFAULT_REDIS_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "cache.port",
            "port must be greater than zero",
        ));
    }

    let expiration = non_zero_secs(
        cache
            .expiration_seconds
            .unwrap_or(DEFAULT_CACHE_EXPIRATION_SECS),
        "cache.expiration_seconds",
    )?;
    let connect_timeout = non_zero_secs(
        cache
            .connect_timeout_seconds
            .unwrap_or(DEFAULT_CACHE_CONNECT_TIMEOUT_SECS),
        "cache.connect_timeout_seconds",
    )?;
    let operation_timeout = non_zero_secs(
        cache
            .operation_timeout_seconds
            .unwrap_or(DEFAULT_CACHE_OPERATION_TIMEOUT_SECS),
        "cache.operation_timeout_seconds",
    )?;

    Ok(CacheSettings {
        backend,
        host,
        port,
        db: cache.db.unwrap_or(DEFAULT_REDIS_DB),
        expiration,
        connect_timeout,
        operation_timeout,
    })
}

fn build_generation_settings(
    generation: RawGenerationSettings,
) -> Result<GenerationSettings, LoadError> {
    let api_key = non_blank(generation.api_key);

    let model = non_blank(generation.model).unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string());

    let base_url = generation
        .base_url
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_GENERATION_BASE_URL.to_string());
    if base_url.is_empty() {
        return Err(LoadError::invalid(
            "generation.base_url",
            "url must not be empty",
        ));
    }

    let temperature = generation
        .temperature
        .unwrap_or(DEFAULT_GENERATION_TEMPERATURE);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(LoadError::invalid(
            "generation.temperature",
            "must be between 0 and 2",
        ));
    }

    let top_p = generation.top_p.unwrap_or(DEFAULT_GENERATION_TOP_P);
    if !(top_p > 0.0 && top_p <= 1.0) {
        return Err(LoadError::invalid(
            "generation.top_p",
            "must be greater than 0 and at most 1",
        ));
    }

    let max_tokens = NonZeroU32::new(
        generation
            .max_tokens
            .unwrap_or(DEFAULT_GENERATION_MAX_TOKENS),
    )
    .ok_or_else(|| LoadError::invalid("generation.max_tokens", "must be greater than zero"))?;

    let timeout = non_zero_secs(
        generation
            .timeout_seconds
            .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
        "generation.timeout_seconds",
    )?;

    let fallback_delay = Duration::from_millis(
        generation
            .fallback_delay_ms
            .unwrap_or(DEFAULT_FALLBACK_DELAY_MS),
    );

    Ok(GenerationSettings {
        api_key,
        model,
        base_url,
        temperature,
        max_tokens,
        top_p,
        timeout,
        fallback_delay,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    port: Option<u16>,
    admin_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    db: Option<u32>,
    expiration_seconds: Option<u64>,
    connect_timeout_seconds: Option<u64>,
    operation_timeout_seconds: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawGenerationSettings {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    timeout_seconds: Option<u64>,
    fallback_delay_ms: Option<u64>,
}

impl fmt::Debug for RawGenerationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawGenerationSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, LoadError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| LoadError::invalid(key, format!("failed to parse `{value}`: {err}")))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
