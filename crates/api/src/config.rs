//! Configuration surface: environment settings, keyed config documents,
//! `{{env.NAME}}` substitution, and TTL caching.
//!
//! Each of the three config documents (agents, providers, webhooks) is
//! sourced from a file path or an http(s) URL named by its
//! `CUBICLER_*_LIST` variable. Documents are validated at load, cached per
//! namespace with a single writer and TTL expiry, and re-fetched after
//! expiry or an explicit `clear()`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cubicler_core::dispatch::AgentsSource;
use cubicler_types::config::{AgentsConfig, ProvidersConfig, WebhooksConfig};
use cubicler_types::CubiclerError;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 1503;
pub const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_CONFIG_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true, ttl: Duration::from_secs(DEFAULT_CACHE_TIMEOUT_SECS) }
    }
}

/// Process-wide settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub agents_list: Option<String>,
    pub providers_list: Option<String>,
    pub webhooks_list: Option<String>,
    pub default_call_timeout: Duration,
    pub provider_call_timeout: Duration,
    pub agent_call_timeout: Duration,
    pub strict_params: bool,
    pub config_timeout: Duration,
    pub agents_cache: CacheSettings,
    pub providers_cache: CacheSettings,
    pub webhooks_cache: CacheSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let default_call = Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS);
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            agents_list: None,
            providers_list: None,
            webhooks_list: None,
            default_call_timeout: default_call,
            provider_call_timeout: default_call,
            agent_call_timeout: default_call * 3,
            strict_params: false,
            config_timeout: Duration::from_millis(DEFAULT_CONFIG_TIMEOUT_MS),
            agents_cache: CacheSettings::default(),
            providers_cache: CacheSettings::default(),
            webhooks_cache: CacheSettings::default(),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, CubiclerError> {
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| CubiclerError::Config(format!("invalid value for {}: {}", name, raw))),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>, CubiclerError> {
    match env_string(name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if ["1", "true", "yes", "on"].contains(&v.as_str()) => Ok(Some(true)),
        Some(v) if ["0", "false", "no", "off"].contains(&v.as_str()) => Ok(Some(false)),
        Some(v) => Err(CubiclerError::Config(format!("invalid boolean for {}: {}", name, v))),
    }
}

fn cache_settings(namespace: &str) -> Result<CacheSettings, CubiclerError> {
    let mut settings = CacheSettings::default();
    if let Some(enabled) = env_bool(&format!("{}_CACHE_ENABLED", namespace))? {
        settings.enabled = enabled;
    }
    if let Some(secs) = env_parse::<u64>(&format!("{}_CACHE_TIMEOUT", namespace))? {
        settings.ttl = Duration::from_secs(secs);
    }
    Ok(settings)
}

impl Settings {
    pub fn from_env() -> Result<Self, CubiclerError> {
        let mut settings = Self::default();
        if let Some(host) = env_string("CUBICLER_HOST") {
            settings.host = host;
        }
        if let Some(port) = env_parse::<u16>("CUBICLER_PORT")? {
            settings.port = port;
        }
        settings.agents_list = env_string("CUBICLER_AGENTS_LIST");
        settings.providers_list = env_string("CUBICLER_PROVIDERS_LIST");
        settings.webhooks_list = env_string("CUBICLER_WEBHOOKS_LIST");

        if let Some(ms) = env_parse::<u64>("DEFAULT_CALL_TIMEOUT")? {
            settings.default_call_timeout = Duration::from_millis(ms);
            settings.provider_call_timeout = settings.default_call_timeout;
            settings.agent_call_timeout = settings.default_call_timeout * 3;
        }
        if let Some(ms) = env_parse::<u64>("PROVIDER_CALL_TIMEOUT")? {
            settings.provider_call_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("AGENT_CALL_TIMEOUT")? {
            settings.agent_call_timeout = Duration::from_millis(ms);
        }
        if let Some(strict) = env_bool("CUBICLER_STRICT_PARAMS")? {
            settings.strict_params = strict;
        }
        if let Some(ms) = env_parse::<u64>("CUBICLER_CONFIG_TIMEOUT")? {
            settings.config_timeout = Duration::from_millis(ms);
        }
        settings.agents_cache = cache_settings("AGENTS")?;
        settings.providers_cache = cache_settings("PROVIDERS")?;
        settings.webhooks_cache = cache_settings("WEBHOOKS")?;
        Ok(settings)
    }
}

/// Substitute `{{env.NAME}}` placeholders in every string of a JSON value.
/// Unset variables leave the placeholder untouched.
pub fn substitute_env(value: &mut Value) {
    // The pattern is tiny and fixed; compiling per load is fine.
    let pattern = Regex::new(r"\{\{env\.([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("valid pattern");
    substitute_with(value, &pattern);
}

fn substitute_with(value: &mut Value, pattern: &Regex) {
    match value {
        Value::String(text) => {
            let replaced = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
                match std::env::var(&caps[1]) {
                    Ok(found) => found,
                    Err(_) => caps[0].to_string(),
                }
            });
            *text = replaced.into_owned();
        }
        Value::Array(items) => {
            for item in items {
                substitute_with(item, pattern);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                substitute_with(item, pattern);
            }
        }
        _ => {}
    }
}

struct DocumentCache<T> {
    source: Option<String>,
    settings: CacheSettings,
    slot: RwLock<Option<(T, Instant)>>,
}

impl<T: Clone> DocumentCache<T> {
    fn new(source: Option<String>, settings: CacheSettings) -> Self {
        Self { source, settings, slot: RwLock::new(None) }
    }

    async fn cached(&self) -> Option<T> {
        if !self.settings.enabled {
            return None;
        }
        let slot = self.slot.read().await;
        match *slot {
            Some((ref value, loaded_at)) if loaded_at.elapsed() < self.settings.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    async fn store(&self, value: T) {
        if self.settings.enabled {
            *self.slot.write().await = Some((value, Instant::now()));
        }
    }

    async fn clear(&self) {
        *self.slot.write().await = None;
    }
}

/// Loads and caches the three config documents.
pub struct ConfigProvider {
    client: reqwest::Client,
    agents: DocumentCache<AgentsConfig>,
    providers: DocumentCache<ProvidersConfig>,
    webhooks: DocumentCache<WebhooksConfig>,
}

impl ConfigProvider {
    pub fn new(settings: &Settings) -> Result<Self, CubiclerError> {
        let client = reqwest::Client::builder()
            .timeout(settings.config_timeout)
            .build()
            .map_err(|e| CubiclerError::Transport(format!("failed to build client: {}", e)))?;
        Ok(Self {
            client,
            agents: DocumentCache::new(settings.agents_list.clone(), settings.agents_cache.clone()),
            providers: DocumentCache::new(
                settings.providers_list.clone(),
                settings.providers_cache.clone(),
            ),
            webhooks: DocumentCache::new(
                settings.webhooks_list.clone(),
                settings.webhooks_cache.clone(),
            ),
        })
    }

    async fn fetch_raw(&self, source: &str) -> Result<String, CubiclerError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            let response = self.client.get(source).send().await.map_err(|e| {
                CubiclerError::Config(format!("failed to fetch config {}: {}", source, e))
            })?;
            if !response.status().is_success() {
                return Err(CubiclerError::Config(format!(
                    "failed to fetch config {}: status {}",
                    source,
                    response.status()
                )));
            }
            response.text().await.map_err(|e| {
                CubiclerError::Config(format!("failed to fetch config {}: {}", source, e))
            })
        } else {
            tokio::fs::read_to_string(source).await.map_err(|e| {
                CubiclerError::Config(format!("failed to read config {}: {}", source, e))
            })
        }
    }

    async fn load_document<T>(&self, source: &Option<String>) -> Result<T, CubiclerError>
    where
        T: DeserializeOwned + Default,
    {
        let Some(source) = source.as_deref() else {
            // An unset list means the namespace is unused.
            return Ok(T::default());
        };
        let raw = self.fetch_raw(source).await?;
        let mut value: Value = serde_json::from_str(&raw)
            .map_err(|e| CubiclerError::Config(format!("invalid JSON in {}: {}", source, e)))?;
        substitute_env(&mut value);
        serde_json::from_value(value)
            .map_err(|e| CubiclerError::Config(format!("invalid config in {}: {}", source, e)))
    }

    pub async fn agents(&self) -> Result<AgentsConfig, CubiclerError> {
        if let Some(cached) = self.agents.cached().await {
            return Ok(cached);
        }
        let config: AgentsConfig = self.load_document(&self.agents.source).await?;
        config.validate()?;
        debug!(agents = config.agents.len(), "loaded agents config");
        self.agents.store(config.clone()).await;
        Ok(config)
    }

    pub async fn providers(&self) -> Result<ProvidersConfig, CubiclerError> {
        if let Some(cached) = self.providers.cached().await {
            return Ok(cached);
        }
        let config: ProvidersConfig = self.load_document(&self.providers.source).await?;
        config.validate()?;
        debug!(
            mcp = config.mcp_servers.len(),
            rest = config.rest_servers.len(),
            "loaded providers config"
        );
        self.providers.store(config.clone()).await;
        Ok(config)
    }

    pub async fn webhooks(&self) -> Result<WebhooksConfig, CubiclerError> {
        if let Some(cached) = self.webhooks.cached().await {
            return Ok(cached);
        }
        let config: WebhooksConfig = self.load_document(&self.webhooks.source).await?;
        config.validate()?;
        self.webhooks.store(config.clone()).await;
        Ok(config)
    }

    /// Drop every cached document.
    pub async fn clear(&self) {
        self.agents.clear().await;
        self.providers.clear().await;
        self.webhooks.clear().await;
    }
}

#[async_trait]
impl AgentsSource for ConfigProvider {
    async fn agents_config(&self) -> Result<AgentsConfig, CubiclerError> {
        self.agents().await
    }
}

/// Convenience for wiring: a provider behind an `Arc`.
pub type SharedConfig = Arc<ConfigProvider>;
