use serde::Serialize;

use crate::error::{Error, Result};
use crate::metrics::{AverageMode, MetricsConfig, SkewPolicy};
use crate::storage::KeyValueStore;

pub const KEY_API_BASE_URL: &str = "api_base_url";
pub const KEY_API_TOKEN: &str = "api_token";
pub const KEY_SKEW_POLICY: &str = "skew_policy";
pub const KEY_AVERAGE_MODE: &str = "average_mode";
pub const KEY_ON_TIME_MINUTES: &str = "on_time_minutes";

pub const ENV_API_TOKEN: &str = "ORDERLENS_API_TOKEN";
pub const ENV_API_URL: &str = "ORDERLENS_API_URL";

/// Every key `config set` accepts.
pub const KNOWN_KEYS: &[&str] = &[
    KEY_API_BASE_URL,
    KEY_API_TOKEN,
    KEY_SKEW_POLICY,
    KEY_AVERAGE_MODE,
    KEY_ON_TIME_MINUTES,
];

/// Effective settings after merging the store with environment overrides.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub api_base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub metrics: MetricsConfig,
}

impl Settings {
    /// Load from the store, then apply `ORDERLENS_API_URL` and
    /// `ORDERLENS_API_TOKEN` on top.
    pub async fn load<S: KeyValueStore>(store: &S) -> Result<Self> {
        Self::load_with_env(store, |name| std::env::var(name).ok()).await
    }

    pub async fn load_with_env<S, F>(store: &S, env: F) -> Result<Self>
    where
        S: KeyValueStore,
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings {
            api_base_url: store.get(KEY_API_BASE_URL).await?,
            api_token: store.get(KEY_API_TOKEN).await?,
            metrics: MetricsConfig::default(),
        };

        if let Some(raw) = store.get(KEY_SKEW_POLICY).await? {
            settings.metrics.skew_policy = raw.parse()?;
        }
        if let Some(raw) = store.get(KEY_AVERAGE_MODE).await? {
            settings.metrics.average_mode = raw.parse()?;
        }
        if let Some(raw) = store.get(KEY_ON_TIME_MINUTES).await? {
            settings.metrics.on_time_threshold_minutes = parse_minutes(&raw)?;
        }

        let non_empty = |v: String| (!v.trim().is_empty()).then_some(v);
        if let Some(url) = env(ENV_API_URL).and_then(non_empty) {
            log::debug!("Using API URL from {ENV_API_URL}");
            settings.api_base_url = Some(url);
        }
        if let Some(token) = env(ENV_API_TOKEN).and_then(non_empty) {
            log::debug!("Using API token from {ENV_API_TOKEN}");
            settings.api_token = Some(token);
        }

        Ok(settings)
    }

    /// Base URL as a parsed `Url`, or a config error naming how to set it.
    pub fn base_url(&self) -> Result<url::Url> {
        let raw = self.api_base_url.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "no API URL configured. Run: orderlens config set {KEY_API_BASE_URL} <URL> \
                 or set {ENV_API_URL}"
            ))
        })?;
        Ok(url::Url::parse(raw)?)
    }
}

/// Validate a value before `config set` stores it.
pub fn validate(key: &str, value: &str) -> Result<()> {
    match key {
        KEY_API_BASE_URL => {
            url::Url::parse(value)?;
        }
        KEY_API_TOKEN => {}
        KEY_SKEW_POLICY => {
            value.parse::<SkewPolicy>()?;
        }
        KEY_AVERAGE_MODE => {
            value.parse::<AverageMode>()?;
        }
        KEY_ON_TIME_MINUTES => {
            parse_minutes(value)?;
        }
        other => {
            return Err(Error::Config(format!(
                "unknown config key '{other}' (known: {})",
                KNOWN_KEYS.join(", ")
            )))
        }
    }
    Ok(())
}

fn parse_minutes(raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{KEY_ON_TIME_MINUTES} must be a positive whole number, got '{raw}'"
        ))),
    }
}
