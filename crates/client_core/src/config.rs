use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_SETTINGS_FILE: &str = "vote_client.toml";
const ENV_PREFIX: &str = "APP__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub indexer_url: String,
    pub ledger_url: String,
    pub wallet_account: Option<String>,
    pub catalog_limit: u32,
    pub confirmations: u32,
    pub confirmation_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub confirmed_sync_attempts: usize,
    pub confirmed_sync_delay_ms: u64,
    pub content_fallback: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            indexer_url: "http://127.0.0.1:8080".into(),
            ledger_url: "http://127.0.0.1:8545".into(),
            wallet_account: None,
            catalog_limit: 50,
            confirmations: 1,
            confirmation_timeout_secs: 120,
            refresh_interval_secs: 30,
            confirmed_sync_attempts: 5,
            confirmed_sync_delay_ms: 2_000,
            content_fallback: "Content unavailable.".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    indexer_url: Option<String>,
    ledger_url: Option<String>,
    wallet_account: Option<String>,
    catalog_limit: Option<u32>,
    confirmations: Option<u32>,
    confirmation_timeout_secs: Option<u64>,
    refresh_interval_secs: Option<u64>,
    confirmed_sync_attempts: Option<usize>,
    confirmed_sync_delay_ms: Option<u64>,
    content_fallback: Option<String>,
}

impl EngineSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn confirmed_sync_delay(&self) -> Duration {
        Duration::from_millis(self.confirmed_sync_delay_ms)
    }

    /// Defaults, then the settings file, then `APP__*` environment variables.
    ///
    /// A missing default file is fine; an explicitly requested one must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_SETTINGS_FILE), false),
        };
        match fs::read_to_string(path) {
            Ok(raw) => settings.apply_file(&raw, &path.display().to_string())?,
            Err(source) if explicit => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
            Err(_) => {}
        }

        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    fn apply_file(&mut self, raw: &str, path: &str) -> Result<(), ConfigError> {
        let file: SettingsFile = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;

        if let Some(v) = file.indexer_url {
            self.indexer_url = v;
        }
        if let Some(v) = file.ledger_url {
            self.ledger_url = v;
        }
        if let Some(v) = file.wallet_account {
            self.wallet_account = Some(v);
        }
        if let Some(v) = file.catalog_limit {
            self.catalog_limit = v;
        }
        if let Some(v) = file.confirmations {
            self.confirmations = v;
        }
        if let Some(v) = file.confirmation_timeout_secs {
            self.confirmation_timeout_secs = v;
        }
        if let Some(v) = file.refresh_interval_secs {
            self.refresh_interval_secs = v;
        }
        if let Some(v) = file.confirmed_sync_attempts {
            self.confirmed_sync_attempts = v;
        }
        if let Some(v) = file.confirmed_sync_delay_ms {
            self.confirmed_sync_delay_ms = v;
        }
        if let Some(v) = file.content_fallback {
            self.content_fallback = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

        if let Some(v) = var("INDEXER_URL") {
            self.indexer_url = v;
        }
        if let Some(v) = var("LEDGER_URL") {
            self.ledger_url = v;
        }
        if let Some(v) = var("WALLET_ACCOUNT") {
            self.wallet_account = (!v.trim().is_empty()).then_some(v);
        }
        if let Some(v) = var("CONTENT_FALLBACK") {
            self.content_fallback = v;
        }

        parse_env(&var, "CATALOG_LIMIT", &mut self.catalog_limit);
        parse_env(&var, "CONFIRMATIONS", &mut self.confirmations);
        parse_env(
            &var,
            "CONFIRMATION_TIMEOUT_SECS",
            &mut self.confirmation_timeout_secs,
        );
        parse_env(&var, "REFRESH_INTERVAL_SECS", &mut self.refresh_interval_secs);
        parse_env(
            &var,
            "CONFIRMED_SYNC_ATTEMPTS",
            &mut self.confirmed_sync_attempts,
        );
        parse_env(
            &var,
            "CONFIRMED_SYNC_DELAY_MS",
            &mut self.confirmed_sync_delay_ms,
        );
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("indexer_url", &self.indexer_url),
            ("ledger_url", &self.ledger_url),
        ] {
            let valid = Url::parse(value)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidUrl {
                    key,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(raw) = var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = %raw, "config: ignoring unparsable environment override"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
