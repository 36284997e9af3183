// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::api::HttpMethod;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// User-Agent some providers require before they will answer at all.
pub const DEFAULT_USER_AGENT: &str =
    "Connection: Keep-Alive User-Agent: okhttp/5.0.0-alpha.2 Accept-Encoding: gzip, deflate";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub guide: GuideConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: Option<String>,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Use POST instead of GET for catalog requests.
    #[serde(default)]
    pub use_post: bool,
}

impl ProviderConfig {
    pub fn method(&self) -> HttpMethod {
        if self.use_post { HttpMethod::Post } else { HttpMethod::Get }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideConfig {
    /// Seconds the on-disk guide cache stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Fuzzy-match acceptance threshold in `[0, 1]`.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Bound on concurrent guide fetch tasks.
    #[serde(default = "default_pool_size")]
    pub fetch_pool_size: usize,
    /// Explicit catalog-id to guide-id mappings for channels whose
    /// advertised guide id never appears in the feed.
    #[serde(default)]
    pub id_overrides: HashMap<String, String>,
    /// Override the cache file location.
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            match_threshold: default_match_threshold(),
            fetch_pool_size: default_pool_size(),
            id_overrides: HashMap::new(),
            cache_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_match_threshold() -> f64 {
    crate::correlate::DEFAULT_MATCH_THRESHOLD
}

fn default_pool_size() -> usize {
    10
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("teleguide").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
        Self::load(&path).unwrap_or_else(|_| {
            eprintln!("Warning: Could not load config file, using defaults");
            Self::default()
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Pick a provider by name (case-insensitive); with no name, the single
    /// configured provider.
    pub fn select_provider(&self, name: Option<&str>) -> Result<&ProviderConfig> {
        match name {
            Some(wanted) => self
                .providers
                .iter()
                .find(|p| {
                    p.name
                        .as_deref()
                        .is_some_and(|n| n.eq_ignore_ascii_case(wanted))
                })
                .with_context(|| format!("No provider named '{wanted}' in config")),
            None => match self.providers.as_slice() {
                [only] => Ok(only),
                [] => anyhow::bail!("No providers configured"),
                _ => anyhow::bail!("Multiple providers configured, pass --provider"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[providers]]
            url = "http://example.com"
            username = "u"
            password = "p"
            "#,
        )
        .unwrap();

        assert_eq!(config.guide.cache_ttl_secs, 3600);
        assert_eq!(config.guide.match_threshold, 0.6);
        assert_eq!(config.guide.fetch_pool_size, 10);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(!config.providers[0].use_post);
        assert_eq!(config.providers[0].method(), HttpMethod::Get);
    }

    #[test]
    fn id_overrides_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [guide.id_overrides]
            cnn = "cnn.us"
            fox = "fox.us"
            "#,
        )
        .unwrap();
        assert_eq!(config.guide.id_overrides["cnn"], "cnn.us");
        assert_eq!(config.guide.id_overrides.len(), 2);
    }

    #[test]
    fn select_provider_by_name_is_case_insensitive() {
        let config: Config = toml::from_str(
            r#"
            [[providers]]
            name = "Home"
            url = "http://a.example"
            username = "u"
            password = "p"

            [[providers]]
            name = "Work"
            url = "http://b.example"
            username = "u"
            password = "p"
            use_post = true
            "#,
        )
        .unwrap();

        assert_eq!(
            config.select_provider(Some("work")).unwrap().url,
            "http://b.example"
        );
        assert!(config.select_provider(Some("work")).unwrap().use_post);
        assert!(config.select_provider(None).is_err());
        assert!(config.select_provider(Some("nope")).is_err());
    }
}
